//! Scenario sweeps: dependence grids and calibration curves.
//!
//! A sweep is a list of independent scenarios. Each one runs through the
//! harness on its own, optionally fanned out over rayon; the hash-derived
//! seeds make the parallel output identical to the sequential one. A
//! scenario that fails validation or calibration is recorded as a failure
//! and the rest of the sweep carries on.

use mtcal_core::Method;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::harness::{MonteCarloHarness, Scenario, ScenarioSummary, SweptParameter};

// ─── Scenario grids ──────────────────────────────────────────────────

/// Scenario at the given dependence levels, calibrated at `cfg.alpha`.
pub fn scenario_at(cfg: &ExperimentConfig, phi: f64, rho: f64) -> Scenario {
    let source = cfg.source.with_dependence(phi, rho);
    let calibration = cfg.calibration_for(&source, cfg.alpha);
    Scenario::new(format!("phi={phi},rho={rho}"), source, calibration)
}

/// Phi levels at the base rho, then rho levels at the base phi.
pub fn dependence_scenarios(cfg: &ExperimentConfig) -> Vec<Scenario> {
    let (base_phi, base_rho) = (cfg.source.phi, cfg.source.rho);
    let by_phi = cfg
        .sweep
        .phi_levels
        .iter()
        .map(|&phi| scenario_at(cfg, phi, base_rho).swept(SweptParameter::Phi, phi));
    let by_rho = cfg
        .sweep
        .rho_levels
        .iter()
        .map(|&rho| scenario_at(cfg, base_phi, rho).swept(SweptParameter::Rho, rho));
    by_phi.chain(by_rho).collect()
}

// ─── Results ─────────────────────────────────────────────────────────

/// A scenario that could not run, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFailure {
    pub label: String,
    pub swept_parameter: SweptParameter,
    pub swept_value: Option<f64>,
    pub error: String,
}

/// Summaries of every scenario that ran, plus the ones that did not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    pub summaries: Vec<ScenarioSummary>,
    pub failures: Vec<ScenarioFailure>,
}

impl SweepResults {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Summaries varying `parameter`, in sweep order.
    pub fn by_parameter(&self, parameter: SweptParameter) -> Vec<&ScenarioSummary> {
        self.summaries
            .iter()
            .filter(|s| s.swept_parameter == parameter)
            .collect()
    }
}

// ─── Executor ────────────────────────────────────────────────────────

/// Runs a list of scenarios through one harness.
pub struct ScenarioSweep {
    harness: MonteCarloHarness,
    parallel: bool,
}

impl ScenarioSweep {
    pub fn new(harness: MonteCarloHarness) -> Self {
        Self {
            harness,
            parallel: true,
        }
    }

    /// Build the harness from an experiment config.
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self::new(MonteCarloHarness::new(cfg.seed, cfg.trials, cfg.methods.clone()))
            .with_parallelism(cfg.parallel)
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn harness(&self) -> &MonteCarloHarness {
        &self.harness
    }

    /// Run every scenario at every level in `alphas`.
    pub fn run(&self, scenarios: &[Scenario], alphas: &[f64]) -> SweepResults {
        self.execute(scenarios, |_| alphas.to_vec())
    }

    /// Run every scenario at its own calibration level.
    pub fn run_single_level(&self, scenarios: &[Scenario]) -> SweepResults {
        self.execute(scenarios, |s| vec![s.calibration.alpha])
    }

    fn execute<F>(&self, scenarios: &[Scenario], levels: F) -> SweepResults
    where
        F: Fn(&Scenario) -> Vec<f64> + Sync,
    {
        info!(
            scenarios = scenarios.len(),
            parallel = self.parallel,
            "starting sweep"
        );
        let run_one = |s: &Scenario| self.harness.run_levels(s, &levels(s));
        let outcomes: Vec<_> = if self.parallel {
            scenarios.par_iter().map(|s| (s, run_one(s))).collect()
        } else {
            scenarios.iter().map(|s| (s, run_one(s))).collect()
        };

        let mut results = SweepResults::default();
        for (scenario, outcome) in outcomes {
            match outcome {
                Ok(summaries) => results.summaries.extend(summaries),
                Err(e) => {
                    warn!(scenario = %scenario.label, error = %e, "scenario failed");
                    results.failures.push(ScenarioFailure {
                        label: scenario.label.clone(),
                        swept_parameter: scenario.swept_parameter,
                        swept_value: scenario.swept_value,
                        error: e.to_string(),
                    });
                }
            }
        }
        results
    }
}

// ─── Calibration curves ──────────────────────────────────────────────

/// Realized versus nominal error of one method at one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub scenario: String,
    pub phi: f64,
    pub rho: f64,
    pub method: Method,
    pub nominal_alpha: f64,
    pub fwer_mean: f64,
    pub fwer_se: f64,
    pub fdr_mean: f64,
    pub fdr_se: f64,
    pub power_mean: Option<f64>,
    pub power_se: Option<f64>,
    /// |realized FWER - nominal alpha|.
    pub calibration_error: f64,
    pub trials: usize,
}

/// Flatten summaries into calibration points, ordered by scenario, then
/// level, then method.
pub fn calibration_points(summaries: &[ScenarioSummary]) -> Vec<CalibrationPoint> {
    // summaries of one scenario are contiguous; number the groups
    let mut group = 0usize;
    let mut keyed: Vec<(usize, CalibrationPoint)> = Vec::new();
    for (i, s) in summaries.iter().enumerate() {
        if i > 0 && summaries[i - 1].label != s.label {
            group += 1;
        }
        keyed.extend(s.methods.iter().map(|m| {
            (
                group,
                CalibrationPoint {
                    scenario: s.label.clone(),
                    phi: s.phi,
                    rho: s.rho,
                    method: m.method,
                    nominal_alpha: s.alpha,
                    fwer_mean: m.fwer.mean,
                    fwer_se: m.fwer.std_error,
                    fdr_mean: m.fdr.mean,
                    fdr_se: m.fdr.std_error,
                    power_mean: m.power.map(|p| p.mean),
                    power_se: m.power.map(|p| p.std_error),
                    calibration_error: (m.fwer.mean - s.alpha).abs(),
                    trials: s.trials,
                },
            )
        }));
    }
    keyed.sort_by(|(ga, a), (gb, b)| {
        ga.cmp(gb)
            .then(a.nominal_alpha.total_cmp(&b.nominal_alpha))
            .then(a.method.cmp(&b.method))
    });
    keyed.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockLengthRule;

    fn quick_config() -> ExperimentConfig {
        let mut cfg = ExperimentConfig {
            trials: 4,
            n_resamples: 20,
            block_length: BlockLengthRule::RuleOfThumb,
            methods: vec![Method::Bonferroni, Method::BootstrapSingle],
            ..Default::default()
        };
        cfg.source.periods = 50;
        cfg.sweep.phi_levels = vec![0.0, 0.9];
        cfg.sweep.rho_levels = vec![0.2];
        cfg
    }

    #[test]
    fn dependence_grid_layout() {
        let cfg = quick_config();
        let scenarios = dependence_scenarios(&cfg);
        assert_eq!(scenarios.len(), 3);
        assert_eq!(scenarios[0].swept_parameter, SweptParameter::Phi);
        assert_eq!(scenarios[0].source.rho, cfg.source.rho);
        assert_eq!(scenarios[1].calibration.block_length, 10);
        assert_eq!(scenarios[2].swept_parameter, SweptParameter::Rho);
        assert_eq!(scenarios[2].source.phi, cfg.source.phi);
    }

    #[test]
    fn parallel_matches_sequential() {
        let cfg = quick_config();
        let scenarios = dependence_scenarios(&cfg);
        let seq = ScenarioSweep::from_config(&cfg).with_parallelism(false).run(&scenarios, &[cfg.alpha]);
        let par = ScenarioSweep::from_config(&cfg).with_parallelism(true).run(&scenarios, &[cfg.alpha]);
        assert_eq!(seq, par);
        assert!(seq.is_complete());
        assert_eq!(seq.by_parameter(SweptParameter::Phi).len(), 2);
    }

    #[test]
    fn calibration_points_sorted_by_level_then_method() {
        let cfg = quick_config();
        let scenarios = vec![scenario_at(&cfg, 0.3, 0.0)];
        let results = ScenarioSweep::from_config(&cfg).run(&scenarios, &[0.05, 0.01]);
        let points = calibration_points(&results.summaries);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].nominal_alpha, 0.01);
        assert_eq!(points[0].method, Method::Bonferroni);
        assert_eq!(points[3].method, Method::BootstrapSingle);
        for p in &points {
            assert!((p.calibration_error - (p.fwer_mean - p.nominal_alpha).abs()).abs() < 1e-12);
        }
    }
}

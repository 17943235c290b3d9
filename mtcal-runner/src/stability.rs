//! Discovery stability under resampling.
//!
//! For one method and level, each trial draws a panel, calibrates the
//! method on it and then replays the frozen rejection rule on B block-cluster
//! resamples of the (uncentered) panel:
//! - classical methods reapply their corrector to the resample's p-values
//! - the single-threshold bootstrap compares resample |t| to the trial's t*
//! - the step-down bootstrap walks the resample's |t| against the trial's
//!   bootstrap matrix
//!
//! A series' survival rate is the fraction of resamples that reject it; the
//! spread of its resampled p-values is summarized by their IQR. Survival
//! and IQR are then averaged over true-effect and null series separately.

use mtcal_core::distribution::{iqr, mean, percentile};
use mtcal_core::{
    compute_statistics, CalibrationConfig, GroundTruth, LabeledPanel, Method, MethodInput,
    PanelSource, RejectionSet, RngHierarchy, Stream,
};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::harness::{HarnessError, Scenario};
use crate::summary::MetricSummary;

/// Floor on null survival when forming the stability ratio.
pub const NULL_SURVIVAL_FLOOR: f64 = 0.001;

// ─── One panel ───────────────────────────────────────────────────────

/// Stability of every series of one panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelStability {
    pub original: RejectionSet,
    /// Fraction of resamples rejecting each series.
    pub survival_rate: Vec<f64>,
    /// p75 - p25 of each series' resampled p-values.
    pub p_value_iqr: Vec<f64>,
}

/// Mean and median of a group of series; `None` for an empty group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub mean: f64,
    pub median: f64,
}

impl GroupStats {
    fn of(values: &[f64], truth: &GroundTruth, effects: bool) -> Option<Self> {
        let group: Vec<f64> = values
            .iter()
            .zip(truth.as_slice())
            .filter(|&(_, &is_effect)| is_effect == effects)
            .map(|(&v, _)| v)
            .collect();
        (!group.is_empty()).then(|| GroupStats {
            mean: mean(&group),
            median: percentile(&group, 50.0),
        })
    }
}

impl PanelStability {
    pub fn survival(&self, truth: &GroundTruth, effects: bool) -> Option<GroupStats> {
        GroupStats::of(&self.survival_rate, truth, effects)
    }

    pub fn iqr(&self, truth: &GroundTruth, effects: bool) -> Option<GroupStats> {
        GroupStats::of(&self.p_value_iqr, truth, effects)
    }
}

/// Calibrate `method` on `labeled` with `calibration_rng`, then replay its
/// rule on `config.n_resamples` resamples drawn with `resample_rng`.
pub fn analyze_panel<R1: Rng + ?Sized, R2: Rng + ?Sized>(
    labeled: &LabeledPanel,
    method: Method,
    config: &CalibrationConfig,
    calibration_rng: &mut R1,
    resample_rng: &mut R2,
) -> Result<PanelStability, HarnessError> {
    let stats = compute_statistics(&labeled.panel, config.mode);
    let input = MethodInput::from_labeled(labeled, &stats);
    let calibrated = method.calibrate(&input, config, calibration_rng)?;

    let k = labeled.panel.series();
    let b = config.n_resamples;
    let resampler = config.resampler();
    let mut survived = vec![0usize; k];
    let mut p_values: Vec<Vec<f64>> = vec![Vec::with_capacity(b); k];
    for _ in 0..b {
        let draw = resampler.resample(&labeled.panel, &labeled.clusters, resample_rng)?;
        let draw_stats = compute_statistics(&draw, config.mode);
        let rejected = calibrated.rule.reject(&draw_stats)?;
        for (i, series_p) in p_values.iter_mut().enumerate() {
            series_p.push(draw_stats.p[i]);
            if rejected.is_rejected(i) {
                survived[i] += 1;
            }
        }
    }

    Ok(PanelStability {
        original: calibrated.outcome.rejections,
        survival_rate: survived.iter().map(|&s| s as f64 / b as f64).collect(),
        p_value_iqr: p_values.iter().map(|p| iqr(p)).collect(),
    })
}

// ─── Across trials ───────────────────────────────────────────────────

/// Stability of one method at one level across trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilitySummary {
    pub scenario: String,
    pub method: Method,
    pub alpha: f64,
    pub trials: usize,
    pub true_survival: Option<MetricSummary>,
    pub null_survival: Option<MetricSummary>,
    /// Across-trial mean of the per-trial median survival.
    pub true_survival_median: Option<f64>,
    pub null_survival_median: Option<f64>,
    pub true_iqr: Option<MetricSummary>,
    pub null_iqr: Option<MetricSummary>,
    /// true survival / max(null survival, 0.001).
    pub stability_ratio: Option<f64>,
}

#[derive(Debug, Default)]
struct StabilityAccumulator {
    true_survival: Vec<Option<f64>>,
    null_survival: Vec<Option<f64>>,
    true_median: Vec<Option<f64>>,
    null_median: Vec<Option<f64>>,
    true_iqr: Vec<Option<f64>>,
    null_iqr: Vec<Option<f64>>,
}

impl StabilityAccumulator {
    fn push(&mut self, panel: &PanelStability, truth: &GroundTruth) {
        let t = panel.survival(truth, true);
        let n = panel.survival(truth, false);
        self.true_survival.push(t.map(|g| g.mean));
        self.null_survival.push(n.map(|g| g.mean));
        self.true_median.push(t.map(|g| g.median));
        self.null_median.push(n.map(|g| g.median));
        self.true_iqr.push(panel.iqr(truth, true).map(|g| g.mean));
        self.null_iqr.push(panel.iqr(truth, false).map(|g| g.mean));
    }

    fn summarize(&self, scenario: &str, method: Method, alpha: f64) -> StabilitySummary {
        let true_survival = MetricSummary::from_defined(&self.true_survival);
        let null_survival = MetricSummary::from_defined(&self.null_survival);
        let stability_ratio = match (true_survival, null_survival) {
            (Some(t), Some(n)) => Some(t.mean / n.mean.max(NULL_SURVIVAL_FLOOR)),
            _ => None,
        };
        StabilitySummary {
            scenario: scenario.to_string(),
            method,
            alpha,
            trials: self.true_survival.len(),
            true_survival,
            null_survival,
            true_survival_median: MetricSummary::from_defined(&self.true_median).map(|s| s.mean),
            null_survival_median: MetricSummary::from_defined(&self.null_median).map(|s| s.mean),
            true_iqr: MetricSummary::from_defined(&self.true_iqr),
            null_iqr: MetricSummary::from_defined(&self.null_iqr),
            stability_ratio,
        }
    }
}

/// Runs stability cells of a scenario.
#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    rng: RngHierarchy,
    trials: usize,
    parallel: bool,
}

impl StabilityAnalyzer {
    pub fn new(master_seed: u64, trials: usize) -> Self {
        Self {
            rng: RngHierarchy::new(master_seed),
            trials,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution over cells.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Stability of `method` at `alpha` over all trials of `scenario`.
    pub fn run_cell(
        &self,
        scenario: &Scenario,
        method: Method,
        alpha: f64,
    ) -> Result<StabilitySummary, HarnessError> {
        if self.trials == 0 {
            return Err(HarnessError::NoTrials);
        }
        let config = scenario.calibration.with_alpha(alpha);
        scenario.validate()?;
        config.validate()?;

        let mut acc = StabilityAccumulator::default();
        for trial in 0..self.trials as u64 {
            let labeled = scenario
                .source
                .draw(&mut self.rng.rng_for(&scenario.label, trial, Stream::Data))?;
            let panel = analyze_panel(
                &labeled,
                method,
                &config,
                &mut self.rng.rng_for(&scenario.label, trial, Stream::Calibration),
                &mut self.rng.rng_for(&scenario.label, trial, Stream::Stability),
            )?;
            acc.push(&panel, &labeled.truth);
        }
        Ok(acc.summarize(&scenario.label, method, alpha))
    }

    /// Every (level, method) cell, ordered by level then method. Cells run
    /// independently; the first failure is returned.
    pub fn run_grid(
        &self,
        scenario: &Scenario,
        methods: &[Method],
        alphas: &[f64],
    ) -> Result<Vec<StabilitySummary>, HarnessError> {
        let cells: Vec<(f64, Method)> = alphas
            .iter()
            .flat_map(|&a| methods.iter().map(move |&m| (a, m)))
            .collect();
        info!(
            scenario = %scenario.label,
            cells = cells.len(),
            trials = self.trials,
            "running stability grid"
        );
        if self.parallel {
            cells
                .par_iter()
                .map(|&(alpha, method)| self.run_cell(scenario, method, alpha))
                .collect()
        } else {
            cells
                .iter()
                .map(|&(alpha, method)| self.run_cell(scenario, method, alpha))
                .collect()
        }
    }
}

//! Monte Carlo harness.
//!
//! One trial draws a panel, computes statistics once, applies every
//! configured method at every requested level and scores each rejection
//! set against the ground truth. After all trials each (level, method) cell
//! is reduced to `MetricSummary` values.
//!
//! Randomness comes from the RNG hierarchy keyed by (scenario label, trial,
//! stream), so a trial reproduces regardless of which thread runs it or in
//! which order scenarios are visited. Every method and level of a trial
//! reseeds the calibration stream, so all bootstrap methods at all levels
//! see the same resamples.

use std::fmt;

use mtcal_core::{
    compute_statistics, evaluate, CalibrationConfig, ClusteredAr1Source, EvaluationError, Method,
    MethodError, MethodInput, PanelSource, PerformanceRecord, ResampleError, RngHierarchy, SourceError,
    StatisticMode, Stream,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::summary::MetricSummary;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid data source: {0}")]
    Source(#[from] SourceError),
    #[error("invalid calibration: {0}")]
    Calibration(#[from] mtcal_core::ConfigError),
    #[error(transparent)]
    Method(#[from] MethodError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("harness needs at least one trial")]
    NoTrials,
    #[error("no significance levels requested")]
    NoLevels,
}

// ─── Scenarios ───────────────────────────────────────────────────────

/// Which parameter a scenario varies relative to the base configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweptParameter {
    None,
    Phi,
    Rho,
}

impl fmt::Display for SweptParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SweptParameter::None => "none",
            SweptParameter::Phi => "phi",
            SweptParameter::Rho => "rho",
        })
    }
}

/// One cell of an experiment: a data source and calibration settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Display label; also keys the scenario's random streams.
    pub label: String,
    pub swept_parameter: SweptParameter,
    pub swept_value: Option<f64>,
    pub source: ClusteredAr1Source,
    pub calibration: CalibrationConfig,
}

impl Scenario {
    pub fn new(label: impl Into<String>, source: ClusteredAr1Source, calibration: CalibrationConfig) -> Self {
        Self {
            label: label.into(),
            swept_parameter: SweptParameter::None,
            swept_value: None,
            source,
            calibration,
        }
    }

    pub fn swept(mut self, parameter: SweptParameter, value: f64) -> Self {
        self.swept_parameter = parameter;
        self.swept_value = Some(value);
        self
    }

    /// Reject the scenario before any simulation work.
    pub fn validate(&self) -> Result<(), HarnessError> {
        self.source.validate()?;
        self.calibration.validate()?;
        let (block_length, periods) = (self.calibration.block_length, self.source.periods);
        if self.calibration.scheme.uses_blocks() && block_length > periods {
            return Err(ResampleError::InvalidBlockLength {
                block_length,
                periods,
            }
            .into());
        }
        Ok(())
    }
}

// ─── Per-trial results ───────────────────────────────────────────────

/// One method at one level on one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodTrial {
    pub method: Method,
    pub alpha: f64,
    pub record: PerformanceRecord,
    pub threshold: Option<f64>,
    pub effective_tests: Option<f64>,
}

#[derive(Debug, Default)]
struct MethodAccumulator {
    fwer: Vec<f64>,
    fdr: Vec<f64>,
    power: Vec<Option<f64>>,
    effective_tests: Vec<f64>,
    thresholds: Vec<f64>,
}

impl MethodAccumulator {
    fn push(&mut self, trial: &MethodTrial) {
        self.fwer.push(trial.record.fwer);
        self.fdr.push(trial.record.fdr);
        self.power.push(trial.record.power);
        self.effective_tests.extend(trial.effective_tests);
        self.thresholds.extend(trial.threshold);
    }

    fn summarize(&self, method: Method) -> Result<MethodSummary, HarnessError> {
        Ok(MethodSummary {
            method,
            fwer: MetricSummary::from_values(&self.fwer).ok_or(HarnessError::NoTrials)?,
            fdr: MetricSummary::from_values(&self.fdr).ok_or(HarnessError::NoTrials)?,
            power: MetricSummary::from_defined(&self.power),
            effective_tests: MetricSummary::from_values(&self.effective_tests),
            threshold: MetricSummary::from_values(&self.thresholds),
        })
    }
}

// ─── Summaries ───────────────────────────────────────────────────────

/// Across-trial metrics of one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub method: Method,
    pub fwer: MetricSummary,
    pub fdr: MetricSummary,
    /// `None` when no trial had a true effect.
    pub power: Option<MetricSummary>,
    /// Bootstrap methods only.
    pub effective_tests: Option<MetricSummary>,
    /// Calibrated threshold t* (bootstrap methods only).
    pub threshold: Option<MetricSummary>,
}

/// All method summaries of one scenario at one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub label: String,
    pub swept_parameter: SweptParameter,
    pub swept_value: Option<f64>,
    pub phi: f64,
    pub rho: f64,
    pub alpha: f64,
    pub block_length: usize,
    pub mode: StatisticMode,
    pub trials: usize,
    pub methods: Vec<MethodSummary>,
}

impl ScenarioSummary {
    pub fn method(&self, method: Method) -> Option<&MethodSummary> {
        self.methods.iter().find(|m| m.method == method)
    }
}

// ─── Harness ─────────────────────────────────────────────────────────

/// Drives independent trials of a scenario.
#[derive(Debug, Clone)]
pub struct MonteCarloHarness {
    rng: RngHierarchy,
    trials: usize,
    methods: Vec<Method>,
}

impl MonteCarloHarness {
    pub fn new(master_seed: u64, trials: usize, methods: Vec<Method>) -> Self {
        Self {
            rng: RngHierarchy::new(master_seed),
            trials,
            methods,
        }
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn rng(&self) -> &RngHierarchy {
        &self.rng
    }

    /// Run all trials at the scenario's own level.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioSummary, HarnessError> {
        self.run_levels(scenario, &[scenario.calibration.alpha])?
            .pop()
            .ok_or(HarnessError::NoLevels)
    }

    /// Run all trials once and evaluate every method at each level in
    /// `alphas`. Returns one summary per level, in input order.
    pub fn run_levels(
        &self,
        scenario: &Scenario,
        alphas: &[f64],
    ) -> Result<Vec<ScenarioSummary>, HarnessError> {
        if self.trials == 0 {
            return Err(HarnessError::NoTrials);
        }
        if alphas.is_empty() {
            return Err(HarnessError::NoLevels);
        }
        scenario.validate()?;
        for &alpha in alphas {
            scenario.calibration.with_alpha(alpha).validate()?;
        }
        info!(
            scenario = %scenario.label,
            phi = scenario.source.phi,
            rho = scenario.source.rho,
            trials = self.trials,
            levels = alphas.len(),
            "running scenario"
        );

        let mut cells: Vec<MethodAccumulator> = (0..alphas.len() * self.methods.len())
            .map(|_| MethodAccumulator::default())
            .collect();
        for trial in 0..self.trials {
            for (cell, result) in cells.iter_mut().zip(self.run_trial(scenario, trial as u64, alphas)?) {
                cell.push(&result);
            }
        }

        alphas
            .iter()
            .enumerate()
            .map(|(level, &alpha)| {
                let methods = self
                    .methods
                    .iter()
                    .enumerate()
                    .map(|(m, &method)| cells[level * self.methods.len() + m].summarize(method))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ScenarioSummary {
                    label: scenario.label.clone(),
                    swept_parameter: scenario.swept_parameter,
                    swept_value: scenario.swept_value,
                    phi: scenario.source.phi,
                    rho: scenario.source.rho,
                    alpha,
                    block_length: scenario.calibration.block_length,
                    mode: scenario.calibration.mode,
                    trials: self.trials,
                    methods,
                })
            })
            .collect()
    }

    /// One trial: every method at every level, level-major.
    pub fn run_trial(
        &self,
        scenario: &Scenario,
        trial: u64,
        alphas: &[f64],
    ) -> Result<Vec<MethodTrial>, HarnessError> {
        let mut data_rng = self.rng.rng_for(&scenario.label, trial, Stream::Data);
        let labeled = scenario.source.draw(&mut data_rng)?;
        let stats = compute_statistics(&labeled.panel, scenario.calibration.mode);
        let input = MethodInput::from_labeled(&labeled, &stats);

        let mut results = Vec::with_capacity(alphas.len() * self.methods.len());
        for &alpha in alphas {
            let config = scenario.calibration.with_alpha(alpha);
            for &method in &self.methods {
                let mut calibration_rng = self.rng.rng_for(&scenario.label, trial, Stream::Calibration);
                let outcome = method.apply(&input, &config, &mut calibration_rng)?;
                let record = evaluate(&outcome.rejections, &labeled.truth)?;
                results.push(MethodTrial {
                    method,
                    alpha,
                    record,
                    threshold: outcome.threshold,
                    effective_tests: outcome.effective_tests,
                });
            }
        }
        debug!(scenario = %scenario.label, trial, "trial complete");
        Ok(results)
    }
}

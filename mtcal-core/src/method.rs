//! Closed registry of correction methods behind one interface.
//!
//! Every method maps the same input (panel, clusters, statistics) and
//! configuration to a rejection set plus whatever auxiliary output it has.
//! Calibrating a method also yields a frozen `RejectionRule` that can be
//! replayed on other statistics of the same shape, which is what the
//! stability analysis needs.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bootstrap::{reject_above, single_threshold_from_matrix, BootstrapMatrix, CalibrationError};
use crate::config::CalibrationConfig;
use crate::correction::{benjamini_hochberg, bonferroni, holm, RejectionSet};
use crate::panel::{ClusterLabeling, LabeledPanel, Panel};
use crate::stepdown::{stepdown_from_matrix, stepdown_walk};
use crate::statistics::TestStatistics;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    #[error("unknown method '{0}' (bonferroni, holm, bh, bootstrap, stepdown)")]
    UnknownMethod(String),
    #[error("{0} is not a classical corrector")]
    NotClassical(Method),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Bonferroni,
    Holm,
    BenjaminiHochberg,
    /// Single max-|t| threshold from the block-cluster bootstrap.
    BootstrapSingle,
    /// Romano-Wolf step-down over the block-cluster bootstrap.
    BootstrapStepdown,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Bonferroni,
        Method::Holm,
        Method::BenjaminiHochberg,
        Method::BootstrapSingle,
        Method::BootstrapStepdown,
    ];

    pub const CLASSICAL: [Method; 3] = [Method::Bonferroni, Method::Holm, Method::BenjaminiHochberg];

    pub fn name(self) -> &'static str {
        match self {
            Method::Bonferroni => "bonferroni",
            Method::Holm => "holm",
            Method::BenjaminiHochberg => "bh",
            Method::BootstrapSingle => "bootstrap",
            Method::BootstrapStepdown => "stepdown",
        }
    }

    pub fn is_bootstrap(self) -> bool {
        matches!(self, Method::BootstrapSingle | Method::BootstrapStepdown)
    }

    /// Calibrate on `input` and return both the outcome and the frozen rule.
    pub fn calibrate<R: Rng + ?Sized>(
        self,
        input: &MethodInput<'_>,
        config: &CalibrationConfig,
        rng: &mut R,
    ) -> Result<Calibrated, MethodError> {
        config.validate().map_err(CalibrationError::from)?;
        let alpha = config.alpha;
        let stats = input.stats;
        if stats.len() != input.panel.series() {
            return Err(CalibrationError::SeriesMismatch {
                got: stats.len(),
                expected: input.panel.series(),
            }
            .into());
        }

        let calibrated = match self {
            Method::Bonferroni | Method::Holm | Method::BenjaminiHochberg => {
                let rule = RejectionRule::Classical { method: self, alpha };
                let rejections = rule.reject(stats)?;
                Calibrated {
                    outcome: MethodOutcome::plain(self, rejections),
                    rule,
                }
            }
            Method::BootstrapSingle => {
                let matrix = BootstrapMatrix::draw(input.panel, input.clusters, config, rng)?;
                let single = single_threshold_from_matrix(&matrix, stats, alpha)?;
                Calibrated {
                    outcome: MethodOutcome {
                        method: self,
                        rejections: single.rejections,
                        threshold: Some(single.threshold),
                        effective_tests: Some(single.effective_tests),
                        adjusted_p_values: None,
                    },
                    rule: RejectionRule::Threshold {
                        threshold: single.threshold,
                    },
                }
            }
            Method::BootstrapStepdown => {
                let matrix = BootstrapMatrix::draw(input.panel, input.clusters, config, rng)?;
                let step = stepdown_from_matrix(&matrix, stats, alpha)?;
                Calibrated {
                    outcome: MethodOutcome {
                        method: self,
                        rejections: step.rejections,
                        threshold: Some(step.first_step_threshold),
                        effective_tests: Some(step.effective_tests),
                        adjusted_p_values: Some(step.adjusted_p_values),
                    },
                    rule: RejectionRule::Stepdown { matrix, alpha },
                }
            }
        };
        Ok(calibrated)
    }

    /// Apply the method to `input`.
    pub fn apply<R: Rng + ?Sized>(
        self,
        input: &MethodInput<'_>,
        config: &CalibrationConfig,
        rng: &mut R,
    ) -> Result<MethodOutcome, MethodError> {
        self.calibrate(input, config, rng).map(|c| c.outcome)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = MethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bonferroni" => Ok(Method::Bonferroni),
            "holm" => Ok(Method::Holm),
            "bh" | "benjamini_hochberg" | "benjamini-hochberg" => Ok(Method::BenjaminiHochberg),
            "bootstrap" | "bootstrap_single" => Ok(Method::BootstrapSingle),
            "stepdown" | "bootstrap_stepdown" | "romano_wolf" | "romano-wolf" => {
                Ok(Method::BootstrapStepdown)
            }
            _ => Err(MethodError::UnknownMethod(s.to_string())),
        }
    }
}

/// Borrowed view of one trial's data.
#[derive(Debug, Clone, Copy)]
pub struct MethodInput<'a> {
    pub panel: &'a Panel,
    pub clusters: &'a ClusterLabeling,
    pub stats: &'a TestStatistics,
}

impl<'a> MethodInput<'a> {
    pub fn new(panel: &'a Panel, clusters: &'a ClusterLabeling, stats: &'a TestStatistics) -> Self {
        Self {
            panel,
            clusters,
            stats,
        }
    }

    pub fn from_labeled(labeled: &'a LabeledPanel, stats: &'a TestStatistics) -> Self {
        Self::new(&labeled.panel, &labeled.clusters, stats)
    }
}

/// Uniform result of applying a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodOutcome {
    pub method: Method,
    pub rejections: RejectionSet,
    /// Calibrated |t| threshold (bootstrap methods only).
    pub threshold: Option<f64>,
    /// Effective number of tests diagnostic (bootstrap methods only).
    pub effective_tests: Option<f64>,
    /// Romano-Wolf adjusted p-values (step-down only).
    pub adjusted_p_values: Option<Vec<f64>>,
}

impl MethodOutcome {
    fn plain(method: Method, rejections: RejectionSet) -> Self {
        Self {
            method,
            rejections,
            threshold: None,
            effective_tests: None,
            adjusted_p_values: None,
        }
    }
}

/// A calibrated decision rule, replayable on new statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionRule {
    /// Reapply a classical corrector to the new p-values.
    Classical { method: Method, alpha: f64 },
    /// Compare |t| against a fixed calibrated threshold.
    Threshold { threshold: f64 },
    /// Rerun the step-down walk against the calibration's bootstrap matrix.
    Stepdown { matrix: BootstrapMatrix, alpha: f64 },
}

impl RejectionRule {
    pub fn reject(&self, stats: &TestStatistics) -> Result<RejectionSet, MethodError> {
        Ok(match self {
            RejectionRule::Classical { method, alpha } => match method {
                Method::Bonferroni => bonferroni(&stats.p, *alpha),
                Method::Holm => holm(&stats.p, *alpha),
                Method::BenjaminiHochberg => benjamini_hochberg(&stats.p, *alpha),
                Method::BootstrapSingle | Method::BootstrapStepdown => {
                    return Err(MethodError::NotClassical(*method));
                }
            },
            RejectionRule::Threshold { threshold } => reject_above(&stats.abs_t(), *threshold),
            RejectionRule::Stepdown { matrix, alpha } => {
                stepdown_walk(&stats.t, matrix, *alpha)?.rejections
            }
        })
    }
}

/// Outcome on the calibration data plus the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrated {
    pub outcome: MethodOutcome,
    pub rule: RejectionRule,
}

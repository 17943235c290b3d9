//! Bootstrap max-|t| calibration.
//!
//! The panel is centered first so every resample approximates the joint
//! null, whatever effects the real data carry. Each resample contributes the
//! |t| of every series to a shared B×K matrix; the single-threshold rule
//! uses only the per-draw maxima, the step-down rule (see `stepdown`) walks
//! the whole matrix.
//!
//! Key design choices:
//! - The threshold is the (1 - alpha) percentile of the sorted maxima with
//!   linear interpolation, so it depends only on their multiset.
//! - Rejection compares the ORIGINAL uncentered |t| against the threshold,
//!   strictly (`|t| > t*`).
//! - The effective number of tests is reported for interpretation only and
//!   never feeds a rejection decision.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{CalibrationConfig, ConfigError};
use crate::correction::RejectionSet;
use crate::distribution::{mean, percentile_sorted, population_std, sorted_copy, t_upper_tail};
use crate::panel::{ClusterLabeling, Panel, PanelError};
use crate::resample::ResampleError;
use crate::statistics::{abs_t_statistics, TestStatistics};

/// Everything a calibration call can fail on. All variants are
/// configuration or shape problems detected before any resampling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error("statistics cover {got} series, bootstrap matrix has {expected}")]
    SeriesMismatch { got: usize, expected: usize },
}

// ─── Bootstrap matrix ────────────────────────────────────────────────

/// |t| of every series under every bootstrap draw, stored draw by draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapMatrix {
    draws: usize,
    series: usize,
    abs_t: Vec<f64>,
}

impl BootstrapMatrix {
    /// Build from one |t| row per draw. Rows must all have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, CalibrationError> {
        let draws = rows.len();
        let series = rows.first().map_or(0, Vec::len);
        let mut abs_t = Vec::with_capacity(draws * series);
        for row in rows {
            if row.len() != series {
                return Err(CalibrationError::SeriesMismatch {
                    got: row.len(),
                    expected: series,
                });
            }
            abs_t.extend(row.into_iter().map(f64::abs));
        }
        Ok(Self {
            draws,
            series,
            abs_t,
        })
    }

    /// Draw `config.n_resamples` resamples of the centered panel and record
    /// every series' |t| under `config.mode`.
    pub fn draw<R: Rng + ?Sized>(
        panel: &Panel,
        clusters: &ClusterLabeling,
        config: &CalibrationConfig,
        rng: &mut R,
    ) -> Result<Self, CalibrationError> {
        config.validate()?;
        let resampler = config.resampler();
        resampler.check(panel, clusters)?;

        let centered = panel.centered();
        let series = panel.series();
        let mut abs_t = Vec::with_capacity(config.n_resamples * series);
        for _ in 0..config.n_resamples {
            let draw = resampler.draw_unchecked(&centered, clusters, rng);
            abs_t.extend(abs_t_statistics(&draw, config.mode));
        }
        Ok(Self {
            draws: config.n_resamples,
            series,
            abs_t,
        })
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn series(&self) -> usize {
        self.series
    }

    /// |t| of every series in draw `b`.
    pub fn row(&self, b: usize) -> &[f64] {
        &self.abs_t[b * self.series..(b + 1) * self.series]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.abs_t.chunks_exact(self.series.max(1)).take(self.draws)
    }

    /// Per-draw maxima over all series.
    pub fn maxima(&self) -> Vec<f64> {
        self.rows()
            .map(|row| row.iter().fold(0.0_f64, |m, &v| m.max(v)))
            .collect()
    }

    /// Distribution of the per-draw maxima.
    pub fn max_distribution(&self) -> BootstrapDistribution {
        BootstrapDistribution::from_maxima(self.maxima())
    }
}

// ─── Max-statistic distribution ──────────────────────────────────────

/// Sorted bootstrap maxima of |t|.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapDistribution {
    sorted: Vec<f64>,
}

impl BootstrapDistribution {
    pub fn from_maxima(maxima: Vec<f64>) -> Self {
        Self {
            sorted: sorted_copy(&maxima),
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn as_sorted(&self) -> &[f64] {
        &self.sorted
    }

    /// Calibrated threshold t*: the (1 - alpha) percentile.
    pub fn threshold(&self, alpha: f64) -> f64 {
        percentile_sorted(&self.sorted, (1.0 - alpha) * 100.0)
    }

    pub fn mean(&self) -> f64 {
        mean(&self.sorted)
    }

    pub fn std(&self) -> f64 {
        population_std(&self.sorted)
    }
}

// ─── Effective number of tests ───────────────────────────────────────

/// How many independent tests a family would need to produce the same
/// family-wise level `alpha` at threshold `t*`.
///
/// With p = P(T > t*) under a t(df) reference, independent two-sided tests
/// give FWER = 1 - (1 - 2p)^K, so K_eff = ln(1 - alpha) / ln(1 - 2p). When
/// p is outside (0, 0.5) the inversion is meaningless and K is reported.
/// The result is clamped to [1, K].
pub fn effective_number_of_tests(threshold: f64, df: f64, alpha: f64, k: usize) -> f64 {
    let k_f = k.max(1) as f64;
    let p = t_upper_tail(threshold, df);
    if !(p > 0.0 && p < 0.5) {
        return k_f;
    }
    let denom = (-2.0 * p).ln_1p();
    let k_eff = if denom.abs() < 1e-10 {
        -(1.0 - alpha).ln() / (2.0 * p)
    } else {
        (1.0 - alpha).ln() / denom
    };
    if k_eff.is_finite() {
        k_eff.clamp(1.0, k_f)
    } else {
        k_f
    }
}

// ─── Single-threshold calibration ────────────────────────────────────

/// Result of the single-threshold bootstrap rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleThresholdOutcome {
    pub rejections: RejectionSet,
    /// Calibrated threshold t*.
    pub threshold: f64,
    pub effective_tests: f64,
    pub distribution: BootstrapDistribution,
}

/// Reject every series whose |t| strictly exceeds `threshold`.
pub fn reject_above(abs_t: &[f64], threshold: f64) -> RejectionSet {
    abs_t.iter().map(|&t| t > threshold).collect::<Vec<_>>().into()
}

/// Calibrate a single max-|t| threshold on `panel` and apply it to the
/// panel's own statistics.
pub fn calibrate_single<R: Rng + ?Sized>(
    panel: &Panel,
    clusters: &ClusterLabeling,
    stats: &TestStatistics,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Result<SingleThresholdOutcome, CalibrationError> {
    let matrix = BootstrapMatrix::draw(panel, clusters, config, rng)?;
    single_threshold_from_matrix(&matrix, stats, config.alpha)
}

/// Single-threshold rule against an already drawn matrix.
pub fn single_threshold_from_matrix(
    matrix: &BootstrapMatrix,
    stats: &TestStatistics,
    alpha: f64,
) -> Result<SingleThresholdOutcome, CalibrationError> {
    if stats.len() != matrix.series() {
        return Err(CalibrationError::SeriesMismatch {
            got: stats.len(),
            expected: matrix.series(),
        });
    }
    let distribution = matrix.max_distribution();
    let threshold = distribution.threshold(alpha);
    let effective_tests = effective_number_of_tests(threshold, stats.df, alpha, stats.len());
    let rejections = reject_above(&stats.abs_t(), threshold);
    debug!(
        threshold,
        effective_tests,
        rejected = rejections.count(),
        "single-threshold bootstrap calibrated"
    );
    Ok(SingleThresholdOutcome {
        rejections,
        threshold,
        effective_tests,
        distribution,
    })
}

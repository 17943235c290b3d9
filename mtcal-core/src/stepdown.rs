//! Romano-Wolf step-down bootstrap.
//!
//! Hypotheses are visited in descending order of observed |t|. At rank k the
//! comparison set is the still-untested hypotheses (ranks k..K-1); the
//! adjusted p-value is the fraction of bootstrap draws whose maximum over
//! that set is at least the observed |t| at rank k. The walk rejects while
//! the adjusted p-value is below alpha and stops at the first failure.
//!
//! One bootstrap matrix is drawn and shared by every step. Hypotheses the
//! walk never reaches keep an adjusted p-value of 1.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bootstrap::{effective_number_of_tests, BootstrapMatrix, CalibrationError};
use crate::config::CalibrationConfig;
use crate::correction::RejectionSet;
use crate::distribution::by_abs_desc;
use crate::panel::{ClusterLabeling, Panel};
use crate::statistics::TestStatistics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepdownOutcome {
    pub rejections: RejectionSet,
    /// Adjusted p-value per series in original index order.
    pub adjusted_p_values: Vec<f64>,
    /// Series indices in the order the walk visits them.
    pub order: Vec<usize>,
    pub effective_tests: f64,
    /// (1 - alpha) percentile of the full-set maxima; the first step's cutoff.
    pub first_step_threshold: f64,
}

/// Result of one walk over a bootstrap matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct StepdownWalk {
    pub rejections: RejectionSet,
    pub adjusted_p_values: Vec<f64>,
    pub order: Vec<usize>,
}

/// Series indices by descending |t|; ties keep index order.
pub fn descending_order(t: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..t.len()).collect();
    order.sort_by(|&a, &b| by_abs_desc(&t[a], &t[b]));
    order
}

/// Walk the observed statistics `t` (signs ignored) against `matrix`.
pub fn stepdown_walk(
    t: &[f64],
    matrix: &BootstrapMatrix,
    alpha: f64,
) -> Result<StepdownWalk, CalibrationError> {
    let k = t.len();
    if k != matrix.series() {
        return Err(CalibrationError::SeriesMismatch {
            got: k,
            expected: matrix.series(),
        });
    }
    let order = descending_order(t);
    let mut rejections = RejectionSet::none(k);
    let mut adjusted_p_values = vec![1.0; k];
    if k == 0 || matrix.draws() == 0 {
        return Ok(StepdownWalk {
            rejections,
            adjusted_p_values,
            order,
        });
    }

    // suffix[b * k + r] = max over ranks r..K-1 of draw b
    let mut suffix = vec![0.0_f64; matrix.draws() * k];
    for (b, row) in matrix.rows().enumerate() {
        let mut running = 0.0_f64;
        for r in (0..k).rev() {
            running = running.max(row[order[r]]);
            suffix[b * k + r] = running;
        }
    }

    let draws = matrix.draws() as f64;
    for (rank, &idx) in order.iter().enumerate() {
        let observed = t[idx].abs();
        let exceed = (0..matrix.draws())
            .filter(|&b| suffix[b * k + rank] >= observed)
            .count();
        let p = exceed as f64 / draws;
        adjusted_p_values[idx] = p;
        if p < alpha {
            rejections.reject(idx);
        } else {
            break;
        }
    }

    Ok(StepdownWalk {
        rejections,
        adjusted_p_values,
        order,
    })
}

/// Draw one shared bootstrap matrix and run the step-down walk for the
/// panel's own statistics.
pub fn calibrate_stepdown<R: Rng + ?Sized>(
    panel: &Panel,
    clusters: &ClusterLabeling,
    stats: &TestStatistics,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Result<StepdownOutcome, CalibrationError> {
    let matrix = BootstrapMatrix::draw(panel, clusters, config, rng)?;
    stepdown_from_matrix(&matrix, stats, config.alpha)
}

/// Step-down rule against an already drawn matrix.
pub fn stepdown_from_matrix(
    matrix: &BootstrapMatrix,
    stats: &TestStatistics,
    alpha: f64,
) -> Result<StepdownOutcome, CalibrationError> {
    let walk = stepdown_walk(&stats.t, matrix, alpha)?;
    let first_step_threshold = matrix.max_distribution().threshold(alpha);
    let effective_tests =
        effective_number_of_tests(first_step_threshold, stats.df, alpha, stats.len());
    debug!(
        rejected = walk.rejections.count(),
        effective_tests, "step-down bootstrap walked"
    );
    Ok(StepdownOutcome {
        rejections: walk.rejections,
        adjusted_p_values: walk.adjusted_p_values,
        order: walk.order,
        effective_tests,
        first_step_threshold,
    })
}

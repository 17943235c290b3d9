//! Scoring a rejection set against ground truth.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correction::RejectionSet;
use crate::panel::GroundTruth;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("rejection set covers {rejections} series, ground truth {truth}")]
    LengthMismatch { rejections: usize, truth: usize },
}

/// Error and power metrics of one method on one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub false_positives: usize,
    pub true_positives: usize,
    pub total_discoveries: usize,
    pub total_true_effects: usize,
    /// 1.0 if any truly null series was rejected, else 0.0.
    pub fwer: f64,
    /// False discoveries over discoveries; 0 with no discoveries.
    pub fdr: f64,
    /// True positives over true effects; `None` when there are no true
    /// effects. Never report this as zero.
    pub power: Option<f64>,
}

pub fn evaluate(
    rejections: &RejectionSet,
    truth: &GroundTruth,
) -> Result<PerformanceRecord, EvaluationError> {
    if rejections.len() != truth.len() {
        return Err(EvaluationError::LengthMismatch {
            rejections: rejections.len(),
            truth: truth.len(),
        });
    }

    let (mut false_positives, mut true_positives) = (0, 0);
    for (&rejected, &effect) in rejections.as_slice().iter().zip(truth.as_slice()) {
        match (rejected, effect) {
            (true, true) => true_positives += 1,
            (true, false) => false_positives += 1,
            _ => {}
        }
    }
    let total_discoveries = false_positives + true_positives;
    let total_true_effects = truth.n_effects();

    let fdr = if total_discoveries == 0 {
        0.0
    } else {
        false_positives as f64 / total_discoveries as f64
    };
    let power = (total_true_effects > 0).then(|| true_positives as f64 / total_true_effects as f64);

    Ok(PerformanceRecord {
        false_positives,
        true_positives,
        total_discoveries,
        total_true_effects,
        fwer: if false_positives > 0 { 1.0 } else { 0.0 },
        fdr,
        power,
    })
}

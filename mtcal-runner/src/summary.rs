//! Summaries of a metric across Monte Carlo trials.
//!
//! Point estimates alone hide Monte Carlo noise, so every summary carries
//! the empirical [2.5, 97.5] percentile band and the standard error of the
//! mean alongside the mean itself.

use mtcal_core::distribution::{mean, percentile_sorted, population_std, sorted_copy};
use serde::{Deserialize, Serialize};

/// Mean, percentile band and standard error of one metric across trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    /// 2.5th percentile.
    pub ci_lower: f64,
    /// 97.5th percentile.
    pub ci_upper: f64,
    /// Population standard deviation across trials.
    pub std_dev: f64,
    /// std_dev / sqrt(n).
    pub std_error: f64,
    /// Trials that contributed a defined value.
    pub n: usize,
}

impl MetricSummary {
    /// Summarize `values`; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted_copy(values);
        let std_dev = population_std(values);
        Some(Self {
            mean: mean(values),
            median: percentile_sorted(&sorted, 50.0),
            ci_lower: percentile_sorted(&sorted, 2.5),
            ci_upper: percentile_sorted(&sorted, 97.5),
            std_dev,
            std_error: std_dev / (values.len() as f64).sqrt(),
            n: values.len(),
        })
    }

    /// Summarize the defined entries, skipping undefined ones. Undefined
    /// values are never counted as zero.
    pub fn from_defined(values: &[Option<f64>]) -> Option<Self> {
        let defined: Vec<f64> = values.iter().flatten().copied().collect();
        Self::from_values(&defined)
    }

    /// Return the 95% percentile band (p2.5, p97.5).
    pub fn ci_95(&self) -> (f64, f64) {
        (self.ci_lower, self.ci_upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_summary() {
        assert!(MetricSummary::from_values(&[]).is_none());
        assert!(MetricSummary::from_defined(&[None, None]).is_none());
    }

    #[test]
    fn indicator_metric() {
        // 5 of 100 trials with a false rejection
        let values: Vec<f64> = (0..100).map(|i| if i < 5 { 1.0 } else { 0.0 }).collect();
        let s = MetricSummary::from_values(&values).unwrap();
        assert!((s.mean - 0.05).abs() < 1e-12);
        assert_eq!(s.ci_lower, 0.0);
        assert_eq!(s.ci_upper, 1.0);
        assert!((s.std_error - (0.05_f64 * 0.95).sqrt() / 10.0).abs() < 1e-12);
    }

    #[test]
    fn undefined_entries_are_skipped_not_zeroed() {
        let s = MetricSummary::from_defined(&[Some(1.0), None, Some(0.5), None]).unwrap();
        assert_eq!(s.n, 2);
        assert!((s.mean - 0.75).abs() < 1e-12);
    }

    #[test]
    fn band_and_median() {
        let values: Vec<f64> = (0..=40).map(f64::from).collect();
        let s = MetricSummary::from_values(&values).unwrap();
        assert_eq!(s.median, 20.0);
        let (lo, hi) = s.ci_95();
        assert!((lo - 1.0).abs() < 1e-9 && (hi - 39.0).abs() < 1e-9);
    }
}

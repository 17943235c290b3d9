//! Per-series test statistics under a null of zero mean.
//!
//! Two modes:
//! - **Naive**: one-sample t-test, Student-t reference with T-1 df.
//! - **Prewhitened**: AR(1)-adjusted t-statistic. The lag-1 autocorrelation
//!   is estimated, clipped to [-0.99, 0.99], and the standard error of the
//!   implied mean is inflated for serial dependence. Reference df is
//!   max(1, T-2).
//!
//! Neither mode ever fails: a collapsed variance or standard error yields
//! t = 0 and p = 1 for that series.

use serde::{Deserialize, Serialize};

use crate::distribution::two_sided_p_value;
use crate::panel::Panel;

/// Autocorrelation clip bound.
pub const PHI_CLIP: f64 = 0.99;

/// A spread at or below this fraction of the series mean is rounding noise.
const RELATIVE_SPREAD_FLOOR: f64 = 1e-12;

/// True when `spread` carries no information relative to `level`. Relative
/// so that rescaling a series never changes its verdict.
fn is_degenerate(spread: f64, level: f64) -> bool {
    !spread.is_finite() || spread <= RELATIVE_SPREAD_FLOOR * level.abs()
}

/// How per-series statistics are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticMode {
    /// Plain one-sample t-test.
    #[default]
    Naive,
    /// AR(1) prewhitened t-test.
    Prewhitened,
}

impl StatisticMode {
    /// Reference degrees of freedom for a panel with `periods` rows.
    pub fn degrees_of_freedom(self, periods: usize) -> f64 {
        match self {
            StatisticMode::Naive => periods.saturating_sub(1).max(1) as f64,
            StatisticMode::Prewhitened => periods.saturating_sub(2).max(1) as f64,
        }
    }
}

impl std::fmt::Display for StatisticMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticMode::Naive => write!(f, "naive"),
            StatisticMode::Prewhitened => write!(f, "prewhitened"),
        }
    }
}

impl std::str::FromStr for StatisticMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(StatisticMode::Naive),
            "prewhitened" | "prewhiten" | "ar1" => Ok(StatisticMode::Prewhitened),
            other => Err(format!("unknown statistic mode '{other}' (naive, prewhitened)")),
        }
    }
}

/// Statistic and p-value of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesTest {
    pub t_statistic: f64,
    pub p_value: f64,
}

impl SeriesTest {
    const NEUTRAL: SeriesTest = SeriesTest {
        t_statistic: 0.0,
        p_value: 1.0,
    };
}

/// Statistics for every series of one panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStatistics {
    pub t: Vec<f64>,
    pub p: Vec<f64>,
    /// Reference degrees of freedom used for the p-values.
    pub df: f64,
}

impl TestStatistics {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// |t| per series.
    pub fn abs_t(&self) -> Vec<f64> {
        self.t.iter().map(|t| t.abs()).collect()
    }

    /// Largest |t| across series (0 for an empty vector).
    pub fn max_abs_t(&self) -> f64 {
        self.t.iter().fold(0.0_f64, |m, t| m.max(t.abs()))
    }
}

/// Compute statistics for every series of `panel`.
pub fn compute_statistics(panel: &Panel, mode: StatisticMode) -> TestStatistics {
    let df = mode.degrees_of_freedom(panel.periods());
    let (t, p) = panel
        .columns()
        .map(|series| {
            let test = match mode {
                StatisticMode::Naive => naive_t_test(series),
                StatisticMode::Prewhitened => prewhitened_t_test(series),
            };
            (test.t_statistic, test.p_value)
        })
        .unzip();
    TestStatistics { t, p, df }
}

/// Only the |t| per series; skips the p-value work in bootstrap loops.
pub fn abs_t_statistics(panel: &Panel, mode: StatisticMode) -> Vec<f64> {
    panel
        .columns()
        .map(|series| match mode {
            StatisticMode::Naive => naive_t(series).abs(),
            StatisticMode::Prewhitened => prewhitened_t(series).0.abs(),
        })
        .collect()
}

/// One-sample t-test of H0: mean = 0, two-sided.
pub fn naive_t_test(series: &[f64]) -> SeriesTest {
    if series.len() < 2 {
        return SeriesTest::NEUTRAL;
    }
    let t = naive_t(series);
    if t == 0.0 {
        return SeriesTest::NEUTRAL;
    }
    let df = (series.len() - 1) as f64;
    SeriesTest {
        t_statistic: t,
        p_value: two_sided_p_value(t, df),
    }
}

fn naive_t(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean = series.iter().sum::<f64>() / n_f;
    let var = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n_f - 1.0);
    let sd = var.sqrt();
    if is_degenerate(sd, mean) {
        return 0.0;
    }
    mean / (sd / n_f.sqrt())
}

/// AR(1) prewhitened test of H0: mean = 0, two-sided.
pub fn prewhitened_t_test(series: &[f64]) -> SeriesTest {
    if series.len() < 2 {
        return SeriesTest::NEUTRAL;
    }
    let (t, _) = prewhitened_t(series);
    if t == 0.0 {
        return SeriesTest::NEUTRAL;
    }
    let df = series.len().saturating_sub(2).max(1) as f64;
    SeriesTest {
        t_statistic: t,
        p_value: two_sided_p_value(t, df),
    }
}

/// Clipped lag-1 autocorrelation gamma_1 / gamma_0. Zero for a constant
/// series.
pub fn lag1_autocorrelation(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let gamma0 = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if is_degenerate(gamma0.sqrt(), mean) {
        return 0.0;
    }
    let gamma1 = series
        .windows(2)
        .map(|w| (w[1] - mean) * (w[0] - mean))
        .sum::<f64>()
        / n as f64;
    (gamma1 / gamma0).clamp(-PHI_CLIP, PHI_CLIP)
}

/// Returns (t, phi_hat).
fn prewhitened_t(series: &[f64]) -> (f64, f64) {
    let n = series.len();
    let n_f = n as f64;
    let mean = series.iter().sum::<f64>() / n_f;
    let phi = lag1_autocorrelation(series);
    let sample_var = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n_f - 1.0);
    if is_degenerate(sample_var.sqrt(), mean) {
        return (0.0, phi);
    }
    let mu = mean * (1.0 - phi);

    // Stationary initialization keeps the first residual on the innovation scale.
    let first = (series[0] - mean) * (1.0 - phi * phi).max(0.0).sqrt();
    let ss = first * first
        + series
            .windows(2)
            .map(|w| {
                let e = w[1] - mu - phi * w[0];
                e * e
            })
            .sum::<f64>();
    let sigma2 = ss / (n_f - 1.0);

    let se = if phi.abs() >= PHI_CLIP {
        // At the clip the AR(1) formula is unreliable; inflate the raw
        // variance of the mean by the largest long-run factor instead.
        (sample_var * (1.0 + PHI_CLIP) / ((1.0 - PHI_CLIP) * n_f)).sqrt()
    } else {
        (sigma2 * (1.0 + phi) / (n_f * (1.0 - phi))).sqrt()
    };

    // se * sqrt(n) is the long-run deviation, on the same scale as the mean.
    if is_degenerate(se * n_f.sqrt(), mean) {
        return (0.0, phi);
    }
    (mu / se, phi)
}

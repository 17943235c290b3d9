//! Student's t reference distribution and empirical percentiles.
//!
//! Implements from first principles:
//! - Lanczos approximation for ln(Gamma)
//! - Regularized incomplete beta function (modified Lentz continued fraction)
//! - Student's t CDF, upper tail and two-sided p-values
//! - Linear-interpolation percentiles over sorted samples
//!
//! Every caller in the engine needs only a handful of t evaluations per
//! series, so accuracy to ~1e-10 is more useful here than speed.

use std::cmp::Ordering;

// ─── Special functions ───────────────────────────────────────────────

/// Lanczos approximation for ln(Gamma(x)), g=7, n=9.
pub(crate) fn ln_gamma(x: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const LANCZOS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;
    use std::f64::consts::PI;

    if x < 0.5 {
        // Reflection: Gamma(x) * Gamma(1-x) = pi / sin(pi*x)
        let sin_pi_x = (PI * x).sin();
        if sin_pi_x.abs() < 1e-300 {
            return f64::INFINITY;
        }
        return PI.ln() - sin_pi_x.abs().ln() - ln_gamma(1.0 - x);
    }

    let z = x - 1.0;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, &c)| acc + c / (z + i as f64));

    let t = z + G + 0.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta I_x(a, b).
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return f64::NAN;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }

    // The continued fraction converges fast only below the mean.
    if x > (a + 1.0) / (a + b + 2.0) {
        return 1.0 - incomplete_beta(b, a, 1.0 - x);
    }

    let ln_front =
        a * x.ln() + b * (1.0 - x).ln() - ln_gamma(a) - ln_gamma(b) + ln_gamma(a + b) - a.ln();

    ln_front.exp() * beta_continued_fraction(a, b, x)
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-30;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.0_f64;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut f = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;

        let even = m * (b - m) * x / ((a + 2.0 * m - 1.0) * (a + 2.0 * m));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        f *= c * d;

        let odd = -((a + m) * (a + b + m) * x) / ((a + 2.0 * m) * (a + 2.0 * m + 1.0));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = c * d;
        f *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }

    f
}

// ─── Student's t ─────────────────────────────────────────────────────

/// Student's t CDF: P(T <= t) for `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 || t.is_nan() {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    if t.is_infinite() {
        return if t > 0.0 { 1.0 } else { 0.0 };
    }

    let tail = 0.5 * incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Upper tail P(T > t).
///
/// Computed directly from the incomplete beta so that small tail
/// probabilities do not cancel against 1.
pub fn t_upper_tail(t: f64, df: f64) -> f64 {
    if df <= 0.0 || t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return if t > 0.0 { 0.0 } else { 1.0 };
    }
    let half = 0.5 * incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t >= 0.0 {
        half
    } else {
        1.0 - half
    }
}

/// Two-sided p-value P(|T| >= |t|), clamped to [0, 1].
pub fn two_sided_p_value(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { 1.0 } else { 0.0 };
    }
    (2.0 * t_upper_tail(t.abs(), df)).clamp(0.0, 1.0)
}

// ─── Percentiles ─────────────────────────────────────────────────────

/// Sort a copy of `values` ascending using a total order.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile (0..=100) of an ascending slice with linear interpolation
/// between closest ranks. Returns NaN for an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            sorted[lo] * (1.0 - frac) + sorted[hi] * frac
        }
    }
}

/// Percentile of unsorted values (copies and sorts).
pub fn percentile(values: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted_copy(values), p)
}

/// Interquartile range (p75 - p25).
pub fn iqr(values: &[f64]) -> f64 {
    let sorted = sorted_copy(values);
    percentile_sorted(&sorted, 75.0) - percentile_sorted(&sorted, 25.0)
}

/// Arithmetic mean; NaN when empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (denominator n); NaN when empty.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Comparator for descending order by absolute value; ties keep input order
/// when used with a stable sort.
pub(crate) fn by_abs_desc(a: &f64, b: &f64) -> Ordering {
    b.abs().total_cmp(&a.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ln_gamma_known_values() {
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!(ln_gamma(2.0).abs() < 1e-10);
        assert!((ln_gamma(3.0) - 2.0_f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn t_cdf_at_zero_is_half() {
        for df in [1.0, 10.0, 198.0] {
            assert!((t_cdf(0.0, df) - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn t_cdf_symmetry() {
        for &t in &[0.5, 1.0, 2.0, 3.0] {
            let s = t_cdf(-t, 10.0) + t_cdf(t, 10.0);
            assert!((s - 1.0).abs() < 1e-10, "t={t}: sum {s}");
        }
    }

    #[test]
    fn t_cdf_cauchy_and_normal_limits() {
        // df=1 is Cauchy: CDF(1) = 0.75
        assert!((t_cdf(1.0, 1.0) - 0.75).abs() < 1e-8);
        assert!((t_cdf(1.96, 1e5) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn two_sided_p_known_values() {
        // t_{0.975, 10} = 2.228
        assert!((two_sided_p_value(2.228, 10.0) - 0.05).abs() < 1e-3);
        assert!((two_sided_p_value(-2.228, 10.0) - 0.05).abs() < 1e-3);
        assert_eq!(two_sided_p_value(0.0, 10.0), 1.0);
        assert_eq!(two_sided_p_value(f64::INFINITY, 10.0), 0.0);
    }

    #[test]
    fn upper_tail_keeps_precision_far_out() {
        let tail = t_upper_tail(12.0, 198.0);
        assert!(tail > 0.0 && tail < 1e-20);
    }

    #[test]
    fn percentile_interpolates_like_numpy() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(percentile_sorted(&sorted, 50.0), 3.0);
        assert_eq!(percentile_sorted(&sorted, 100.0), 5.0);
        // rank = 0.95 * 4 = 3.8
        assert!((percentile_sorted(&sorted, 95.0) - 4.8).abs() < 1e-12);
        assert!(percentile_sorted(&[], 50.0).is_nan());
    }

    #[test]
    fn iqr_of_uniform_grid() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        assert!((iqr(&values) - 50.0).abs() < 1e-12);
    }
}

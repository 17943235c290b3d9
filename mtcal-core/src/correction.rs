//! Classical multiple-testing corrections.
//!
//! All three rules map (p-values, alpha) to a rejection set of the same
//! length:
//! - Bonferroni: reject i iff p_i < alpha / K
//! - Holm step-down: walk ascending p-values, reject while
//!   p_(k) <= alpha / (K - k), stop at the first failure
//! - Benjamini-Hochberg step-up: find the largest k with
//!   p_(k) <= (k / K) * alpha and reject the k smallest
//!
//! Sorting is stable, so tied p-values keep their index order and the
//! result never depends on how the sort breaks ties.

use serde::{Deserialize, Serialize};

/// Per-series reject/retain decisions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RejectionSet(Vec<bool>);

impl RejectionSet {
    /// Nothing rejected among `len` hypotheses.
    pub fn none(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn from_vec(decisions: Vec<bool>) -> Self {
        Self(decisions)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_rejected(&self, k: usize) -> bool {
        self.0[k]
    }

    pub fn reject(&mut self, k: usize) {
        self.0[k] = true;
    }

    /// Number of rejections.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&r| r).count()
    }

    /// Indices of rejected hypotheses, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(k, &r)| r.then_some(k))
            .collect()
    }

    /// True when every rejection here is also a rejection in `other`.
    pub fn is_subset_of(&self, other: &RejectionSet) -> bool {
        self.len() == other.len() && self.0.iter().zip(&other.0).all(|(&a, &b)| !a || b)
    }
}

impl From<Vec<bool>> for RejectionSet {
    fn from(v: Vec<bool>) -> Self {
        Self(v)
    }
}

/// Indices ordering p-values ascending; ties in index order.
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
    order
}

/// Bonferroni: controls FWER under any dependence.
pub fn bonferroni(p_values: &[f64], alpha: f64) -> RejectionSet {
    let k = p_values.len();
    if k == 0 {
        return RejectionSet::default();
    }
    let threshold = alpha / k as f64;
    p_values.iter().map(|&p| p < threshold).collect::<Vec<_>>().into()
}

/// Holm step-down: uniformly more powerful than Bonferroni, same FWER
/// guarantee.
pub fn holm(p_values: &[f64], alpha: f64) -> RejectionSet {
    let k = p_values.len();
    let mut rejected = RejectionSet::none(k);

    for (rank, idx) in ascending_order(p_values).into_iter().enumerate() {
        let threshold = alpha / (k - rank) as f64;
        if p_values[idx] <= threshold {
            rejected.reject(idx);
        } else {
            break;
        }
    }

    rejected
}

/// Benjamini-Hochberg step-up: controls FDR under independence or positive
/// regression dependence.
pub fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> RejectionSet {
    let k = p_values.len();
    let mut rejected = RejectionSet::none(k);
    if k == 0 {
        return rejected;
    }

    let order = ascending_order(p_values);
    let cutoff = (1..=k)
        .rev()
        .find(|&rank| p_values[order[rank - 1]] <= (rank as f64 / k as f64) * alpha);

    if let Some(n_reject) = cutoff {
        for &idx in &order[..n_reject] {
            rejected.reject(idx);
        }
    }

    rejected
}

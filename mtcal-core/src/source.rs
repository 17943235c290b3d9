//! Data-source contract and the synthetic clustered AR(1) panel.
//!
//! The engine only needs panels whose rows are uniformly spaced periods and
//! whose columns are consistently cluster-labeled; how dependence is induced
//! is the source's business.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::panel::{ClusterLabeling, GroundTruth, LabeledPanel, Panel, PanelError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("true effects per cluster ({n_true}) must be less than series per cluster ({per_cluster})")]
    TooManyTrueEffects { n_true: usize, per_cluster: usize },
    #[error("autocorrelation phi must lie in (-1, 1), got {0}")]
    NonStationary(f64),
    #[error("cluster correlation rho must lie in [0, 1], got {0}")]
    InvalidCorrelation(f64),
    #[error("effect strength must be finite, got {0}")]
    InvalidStrength(f64),
    #[error("need at least one cluster with at least one series")]
    EmptyPanel,
    #[error(transparent)]
    Panel(#[from] PanelError),
}

/// Anything that can produce labeled panels for the harness.
pub trait PanelSource {
    /// Reject a configuration before any simulation work starts.
    fn validate(&self) -> Result<(), SourceError>;

    /// Draw one labeled panel.
    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<LabeledPanel, SourceError>;
}

/// Clustered panel with AR(1) dynamics and planted mean shifts.
///
/// Each cluster has a common AR(1) factor f; each series an idiosyncratic
/// AR(1) shock e, both with coefficient `phi` and unit-variance innovations
/// started from a single standard normal draw. Series i of cluster c is
/// `sqrt(rho) * f_c + sqrt(1 - rho) * e_i`, and the first `n_true` series
/// of every cluster are shifted by `strength`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteredAr1Source {
    pub periods: usize,
    pub n_clusters: usize,
    pub series_per_cluster: usize,
    pub n_true: usize,
    pub strength: f64,
    pub phi: f64,
    pub rho: f64,
}

impl Default for ClusteredAr1Source {
    fn default() -> Self {
        Self {
            periods: 200,
            n_clusters: 2,
            series_per_cluster: 3,
            n_true: 1,
            strength: 0.15,
            phi: 0.5,
            rho: 0.5,
        }
    }
}

impl ClusteredAr1Source {
    pub fn series(&self) -> usize {
        self.n_clusters * self.series_per_cluster
    }

    pub fn with_dependence(&self, phi: f64, rho: f64) -> Self {
        Self {
            phi,
            rho,
            ..self.clone()
        }
    }

    fn ar1<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut x = Vec::with_capacity(self.periods);
        let mut prev: f64 = StandardNormal.sample(rng);
        x.push(prev);
        for _ in 1..self.periods {
            let z: f64 = StandardNormal.sample(rng);
            prev = self.phi * prev + z;
            x.push(prev);
        }
        x
    }
}

impl PanelSource for ClusteredAr1Source {
    fn validate(&self) -> Result<(), SourceError> {
        if self.n_clusters == 0 || self.series_per_cluster == 0 {
            return Err(SourceError::EmptyPanel);
        }
        if self.periods < 2 {
            return Err(PanelError::TooFewPeriods(self.periods).into());
        }
        if self.n_true >= self.series_per_cluster {
            return Err(SourceError::TooManyTrueEffects {
                n_true: self.n_true,
                per_cluster: self.series_per_cluster,
            });
        }
        if !(self.phi > -1.0 && self.phi < 1.0) {
            return Err(SourceError::NonStationary(self.phi));
        }
        if !(0.0..=1.0).contains(&self.rho) {
            return Err(SourceError::InvalidCorrelation(self.rho));
        }
        if !self.strength.is_finite() {
            return Err(SourceError::InvalidStrength(self.strength));
        }
        Ok(())
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<LabeledPanel, SourceError> {
        self.validate()?;
        let factors: Vec<Vec<f64>> = (0..self.n_clusters).map(|_| self.ar1(rng)).collect();
        let (load_common, load_own) = (self.rho.sqrt(), (1.0 - self.rho).sqrt());

        let mut columns = Vec::with_capacity(self.series());
        let mut is_effect = Vec::with_capacity(self.series());
        for factor in &factors {
            for j in 0..self.series_per_cluster {
                let planted = j < self.n_true;
                let shift = if planted { self.strength } else { 0.0 };
                let own = self.ar1(rng);
                columns.push(
                    factor
                        .iter()
                        .zip(&own)
                        .map(|(f, e)| load_common * f + load_own * e + shift)
                        .collect(),
                );
                is_effect.push(planted);
            }
        }

        let panel = Panel::from_columns(columns)?;
        let clusters = ClusterLabeling::contiguous(self.n_clusters, self.series_per_cluster);
        Ok(LabeledPanel::new(panel, clusters, GroundTruth::new(is_effect))?)
    }
}

/// Rule-of-thumb block length ceil(1 / (1 - phi)), clamped to [1, periods].
pub fn suggested_block_length(phi: f64, periods: usize) -> usize {
    let upper = periods.max(1);
    if phi.is_nan() || phi >= 1.0 {
        return upper;
    }
    // 1 / (1 - 0.9) is 10.000000000000002 in floating point
    let raw = (1.0 / (1.0 - phi) - 1e-9).ceil();
    if raw.is_finite() && raw >= 1.0 {
        (raw as usize).clamp(1, upper)
    } else {
        1
    }
}

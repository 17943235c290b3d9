//! Calibration configuration shared by every method.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resample::{BlockClusterResampler, ResampleScheme};
use crate::statistics::StatisticMode;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("alpha must lie in (0, 1), got {0}")]
    InvalidAlpha(f64),
    #[error("need at least one bootstrap resample")]
    NoResamples,
    #[error("block length must be at least 1")]
    ZeroBlockLength,
}

/// Immutable per-call calibration settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Nominal level (default 0.05).
    pub alpha: f64,
    /// Bootstrap resamples B (default 100).
    pub n_resamples: usize,
    /// Moving-block length L (default 12).
    pub block_length: usize,
    pub mode: StatisticMode,
    pub scheme: ResampleScheme,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            n_resamples: 100,
            block_length: 12,
            mode: StatisticMode::Naive,
            scheme: ResampleScheme::BlockCluster,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if self.n_resamples == 0 {
            return Err(ConfigError::NoResamples);
        }
        if self.block_length == 0 {
            return Err(ConfigError::ZeroBlockLength);
        }
        Ok(())
    }

    /// Same settings at a different level.
    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    pub fn resampler(&self) -> BlockClusterResampler {
        BlockClusterResampler::new(self.block_length, self.scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CalibrationConfig::default().validate().is_ok());
    }

    #[test]
    fn alpha_bounds_are_open() {
        for alpha in [0.0, 1.0, -0.1, f64::NAN] {
            let cfg = CalibrationConfig::default().with_alpha(alpha);
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAlpha(_))));
        }
    }

    #[test]
    fn zero_counts_rejected() {
        let cfg = CalibrationConfig {
            n_resamples: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoResamples));
        let cfg = CalibrationConfig {
            block_length: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBlockLength));
    }

    #[test]
    fn partial_input_fills_defaults() {
        let cfg: CalibrationConfig = serde_json::from_str(r#"{"alpha": 0.01, "mode": "prewhitened"}"#).unwrap();
        assert_eq!(cfg.alpha, 0.01);
        assert_eq!(cfg.mode, StatisticMode::Prewhitened);
        assert_eq!(cfg.n_resamples, 100);
    }
}

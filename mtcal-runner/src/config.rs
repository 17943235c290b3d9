//! Experiment configuration, loaded from TOML.
//!
//! Every field has a default, so a config file only needs the settings it
//! changes. CLI flags are applied on top of the loaded value.

use std::path::{Path, PathBuf};

use mtcal_core::{
    suggested_block_length, CalibrationConfig, ClusteredAr1Source, Method, ResampleScheme,
    StatisticMode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("alpha must lie in (0, 1), got {0}")]
    InvalidAlpha(f64),
    #[error("trials must be at least 1")]
    NoTrials,
    #[error("bootstrap resamples must be at least 1")]
    NoResamples,
    #[error("no methods configured")]
    NoMethods,
    #[error("fixed block length must be at least 1")]
    ZeroBlockLength,
}

/// How the moving-block length is chosen per scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLengthRule {
    /// The same length everywhere.
    Fixed(usize),
    /// ceil(1 / (1 - phi)) for the scenario's phi, clamped to [1, T].
    RuleOfThumb,
}

impl BlockLengthRule {
    pub fn resolve(self, phi: f64, periods: usize) -> usize {
        match self {
            BlockLengthRule::Fixed(l) => l,
            BlockLengthRule::RuleOfThumb => suggested_block_length(phi, periods),
        }
    }
}

impl Default for BlockLengthRule {
    fn default() -> Self {
        BlockLengthRule::Fixed(12)
    }
}

/// Dependence levels for the sweep. Each phi level runs at the base rho,
/// each rho level at the base phi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub phi_levels: Vec<f64>,
    pub rho_levels: Vec<f64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            phi_levels: vec![0.0, 0.3, 0.6, 0.9],
            rho_levels: vec![0.0, 0.3, 0.6, 0.9],
        }
    }
}

/// Full experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Master seed for the RNG hierarchy.
    pub seed: u64,
    /// Monte Carlo trials per scenario.
    pub trials: usize,
    /// Trials per stability cell (each one runs B extra resamples per method).
    pub stability_trials: usize,
    /// Nominal level for baseline and bootstrap runs.
    pub alpha: f64,
    /// Nominal levels for calibration curves and stability.
    pub alpha_levels: Vec<f64>,
    pub n_resamples: usize,
    pub block_length: BlockLengthRule,
    pub mode: StatisticMode,
    pub scheme: ResampleScheme,
    pub methods: Vec<Method>,
    /// Base data-generating process; its phi and rho are the base levels.
    pub source: ClusteredAr1Source,
    pub sweep: SweepConfig,
    /// Fan scenarios out over the rayon pool.
    pub parallel: bool,
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 73,
            trials: 100,
            stability_trials: 50,
            alpha: 0.05,
            alpha_levels: vec![0.005, 0.01, 0.02, 0.05],
            n_resamples: 100,
            block_length: BlockLengthRule::default(),
            mode: StatisticMode::Naive,
            scheme: ResampleScheme::BlockCluster,
            methods: Method::ALL.to_vec(),
            source: ClusteredAr1Source::default(),
            sweep: SweepConfig::default(),
            parallel: true,
            output_dir: PathBuf::from("reports"),
        }
    }
}

impl ExperimentConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check run-wide settings. Data-source settings are checked per
    /// scenario so that one bad cell does not stop a sweep.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for &alpha in std::iter::once(&self.alpha).chain(&self.alpha_levels) {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(ConfigError::InvalidAlpha(alpha));
            }
        }
        if self.trials == 0 || self.stability_trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.n_resamples == 0 {
            return Err(ConfigError::NoResamples);
        }
        if self.methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }
        if self.block_length == BlockLengthRule::Fixed(0) {
            return Err(ConfigError::ZeroBlockLength);
        }
        Ok(())
    }

    /// Calibration settings for a scenario drawn from `source` at `alpha`.
    pub fn calibration_for(&self, source: &ClusteredAr1Source, alpha: f64) -> CalibrationConfig {
        CalibrationConfig {
            alpha,
            n_resamples: self.n_resamples,
            block_length: self.block_length.resolve(source.phi, source.periods),
            mode: self.mode,
            scheme: self.scheme,
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ExperimentConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.source.series(), 6);
        assert_eq!(cfg.methods.len(), 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ExperimentConfig::from_toml(
            r#"
            seed = 7
            trials = 20
            mode = "prewhitened"
            methods = ["holm", "bootstrap_stepdown"]
            block_length = "rule_of_thumb"

            [source]
            periods = 120
            n_clusters = 3
            series_per_cluster = 4
            n_true = 2
            strength = 0.3
            phi = 0.2
            rho = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.trials, 20);
        assert_eq!(cfg.mode, StatisticMode::Prewhitened);
        assert_eq!(cfg.methods, vec![Method::Holm, Method::BootstrapStepdown]);
        assert_eq!(cfg.block_length, BlockLengthRule::RuleOfThumb);
        assert_eq!(cfg.source.series(), 12);
        assert_eq!(cfg.alpha, 0.05);
        assert_eq!(cfg.sweep.phi_levels.len(), 4);
    }

    #[test]
    fn fixed_block_length_from_toml() {
        let cfg = ExperimentConfig::from_toml("block_length = { fixed = 6 }").unwrap();
        assert_eq!(cfg.block_length, BlockLengthRule::Fixed(6));
    }

    #[test]
    fn unknown_method_is_a_parse_error() {
        let err = ExperimentConfig::from_toml(r#"methods = ["sidak"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_alpha_level_rejected() {
        let cfg = ExperimentConfig {
            alpha_levels: vec![0.05, 1.5],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAlpha(a)) if a == 1.5));
    }

    #[test]
    fn rule_of_thumb_tracks_phi() {
        let cfg = ExperimentConfig {
            block_length: BlockLengthRule::RuleOfThumb,
            ..Default::default()
        };
        let source = cfg.source.with_dependence(0.9, 0.5);
        assert_eq!(cfg.calibration_for(&source, 0.05).block_length, 10);
    }

    #[test]
    fn toml_round_trip() {
        let cfg = ExperimentConfig::default();
        let text = cfg.to_toml().unwrap();
        assert_eq!(ExperimentConfig::from_toml(&text).unwrap(), cfg);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ExperimentConfig::from_file(Path::new("/nonexistent/mtcal.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/mtcal.toml"));
    }
}

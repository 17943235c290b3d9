//! mtcal core: multiple-testing calibration under serial and
//! cross-sectional dependence.
//!
//! This crate contains the engine:
//! - Panel data model with cluster labels and ground truth
//! - Student-t reference distribution and percentiles
//! - Naive and AR(1)-prewhitened per-series t statistics
//! - Bonferroni, Holm and Benjamini-Hochberg correctors
//! - Moving-block, cluster-aware resampler
//! - Single-threshold and Romano-Wolf step-down bootstrap calibrators
//! - Method registry, performance evaluation, RNG hierarchy
//! - Data-source contract with a clustered AR(1) reference source

pub mod bootstrap;
pub mod config;
pub mod correction;
pub mod distribution;
pub mod evaluation;
pub mod method;
pub mod panel;
pub mod resample;
pub mod rng;
pub mod source;
pub mod statistics;
pub mod stepdown;

pub use bootstrap::{
    calibrate_single, effective_number_of_tests, BootstrapDistribution, BootstrapMatrix,
    CalibrationError, SingleThresholdOutcome,
};
pub use config::{CalibrationConfig, ConfigError};
pub use correction::{benjamini_hochberg, bonferroni, holm, RejectionSet};
pub use evaluation::{evaluate, EvaluationError, PerformanceRecord};
pub use method::{Calibrated, Method, MethodError, MethodInput, MethodOutcome, RejectionRule};
pub use panel::{ClusterLabeling, GroundTruth, LabeledPanel, Panel, PanelError};
pub use resample::{BlockClusterResampler, ResampleError, ResampleScheme};
pub use rng::{RngHierarchy, Stream};
pub use source::{suggested_block_length, ClusteredAr1Source, PanelSource, SourceError};
pub use statistics::{compute_statistics, StatisticMode, TestStatistics};
pub use stepdown::{calibrate_stepdown, stepdown_walk, StepdownOutcome};

//! mtcal runner: Monte Carlo experiments over the calibration engine.
//!
//! This crate builds on `mtcal-core` to provide:
//! - TOML experiment configuration with CLI-overridable defaults
//! - Monte Carlo harness with hash-derived per-trial seeds
//! - Dependence sweeps and calibration curves with rayon fan-out
//! - Stability analysis of discoveries under resampling
//! - Across-trial metric summaries and CSV/JSON report export

pub mod config;
pub mod export;
pub mod harness;
pub mod stability;
pub mod summary;
pub mod sweep;

pub use config::{BlockLengthRule, ConfigError, ExperimentConfig, SweepConfig};
pub use export::{
    export_calibration_csv, export_csv, export_panel_csv, export_stability_csv,
    export_summary_csv, load_manifest, save_report, summary_records, Report, ReportManifest,
    StabilityRecord, SummaryRecord, SCHEMA_VERSION,
};
pub use harness::{
    HarnessError, MethodSummary, MethodTrial, MonteCarloHarness, Scenario, ScenarioSummary,
    SweptParameter,
};
pub use stability::{analyze_panel, PanelStability, StabilityAnalyzer, StabilitySummary};
pub use summary::MetricSummary;
pub use sweep::{
    calibration_points, dependence_scenarios, scenario_at, CalibrationPoint, ScenarioFailure,
    ScenarioSweep, SweepResults,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn harness_types_are_send_sync() {
        assert_send::<MonteCarloHarness>();
        assert_sync::<MonteCarloHarness>();
        assert_send::<StabilityAnalyzer>();
        assert_sync::<StabilityAnalyzer>();
        assert_send::<Scenario>();
        assert_sync::<Scenario>();
    }

    #[test]
    fn result_types_are_send_sync() {
        assert_send::<ScenarioSummary>();
        assert_sync::<ScenarioSummary>();
        assert_send::<StabilitySummary>();
        assert_sync::<StabilitySummary>();
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
    }
}

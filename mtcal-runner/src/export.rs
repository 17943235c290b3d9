//! Report sink: flat records exported as CSV and JSON.
//!
//! A report directory is named `{name}_{timestamp}/` and holds:
//! - `manifest.json`: schema version, creation time, the experiment config
//!   and any scenarios that failed
//! - `summary.csv` / `summary.json`: one row per scenario, level and method
//! - `calibration.csv`: realized versus nominal error rates
//! - `stability.csv`: survival and p-value spread per method and level
//!
//! Files for empty tables are not written. Manifests with a newer schema
//! version than this build understands are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use mtcal_core::{LabeledPanel, Method};
use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::harness::{ScenarioSummary, SweptParameter};
use crate::stability::StabilitySummary;
use crate::summary::MetricSummary;
use crate::sweep::{CalibrationPoint, ScenarioFailure};

pub const SCHEMA_VERSION: u32 = 1;

// ─── Flat records ───────────────────────────────────────────────────

/// One method of one scenario at one level, flattened for tabular export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub scenario: String,
    pub method: Method,
    pub swept_parameter: SweptParameter,
    pub swept_value: Option<f64>,
    pub phi: f64,
    pub rho: f64,
    pub alpha: f64,
    pub block_length: usize,
    pub trials: usize,
    pub fwer_mean: f64,
    pub fwer_ci_lower: f64,
    pub fwer_ci_upper: f64,
    pub fwer_se: f64,
    pub fdr_mean: f64,
    pub fdr_ci_lower: f64,
    pub fdr_ci_upper: f64,
    pub fdr_se: f64,
    pub power_mean: Option<f64>,
    pub power_ci_lower: Option<f64>,
    pub power_ci_upper: Option<f64>,
    pub power_se: Option<f64>,
    pub effective_tests_mean: Option<f64>,
    pub effective_tests_ci_lower: Option<f64>,
    pub effective_tests_ci_upper: Option<f64>,
    /// Mean calibrated threshold t*.
    pub threshold: Option<f64>,
}

impl SummaryRecord {
    /// One record per method of `summary`, in method order.
    pub fn from_summary(summary: &ScenarioSummary) -> Vec<Self> {
        summary
            .methods
            .iter()
            .map(|m| {
                let opt = |s: Option<MetricSummary>, f: fn(&MetricSummary) -> f64| s.as_ref().map(f);
                SummaryRecord {
                    scenario: summary.label.clone(),
                    method: m.method,
                    swept_parameter: summary.swept_parameter,
                    swept_value: summary.swept_value,
                    phi: summary.phi,
                    rho: summary.rho,
                    alpha: summary.alpha,
                    block_length: summary.block_length,
                    trials: summary.trials,
                    fwer_mean: m.fwer.mean,
                    fwer_ci_lower: m.fwer.ci_lower,
                    fwer_ci_upper: m.fwer.ci_upper,
                    fwer_se: m.fwer.std_error,
                    fdr_mean: m.fdr.mean,
                    fdr_ci_lower: m.fdr.ci_lower,
                    fdr_ci_upper: m.fdr.ci_upper,
                    fdr_se: m.fdr.std_error,
                    power_mean: opt(m.power, |s| s.mean),
                    power_ci_lower: opt(m.power, |s| s.ci_lower),
                    power_ci_upper: opt(m.power, |s| s.ci_upper),
                    power_se: opt(m.power, |s| s.std_error),
                    effective_tests_mean: opt(m.effective_tests, |s| s.mean),
                    effective_tests_ci_lower: opt(m.effective_tests, |s| s.ci_lower),
                    effective_tests_ci_upper: opt(m.effective_tests, |s| s.ci_upper),
                    threshold: opt(m.threshold, |s| s.mean),
                }
            })
            .collect()
    }
}

/// Flatten every summary into records.
pub fn summary_records(summaries: &[ScenarioSummary]) -> Vec<SummaryRecord> {
    summaries.iter().flat_map(SummaryRecord::from_summary).collect()
}

/// One stability cell, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityRecord {
    pub scenario: String,
    pub method: Method,
    pub alpha: f64,
    pub trials: usize,
    pub true_survival_mean: Option<f64>,
    pub true_survival_se: Option<f64>,
    pub true_survival_median: Option<f64>,
    pub null_survival_mean: Option<f64>,
    pub null_survival_se: Option<f64>,
    pub null_survival_median: Option<f64>,
    pub true_iqr_mean: Option<f64>,
    pub null_iqr_mean: Option<f64>,
    pub stability_ratio: Option<f64>,
}

impl From<&StabilitySummary> for StabilityRecord {
    fn from(s: &StabilitySummary) -> Self {
        Self {
            scenario: s.scenario.clone(),
            method: s.method,
            alpha: s.alpha,
            trials: s.trials,
            true_survival_mean: s.true_survival.map(|m| m.mean),
            true_survival_se: s.true_survival.map(|m| m.std_error),
            true_survival_median: s.true_survival_median,
            null_survival_mean: s.null_survival.map(|m| m.mean),
            null_survival_se: s.null_survival.map(|m| m.std_error),
            null_survival_median: s.null_survival_median,
            true_iqr_mean: s.true_iqr.map(|m| m.mean),
            null_iqr_mean: s.null_iqr.map(|m| m.mean),
            stability_ratio: s.stability_ratio,
        }
    }
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Serialize flat records as CSV with a header row. Undefined values are
/// written as empty fields.
pub fn export_csv<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record).context("failed to write CSV record")?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_summary_csv(summaries: &[ScenarioSummary]) -> Result<String> {
    export_csv(&summary_records(summaries))
}

pub fn export_calibration_csv(points: &[CalibrationPoint]) -> Result<String> {
    export_csv(points)
}

pub fn export_stability_csv(rows: &[StabilitySummary]) -> Result<String> {
    let records: Vec<StabilityRecord> = rows.iter().map(StabilityRecord::from).collect();
    export_csv(&records)
}

/// Export a labeled panel in long format: one row per (period, series).
///
/// Columns: period, series, cluster, is_effect, value
pub fn export_panel_csv(labeled: &LabeledPanel) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["period", "series", "cluster", "is_effect", "value"])?;
    let (periods, series) = labeled.panel.shape();
    for t in 0..periods {
        for k in 0..series {
            wtr.write_record([
                &t.to_string(),
                &k.to_string(),
                &labeled.clusters.labels()[k].to_string(),
                &labeled.truth.is_effect(k).to_string(),
                &format!("{:.6}", labeled.panel.value(t, k)),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Report bundle ──────────────────────────────────────────────────

/// Run metadata stored as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportManifest {
    pub schema_version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub config: ExperimentConfig,
    pub failures: Vec<ScenarioFailure>,
}

/// Everything one CLI command produces.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub summaries: Vec<ScenarioSummary>,
    pub calibration: Vec<CalibrationPoint>,
    pub stability: Vec<StabilitySummary>,
    pub failures: Vec<ScenarioFailure>,
}

/// Write `report` to a new `{name}_{timestamp}/` directory under
/// `output_dir`. Returns the directory.
pub fn save_report(
    report: &Report,
    config: &ExperimentConfig,
    name: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    let dirname = format!("{}_{}", name, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create report dir: {}", run_dir.display()))?;

    let manifest = ReportManifest {
        schema_version: SCHEMA_VERSION,
        name: name.to_string(),
        created_at: Utc::now(),
        config: config.clone(),
        failures: report.failures.clone(),
    };
    let json = serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
    write_file(&run_dir.join("manifest.json"), &json)?;

    if !report.summaries.is_empty() {
        write_file(&run_dir.join("summary.csv"), &export_summary_csv(&report.summaries)?)?;
        let json = serde_json::to_string_pretty(&summary_records(&report.summaries))
            .context("failed to serialize summary records")?;
        write_file(&run_dir.join("summary.json"), &json)?;
    }
    if !report.calibration.is_empty() {
        write_file(
            &run_dir.join("calibration.csv"),
            &export_calibration_csv(&report.calibration)?,
        )?;
    }
    if !report.stability.is_empty() {
        write_file(
            &run_dir.join("stability.csv"),
            &export_stability_csv(&report.stability)?,
        )?;
    }

    Ok(run_dir)
}

/// Load the manifest of a report directory, rejecting unknown schema
/// versions.
pub fn load_manifest(dir: &Path) -> Result<ReportManifest> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: ReportManifest =
        serde_json::from_str(&json).context("failed to deserialize report manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::MethodSummary;

    fn metric(mean: f64) -> MetricSummary {
        MetricSummary::from_values(&[mean, mean]).unwrap()
    }

    fn summary() -> ScenarioSummary {
        ScenarioSummary {
            label: "phi=0.3,rho=0.5".into(),
            swept_parameter: SweptParameter::Phi,
            swept_value: Some(0.3),
            phi: 0.3,
            rho: 0.5,
            alpha: 0.05,
            block_length: 12,
            mode: mtcal_core::StatisticMode::Naive,
            trials: 2,
            methods: vec![
                MethodSummary {
                    method: Method::Holm,
                    fwer: metric(0.04),
                    fdr: metric(0.02),
                    power: None,
                    effective_tests: None,
                    threshold: None,
                },
                MethodSummary {
                    method: Method::BootstrapSingle,
                    fwer: metric(0.06),
                    fdr: metric(0.03),
                    power: Some(metric(0.7)),
                    effective_tests: Some(metric(4.2)),
                    threshold: Some(metric(2.9)),
                },
            ],
        }
    }

    #[test]
    fn records_flatten_each_method() {
        let records = summary_records(&[summary()]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].method, Method::Holm);
        assert!(records[0].power_mean.is_none());
        assert_eq!(records[1].threshold, Some(2.9));
        assert_eq!(records[1].effective_tests_mean, Some(4.2));
    }

    #[test]
    fn csv_has_header_and_blank_undefined_fields() {
        let csv = export_summary_csv(&[summary()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("scenario,method,swept_parameter,swept_value,phi,rho,alpha"));
        assert!(lines[1].contains(",holm,"));
        assert!(lines[1].contains(",,"));
        assert!(lines[2].contains(",bootstrap_single,"));
    }

    #[test]
    fn save_and_load_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report {
            summaries: vec![summary()],
            ..Default::default()
        };
        let config = ExperimentConfig::default();
        let run_dir = save_report(&report, &config, "baseline", dir.path()).unwrap();

        assert!(run_dir.join("summary.csv").exists());
        assert!(run_dir.join("summary.json").exists());
        assert!(!run_dir.join("stability.csv").exists());
        let manifest = load_manifest(&run_dir).unwrap();
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.name, "baseline");
        assert_eq!(manifest.config, config);
        assert!(manifest.failures.is_empty());
    }

    #[test]
    fn panel_csv_is_long_format() {
        use mtcal_core::{ClusterLabeling, GroundTruth, Panel};
        let panel = Panel::from_columns(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let labeled = LabeledPanel::new(
            panel,
            ClusterLabeling::contiguous(1, 2),
            GroundTruth::new(vec![true, false]),
        )
        .unwrap();
        let csv = export_panel_csv(&labeled).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "period,series,cluster,is_effect,value");
        assert_eq!(lines[1], "0,0,0,true,1.000000");
        assert_eq!(lines[4], "1,1,0,false,4.000000");
    }

    #[test]
    fn newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ReportManifest {
            schema_version: SCHEMA_VERSION + 1,
            name: "future".into(),
            created_at: Utc::now(),
            config: ExperimentConfig::default(),
            failures: vec![],
        };
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }
}

//! mtcal CLI: Monte Carlo studies of multiple-testing calibration.
//!
//! Commands:
//! - `baseline`: classical correctors across the dependence sweep
//! - `bootstrap`: all methods, bootstrap calibrators included, across the sweep
//! - `calibration`: realized versus nominal error over the alpha levels
//! - `stability`: survival of discoveries under resampling
//! - `data`: draw one panel from the configured source and describe it

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mtcal_core::statistics::lag1_autocorrelation;
use mtcal_core::{compute_statistics, Method, PanelSource, StatisticMode};
use mtcal_runner::{
    calibration_points, dependence_scenarios, export_panel_csv, save_report, scenario_at,
    CalibrationPoint, ExperimentConfig, Report, ScenarioSummary, ScenarioSweep,
    StabilityAnalyzer, StabilitySummary, SweepResults,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "mtcal",
    about = "mtcal: multiple-testing calibration under serial and cross-sectional dependence"
)]
struct Cli {
    /// Log level: error, warn, info, debug or trace.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every experiment command. Flags override the config file.
#[derive(Args)]
struct RunArgs {
    /// Path to a TOML experiment config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Monte Carlo trials per scenario (stability trials for `stability`).
    #[arg(long)]
    trials: Option<usize>,

    /// Nominal level.
    #[arg(long)]
    alpha: Option<f64>,

    /// Bootstrap resamples per calibration.
    #[arg(long)]
    resamples: Option<usize>,

    /// Test statistic: naive or prewhitened.
    #[arg(long)]
    mode: Option<String>,

    /// Comma-separated methods, e.g. holm,bh,stepdown.
    #[arg(long, value_delimiter = ',')]
    methods: Vec<String>,

    /// Run scenarios in parallel.
    #[arg(long)]
    parallel: Option<bool>,

    /// Directory for report output.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print results without writing a report directory.
    #[arg(long, default_value_t = false)]
    no_export: bool,
}

/// A single dependence point; defaults to the config's base phi and rho.
#[derive(Args)]
struct PointArgs {
    /// Serial autocorrelation.
    #[arg(long)]
    phi: Option<f64>,

    /// Within-cluster correlation.
    #[arg(long)]
    rho: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classical correctors across the dependence sweep.
    Baseline {
        #[command(flatten)]
        run: RunArgs,
    },
    /// All methods across the dependence sweep.
    Bootstrap {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Calibration curves over the configured alpha levels.
    Calibration {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        point: PointArgs,
    },
    /// Stability of discoveries under block-cluster resampling.
    Stability {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        point: PointArgs,
    },
    /// Draw one panel and print per-series statistics.
    Data {
        /// Path to a TOML experiment config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for the draw.
        #[arg(long, default_value_t = 73)]
        seed: u64,

        #[command(flatten)]
        point: PointArgs,

        /// Test statistic: naive or prewhitened.
        #[arg(long)]
        mode: Option<String>,

        /// Write the panel as long-format CSV.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Baseline { run } => {
            run_sweep_cmd("baseline", &run, Some(&Method::CLASSICAL[..]))
        }
        Commands::Bootstrap { run } => run_sweep_cmd("bootstrap", &run, None),
        Commands::Calibration { run, point } => run_calibration_cmd(&run, &point),
        Commands::Stability { run, point } => run_stability_cmd(&run, &point),
        Commands::Data {
            config,
            seed,
            point,
            mode,
            out,
        } => run_data_cmd(config.as_deref(), seed, &point, mode.as_deref(), out.as_deref()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .with_context(|| format!("invalid --log-level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

// ─── Config ─────────────────────────────────────────────────────────

fn read_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => Ok(ExperimentConfig::from_file(path)?),
        None => Ok(ExperimentConfig::default()),
    }
}

/// Load the config and apply flag overrides. `default_methods` replaces the
/// configured methods when `--methods` is not given.
fn load_config(args: &RunArgs, default_methods: Option<&[Method]>) -> Result<ExperimentConfig> {
    let mut cfg = read_config(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(trials) = args.trials {
        cfg.trials = trials;
        cfg.stability_trials = trials;
    }
    if let Some(alpha) = args.alpha {
        cfg.alpha = alpha;
    }
    if let Some(resamples) = args.resamples {
        cfg.n_resamples = resamples;
    }
    if let Some(mode) = &args.mode {
        cfg.mode = mode.parse::<StatisticMode>().map_err(anyhow::Error::msg)?;
    }
    if !args.methods.is_empty() {
        cfg.methods = args
            .methods
            .iter()
            .map(|m| m.parse::<Method>())
            .collect::<Result<_, _>>()?;
    } else if let Some(methods) = default_methods {
        cfg.methods = methods.to_vec();
    }
    if let Some(parallel) = args.parallel {
        cfg.parallel = parallel;
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn point_or_base(cfg: &ExperimentConfig, point: &PointArgs) -> (f64, f64) {
    (
        point.phi.unwrap_or(cfg.source.phi),
        point.rho.unwrap_or(cfg.source.rho),
    )
}

fn export(report: &Report, cfg: &ExperimentConfig, name: &str, no_export: bool) -> Result<()> {
    if no_export {
        return Ok(());
    }
    let run_dir = save_report(report, cfg, name, &cfg.output_dir)?;
    println!();
    println!("Report saved to: {}", run_dir.display());
    Ok(())
}

// ─── Commands ───────────────────────────────────────────────────────

fn run_sweep_cmd(name: &str, args: &RunArgs, default_methods: Option<&[Method]>) -> Result<()> {
    let cfg = load_config(args, default_methods)?;
    let scenarios = dependence_scenarios(&cfg);
    info!(command = name, scenarios = scenarios.len(), trials = cfg.trials, "starting");

    let results = ScenarioSweep::from_config(&cfg).run_single_level(&scenarios);
    print_sweep(&results);
    if results.summaries.is_empty() {
        bail!("every scenario failed; see the errors above");
    }

    let report = Report {
        summaries: results.summaries,
        failures: results.failures,
        ..Default::default()
    };
    export(&report, &cfg, name, args.no_export)
}

fn run_calibration_cmd(args: &RunArgs, point: &PointArgs) -> Result<()> {
    let cfg = load_config(args, None)?;
    let (phi, rho) = point_or_base(&cfg, point);
    let scenarios = vec![scenario_at(&cfg, phi, rho)];

    let results = ScenarioSweep::from_config(&cfg).run(&scenarios, &cfg.alpha_levels);
    if let Some(failure) = results.failures.first() {
        bail!("scenario {} failed: {}", failure.label, failure.error);
    }
    let points = calibration_points(&results.summaries);
    print_calibration(&points);

    let report = Report {
        calibration: points,
        summaries: results.summaries,
        ..Default::default()
    };
    export(&report, &cfg, "calibration", args.no_export)
}

fn run_stability_cmd(args: &RunArgs, point: &PointArgs) -> Result<()> {
    let cfg = load_config(args, None)?;
    let (phi, rho) = point_or_base(&cfg, point);
    let scenario = scenario_at(&cfg, phi, rho);

    let rows = StabilityAnalyzer::new(cfg.seed, cfg.stability_trials)
        .with_parallelism(cfg.parallel)
        .run_grid(&scenario, &cfg.methods, &cfg.alpha_levels)?;
    print_stability(&rows);

    let report = Report {
        stability: rows,
        ..Default::default()
    };
    export(&report, &cfg, "stability", args.no_export)
}

fn run_data_cmd(
    config: Option<&Path>,
    seed: u64,
    point: &PointArgs,
    mode: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    let cfg = read_config(config)?;
    let (phi, rho) = point_or_base(&cfg, point);
    let mode = mode
        .map(|m| m.parse::<StatisticMode>().map_err(anyhow::Error::msg))
        .transpose()?
        .unwrap_or(cfg.mode);
    let source = cfg.source.with_dependence(phi, rho);
    source.validate()?;

    let labeled = source.draw(&mut StdRng::seed_from_u64(seed))?;
    let stats = compute_statistics(&labeled.panel, mode);
    let (periods, series) = labeled.panel.shape();

    println!("=== Panel ===");
    println!("Periods:        {periods}");
    println!("Series:         {series}");
    println!("Clusters:       {}", labeled.clusters.n_clusters());
    println!("True effects:   {}", labeled.truth.n_effects());
    println!("phi / rho:      {phi} / {rho}");
    println!("Statistic:      {mode:?}");
    println!();
    println!(
        "{:<7} {:<8} {:<7} {:>9} {:>8} {:>8} {:>9}",
        "Series", "Cluster", "Effect", "Mean", "AR(1)", "t", "p"
    );
    println!("{}", "-".repeat(62));
    let means = labeled.panel.column_means();
    for k in 0..series {
        println!(
            "{:<7} {:<8} {:<7} {:>9.4} {:>8.3} {:>8.3} {:>9.4}",
            k,
            labeled.clusters.labels()[k],
            if labeled.truth.is_effect(k) { "yes" } else { "no" },
            means[k],
            lag1_autocorrelation(labeled.panel.column(k)),
            stats.t[k],
            stats.p[k],
        );
    }

    if let Some(path) = out {
        let csv = export_panel_csv(&labeled)?;
        std::fs::write(path, csv)
            .with_context(|| format!("failed to write panel CSV {}", path.display()))?;
        println!();
        println!("Panel written to: {}", path.display());
    }
    Ok(())
}

// ─── Tables ─────────────────────────────────────────────────────────

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

fn fmt_band((lower, upper): (f64, f64)) -> String {
    format!("[{lower:.3}, {upper:.3}]")
}

fn print_summary_rows(summary: &ScenarioSummary) {
    for m in &summary.methods {
        println!(
            "{:<22} {:<20} {:>7.3} {:>16} {:>7.3} {:>7} {:>7} {:>7}",
            summary.label,
            m.method.to_string(),
            m.fwer.mean,
            fmt_band(m.fwer.ci_95()),
            m.fdr.mean,
            fmt_opt(m.power.map(|p| p.mean), 3),
            fmt_opt(m.effective_tests.map(|e| e.mean), 2),
            fmt_opt(m.threshold.map(|t| t.mean), 3),
        );
    }
}

fn print_sweep(results: &SweepResults) {
    println!(
        "{:<22} {:<20} {:>7} {:>16} {:>7} {:>7} {:>7} {:>7}",
        "Scenario", "Method", "FWER", "95% band", "FDR", "Power", "M_eff", "t*"
    );
    println!("{}", "-".repeat(102));
    for summary in &results.summaries {
        print_summary_rows(summary);
    }
    if !results.is_complete() {
        println!();
        println!("Failed scenarios:");
        for f in &results.failures {
            println!("  {}: {}", f.label, f.error);
        }
    }
}

fn print_calibration(points: &[CalibrationPoint]) {
    println!(
        "{:<20} {:>7} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Method", "alpha", "FWER", "SE", "FDR", "Power", "|err|"
    );
    println!("{}", "-".repeat(74));
    for p in points {
        println!(
            "{:<20} {:>7.3} {:>8.4} {:>8.4} {:>8.4} {:>8} {:>8.4}",
            p.method.to_string(),
            p.nominal_alpha,
            p.fwer_mean,
            p.fwer_se,
            p.fdr_mean,
            fmt_opt(p.power_mean, 4),
            p.calibration_error,
        );
    }
}

fn print_stability(rows: &[StabilitySummary]) {
    println!(
        "{:<20} {:>7} {:>10} {:>10} {:>9} {:>9} {:>8}",
        "Method", "alpha", "True surv", "Null surv", "True IQR", "Null IQR", "Ratio"
    );
    println!("{}", "-".repeat(78));
    for r in rows {
        println!(
            "{:<20} {:>7.3} {:>10} {:>10} {:>9} {:>9} {:>8}",
            r.method.to_string(),
            r.alpha,
            fmt_opt(r.true_survival.map(|s| s.mean), 3),
            fmt_opt(r.null_survival.map(|s| s.mean), 3),
            fmt_opt(r.true_iqr.map(|s| s.mean), 3),
            fmt_opt(r.null_iqr.map(|s| s.mean), 3),
            fmt_opt(r.stability_ratio, 2),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_args(flags: &[&str]) -> RunArgs {
        let argv = ["mtcal", "baseline"].into_iter().chain(flags.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Baseline { run } => run,
            _ => unreachable!(),
        }
    }

    #[test]
    fn mode_flag_accepts_statistic_aliases() {
        for (flag, expected) in [
            ("naive", StatisticMode::Naive),
            ("Prewhitened", StatisticMode::Prewhitened),
            ("prewhiten", StatisticMode::Prewhitened),
            ("ar1", StatisticMode::Prewhitened),
        ] {
            let cfg = load_config(&baseline_args(&["--mode", flag]), None).unwrap();
            assert_eq!(cfg.mode, expected, "{flag}");
        }
        let err = load_config(&baseline_args(&["--mode", "robust"]), None).unwrap_err();
        assert!(err.to_string().contains("unknown statistic mode"));
    }

    #[test]
    fn band_formats_the_percentile_interval() {
        let s = mtcal_runner::MetricSummary::from_values(&[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert_eq!(fmt_band(s.ci_95()), format!("[{:.3}, {:.3}]", s.ci_lower, s.ci_upper));
    }
}

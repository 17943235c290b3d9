//! Sweeps with fault isolation, calibration curves and report export.

use mtcal_core::Method;
use mtcal_runner::{
    calibration_points, dependence_scenarios, load_manifest, save_report, scenario_at,
    ExperimentConfig, Report, ScenarioSweep, StabilityAnalyzer, SweptParameter,
};

fn small_config() -> ExperimentConfig {
    let mut cfg = ExperimentConfig {
        trials: 6,
        stability_trials: 2,
        n_resamples: 20,
        methods: vec![Method::Holm, Method::BenjaminiHochberg, Method::BootstrapStepdown],
        alpha_levels: vec![0.01, 0.05],
        ..Default::default()
    };
    cfg.source.periods = 60;
    cfg.sweep.phi_levels = vec![0.0, 0.6];
    cfg.sweep.rho_levels = vec![0.3];
    cfg
}

// ── 1. Fault isolation ──

#[test]
fn invalid_scenario_does_not_stop_the_sweep() {
    let cfg = small_config();
    let mut scenarios = dependence_scenarios(&cfg);
    scenarios[1].source.n_true = 3;

    let results = ScenarioSweep::from_config(&cfg).run_single_level(&scenarios);

    assert!(!results.is_complete());
    assert_eq!(results.failures.len(), 1);
    assert_eq!(results.failures[0].label, scenarios[1].label);
    assert!(results.failures[0].error.contains("true effects"));
    assert_eq!(results.summaries.len(), 2);
    assert_eq!(results.by_parameter(SweptParameter::Rho).len(), 1);
}

// ── 2. Calibration curves ──

#[test]
fn calibration_curve_has_a_row_per_level_and_method() {
    let cfg = small_config();
    let scenarios = vec![scenario_at(&cfg, 0.3, 0.3)];
    let results = ScenarioSweep::from_config(&cfg)
        .with_parallelism(false)
        .run(&scenarios, &cfg.alpha_levels);
    assert!(results.is_complete());

    let points = calibration_points(&results.summaries);
    assert_eq!(points.len(), cfg.alpha_levels.len() * cfg.methods.len());
    for p in &points {
        assert!((0.0..=1.0).contains(&p.fwer_mean));
        assert!(p.fwer_se >= 0.0);
        assert_eq!(p.trials, cfg.trials);
    }
    // the same data at a looser level can only reject more
    for method in &cfg.methods {
        let fwer_at = |a: f64| {
            points
                .iter()
                .find(|p| p.method == *method && p.nominal_alpha == a)
                .unwrap()
                .fwer_mean
        };
        assert!(fwer_at(0.05) >= fwer_at(0.01), "{method}");
    }
}

// ── 3. Report export ──

#[test]
fn report_directory_round_trip() {
    let cfg = small_config();
    let scenarios = dependence_scenarios(&cfg);
    let mut bad = scenarios.clone();
    bad[0].source.rho = 1.5;
    let results = ScenarioSweep::from_config(&cfg).run_single_level(&bad);

    let stability = StabilityAnalyzer::new(cfg.seed, cfg.stability_trials)
        .run_grid(&scenarios[0], &[Method::Holm], &[0.05])
        .unwrap();
    let report = Report {
        calibration: calibration_points(&results.summaries),
        summaries: results.summaries,
        stability,
        failures: results.failures,
    };

    let dir = tempfile::tempdir().unwrap();
    let run_dir = save_report(&report, &cfg, "sweep", dir.path()).unwrap();
    assert!(run_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("sweep_"));

    let manifest = load_manifest(&run_dir).unwrap();
    assert_eq!(manifest.failures.len(), 1);
    assert_eq!(manifest.config.trials, cfg.trials);

    let mut reader = csv::Reader::from_path(run_dir.join("summary.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert!(headers.iter().any(|h| h == "fwer_ci_upper"));
    assert_eq!(reader.records().count(), 2 * cfg.methods.len());

    let mut reader = csv::Reader::from_path(run_dir.join("stability.csv")).unwrap();
    assert_eq!(reader.records().count(), 1);
    assert!(run_dir.join("calibration.csv").exists());
}

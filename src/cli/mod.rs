//! Neglect forecast CLI module
//!
//! Command-line interface for training horizon ensembles, projecting
//! snapshots, listing current-year scores and inspecting panels.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ForecastConfig;
use crate::feature_engineering::{enrich_snapshot_with_lags, SnapshotRow};
use crate::projection::{Horizon, ProjectionStep};
use crate::training::{CountryScore, CurrentYearScoring, EnsembleTrainer, ForecastArtifacts};
use crate::utils::{DataLoader, PanelSummary};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(255, 170, 80) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "neglect-forecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train neglect-score ensembles and project them quarter by quarter")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the one- and two-year ensembles on a panel
    Train {
        /// Panel CSV, one row per country and year
        #[arg(short, long)]
        panel: PathBuf,

        /// Output artifacts file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Earliest base year of training pairs
        #[arg(long)]
        min_year: Option<i32>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Multiply every tree count by this factor
        #[arg(long)]
        estimator_scale: Option<f64>,
    },

    /// Project snapshot rows forward with trained artifacts
    Project {
        /// Artifacts file written by `train`
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Snapshot CSV, one row per country
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Historical panel CSV used to fill lag features of the snapshot
        #[arg(long)]
        history: Option<PathBuf>,

        /// Number of steps
        #[arg(long)]
        steps: Option<usize>,

        /// Years per step
        #[arg(long)]
        step_years: Option<f64>,

        /// Output projections file (JSON); prints a table when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List current-year scores and peers stored in trained artifacts
    Scores {
        /// Artifacts file written by `train`
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Show only this country
        #[arg(long)]
        country: Option<String>,

        /// Number of countries listed, highest ensemble score first
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Output scores file (JSON); prints a table when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show panel information
    Info {
        /// Panel CSV
        #[arg(short, long)]
        panel: PathBuf,
    },
}

impl Cli {
    /// Config file contents, or defaults when no file was given
    pub fn load_config(&self) -> anyhow::Result<ForecastConfig> {
        Ok(match &self.config {
            Some(path) => ForecastConfig::from_file(path)?,
            None => ForecastConfig::default(),
        })
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    config: &ForecastConfig,
    panel_path: &Path,
    output: &Path,
    min_year: Option<i32>,
    cv_folds: Option<usize>,
    estimator_scale: Option<f64>,
) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading panel");
    let start = Instant::now();
    let panel = DataLoader::new().load_panel(panel_path)?;
    step_done(&format!("{} rows in {:?}", panel.len(), start.elapsed()));

    let mut training = config.training.clone();
    if let Some(year) = min_year {
        training = training.with_min_year(year);
    }
    if let Some(folds) = cv_folds {
        training = training.with_cv_folds(folds);
    }
    if let Some(scale) = estimator_scale {
        training = training.with_estimator_scale(scale);
    }

    step_run("Training horizon ensembles");
    let start = Instant::now();
    let artifacts = EnsembleTrainer::new(training)?.train(&panel)?;
    step_done(&format!("{:?}", start.elapsed()));

    for horizon in Horizon::ALL {
        println!();
        println!("  {} {}", accent(horizon.label()), muted("horizon"));
        if let Some(report) = artifacts.reports.get(&horizon) {
            kv("pairs", &report.n_pairs.to_string());
            kv("countries", &report.n_countries.to_string());
        }
        if let Some(stats) = artifacts.cv.get(&horizon) {
            for (model, score) in stats {
                kv(model.key(), &format!("R² {:.4} ± {:.4}", score.mean, score.std));
            }
        }
    }

    print_current_year(&artifacts.current, 10);

    step_run(&format!("Saving → {}", output.display()));
    artifacts.save(output)?;
    step_done("");
    println!();
    Ok(())
}

pub fn cmd_project(
    config: &ForecastConfig,
    artifacts_path: &Path,
    snapshot_path: &Path,
    history_path: Option<&Path>,
    steps: Option<usize>,
    step_years: Option<f64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Project");

    step_run("Loading artifacts");
    let projector = ForecastArtifacts::load(artifacts_path)?.projector()?;
    step_done("");

    let loader = DataLoader::new();
    step_run("Loading snapshot");
    let rows: Vec<SnapshotRow> = match history_path {
        Some(history) => {
            let snapshot = loader.load_panel(snapshot_path)?;
            let history = loader.load_panel(history)?;
            enrich_snapshot_with_lags(&snapshot, &history)
                .iter()
                .map(|r| r.to_snapshot_row())
                .collect()
        }
        None => loader.load_snapshot(snapshot_path)?,
    };
    step_done(&format!("{} countries", rows.len()));

    let mut projection = config.projection.clone();
    if let Some(n) = steps {
        projection = projection.with_n_steps(n);
    }
    if let Some(s) = step_years {
        projection = projection.with_step_years(s);
    }
    projection.validate()?;

    step_run(&format!("Projecting {} steps", projection.n_steps));
    let start = Instant::now();
    let results = projector.project_batch(&rows, projection.n_steps, projection.step_years)?;
    step_done(&format!("{:?}", start.elapsed()));

    match output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&results)?)?;
            println!("  {} {}", ok("✓"), format!("wrote {}", path.display()));
        }
        None => print_projection_table(&results),
    }
    println!();
    Ok(())
}

fn print_projection_table(results: &BTreeMap<String, Vec<ProjectionStep>>) {
    let Some(first) = results.values().next() else {
        return;
    };
    println!();
    let header: String = first.iter().map(|s| format!("{:>8}", s.step)).collect();
    println!("  {:<8}{}", muted("country"), muted(&header));
    println!("  {}", dim(&"─".repeat(8 + 8 * first.len())));
    for (country, steps) in results {
        let row: String = steps.iter().map(|s| format!("{:>8.2}", s.scores.ensemble_score)).collect();
        println!("  {:<8}{}", country.white().bold(), row);
    }
}

pub fn cmd_scores(
    artifacts_path: &Path,
    country: Option<&str>,
    top: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Scores");

    step_run("Loading artifacts");
    let artifacts = ForecastArtifacts::load(artifacts_path)?;
    step_done(&format!("{} countries", artifacts.scores().len()));

    let selected: Vec<&CountryScore> = match country {
        Some(iso3) => {
            let record = artifacts
                .current
                .score(iso3)
                .ok_or_else(|| anyhow::anyhow!("no current-year score for {}", iso3))?;
            vec![record]
        }
        None => artifacts.current.ranked().into_iter().take(top).collect(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&selected)?)?;
            println!("  {} {}", ok("✓"), format!("wrote {}", path.display()));
        }
        None => {
            kv("year", &artifacts.current.year.to_string());
            print_score_table(&selected, artifacts.current.neglect_flag_threshold);
        }
    }
    println!();
    Ok(())
}

fn print_current_year(current: &CurrentYearScoring, top: usize) {
    println!();
    println!("  {} {}", accent(&current.year.to_string()), muted("current year"));
    kv("countries", &current.scores.len().to_string());
    kv(
        "flagged",
        &format!("{} at ensemble ≥ {:.0}", current.flagged().count(), current.neglect_flag_threshold),
    );
    for (model, score) in &current.cv {
        kv(model.key(), &format!("R² {:.4} ± {:.4}", score.mean, score.std));
    }
    let ranked: Vec<&CountryScore> = current.ranked().into_iter().take(top).collect();
    print_score_table(&ranked, current.neglect_flag_threshold);
}

fn print_score_table(records: &[&CountryScore], threshold: f64) {
    println!();
    println!(
        "  {:<8}{:>10}{:>8}{:>8}  {:<10}{}",
        muted("country"),
        muted("ensemble"),
        muted("lgbm"),
        muted("agree"),
        muted("severity"),
        muted("peers")
    );
    println!("  {}", dim(&"─".repeat(72)));
    for r in records {
        let ensemble = format!("{:>10.2}", r.ensemble_score);
        let ensemble = if r.ensemble_score >= threshold { warn(&ensemble) } else { ensemble.white() };
        println!(
            "  {:<8}{}{:>8.2}{:>8.2}  {:<10}{}",
            r.iso3.white().bold(),
            ensemble,
            r.neglect_score,
            r.model_agreement,
            r.anomaly_severity.label(),
            dim(&r.peer_iso3.join(" "))
        );
    }
}

pub fn cmd_info(panel_path: &Path) -> anyhow::Result<()> {
    section("Panel");

    let panel = DataLoader::new().load_panel(panel_path)?;
    let summary = PanelSummary::from_rows(&panel);

    let years = match (summary.first_year, summary.last_year) {
        (Some(a), Some(b)) => format!("{}–{}", a, b),
        _ => "-".to_string(),
    };
    kv("rows", &summary.rows.to_string());
    kv("countries", &summary.countries.to_string());
    kv("years", &years);
    kv("mean neglect", &format!("{:.2}", summary.mean_neglect));
    if let Some(year) = summary.last_year {
        let bands: Vec<String> = summary
            .latest_severity
            .iter()
            .rev()
            .map(|(band, n)| format!("{} {}", band, n))
            .collect();
        kv(&format!("severity {}", year), &bands.join(", "));
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_project() {
        let cli = Cli::try_parse_from([
            "neglect-forecast",
            "project",
            "--artifacts",
            "a.json",
            "--snapshot",
            "s.csv",
            "--steps",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Project { steps, history, .. } => {
                assert_eq!(steps, Some(4));
                assert!(history.is_none());
            }
            _ => panic!("expected project"),
        }
    }

    #[test]
    fn test_parse_scores() {
        let cli = Cli::try_parse_from(["neglect-forecast", "scores", "--artifacts", "a.json", "--country", "SDN"])
            .unwrap();
        match cli.command {
            Commands::Scores { country, top, output, .. } => {
                assert_eq!(country.as_deref(), Some("SDN"));
                assert_eq!(top, 10);
                assert!(output.is_none());
            }
            _ => panic!("expected scores"),
        }
    }
}

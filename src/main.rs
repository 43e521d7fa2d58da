//! Neglect forecast - Main Entry Point

use clap::Parser;
use neglect_forecast::cli::{cmd_info, cmd_project, cmd_scores, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    match cli.command {
        Commands::Train { panel, output, min_year, cv_folds, estimator_scale } => {
            cmd_train(&config, &panel, &output, min_year, cv_folds, estimator_scale)?;
        }
        Commands::Project { artifacts, snapshot, history, steps, step_years, output } => {
            cmd_project(
                &config,
                &artifacts,
                &snapshot,
                history.as_deref(),
                steps,
                step_years,
                output.as_deref(),
            )?;
        }
        Commands::Scores { artifacts, country, top, output } => {
            cmd_scores(&artifacts, country.as_deref(), top, output.as_deref())?;
        }
        Commands::Info { panel } => {
            cmd_info(&panel)?;
        }
    }

    Ok(())
}

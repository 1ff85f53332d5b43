//! bias-audit: run bias audits over an exported dataset snapshot
//!
//! Loads engine configuration (YAML) and a JSON snapshot of users,
//! recommendations and mood entries, then prints analysis results as JSON.
//! Intended for ad-hoc audits and scheduled jobs.

mod commands;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use bias_engine::{BiasConfig, BiasDetectionEngine, DatasetSnapshot, InMemoryDataSource};
use commands::AuditCommands;

#[derive(Parser)]
#[command(name = "bias-audit")]
#[command(about = "Bias and fairness audits for recommendation outputs")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bias-audit.yaml", env = "BIAS_AUDIT_CONFIG")]
    config: String,

    /// Dataset snapshot (JSON)
    #[arg(short, long, env = "BIAS_AUDIT_DATASET")]
    dataset: String,

    /// Lookback window in days (overrides config file)
    #[arg(long, env = "BIAS_AUDIT_DAYS_BACK")]
    days_back: Option<u32>,

    /// Disparate-impact reference group (overrides config file)
    #[arg(long, env = "BIAS_AUDIT_REFERENCE_GROUP")]
    reference_group: Option<String>,

    #[command(subcommand)]
    command: AuditCommands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bias_audit=info".parse()?)
                .add_directive("bias_engine=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if Path::new(&cli.config).exists() {
        info!(path = %cli.config, "Loading config");
        BiasConfig::from_file(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        BiasConfig::default()
    };

    if let Some(group) = cli.reference_group {
        config = config.with_reference_group(group);
    }

    let snapshot = DatasetSnapshot::from_file(&cli.dataset)?;
    info!(
        dataset = %cli.dataset,
        users = snapshot.users.len(),
        recommendations = snapshot.recommendations.len(),
        mood_entries = snapshot.mood_entries.len(),
        "Dataset loaded"
    );

    let source = InMemoryDataSource::new(snapshot).with_id(cli.dataset.clone());
    let engine = BiasDetectionEngine::with_config(Arc::new(source), config)?;

    let output = commands::execute_command(&engine, cli.days_back, cli.command).await?;
    println!("{output}");

    Ok(())
}

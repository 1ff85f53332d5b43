//! Audit subcommands.

use std::path::PathBuf;
use std::time::Duration;

use clap::Subcommand;
use tracing::info;

use bias_engine::{BiasDetectionEngine, RecommendationCandidate, ResourceType};

/// Audit commands
#[derive(Debug, Subcommand)]
pub enum AuditCommands {
    /// Full report: recommendation and geographic analyses over one window
    Report {
        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recommendation bias analysis
    Recommendations,

    /// Geographic bias analysis
    Geographic,

    /// Score one candidate recommendation for a user
    Realtime {
        /// User pseudonym id
        #[arg(short, long)]
        user: String,

        /// Resource type of the candidate
        #[arg(short, long, default_value = "therapy")]
        resource_type: ResourceType,

        /// Confidence score of the candidate
        #[arg(short, long, default_value = "0")]
        confidence: f64,

        /// Baseline query budget in milliseconds (config value if unset)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Run a command and return its printable output.
pub async fn execute_command(
    engine: &BiasDetectionEngine,
    days_back: Option<u32>,
    command: AuditCommands,
) -> anyhow::Result<String> {
    let window = match days_back {
        Some(days) => engine.window(days)?,
        None => engine.default_window()?,
    };

    match command {
        AuditCommands::Report { output } => {
            let report = engine.generate_bias_report_for(&window).await?;
            if let Some(path) = output {
                report.write_json(&path)?;
                info!(path = %path.display(), "Report written");
            }
            Ok(report.to_json()?)
        }
        AuditCommands::Recommendations => {
            let analysis = engine.analyze_recommendation_bias(&window).await?;
            Ok(serde_json::to_string_pretty(&analysis)?)
        }
        AuditCommands::Geographic => {
            let analysis = engine.analyze_geographic_bias(&window).await?;
            Ok(serde_json::to_string_pretty(&analysis)?)
        }
        AuditCommands::Realtime {
            user,
            resource_type,
            confidence,
            timeout_ms,
        } => {
            let candidate = RecommendationCandidate {
                resource_type,
                confidence_score: confidence,
            };
            let result = match timeout_ms {
                Some(ms) => {
                    engine
                        .detect_algorithmic_bias_realtime_within(
                            &user,
                            &candidate,
                            Duration::from_millis(ms),
                        )
                        .await?
                }
                None => engine.detect_algorithmic_bias_realtime(&user, &candidate).await?,
            };
            Ok(serde_json::to_string_pretty(&result)?)
        }
        AuditCommands::Config => Ok(engine.config().to_yaml()?),
    }
}

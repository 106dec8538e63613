use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use skillcast::core::log::init_logging;
use skillcast::core::series::SourceId;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Ingest pre-fetched payload files for one source
    Ingest {
        /// Source id: stackoverflow, github, trends or reddit
        #[arg(short, long)]
        source: String,
        /// Payload file(s) with a JSON array of raw records
        #[arg(short, long, required = true)]
        file: Vec<String>,
    },
    /// Load a topic/sentiment feed file
    Topics {
        #[arg(short, long)]
        file: String,
    },
    /// List all known tags
    Tags,
    /// Display the canonical series for a tag
    Series {
        #[arg(short, long)]
        tag: String,
        /// Start period (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// End period (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Display the demand forecast for a tag
    Forecast {
        #[arg(short, long)]
        tag: String,
        /// Number of future periods to predict
        #[arg(long, default_value_t = 8)]
        horizon: usize,
    },
}

impl TryFrom<Commands> for skillcast::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<skillcast::AppCommand> {
        Ok(match cmd {
            Commands::Ingest { source, file } => skillcast::AppCommand::Ingest {
                source: source.parse::<SourceId>()?,
                files: file,
            },
            Commands::Topics { file } => skillcast::AppCommand::Topics { file },
            Commands::Tags => skillcast::AppCommand::Tags,
            Commands::Series { tag, start, end } => skillcast::AppCommand::Series {
                tag,
                start: start.map(|s| parse_period(&s)).transpose()?,
                end: end.map(|e| parse_period(&e)).transpose()?,
            },
            Commands::Forecast { tag, horizon } => skillcast::AppCommand::Forecast { tag, horizon },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        })
    }
}

fn parse_period(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{raw}' (expected YYYY-MM-DD): {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => skillcast::run_command(cmd.try_into()?, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = skillcast::core::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
granularity: week

sources:
  weights:
    stackoverflow: 1.0
    github: 1.0
    trends: 1.0
    reddit: 1.0

forecast:
  min_history: 10
  holdout: 4
  season_length: 4
  rmse_epsilon: 0.5
  timeout_secs: 30

cache:
  ttl_secs: 21600

tags:
  inactive_after: 12
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

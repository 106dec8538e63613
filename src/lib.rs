pub mod cli;
pub mod core;
pub mod sources;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::facade::DemandCore;
use crate::core::series::SourceId;
use crate::store::KeyValueStore;
use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info};

pub enum AppCommand {
    Ingest {
        source: SourceId,
        files: Vec<String>,
    },
    Topics {
        file: String,
    },
    Tags,
    Series {
        tag: String,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Forecast {
        tag: String,
        horizon: usize,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Skillcast starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = KeyValueStore::open(&config.default_data_path()?.join("store"));
    let core = DemandCore::open(&store, &config).await;

    match command {
        AppCommand::Ingest { source, files } => cli::ingest::run(&core, source, &files).await,
        AppCommand::Topics { file } => cli::topics::run(&core, &file).await,
        AppCommand::Tags => cli::tags::run(&core).await,
        AppCommand::Series { tag, start, end } => cli::series::run(&core, &tag, start, end).await,
        AppCommand::Forecast { tag, horizon } => cli::forecast::run(&core, &tag, horizon).await,
    }
}

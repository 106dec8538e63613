use crate::core::series::{Granularity, SourceId};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Per-source trust weight applied when combining counts across sources.
    #[serde(default)]
    pub weights: HashMap<SourceId, f64>,
}

impl SourcesConfig {
    /// Weight for a source; unlisted sources contribute with weight 1.0.
    pub fn weight(&self, source: SourceId) -> f64 {
        self.weights.get(&source).copied().unwrap_or(1.0)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            weights: SourceId::ALL.iter().map(|s| (*s, 1.0)).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForecastConfig {
    /// Minimum observed canonical points required before forecasting.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Held-out tail length used for backtesting.
    #[serde(default = "default_holdout")]
    pub holdout: usize,
    /// Season length, in periods, for the seasonal strategy.
    #[serde(default = "default_season_length")]
    pub season_length: usize,
    /// RMSE values closer than this are treated as a tie during selection.
    #[serde(default = "default_rmse_epsilon")]
    pub rmse_epsilon: f64,
    /// Ceiling on a single forecast computation before it is abandoned.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            min_history: default_min_history(),
            holdout: default_holdout(),
            season_length: default_season_length(),
            rmse_epsilon: default_rmse_epsilon(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Time-based ceiling on cached forecasts, independent of data version.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TagsConfig {
    /// A tag with no observations for this many periods is reported inactive.
    #[serde(default = "default_inactive_after")]
    pub inactive_after: usize,
}

impl Default for TagsConfig {
    fn default() -> Self {
        TagsConfig {
            inactive_after: default_inactive_after(),
        }
    }
}

fn default_min_history() -> usize {
    10
}
fn default_holdout() -> usize {
    4
}
fn default_season_length() -> usize {
    4
}
fn default_rmse_epsilon() -> f64 {
    0.5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_ttl_secs() -> u64 {
    6 * 60 * 60
}
fn default_inactive_after() -> usize {
    12
}
fn default_granularity() -> Granularity {
    Granularity::Week
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "skillcast")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "skillcast")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

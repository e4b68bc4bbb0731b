//! Run configuration: TOML file, environment overrides, defaults.

use crate::core::cluster::DEFAULT_THRESHOLD;
use crate::core::oracle::OracleConfig;
use crate::core::strategy::{
    default_categories, Category, GroupingStrategy, KeywordMatch, TextCluster, VisualSimilarity,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "snapsort.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// TF-IDF clustering of captions
    Text,
    /// Fixed keyword categories with a visual fallback
    Keyword,
    /// Perceptual hash similarity
    Visual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub screenshots: PathBuf,
    pub sidecars: PathBuf,
    pub albums: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            screenshots: PathBuf::from("Screenshots"),
            sidecars: PathBuf::from("TXTs"),
            albums: PathBuf::from("Albums"),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.resolve(&self.screenshots)
    }

    pub fn sidecars_dir(&self) -> PathBuf {
        self.resolve(&self.sidecars)
    }

    pub fn albums_dir(&self) -> PathBuf {
        self.resolve(&self.albums)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            max_attempts: 3,
            backoff_secs: 3,
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub strategy: StrategyKind,
    pub threshold: f64,
    pub visual_max_distance: u32,
    /// Lets the keyword strategy place unmatched items next to lookalikes.
    pub keyword_visual_fallback: bool,
    pub categories: Vec<Category>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Text,
            threshold: DEFAULT_THRESHOLD,
            visual_max_distance: 10,
            keyword_visual_fallback: true,
            categories: default_categories(),
        }
    }
}

impl GroupingConfig {
    pub fn build_strategy(&self) -> Box<dyn GroupingStrategy> {
        match self.strategy {
            StrategyKind::Text => Box::new(TextCluster {
                threshold: self.threshold,
            }),
            StrategyKind::Visual => Box::new(VisualSimilarity {
                max_distance: self.visual_max_distance,
            }),
            StrategyKind::Keyword => Box::new(KeywordMatch {
                categories: self.categories.clone(),
                visual_fallback: self.keyword_visual_fallback.then_some(VisualSimilarity {
                    max_distance: self.visual_max_distance,
                }),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub oracle: OracleSettings,
    pub grouping: GroupingConfig,
    /// Parallel caption requests.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            oracle: OracleSettings::default(),
            grouping: GroupingConfig::default(),
            workers: 4,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }

    /// `explicit`, else `<root>/snapsort.toml`, else the user config file,
    /// else defaults. A `root` argument always wins over the file's root.
    pub fn load(explicit: Option<&Path>, root: Option<&Path>) -> Result<Self, ConfigError> {
        let found = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let mut candidates = vec![root.unwrap_or(Path::new(".")).join(CONFIG_FILE)];
                if let Some(dir) = dirs::config_dir() {
                    candidates.push(dir.join("snapsort").join("config.toml"));
                }
                candidates.into_iter().find(|path| path.is_file())
            }
        };

        let mut config = match found {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        if let Some(root) = root {
            config.paths.root = root.to_path_buf();
        }
        Ok(config.with_env_overrides())
    }

    /// Applies `SNAPSORT_API_KEY` and `SNAPSORT_ENDPOINT`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("SNAPSORT_API_KEY").filter(|v| !v.is_empty()) {
            self.oracle.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("SNAPSORT_ENDPOINT").filter(|v| !v.is_empty()) {
            self.oracle.endpoint = endpoint;
        }
        self
    }

    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            endpoint: self.oracle.endpoint.clone(),
            api_key: self.oracle.api_key.clone(),
            max_attempts: self.oracle.max_attempts,
            backoff: Duration::from_secs(self.oracle.backoff_secs),
            timeout: Duration::from_secs(self.oracle.timeout_secs),
            connect_timeout: Duration::from_secs(self.oracle.connect_timeout_secs),
        }
    }
}

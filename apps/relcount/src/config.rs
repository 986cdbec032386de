//! # CLI Configuration
//!
//! Optional TOML file with the cache settings and a default database path.
//!
//! ```toml
//! database = "graph.redb"
//!
//! [cache]
//! compaction_threshold = 20
//! compaction_scope = "label_direction"
//! materialization = "literal"
//! persistence = "per_entry"
//! property_prefix = "_RC_"
//! ```
//!
//! A missing file means defaults. A file that exists but does not parse,
//! or whose cache settings are invalid, is an error.

use relcount_core::{RelcountConfig, RelcountError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relcount.toml";

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Database used when `--database` is not given.
    pub database: Option<PathBuf>,
    /// Cache settings.
    pub cache: RelcountConfig,
}

impl CliConfig {
    /// Load the configuration from `explicit`, else from
    /// `DEFAULT_CONFIG_FILE` if it exists, else defaults.
    ///
    /// An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => read_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    read_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config
            .cache
            .validate()
            .map_err(|source| ConfigError::Invalid { source })?;
        Ok(config)
    }

    /// Parse configuration text.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

fn read_file(path: &Path) -> Result<CliConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CliConfig::parse(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid cache settings: {source}")]
    Invalid { source: RelcountError },
}

impl From<ConfigError> for RelcountError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid { source } => source,
            other => RelcountError::InvalidConfig(other.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Application configuration loaded from `config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Could not determine the data directory")]
    DataDirNotFound,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// A learner recognised by the local token registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LearnerEntry {
    pub token: String,
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database holding decks and cards
    pub database_path: Option<PathBuf>,
    /// Default `env_logger` filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Upper bound for a single card store call
    pub store_timeout_ms: u64,
    pub learners: Vec<LearnerEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            store_timeout_ms: 5_000,
            learners: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Default location: `<config dir>/studyhall/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("studyhall").join("config.toml"))
    }

    /// Load from an explicit path, or from the default path if it exists.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configured database path, falling back to the local data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join("studyhall").join("studyhall.db"))
                .ok_or(ConfigError::DataDirNotFound),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/cards.db"
log_level = "debug"
store_timeout_ms = 250

[[learners]]
token = "abc"
id = "6f1c1a52-3d4f-4c1e-9a3b-0a8f4f2f1e11"
name = "ada"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/cards.db"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.learners.len(), 1);
        assert_eq!(config.learners[0].name, "ada");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.store_timeout_ms, 5_000);
        assert!(config.learners.is_empty());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = AppConfig::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "store_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse { .. })));
    }
}

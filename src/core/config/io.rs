use crate::core::config::data::{path_display, Config};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while assembling the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config at {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to read system prompt from {}: {source}", path_display(.path))]
    SystemPrompt {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "{var} is not set\n\nSet your API key:\nexport {var}=\"your-api-key-here\"\n\nor add `api_key` to the [completion] section of the config file"
    )]
    MissingApiKey { var: &'static str },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Config {
    /// Loads the file at `config_path`; a missing file yields defaults.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Loads from the platform config directory, if one can be determined.
    pub fn load() -> Result<Config, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "mcp-agent", "mcp-agent")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

pub(crate) fn read_system_prompt(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::SystemPrompt {
        path: path.to_path_buf(),
        source,
    })
}

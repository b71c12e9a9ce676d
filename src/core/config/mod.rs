//! Startup configuration.
//!
//! Values come from four layers, highest first: command-line overrides,
//! environment variables, the TOML config file, and built-in defaults.

pub mod data;
pub mod io;


pub use data::{ApiFlavor, Config};
pub use io::ConfigError;

use crate::core::constants::DEFAULT_SYSTEM_PROMPT;
use data::{DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MCP_SERVER_URL, DEFAULT_MODEL};
use std::path::PathBuf;

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub api: Option<ApiFlavor>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tool_rounds: Option<usize>,
    pub system_prompt_file: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct McpSettings {
    pub server_url: String,
    pub auth_token: Option<String>,
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub flavor: ApiFlavor,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mcp: McpSettings,
    pub completion: CompletionSettings,
    pub max_tool_rounds: usize,
    pub system_prompt: String,
    pub transcript: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings using the process environment.
    pub fn from_environment(config: Config, overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve(config, overrides, |name| std::env::var(name).ok())
    }

    /// Resolves settings with `env` standing in for the process environment.
    /// Blank variables count as unset.
    pub fn resolve(
        config: Config,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());
        let Config {
            mcp,
            completion,
            agent,
        } = config;

        let server_url = overrides
            .server_url
            .or_else(|| env("MCP_SERVER_URL"))
            .or(mcp.server_url)
            .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string());
        validate_http_url("MCP server URL", &server_url)?;

        let flavor = overrides.api.or(completion.api).unwrap_or_default();
        let base_url = overrides
            .base_url
            .or_else(|| match flavor {
                ApiFlavor::OpenAi => env("OPENAI_BASE_URL"),
                ApiFlavor::Dial => env("DIAL_BASE_URL"),
            })
            .or(completion.base_url)
            .unwrap_or_else(|| flavor.default_base_url().to_string());
        validate_http_url("completion base URL", &base_url)?;

        let api_key = match env(flavor.api_key_var()).or(completion.api_key) {
            Some(key) => key,
            None if flavor == ApiFlavor::Dial => String::new(),
            None => {
                return Err(ConfigError::MissingApiKey {
                    var: flavor.api_key_var(),
                })
            }
        };

        let max_tool_rounds = overrides
            .max_tool_rounds
            .or(agent.max_tool_rounds)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);
        if max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "max_tool_rounds",
                reason: "must be at least 1".to_string(),
            });
        }

        let system_prompt = match overrides.system_prompt_file.or(agent.system_prompt_file) {
            Some(path) => io::read_system_prompt(&path)?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Settings {
            mcp: McpSettings {
                server_url,
                auth_token: env("MCP_AUTH_TOKEN").or(mcp.auth_token),
                protocol_version: mcp.protocol_version,
            },
            completion: CompletionSettings {
                flavor,
                base_url,
                model: overrides
                    .model
                    .or(completion.model)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_key,
                api_version: completion.api_version,
            },
            max_tool_rounds,
            system_prompt,
            transcript: overrides.transcript.or(agent.transcript),
        })
    }
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|err| ConfigError::Invalid {
        field,
        reason: format!("{value}: {err}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            field,
            reason: format!("{value}: unsupported scheme '{scheme}'"),
        }),
    }
}

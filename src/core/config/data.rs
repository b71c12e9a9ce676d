use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MCP_SERVER_URL: &str = "http://localhost:8005/mcp";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DIAL_BASE_URL: &str = "https://ai-proxy.lab.epam.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Wire dialect of the completion endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// `{base}/chat/completions` with `Authorization: Bearer`.
    #[default]
    OpenAi,
    /// `{base}/openai/deployments/{model}/chat/completions` with `Api-Key`.
    Dial,
}

impl ApiFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiFlavor::OpenAi => "openai",
            ApiFlavor::Dial => "dial",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ApiFlavor::OpenAi => DEFAULT_OPENAI_BASE_URL,
            ApiFlavor::Dial => DEFAULT_DIAL_BASE_URL,
        }
    }

    /// Environment variable holding the API key for this flavor.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ApiFlavor::OpenAi => "OPENAI_API_KEY",
            ApiFlavor::Dial => "DIAL_API_KEY",
        }
    }
}

impl std::str::FromStr for ApiFlavor {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiFlavor::OpenAi),
            "dial" => Ok(ApiFlavor::Dial),
            other => Err(format!("unknown API flavor '{other}' (expected openai or dial)")),
        }
    }
}

/// On-disk configuration. Every field is optional; see
/// [`crate::core::config::Settings::resolve`] for precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api: Option<ApiFlavor>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_tool_rounds: Option<usize>,
    pub system_prompt_file: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

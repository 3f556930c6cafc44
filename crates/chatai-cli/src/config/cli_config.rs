//! CLI configuration file support
//!
//! Loads configuration from ~/.config/chatai/config.toml

use chatai_client::MarkerMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Server connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Default settings for each turn
    #[serde(default)]
    pub defaults: DefaultConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the chat API
    pub base_url: Option<String>,
    /// Frame marker handling ("validated" or "fixed-offset")
    pub marker_mode: Option<MarkerMode>,
}

/// Default configuration values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Default model
    pub model: Option<String>,
    /// Custom instructions
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
}

impl CliConfig {
    /// Load configuration from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file");
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chatai").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from_path(Some(dir.path().join("absent.toml")));
        assert!(config.server.base_url.is_none());
        assert!(config.defaults.model.is_none());
    }

    #[test]
    fn parses_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
base_url = "http://chat.internal/v1/api"
marker_mode = "fixed-offset"

[defaults]
model = "llama-3"
system_prompt = "Be terse."
temperature = 0.2
max_tokens = 256
"#,
        )
        .unwrap();

        let config = CliConfig::load_from_path(Some(path));
        assert_eq!(
            config.server.base_url.as_deref(),
            Some("http://chat.internal/v1/api")
        );
        assert_eq!(config.server.marker_mode, Some(MarkerMode::FixedOffset));
        assert_eq!(config.defaults.model.as_deref(), Some("llama-3"));
        assert_eq!(config.defaults.system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(config.defaults.temperature, Some(0.2));
        assert_eq!(config.defaults.max_tokens, Some(256));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nbase_url = ").unwrap();
        let config = CliConfig::load_from_path(Some(path));
        assert!(config.server.base_url.is_none());
    }
}

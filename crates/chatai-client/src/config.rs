//! Client configuration

use serde::{Deserialize, Serialize};

use crate::stream::MarkerMode;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1/api";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// `-1` tells the server not to bound the completion length.
pub const UNBOUNDED_MAX_TOKENS: i32 = -1;

/// Connection-level settings shared by every call of an `ApiClient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub marker_mode: MarkerMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            marker_mode: MarkerMode::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_marker_mode(mut self, mode: MarkerMode) -> Self {
        self.marker_mode = mode;
        self
    }

    /// Join `path` onto the base URL without doubling the slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Sampling options sent with each completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: f64,
    pub max_tokens: i32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: UNBOUNDED_MAX_TOKENS,
        }
    }
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ClientConfig::new("http://localhost:8080/v1/api/");
        assert_eq!(
            config.endpoint("/chat/completion"),
            "http://localhost:8080/v1/api/chat/completion"
        );
        assert_eq!(
            ClientConfig::default().endpoint("chat/models"),
            "http://localhost:8080/v1/api/chat/models"
        );
    }

    #[test]
    fn defaults_match_server_contract() {
        let options = CompletionOptions::default();
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_tokens, -1);
        assert_eq!(ClientConfig::default().marker_mode, MarkerMode::Validated);
    }
}

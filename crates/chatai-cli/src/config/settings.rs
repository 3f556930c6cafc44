//! Effective settings: command-line flags over config file over defaults.

use anyhow::{Result, bail};
use chatai_client::config::DEFAULT_BASE_URL;
use chatai_client::{ClientConfig, CompletionOptions};

use super::CliConfig;
use crate::cli::TurnArgs;

/// Instructions used when neither flags nor config provide any.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Always answer in rhymes.";

#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    pub defaults: TurnSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub model: Option<String>,
    pub system_prompt: String,
    pub options: CompletionOptions,
}

impl Settings {
    pub fn resolve(config: &CliConfig, base_url: Option<String>) -> Self {
        let base_url = base_url
            .or_else(|| config.server.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut client = ClientConfig::new(base_url);
        if let Some(mode) = config.server.marker_mode {
            client = client.with_marker_mode(mode);
        }

        let mut options = CompletionOptions::default();
        if let Some(temperature) = config.defaults.temperature {
            options = options.with_temperature(temperature);
        }
        if let Some(max_tokens) = config.defaults.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        Self {
            client,
            defaults: TurnSettings {
                model: config.defaults.model.clone(),
                system_prompt: config
                    .defaults
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                options,
            },
        }
    }

    /// Apply per-command flags on top of the configured defaults.
    pub fn turn(&self, args: &TurnArgs) -> TurnSettings {
        let mut turn = self.defaults.clone();
        if let Some(model) = &args.model {
            turn.model = Some(model.clone());
        }
        if let Some(system) = &args.system {
            turn.system_prompt = system.clone();
        }
        if let Some(temperature) = args.temperature {
            turn.options = turn.options.with_temperature(temperature);
        }
        if let Some(max_tokens) = args.max_tokens {
            turn.options = turn.options.with_max_tokens(max_tokens);
        }
        turn
    }
}

impl TurnSettings {
    pub fn require_model(&self) -> Result<&str> {
        match self.model.as_deref() {
            Some(model) if !model.trim().is_empty() => Ok(model),
            _ => bail!("No model selected. Pass --model or set defaults.model in the config file"),
        }
    }
}

pub mod auth;
pub mod chat;
pub mod history;
pub mod models;

use chatai_client::ApiClient;

use crate::config::Settings;
use crate::output::OutputFormat;
use crate::store::CredentialStore;

/// Everything a command needs: the server client, effective settings, the
/// credential store and the output format.
pub struct CommandContext {
    pub api: ApiClient,
    pub settings: Settings,
    pub store: CredentialStore,
    pub format: OutputFormat,
}

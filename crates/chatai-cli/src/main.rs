mod cli;
mod commands;
mod completions;
mod config;
mod error;
mod output;
mod paths;
mod store;

use anyhow::Result;
use chatai_client::ApiClient;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{CommandContext, auth, chat, history, models};
use config::{CliConfig, Settings};
use store::CredentialStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error::handle_error(err);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return Ok(());
    }

    // Always log to file; stdout carries the reply stream.
    let file_appender = tracing_appender::rolling::daily(paths::logs_dir()?, "chatai.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    let config = CliConfig::load_from_path(cli.config.clone().or_else(CliConfig::default_path));
    let settings = Settings::resolve(&config, cli.base_url.clone());
    tracing::debug!(base_url = %settings.client.base_url, "Resolved settings");

    let mut ctx = CommandContext {
        api: ApiClient::new(settings.client.clone())?,
        settings,
        store: CredentialStore::open_default()?,
        format: cli.format,
    };

    match cli.command {
        Commands::Completions { .. } => Ok(()),
        Commands::Register(args) => auth::register(&mut ctx, args).await,
        Commands::Login { email } => auth::login(&mut ctx, &email).await,
        Commands::Logout => auth::logout(&mut ctx),
        Commands::Models => models::list(&ctx).await,
        Commands::NewChat => chat::new_chat(&mut ctx).await,
        Commands::History { show: Some(id) } => history::show(&mut ctx, &id).await,
        Commands::History { show: None } => history::list(&ctx).await,
        Commands::Ask(args) => chat::ask(&ctx, args).await,
        Commands::Chat(args) => chat::chat(&mut ctx, args).await,
    }
}

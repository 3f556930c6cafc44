use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "chatai")]
#[command(version, about = "ChatAI - streaming chat client for the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL (defaults to http://localhost:8080/v1/api)
    #[arg(long, global = true, env = "CHATAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Config file path (defaults to ~/.config/chatai/config.toml)
    #[arg(long, global = true, env = "CHATAI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Create an account and store its token
    Register(RegisterArgs),

    /// Sign in and store the token
    Login {
        /// Account email
        #[arg(long)]
        email: String,
    },

    /// Forget the stored token and active chat
    Logout,

    /// List models offered by the server
    Models,

    /// Start a new chat and make it active
    NewChat,

    /// List past chats, or show one of them
    History {
        /// Chat id to print and make active
        #[arg(long)]
        show: Option<String>,
    },

    /// Send one prompt and stream the reply
    Ask(AskArgs),

    /// Interactive chat over stdin (/exit or Ctrl-D to quit)
    Chat(ChatArgs),
}

#[derive(Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub firstname: String,

    #[arg(long)]
    pub lastname: String,
}

#[derive(Args, Clone)]
pub struct TurnArgs {
    /// Model id (see `chatai models`)
    #[arg(short, long, env = "CHATAI_MODEL")]
    pub model: Option<String>,

    /// Custom instructions sent ahead of the conversation
    #[arg(short, long)]
    pub system: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    /// Reply length limit (-1 for unbounded)
    #[arg(long, allow_negative_numbers = true)]
    pub max_tokens: Option<i32>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Prompt text
    pub prompt: String,

    #[command(flatten)]
    pub turn: TurnArgs,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Continue a chat from history
    #[arg(long)]
    pub resume: Option<String>,

    #[command(flatten)]
    pub turn: TurnArgs,
}

//! ChatAI client - streaming chat-completion client
//!
//! This crate provides:
//! - A streaming session that turns a server-sent completion stream into
//!   ordered snapshots of the message list
//! - Incremental UTF-8 decoding and frame parsing for that stream
//! - The request/response calls around it (auth, models, chats, history)

pub mod api;
pub mod config;
pub mod error;
mod http_client;
pub mod message;
pub mod request;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use api::{
    ApiClient, AuthToken, ChatSession, HistoryMessage, ModelInfo, NewChat, RegisterRequest,
};
pub use config::{ClientConfig, CompletionOptions};
pub use error::{ChatError, Result};
pub use message::{Conversation, Message, Role, Snapshot};
pub use request::{ChatCompletionRequest, ChatRequest, ChatTurn, Credentials};
pub use session::{SessionState, SnapshotStream, StreamStats, StreamingChatSession};
pub use stream::{FrameParser, MarkerMode, StreamDelta, Utf8StreamDecoder};
pub use tokio_util::sync::CancellationToken;

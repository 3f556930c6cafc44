//! Error types for the chat client

use thiserror::Error;

use crate::session::SessionState;

/// Chat client error types
#[derive(Error, Debug)]
pub enum ChatError {
    /// The connection could not be established.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The response carries no body to stream from.
    #[error("Response has no streamable body")]
    UnsupportedStream,

    /// A single frame could not be decoded. Recovered inside the session.
    #[error("Malformed frame: {0}")]
    FrameDecode(String),

    #[error("Stream cancelled")]
    Cancelled,

    /// The body failed after streaming had begun.
    #[error("Stream read error: {0}")]
    Read(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session already dispatched (state: {0})")]
    SessionInUse(SessionState),

    /// A non-streaming response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChatError {
    /// Whether this error ends a session that may already hold partial
    /// assistant content.
    pub fn is_terminal_with_partial(&self) -> bool {
        matches!(self, ChatError::Cancelled | ChatError::Read(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::HttpStatus { status, .. } => Some(*status),
            ChatError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for chat client operations
pub type Result<T> = std::result::Result<T, ChatError>;

//! HTTP client for the chat server
//!
//! Besides opening completion streams, the client covers the plain
//! request/response calls the UI layer relies on: registration, sign-in,
//! model listing, chat creation and chat history.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, CompletionOptions};
use crate::error::{ChatError, Result};
use crate::http_client::{build_http_client, status_error};
use crate::message::{Conversation, Message, Role};
use crate::request::ChatRequest;
use crate::session::StreamingChatSession;

/// Registration payload for `/auth/register`.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("firstname", &self.firstname)
            .field("lastname", &self.lastname)
            .field("password", &"***")
            .finish()
    }
}

/// Bearer token issued by the auth endpoints. Opaque to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// Identifier of a freshly created chat. Opaque to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChat {
    pub id: String,
}

/// Stored message as returned by `/chat/history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

impl ChatSession {
    /// Rebuild the visible conversation. Entries of unknown type are dropped.
    pub fn conversation(&self) -> Conversation {
        self.messages
            .iter()
            .filter_map(|item| match Role::parse(&item.kind) {
                Some(role) => Some(Message {
                    role,
                    content: item.content.clone(),
                }),
                None => {
                    tracing::debug!(chat_id = %self.id, kind = %item.kind, "Skipping history entry");
                    None
                }
            })
            .collect::<Vec<_>>()
            .into()
    }
}

/// Chat server client. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client()?, config))
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies, TLS).
    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a session for one completion round trip.
    pub fn session(&self, options: CompletionOptions) -> StreamingChatSession {
        StreamingChatSession::new(self.clone(), options)
    }

    pub async fn register(&self, payload: &RegisterRequest) -> Result<AuthToken> {
        let builder = self
            .client
            .post(self.config.endpoint("/auth/register"))
            .json(payload);
        self.fetch_json(builder, "/auth/register").await
    }

    /// Exchange email and password for a bearer token (HTTP Basic).
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthToken> {
        let credentials = STANDARD.encode(format!("{email}:{password}"));
        let builder = self
            .client
            .get(self.config.endpoint("/auth/authenticate"))
            .header("Authorization", format!("Basic {credentials}"));
        self.fetch_json(builder, "/auth/authenticate").await
    }

    pub async fn get_models(&self, token: Option<&str>) -> Result<Vec<ModelInfo>> {
        let builder = bearer(self.client.get(self.config.endpoint("/chat/models")), token);
        let list: ModelList = self.fetch_json(builder, "/chat/models").await?;
        Ok(list.data)
    }

    pub async fn create_new_chat(&self, token: Option<&str>) -> Result<NewChat> {
        let builder = bearer(
            self.client
                .post(self.config.endpoint("/chat/new"))
                .json(&serde_json::json!({})),
            token,
        );
        self.fetch_json(builder, "/chat/new").await
    }

    pub async fn get_chat_history(&self, token: Option<&str>) -> Result<Vec<ChatSession>> {
        let builder = bearer(self.client.get(self.config.endpoint("/chat/history")), token);
        self.fetch_json(builder, "/chat/history").await
    }

    /// POST the completion request and return the response once its status
    /// is known to be a success. The body is left unread.
    pub async fn open_completion(
        &self,
        request: &ChatRequest,
        token: Option<&str>,
    ) -> Result<Response> {
        let builder = bearer(
            self.client
                .post(self.config.endpoint("/chat/completion"))
                .header("Content-Type", "application/json")
                .json(request),
            token,
        );

        tracing::debug!(
            model = %request.chat_completion_request.model,
            messages = request.chat_completion_request.messages.len(),
            "Opening completion stream"
        );
        let response = builder.send().await.map_err(ChatError::Transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> Result<T> {
        tracing::debug!(path, "Sending request");
        let response = builder.send().await.map_err(ChatError::Transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.text().await.map_err(ChatError::Transport)?;
        serde_json::from_str(&body).map_err(|e| ChatError::Decode(format!("{path}: {e}")))
    }
}

/// Attach a bearer token when one is available; anonymous otherwise.
fn bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.header("Authorization", format!("Bearer {token}")),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_converts_to_conversation() {
        let session: ChatSession = serde_json::from_value(serde_json::json!({
            "id": "chat-9",
            "summary": "math",
            "messages": [
                {"content": "Be terse.", "type": "SYSTEM"},
                {"content": "2+2?", "type": "USER"},
                {"content": "4", "type": "ASSISTANT"},
                {"content": "lookup", "type": "TOOL"}
            ]
        }))
        .unwrap();

        let conversation = session.conversation();
        assert_eq!(
            conversation.messages(),
            &[
                Message::system("Be terse."),
                Message::user("2+2?"),
                Message::assistant("4"),
            ]
        );
    }

    #[test]
    fn history_tolerates_missing_fields() {
        let session: ChatSession =
            serde_json::from_value(serde_json::json!({"id": "chat-1"})).unwrap();
        assert!(session.summary.is_none());
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn register_debug_hides_password() {
        let payload = RegisterRequest {
            email: "a@b.c".to_string(),
            firstname: "A".to_string(),
            lastname: "B".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{payload:?}").contains("hunter2"));
    }
}

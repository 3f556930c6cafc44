//! Wire request shapes for `/chat/completion`

use serde::{Deserialize, Serialize};

use crate::config::CompletionOptions;
use crate::message::{Conversation, Message};

/// Body of the `chatCompletionRequest` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: i32,
    pub stream: bool,
}

/// Full request body. `chat_id` is opaque and serialized as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub chat_completion_request: ChatCompletionRequest,
}

/// One user turn to send: prior visible history, the new prompt, and the
/// model to answer it.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub history: Conversation,
    pub prompt: String,
    pub model: String,
    pub system_prompt: Option<String>,
}

impl ChatTurn {
    pub fn new(history: Conversation, prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            history,
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: None,
        }
    }

    /// Instructions prepended to the request only; never shown in snapshots.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// The visible list once the user turn is appended.
    pub(crate) fn visible_messages(&self) -> Vec<Message> {
        let mut messages = self.history.messages().to_vec();
        messages.push(Message::user(self.prompt.clone()));
        messages
    }

    /// Build the request body from a copy of the turn. Later changes to the
    /// caller's conversation do not reach an already built request.
    pub(crate) fn to_request(
        &self,
        chat_id: Option<String>,
        options: CompletionOptions,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.visible_messages());

        ChatRequest {
            chat_id,
            chat_completion_request: ChatCompletionRequest {
                model: self.model.clone(),
                messages,
                temperature: options.temperature,
                max_tokens: options.max_tokens,
                stream: true,
            },
        }
    }
}

/// Bearer token and active chat id, handed in fresh for each call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        Self { token, chat_id }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_matches_server_shape() {
        let turn = ChatTurn::new(Conversation::new(), "hello", "test-model")
            .with_system_prompt("Always answer in rhymes.");
        let request = turn.to_request(Some("chat-1".to_string()), CompletionOptions::default());

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "chatId": "chat-1",
                "chatCompletionRequest": {
                    "model": "test-model",
                    "messages": [
                        {"role": "system", "content": "Always answer in rhymes."},
                        {"role": "user", "content": "hello"}
                    ],
                    "temperature": 0.7,
                    "maxTokens": -1,
                    "stream": true
                }
            })
        );
    }

    #[test]
    fn missing_chat_id_serializes_as_null() {
        let turn = ChatTurn::new(Conversation::new(), "hi", "m");
        let value = serde_json::to_value(turn.to_request(None, CompletionOptions::default())).unwrap();
        assert!(value["chatId"].is_null());
    }

    #[test]
    fn history_precedes_new_turn() {
        let history = Conversation::from(vec![Message::user("first"), Message::assistant("one")]);
        let turn = ChatTurn::new(history, "second", "m").with_system_prompt("sys");
        let request = turn.to_request(None, CompletionOptions::default());
        let roles: Vec<_> = request
            .chat_completion_request
            .messages
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    }

    #[test]
    fn built_request_is_detached_from_history() {
        let mut turn = ChatTurn::new(Conversation::new(), "q", "m");
        let request = turn.to_request(None, CompletionOptions::default());
        turn.history.push(Message::user("late"));
        assert_eq!(request.chat_completion_request.messages.len(), 1);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message from raw input, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidRequest`] when the input is blank.
    pub fn user(input: &str) -> Result<Self, StreamError> {
        let content = input.trim();
        if content.is_empty() {
            return Err(StreamError::InvalidRequest(
                "user message cannot be empty".into(),
            ));
        }
        Ok(Self {
            role: Role::User,
            content: content.to_string(),
        })
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON body shared by both streaming endpoints: `{"messages":[...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
}

/// Messages to send for a new user turn.
///
/// A system message survives only in first position; user and assistant
/// turns keep their order and the new message is appended.
#[must_use]
pub fn outbound_messages(history: &[ChatMessage], user_message: ChatMessage) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    for (index, message) in history.iter().enumerate() {
        if message.role == Role::System && index != 0 {
            continue;
        }
        messages.push(message.clone());
    }
    messages.push(user_message);
    messages
}

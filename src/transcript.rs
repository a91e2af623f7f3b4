//! Reference consumer of decoder events: the assistant message being produced.
//!
//! Detecting a stream that finished without producing anything is done here,
//! on top of the callbacks, rather than in the decoder.

use serde_json::Value;

use crate::protocol::ChatMessage;
use crate::stream::EventSink;

/// Message reported when a session ends without text, tool activity, or error.
pub const EMPTY_STREAM_MESSAGE: &str = "no data received from the service";

/// How a streamed assistant turn ended, judged from sink activity.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    Completed { text: String },
    Failed { message: String, partial_text: String },
    Empty,
}

/// Accumulates one assistant turn from sink callbacks.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    text: String,
    tool_calls: Vec<Value>,
    tool_results: Vec<Value>,
    error: Option<String>,
    loading: bool,
    received_content: bool,
    resets: usize,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn tool_calls(&self) -> &[Value] {
        &self.tool_calls
    }

    #[must_use]
    pub fn tool_results(&self) -> &[Value] {
        &self.tool_results
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True between `on_start` and the terminal callback.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of times the message text was restarted by the service.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets
    }

    #[must_use]
    pub fn outcome(&self) -> TranscriptOutcome {
        if let Some(message) = &self.error {
            return TranscriptOutcome::Failed {
                message: message.clone(),
                partial_text: self.text.clone(),
            };
        }
        if self.text.is_empty() && !self.received_content {
            return TranscriptOutcome::Empty;
        }
        TranscriptOutcome::Completed {
            text: self.text.clone(),
        }
    }

    /// The assistant message to append to the conversation, if any text arrived.
    #[must_use]
    pub fn into_message(self) -> Option<ChatMessage> {
        if self.text.is_empty() {
            None
        } else {
            Some(ChatMessage::assistant(self.text))
        }
    }
}

impl EventSink for Transcript {
    fn on_start(&mut self) {
        *self = Self {
            loading: true,
            ..Self::default()
        };
    }

    fn on_token(&mut self, text: String) {
        self.received_content = true;
        self.text.push_str(&text);
    }

    fn on_reset_text(&mut self) {
        self.resets += 1;
        self.text.clear();
    }

    fn on_tool_call(&mut self, payload: Value) {
        self.received_content = true;
        self.tool_calls.push(payload);
    }

    fn on_tool_result(&mut self, payload: Value) {
        self.received_content = true;
        self.tool_results.push(payload);
    }

    fn on_finish(&mut self) {
        self.loading = false;
    }

    fn on_error(&mut self, message: String) {
        self.loading = false;
        self.error = Some(message);
    }
}

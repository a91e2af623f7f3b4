use std::time::Duration;

use tracing::info;

use crate::protocol::ChatMessage;

/// Estimated token counts for one chat exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl SessionUsage {
    /// Estimate usage from the messages sent and the text received.
    #[must_use]
    pub fn estimate(messages: &[ChatMessage], response_text: &str) -> Self {
        Self {
            input_tokens: estimate_request_tokens(messages),
            output_tokens: estimate_tokens(response_text),
        }
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) since the services do not
/// report usage in their streams.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the input tokens of a request: every message's content.
#[must_use]
pub fn estimate_request_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|message| estimate_tokens(&message.content))
        .sum()
}

/// Log estimated usage for a completed chat exchange at INFO level.
pub fn log_session_usage(endpoint: &str, usage: &SessionUsage, duration: Duration) {
    info!(
        endpoint = endpoint,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total_tokens = usage.total_tokens(),
        duration_seconds = duration.as_secs_f64(),
        "chat completed"
    );
}

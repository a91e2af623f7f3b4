use serde_json::Value;

/// Semantic event decoded from a chat response stream.
///
/// Both wire formats map onto this one vocabulary. Each event is delivered to
/// the sink exactly once and is never retained by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start,
    TokenDelta(String),
    /// Discard any text accumulated for the current assistant message.
    ResetText,
    ToolCall(Value),
    ToolResult(Value),
    Finish,
    Error(String),
}

impl StreamEvent {
    /// `Finish` and `Error` close a session when they come from the transport.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish | StreamEvent::Error(_))
    }

    /// Short name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::TokenDelta(_) => "token",
            StreamEvent::ResetText => "reset_text",
            StreamEvent::ToolCall(_) => "tool_call",
            StreamEvent::ToolResult(_) => "tool_result",
            StreamEvent::Finish => "finish",
            StreamEvent::Error(_) => "error",
        }
    }
}

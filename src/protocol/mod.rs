pub mod chat;
pub mod delta;
pub mod multiplexed;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use crate::stream::{SessionState, StreamEvent};

pub use chat::{outbound_messages, ChatMessage, ChatRequest, Role};
pub use delta::DeltaParser;
pub use multiplexed::MultiplexedParser;

/// Events produced by one record. Most records yield zero or one event; a
/// Format B token after a message start yields two.
pub type RecordEvents = SmallVec<[StreamEvent; 2]>;

/// Wire convention of a chat response stream, selected once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `data: <json>` records carrying `choices[0].delta.content`, ended by `[DONE]`.
    #[default]
    Delta,
    /// `<code>:<payload>` records, one code per semantic channel.
    Multiplexed,
}

impl WireFormat {
    /// Build the record parser for this format.
    #[must_use]
    pub fn parser(self) -> Box<dyn RecordParser + Send> {
        match self {
            WireFormat::Delta => Box::new(DeltaParser),
            WireFormat::Multiplexed => Box::new(MultiplexedParser),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Delta => write!(f, "delta"),
            WireFormat::Multiplexed => write!(f, "multiplexed"),
        }
    }
}

/// Interprets one complete record of a response stream.
///
/// Implementations never fail: malformed records are logged and produce no
/// events, so a single bad record cannot desynchronise the session.
pub trait RecordParser {
    fn format(&self) -> WireFormat;

    /// Append the events for `line` to `out`.
    fn parse_record(&self, line: &str, state: &mut SessionState, out: &mut RecordEvents);
}

/// Extract a displayable message from an `error` value.
///
/// Strings are used verbatim, objects contribute their `message` field, and
/// anything else falls back to its JSON text. `null`, `false`, `0` and `""`
/// mean "no error".
pub(crate) fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) if !message.is_empty() => Some(message.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

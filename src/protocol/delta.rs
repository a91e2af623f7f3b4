//! Single-channel delta format: `data: <json>` records ended by `data: [DONE]`.
//!
//! The sentinel is not an event. `Finish` comes from the transport reaching
//! end of stream, which the session observes independently of line content.
//!
//! A record may also carry a complete, non-streamed reply in
//! `choices[0].message.content`. That text replaces everything received so far.

use serde_json::Value;

use super::{error_message, RecordEvents, RecordParser, WireFormat};
use crate::stream::{SessionState, StreamEvent};

const DATA_PREFIX: &str = "data:";

/// Payload marking the end of tokens inside a delta stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What one data record contributes to the message.
#[derive(Debug, PartialEq)]
enum DeltaRecord {
    Event(StreamEvent),
    /// Whole reply text; supersedes the accumulated message.
    FullMessage(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaParser;

impl DeltaParser {
    /// Decode one record into at most one event.
    ///
    /// A complete reply is reported as its text; [`RecordParser::parse_record`]
    /// additionally resets the message before it.
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Option<StreamEvent> {
        match self.decode(line)? {
            DeltaRecord::Event(event) => Some(event),
            DeltaRecord::FullMessage(text) => Some(StreamEvent::TokenDelta(text)),
        }
    }

    fn decode(&self, line: &str) -> Option<DeltaRecord> {
        if line.trim().is_empty() {
            return None;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            tracing::trace!(line, "ignoring non-data record");
            return None;
        };
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            tracing::debug!("delta stream sent done sentinel");
            return None;
        }

        let parsed: Value = match serde_json::from_str(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, payload, "skipping malformed delta record");
                return None;
            }
        };

        if let Some(message) = parsed.get("error").and_then(error_message) {
            return Some(DeltaRecord::Event(StreamEvent::Error(message)));
        }

        if let Some(content) = text_field(&parsed, "/choices/0/delta/content") {
            return Some(DeltaRecord::Event(StreamEvent::TokenDelta(content)));
        }
        text_field(&parsed, "/choices/0/message/content").map(DeltaRecord::FullMessage)
    }
}

/// Non-empty string at `pointer`. Other non-null values are skipped.
fn text_field(record: &Value, pointer: &str) -> Option<String> {
    match record.pointer(pointer)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::String(_) | Value::Null => None,
        other => {
            tracing::trace!(field = pointer, value = %other, "skipping non-text content");
            None
        }
    }
}

impl RecordParser for DeltaParser {
    fn format(&self) -> WireFormat {
        WireFormat::Delta
    }

    fn parse_record(&self, line: &str, _state: &mut SessionState, out: &mut RecordEvents) {
        match self.decode(line) {
            Some(DeltaRecord::Event(event)) => out.push(event),
            Some(DeltaRecord::FullMessage(text)) => {
                out.push(StreamEvent::ResetText);
                out.push(StreamEvent::TokenDelta(text));
            }
            None => {}
        }
    }
}

//! Multiplexed prefix format: every record is `<code>:<payload>`, where the
//! single alphanumeric code selects the channel and the payload is usually JSON.
//!
//! | code | channel            | events                                   |
//! |------|--------------------|------------------------------------------|
//! | `f`  | message start      | none; arms the first-token reset         |
//! | `9`  | tool invocation    | `ToolCall`                               |
//! | `a`  | tool result        | `ToolResult`, then `Error` if it failed  |
//! | `0`  | text token         | `ResetText` (first token only), `TokenDelta` |
//! | `e`  | partial completion | none                                     |
//! | `d`  | final completion   | none                                     |

use serde_json::Value;

use super::{error_message, RecordEvents, RecordParser, WireFormat};
use crate::stream::{SessionState, StreamEvent};

const MESSAGE_START: char = 'f';
const TOOL_CALL: char = '9';
const TOOL_RESULT: char = 'a';
const TEXT_TOKEN: char = '0';
const STEP_FINISH: char = 'e';
const MESSAGE_FINISH: char = 'd';

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiplexedParser;

impl MultiplexedParser {
    /// Decode one record, updating the session's first-token flag.
    pub fn parse_line(&self, line: &str, state: &mut SessionState, out: &mut RecordEvents) {
        if line.trim().is_empty() {
            return;
        }
        let Some((code, payload)) = split_record(line) else {
            tracing::warn!(line, "skipping record with unexpected shape");
            return;
        };

        match code {
            MESSAGE_START => {
                tracing::debug!(payload, "message start");
                state.first_token_pending = true;
            }
            TOOL_CALL => match serde_json::from_str::<Value>(payload) {
                Ok(call) => out.push(StreamEvent::ToolCall(call)),
                Err(err) => {
                    tracing::warn!(error = %err, payload, "skipping malformed tool call");
                }
            },
            TOOL_RESULT => match serde_json::from_str::<Value>(payload) {
                Ok(result) => {
                    let failure = tool_result_error(&result);
                    out.push(StreamEvent::ToolResult(result));
                    if let Some(message) = failure {
                        out.push(StreamEvent::Error(message));
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, payload, "skipping malformed tool result");
                }
            },
            TEXT_TOKEN => {
                let token = decode_token(payload);
                if state.first_token_pending {
                    state.first_token_pending = false;
                    out.push(StreamEvent::ResetText);
                }
                out.push(StreamEvent::TokenDelta(token));
            }
            STEP_FINISH | MESSAGE_FINISH => {
                tracing::debug!(code = %code, payload, "completion marker");
            }
            other => {
                tracing::debug!(code = %other, payload, "ignoring unknown record code");
            }
        }
    }
}

impl RecordParser for MultiplexedParser {
    fn format(&self) -> WireFormat {
        WireFormat::Multiplexed
    }

    fn parse_record(&self, line: &str, state: &mut SessionState, out: &mut RecordEvents) {
        self.parse_line(line, state, out);
    }
}

/// Split `<code>:<payload>`; the code is exactly one ASCII alphanumeric char.
fn split_record(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let code = chars.next().filter(char::is_ascii_alphanumeric)?;
    let payload = chars.as_str().strip_prefix(':')?;
    Some((code, payload))
}

/// A token payload is normally a JSON string; anything else is taken verbatim.
fn decode_token(payload: &str) -> String {
    match serde_json::from_str::<String>(payload) {
        Ok(token) => token,
        Err(_) => payload.to_owned(),
    }
}

fn tool_result_error(result: &Value) -> Option<String> {
    if let Some(message) = result.get("error").and_then(error_message) {
        return Some(message);
    }
    let inner = result.get("result");
    if let Some(message) = inner.and_then(|inner| inner.get("error")).and_then(error_message) {
        return Some(message);
    }
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let detail = inner.map_or_else(|| result.to_string(), Value::to_string);
        return Some(format!("tool call failed: {detail}"));
    }
    None
}

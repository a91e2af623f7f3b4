/// Maximum number of upstream body bytes quoted in an error message.
const UPSTREAM_BODY_PREVIEW_BYTES: usize = 512;

/// Failure of the byte source feeding a decoder session.
///
/// Every variant is fatal to the session it reaches: it is surfaced exactly
/// once through [`EventSink::on_error`](crate::stream::EventSink::on_error).
/// Malformed records are never errors; parsers log and skip them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}{message}")]
    Upstream { status: u16, message: String },
    #[error("Response did not provide a body stream")]
    MissingBody,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StreamError {
    /// Build an upstream status error, quoting a bounded prefix of the body.
    #[must_use]
    pub fn upstream(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            String::new()
        } else {
            let mut end = body.len().min(UPSTREAM_BODY_PREVIEW_BYTES);
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(": {}", &body[..end])
        };
        StreamError::Upstream { status, message }
    }

    /// Whether the failure happened before any byte of the response arrived.
    #[must_use]
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            StreamError::Upstream { .. } | StreamError::MissingBody | StreamError::InvalidRequest(_)
        )
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

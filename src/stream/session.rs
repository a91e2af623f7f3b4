//! One in-flight request's decode loop.
//!
//! A [`DecoderSession`] pulls chunks from a [`ByteSource`], frames them into
//! records with a [`LineAssembler`], routes each record through the parser
//! for its [`WireFormat`], and forwards the resulting events to an
//! [`EventSink`]. It can also be driven by hand through the push API
//! (`begin` / `feed` / `finish` / `fail`), which is what [`DecoderSession::run`]
//! uses internally.

use std::mem;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use super::{EventSink, LineAssembler};
use crate::protocol::{RecordEvents, RecordParser, WireFormat};
use crate::transport::ByteSource;

/// Per-request decoder state. Exclusively owned by one session.
#[derive(Debug)]
pub struct SessionState {
    /// Holds the unterminated tail of the stream between chunks.
    pub(crate) lines: LineAssembler,
    /// Set by a message-start record; the next text token resets the message.
    pub first_token_pending: bool,
    pub active: bool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LineAssembler::new(),
            first_token_pending: false,
            active: true,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Source exhausted; `on_finish` was called.
    Finished,
    /// Source failed; `on_error` was called.
    Failed,
    /// Stopped through [`CancelHandle`]; no terminal callback was made.
    Cancelled,
}

/// Requests that a session stop pulling chunks and stop calling its sink.
///
/// Cloneable and usable from any task. Cancelling a session that already
/// ended has no effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The session keeps the sender alive, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Decodes one response stream into sink callbacks.
pub struct DecoderSession {
    id: Uuid,
    format: WireFormat,
    parser: Box<dyn RecordParser + Send>,
    state: SessionState,
    started: bool,
    outcome: Option<SessionOutcome>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    scratch_lines: Vec<String>,
    records: u64,
}

impl DecoderSession {
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            format,
            parser: format.parser(),
            state: SessionState::new(),
            started: false,
            outcome: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            scratch_lines: Vec::new(),
            records: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// `None` while the session is still active.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Emit `on_start`. Called implicitly by the other push operations.
    pub fn begin(&mut self, sink: &mut impl EventSink) {
        if self.started || !self.accepting() {
            return;
        }
        self.started = true;
        tracing::debug!(session_id = %self.id, format = %self.format, "decoder session started");
        sink.on_start();
    }

    /// Frame one chunk and deliver the events of every record it completes.
    pub fn feed(&mut self, chunk: &[u8], sink: &mut impl EventSink) {
        self.begin(sink);
        if !self.accepting() {
            return;
        }
        let mut lines = mem::take(&mut self.scratch_lines);
        self.state.lines.feed_into(chunk, &mut lines);
        for line in lines.drain(..) {
            if !self.dispatch_record(&line, sink) {
                break;
            }
        }
        lines.clear();
        self.scratch_lines = lines;
    }

    /// Normal end of stream: process the final partial record, then `on_finish`.
    pub fn finish(&mut self, sink: &mut impl EventSink) {
        self.begin(sink);
        if !self.accepting() {
            return;
        }
        if let Some(line) = self.state.lines.flush() {
            tracing::debug!(session_id = %self.id, "processing unterminated final record");
            if !self.dispatch_record(&line, sink) {
                return;
            }
        }
        self.close(SessionOutcome::Finished);
        tracing::debug!(session_id = %self.id, records = self.records, "decoder session finished");
        sink.on_finish();
    }

    /// Transport failure: `on_error` once, no `on_finish`.
    pub fn fail(&mut self, message: impl Into<String>, sink: &mut impl EventSink) {
        self.begin(sink);
        if !self.accepting() {
            return;
        }
        let message = message.into();
        self.close(SessionOutcome::Failed);
        tracing::warn!(session_id = %self.id, records = self.records, error = %message, "decoder session failed");
        sink.on_error(message);
    }

    /// Stop without a terminal callback.
    pub fn cancel(&mut self) {
        self.cancel_tx.send_replace(true);
        if self.state.active {
            self.close(SessionOutcome::Cancelled);
            tracing::debug!(session_id = %self.id, records = self.records, "decoder session cancelled");
        }
    }

    /// Drive `source` to completion, cancellation, or failure.
    ///
    /// A pending `read` is abandoned as soon as the session's [`CancelHandle`]
    /// fires; the source is then cancelled and the sink hears nothing more.
    pub async fn run<S, K>(mut self, mut source: S, mut sink: K) -> SessionOutcome
    where
        S: ByteSource,
        K: EventSink,
    {
        self.begin(&mut sink);
        let mut cancel_rx = self.cancel_rx.clone();
        while self.accepting() {
            let read = tokio::select! {
                biased;
                Ok(_) = cancel_rx.wait_for(|cancelled| *cancelled) => None,
                read = source.read() => Some(read),
            };
            match read {
                None => self.cancel(),
                Some(Ok(Some(chunk))) => self.feed(&chunk, &mut sink),
                Some(Ok(None)) => self.finish(&mut sink),
                Some(Err(err)) => self.fail(err.to_string(), &mut sink),
            }
        }

        let outcome = self.outcome.unwrap_or(SessionOutcome::Cancelled);
        if outcome == SessionOutcome::Cancelled {
            source.cancel();
        }
        outcome
    }

    /// Whether callbacks may still be made. Observes the cancel handle.
    fn accepting(&mut self) -> bool {
        if self.state.active && *self.cancel_rx.borrow() {
            self.cancel();
        }
        self.state.active
    }

    /// Returns `false` when the session stopped accepting events.
    fn dispatch_record(&mut self, line: &str, sink: &mut impl EventSink) -> bool {
        if !self.accepting() {
            return false;
        }
        self.records += 1;
        let mut events = RecordEvents::new();
        self.parser.parse_record(line, &mut self.state, &mut events);
        for event in events {
            sink.deliver(event);
        }
        true
    }

    fn close(&mut self, outcome: SessionOutcome) {
        self.state.active = false;
        self.outcome = Some(outcome);
    }
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

use serde_json::Value;
use tokio::sync::mpsc;

use super::StreamEvent;

/// Consumer of decoded stream events, owned by the layer above the decoder.
///
/// A session calls `on_start` exactly once, then any number of the content
/// callbacks in arrival order, then at most one of `on_finish` / `on_error`
/// as its terminal callback. Parser-level `Error` events (an error payload
/// inside the stream) also arrive through `on_error` and do not end the
/// session.
pub trait EventSink {
    fn on_start(&mut self);
    fn on_token(&mut self, text: String);
    fn on_reset_text(&mut self);
    fn on_tool_call(&mut self, payload: Value);
    fn on_tool_result(&mut self, payload: Value);
    fn on_finish(&mut self);
    fn on_error(&mut self, message: String);

    /// Route one event to its callback.
    fn deliver(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Start => self.on_start(),
            StreamEvent::TokenDelta(text) => self.on_token(text),
            StreamEvent::ResetText => self.on_reset_text(),
            StreamEvent::ToolCall(payload) => self.on_tool_call(payload),
            StreamEvent::ToolResult(payload) => self.on_tool_result(payload),
            StreamEvent::Finish => self.on_finish(),
            StreamEvent::Error(message) => self.on_error(message),
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn on_start(&mut self) {
        (**self).on_start();
    }

    fn on_token(&mut self, text: String) {
        (**self).on_token(text);
    }

    fn on_reset_text(&mut self) {
        (**self).on_reset_text();
    }

    fn on_tool_call(&mut self, payload: Value) {
        (**self).on_tool_call(payload);
    }

    fn on_tool_result(&mut self, payload: Value) {
        (**self).on_tool_result(payload);
    }

    fn on_finish(&mut self) {
        (**self).on_finish();
    }

    fn on_error(&mut self, message: String) {
        (**self).on_error(message);
    }

    fn deliver(&mut self, event: StreamEvent) {
        (**self).deliver(event);
    }
}

/// Records every callback as the event it came from.
impl EventSink for Vec<StreamEvent> {
    fn on_start(&mut self) {
        self.push(StreamEvent::Start);
    }

    fn on_token(&mut self, text: String) {
        self.push(StreamEvent::TokenDelta(text));
    }

    fn on_reset_text(&mut self) {
        self.push(StreamEvent::ResetText);
    }

    fn on_tool_call(&mut self, payload: Value) {
        self.push(StreamEvent::ToolCall(payload));
    }

    fn on_tool_result(&mut self, payload: Value) {
        self.push(StreamEvent::ToolResult(payload));
    }

    fn on_finish(&mut self) {
        self.push(StreamEvent::Finish);
    }

    fn on_error(&mut self, message: String) {
        self.push(StreamEvent::Error(message));
    }

    fn deliver(&mut self, event: StreamEvent) {
        self.push(event);
    }
}

/// Forwards events to another task over an unbounded channel.
///
/// Ordering is preserved by the channel. Once the receiver is dropped,
/// further events are discarded.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
    receiver_dropped: bool,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    #[must_use]
    pub fn from_sender(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx,
            receiver_dropped: false,
        }
    }

    fn send(&mut self, event: StreamEvent) {
        if self.receiver_dropped {
            return;
        }
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            tracing::debug!(
                event = event.kind(),
                "event receiver dropped, discarding remaining events"
            );
            self.receiver_dropped = true;
        }
    }
}

impl EventSink for ChannelSink {
    fn on_start(&mut self) {
        self.send(StreamEvent::Start);
    }

    fn on_token(&mut self, text: String) {
        self.send(StreamEvent::TokenDelta(text));
    }

    fn on_reset_text(&mut self) {
        self.send(StreamEvent::ResetText);
    }

    fn on_tool_call(&mut self, payload: Value) {
        self.send(StreamEvent::ToolCall(payload));
    }

    fn on_tool_result(&mut self, payload: Value) {
        self.send(StreamEvent::ToolResult(payload));
    }

    fn on_finish(&mut self) {
        self.send(StreamEvent::Finish);
    }

    fn on_error(&mut self, message: String) {
        self.send(StreamEvent::Error(message));
    }

    fn deliver(&mut self, event: StreamEvent) {
        self.send(event);
    }
}

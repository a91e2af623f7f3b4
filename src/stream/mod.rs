pub mod event;
pub mod lines;
pub mod session;
pub mod sink;

pub use event::StreamEvent;
pub use lines::LineAssembler;
pub use session::{CancelHandle, DecoderSession, SessionOutcome, SessionState};
pub use sink::{ChannelSink, EventSink};

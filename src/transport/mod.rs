mod http_transport;
mod source;

pub use http_transport::{ChatStream, HttpSource, HttpTransport};
pub use source::{BoxedSource, ByteSource, ChunkSource, StreamSource};

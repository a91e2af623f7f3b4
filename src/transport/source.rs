use std::convert::Infallible;
use std::fmt;
use std::future::Future;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};

use crate::error::StreamError;

/// Incrementally-arriving response body.
///
/// `read` yields chunks in arrival order, `Ok(None)` once the body is
/// exhausted, and `Err` when the transport fails. After `cancel`, the source
/// releases its resources and every further `read` returns `Ok(None)`.
pub trait ByteSource {
    fn read(&mut self) -> impl Future<Output = Result<Option<Bytes>, StreamError>> + Send;

    fn cancel(&mut self);
}

/// [`ByteSource`] over any stream of byte chunks, such as an HTTP body.
pub struct StreamSource<S> {
    inner: Option<S>,
}

impl<S> StreamSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: Some(stream),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// In-memory source yielding fixed chunks, then end of stream.
pub type ChunkSource = StreamSource<stream::Iter<std::vec::IntoIter<Result<Bytes, Infallible>>>>;

/// Source over a boxed fallible chunk stream.
pub type BoxedSource<E> = StreamSource<BoxStream<'static, Result<Bytes, E>>>;

impl ChunkSource {
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, Infallible>> =
            chunks.into_iter().map(|chunk| Ok(chunk.into())).collect();
        Self::new(stream::iter(chunks))
    }
}

impl<S, E> ByteSource for StreamSource<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: fmt::Display,
{
    async fn read(&mut self) -> Result<Option<Bytes>, StreamError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(err)) => {
                self.inner = None;
                Err(StreamError::Transport(err.to_string()))
            }
            None => {
                self.inner = None;
                Ok(None)
            }
        }
    }

    fn cancel(&mut self) {
        self.inner = None;
    }
}

impl<S> fmt::Debug for StreamSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource")
            .field("closed", &self.is_closed())
            .finish()
    }
}

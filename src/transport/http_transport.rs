use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use super::source::{BoxedSource, StreamSource};
use crate::config::{EndpointConfig, TransportConfig};
use crate::error::StreamError;
use crate::protocol::{ChatMessage, ChatRequest};
use crate::stream::{CancelHandle, DecoderSession, EventSink, SessionOutcome};

/// Response body of a streaming chat request.
pub type HttpSource = BoxedSource<reqwest::Error>;

fn build_reqwest_client(config: &TransportConfig) -> Result<reqwest::Client, StreamError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    if !config.use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| StreamError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client that opens streaming chat requests.
///
/// Failed requests are not retried; a failure is reported to the session
/// that owns the request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with pooling and timeouts from the given config.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self, StreamError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
        })
    }

    /// POST `messages` to `endpoint` and return the response body as a byte source.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] when the request cannot be sent,
    /// [`StreamError::Upstream`] for a non-success status, and
    /// [`StreamError::MissingBody`] for a `204 No Content` response.
    pub async fn open(
        &self,
        endpoint: &EndpointConfig,
        messages: &[ChatMessage],
    ) -> Result<HttpSource, StreamError> {
        tracing::debug!(
            endpoint = %endpoint.name,
            format = %endpoint.format,
            messages = messages.len(),
            "opening chat stream"
        );
        let response = self
            .client
            .post(endpoint.url.as_str())
            .header(ACCEPT, "text/event-stream")
            .json(&ChatRequest { messages })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::upstream(status.as_u16(), &body));
        }
        if status == StatusCode::NO_CONTENT {
            return Err(StreamError::MissingBody);
        }

        Ok(StreamSource::new(response.bytes_stream().boxed()))
    }

    /// Prepare a streaming chat request decoded in the endpoint's wire format.
    #[must_use]
    pub fn chat<'a>(
        &'a self,
        endpoint: &'a EndpointConfig,
        messages: Vec<ChatMessage>,
    ) -> ChatStream<'a> {
        ChatStream {
            transport: self,
            endpoint,
            messages,
            session: DecoderSession::new(endpoint.format),
        }
    }
}

/// One chat request and the session that will decode its response.
#[derive(Debug)]
pub struct ChatStream<'a> {
    transport: &'a HttpTransport,
    endpoint: &'a EndpointConfig,
    messages: Vec<ChatMessage>,
    session: DecoderSession,
}

impl ChatStream<'_> {
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    #[must_use]
    pub fn session(&self) -> &DecoderSession {
        &self.session
    }

    /// Send the request and decode the response into `sink`.
    ///
    /// A request that cannot be opened still produces a session: the sink sees
    /// `on_start` followed by exactly one `on_error`.
    pub async fn run<K: EventSink>(self, mut sink: K) -> SessionOutcome {
        let ChatStream {
            transport,
            endpoint,
            messages,
            mut session,
        } = self;
        let cancel = session.cancel_handle();

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            opened = transport.open(endpoint, &messages) => Some(opened),
        };

        match opened {
            None => {
                session.cancel();
                SessionOutcome::Cancelled
            }
            Some(Ok(source)) => session.run(source, sink).await,
            Some(Err(err)) => {
                session.fail(err.to_string(), &mut sink);
                session.outcome().unwrap_or(SessionOutcome::Failed)
            }
        }
    }
}

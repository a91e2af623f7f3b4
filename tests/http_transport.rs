use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use glyph_stream::config::{EndpointConfig, TransportConfig};
use glyph_stream::error::StreamError;
use glyph_stream::protocol::{ChatMessage, WireFormat};
use glyph_stream::stream::{SessionOutcome, StreamEvent};
use glyph_stream::transcript::{Transcript, TranscriptOutcome};
use glyph_stream::transport::{ByteSource, HttpTransport};

fn endpoint(server: &MockServer, format: WireFormat) -> EndpointConfig {
    EndpointConfig {
        name: "mock".to_string(),
        format,
        url: format!("{}/chat/stream", server.uri()),
        description: String::new(),
        is_default: true,
    }
}

fn transport() -> HttpTransport {
    HttpTransport::new(&TransportConfig::default()).expect("client")
}

fn hello() -> Vec<ChatMessage> {
    vec![ChatMessage::user("hi").expect("user message")]
}

#[tokio::test]
async fn test_delta_endpoint_streams_tokens() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .and(header("accept", "text/event-stream"))
        .and(body_json(json!({"messages": [{"role": "user", "content": "hi"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport();
    let endpoint = endpoint(&server, WireFormat::Delta);
    let mut events = Vec::new();
    let outcome = transport.chat(&endpoint, hello()).run(&mut events).await;

    assert_eq!(outcome, SessionOutcome::Finished);
    assert_eq!(
        events,
        vec![
            StreamEvent::Start,
            StreamEvent::TokenDelta("Hel".into()),
            StreamEvent::TokenDelta("lo".into()),
            StreamEvent::Finish,
        ]
    );
}

#[tokio::test]
async fn test_multiplexed_endpoint_feeds_transcript() {
    let server = MockServer::start().await;
    let body = concat!(
        "f:{\"messageId\":\"msg-1\"}\n",
        "9:{\"toolCallId\":\"call-1\",\"toolName\":\"weatherTool\",\"args\":{\"location\":\"Paris\"}}\n",
        "a:{\"toolCallId\":\"call-1\",\"result\":{\"temperature\":18}}\n",
        "0:\"It is \"\n",
        "0:\"18 degrees.\"\n",
        "d:{\"finishReason\":\"stop\"}\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain"))
        .mount(&server)
        .await;

    let transport = transport();
    let endpoint = endpoint(&server, WireFormat::Multiplexed);
    let mut transcript = Transcript::new();
    let outcome = transport.chat(&endpoint, hello()).run(&mut transcript).await;

    assert_eq!(outcome, SessionOutcome::Finished);
    assert_eq!(transcript.resets(), 1);
    assert_eq!(transcript.tool_calls().len(), 1);
    assert_eq!(transcript.tool_results().len(), 1);
    assert_eq!(
        transcript.outcome(),
        TranscriptOutcome::Completed {
            text: "It is 18 degrees.".into()
        }
    );
}

#[tokio::test]
async fn test_upstream_status_is_reported_after_start() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let transport = transport();
    let endpoint = endpoint(&server, WireFormat::Delta);
    let mut events = Vec::new();
    let outcome = transport.chat(&endpoint, hello()).run(&mut events).await;

    assert_eq!(outcome, SessionOutcome::Failed);
    assert_eq!(
        events,
        vec![
            StreamEvent::Start,
            StreamEvent::Error("upstream returned status 500: model overloaded".into()),
        ]
    );
}

#[tokio::test]
async fn test_open_rejects_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = transport()
        .open(&endpoint(&server, WireFormat::Delta), &hello())
        .await;
    let err = result.err().expect("404 must fail");
    assert_eq!(
        err,
        StreamError::Upstream {
            status: 404,
            message: String::new()
        }
    );
    assert!(err.is_request_failure());
}

#[tokio::test]
async fn test_open_yields_body_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("0:\"x\"\n", "text/plain"))
        .mount(&server)
        .await;

    let mut source = transport()
        .open(&endpoint(&server, WireFormat::Multiplexed), &hello())
        .await
        .expect("open");
    let mut body = Vec::new();
    while let Some(chunk) = source.read().await.expect("read") {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(body, b"0:\"x\"\n");
    assert!(source.is_closed());
}

#[tokio::test]
async fn test_empty_body_is_an_empty_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transport = transport();
    let endpoint = endpoint(&server, WireFormat::Multiplexed);
    let mut transcript = Transcript::new();
    let outcome = transport.chat(&endpoint, hello()).run(&mut transcript).await;

    assert_eq!(outcome, SessionOutcome::Finished);
    assert_eq!(transcript.outcome(), TranscriptOutcome::Empty);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_session() {
    let config = EndpointConfig {
        name: "closed".to_string(),
        format: WireFormat::Delta,
        url: "http://127.0.0.1:9/chat".to_string(),
        description: String::new(),
        is_default: false,
    };
    let mut events = Vec::new();
    let outcome = transport().chat(&config, hello()).run(&mut events).await;

    assert_eq!(outcome, SessionOutcome::Failed);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::Start);
    assert!(matches!(&events[1], StreamEvent::Error(message) if message.starts_with("Transport error")));
}

#[tokio::test]
async fn test_cancel_before_response_skips_callbacks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("0:\"late\"\n", "text/plain")
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let transport = transport();
    let endpoint = endpoint(&server, WireFormat::Multiplexed);
    let chat = transport.chat(&endpoint, hello());
    let handle = chat.cancel_handle();
    let mut events = Vec::new();
    let (outcome, ()) = tokio::join!(chat.run(&mut events), async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.cancel();
    });

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert!(events.is_empty());
}

//! Facade tests against a local mock server.

use apertus::{
    Apertus, ApertusError, AsyncApertus, ChatCompletionRequest, ChatMessage, ClientConfig,
    ConfigLoader, FinishReason, StreamAccumulator, StreamState,
};
use futures::StreamExt;
use mockito::Matcher;
use serde_json::json;
use std::io::Write;
use std::time::Duration;

const KEY: &str = "test-key";

fn completion_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-abc",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "swiss-ai/apertus-8b-instruct",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hi there"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
    })
}

fn models_body() -> serde_json::Value {
    json!({
        "object": "list",
        "data": [
            {"id": "swiss-ai/apertus-8b-instruct", "object": "model", "created": 1_700_000_000, "owned_by": "swiss-ai"},
            {"id": "swiss-ai/apertus-70b-instruct", "object": "model", "owned_by": "swiss-ai"}
        ]
    })
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::from(
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    );
    for delta in deltas {
        body.push_str(&format!(
            "data: {{\"id\":\"c1\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(delta).unwrap()
        ));
    }
    body.push_str("data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

fn request() -> ChatCompletionRequest {
    ChatCompletionRequest::new("swiss-ai/apertus-8b-instruct", vec![ChatMessage::user("hello")])
}

fn async_client(url: &str) -> AsyncApertus {
    AsyncApertus::from_config(ClientConfig::new(KEY).with_base_url(url)).unwrap()
}

fn blocking_client(url: &str) -> Apertus {
    Apertus::from_config(ClientConfig::new(KEY).with_base_url(url)).unwrap()
}

#[tokio::test]
async fn test_list_models_sends_bearer_and_parses() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/models")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(models_body().to_string())
        .expect(1)
        .create_async()
        .await;

    let models = async_client(&server.url()).models().list().await.unwrap();

    assert_eq!(models.object, "list");
    assert_eq!(models.data.len(), 2);
    assert!(models.contains("swiss-ai/apertus-70b-instruct"));
    assert!(models.data[0].created_at().is_some());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_returns_completion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "model": "swiss-ai/apertus-8b-instruct",
            "messages": [{"role": "user", "content": "hello"}],
            "temperature": 0.0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body().to_string())
        .expect(1)
        .create_async()
        .await;

    let client = async_client(&server.url());
    let completion = client
        .chat()
        .completions()
        .create(request().with_temperature(0.0))
        .await
        .unwrap();

    assert!(!completion.choices.is_empty());
    assert_eq!(completion.content(), Some("hi there"));
    assert_eq!(completion.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(completion.usage.unwrap().total_tokens, 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_maps_to_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "invalid key"}}"#)
        .create_async()
        .await;

    let err = async_client(&server.url())
        .chat()
        .completions()
        .create(request())
        .await
        .unwrap_err();

    match err {
        ApertusError::Api(api) => {
            assert_eq!(api.status_code, 401);
            assert_eq!(api.message, "invalid key");
            assert!(api.url.ends_with("/v1/chat/completions"));
            assert!(api.payload.unwrap().contains("invalid key"));
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_messages_fail_without_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let client = async_client(&server.url());
    let empty = ChatCompletionRequest::new("swiss-ai/apertus-8b-instruct", vec![]);

    let err = client.chat().completions().create(empty.clone()).await.unwrap_err();
    assert!(matches!(err, ApertusError::Validation(_)));

    let err = client.chat().completions().stream(empty).await.unwrap_err();
    assert!(matches!(err, ApertusError::Validation(_)));

    let err = client
        .chat()
        .completions()
        .create(ChatCompletionRequest::new("", vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApertusError::Validation(_)));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = ConfigLoader::new()
        .base_url(server.url())
        .resolve_with(|_| None)
        .and_then(AsyncApertus::from_config)
        .unwrap_err();

    assert!(matches!(err, ApertusError::Config(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_undecodable_success_body_is_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = async_client(&server.url()).models().list().await.unwrap_err();
    assert!(matches!(err, ApertusError::Transport(_)));
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    // Nothing listens on port 1
    let err = async_client("http://127.0.0.1:1")
        .models()
        .list()
        .await
        .unwrap_err();
    assert!(matches!(err, ApertusError::Transport(_)));
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn test_stream_yields_deltas_in_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["Hel", "lo", ", world"]))
        .expect(1)
        .create_async()
        .await;

    let client = async_client(&server.url());
    let mut stream = client.chat().completions().stream(request()).await.unwrap();

    let mut acc = StreamAccumulator::new();
    let mut count = 0;
    while let Some(event) = stream.next().await {
        acc.push(&event.unwrap());
        count += 1;
    }

    assert_eq!(count, 5);
    assert_eq!(acc.content, "Hello, world");
    assert_eq!(acc.finish_reason, Some(FinishReason::Stop));
    assert_eq!(stream.state(), StreamState::Done);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_read_timeout_does_not_cut_off_a_slow_stream() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(|w| {
            for i in 0..6 {
                std::thread::sleep(Duration::from_millis(250));
                write!(
                    w,
                    "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"t{}\"}}}}]}}\n\n",
                    i
                )?;
            }
            w.write_all(b"data: [DONE]\n\n")
        })
        .create_async()
        .await;

    let config = ClientConfig::new(KEY)
        .with_base_url(server.url())
        .with_read_timeout(Duration::from_secs(1));
    let client = AsyncApertus::from_config(config).unwrap();
    let events: Vec<_> = client
        .chat()
        .completions()
        .stream(request())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| e.is_ok()));
}

#[tokio::test]
async fn test_stream_rejected_before_first_event() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body(r#"{"error": "overloaded"}"#)
        .create_async()
        .await;

    let err = async_client(&server.url())
        .chat()
        .completions()
        .stream(request())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(503));
    assert!(err.to_string().contains("overloaded"));
}

#[tokio::test]
async fn test_stream_and_create_agree() {
    let mut create_server = mockito::Server::new_async().await;
    let _create = create_server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(completion_body().to_string())
        .create_async()
        .await;

    let mut stream_server = mockito::Server::new_async().await;
    let _stream = stream_server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_body(sse_body(&["hi", " ", "there"]))
        .create_async()
        .await;

    let completion = async_client(&create_server.url())
        .chat()
        .completions()
        .create(request())
        .await
        .unwrap();

    let client = async_client(&stream_server.url());
    let streamed: String = client
        .chat()
        .completions()
        .stream(request())
        .await
        .unwrap()
        .filter_map(|e| async move { e.ok().and_then(|e| e.delta) })
        .collect()
        .await;

    assert_eq!(completion.content(), Some(streamed.as_str()));
}

#[test]
fn test_blocking_list_and_create() {
    let mut server = mockito::Server::new();
    let _models = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body(models_body().to_string())
        .create();
    let _create = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(completion_body().to_string())
        .create();

    let client = blocking_client(&server.url());

    let models = client.models().list().unwrap();
    assert_eq!(
        models.ids().collect::<Vec<_>>(),
        vec!["swiss-ai/apertus-8b-instruct", "swiss-ai/apertus-70b-instruct"]
    );

    let completion = client.chat().completions().create(request()).unwrap();
    assert_eq!(completion.id, "chatcmpl-abc");
    assert_eq!(completion.content(), Some("hi there"));
}

#[tokio::test]
async fn test_tool_call_reply_with_null_content() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(
            json!({
                "id": "chatcmpl-tool",
                "model": "swiss-ai/apertus-8b-instruct",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": null, "tool_calls": []},
                    "finish_reason": "tool_calls"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let completion = async_client(&server.url())
        .chat()
        .completions()
        .create(request())
        .await
        .unwrap();

    assert_eq!(completion.content(), Some(""));
    assert_eq!(completion.finish_reason(), Some(&FinishReason::ToolCalls));
}

#[test]
fn test_blocking_stream_skips_malformed_frame() {
    let mut body = String::new();
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n");
    body.push_str("data: {this is not json\n\n");
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"b\"}}]}\n\n");
    body.push_str("data: [DONE]\n\n");

    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create();

    let client = blocking_client(&server.url());
    let mut stream = client.chat().completions().stream(request()).unwrap();

    let deltas: Vec<String> = stream
        .by_ref()
        .map(|e| e.unwrap().delta.unwrap_or_default())
        .collect();

    assert_eq!(deltas, vec!["a", "b"]);
    assert_eq!(stream.state(), StreamState::Done);
}

#[test]
fn test_blocking_early_exit() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(sse_body(&["one", "two", "three"]))
        .create();

    let client = blocking_client(&server.url());
    let first_text = client
        .chat()
        .completions()
        .stream(request())
        .unwrap()
        .filter_map(|e| e.ok().and_then(|e| e.delta))
        .next();
    assert_eq!(first_text.as_deref(), Some("one"));

    // The client stays usable after a stream is abandoned
    let again = client.chat().completions().stream(request()).unwrap().count();
    assert_eq!(again, 5);
}

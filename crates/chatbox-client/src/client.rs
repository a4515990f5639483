//! Chat completions client with incremental streaming delivery and
//! cooperative cancellation.
//!
//! `send` drives the whole exchange on the awaiting task and invokes the
//! sink's callbacks inline, so delivery is serialized onto whatever context
//! owns the session state. `abort` cancels the call in flight; an aborted
//! `send` resolves to `Err(ChatError::Aborted)` with no further callbacks.

use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use chatbox_core::config::ApiConfig;
use chatbox_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, Message, RequestMessage, Role,
};

use crate::sse::{self, SseEvent, SseLineBuffer};

// ─────────────────────────────────────────────
// Errors & sink
// ─────────────────────────────────────────────

/// Terminal outcomes of a chat completion call.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Connection-level failure: refused, timed out, stream cut.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Parse(String),

    /// The call was cancelled via [`ChatClient::abort`].
    #[error("request aborted")]
    Aborted,
}

/// Incremental delivery callbacks for a streaming call.
///
/// For every streaming call that runs to a terminal state, exactly one of
/// `on_complete`/`on_error` fires, never both. Aborted calls fire neither
/// and resolve through the returned error instead.
pub trait ChatSink: Send + Sync {
    /// A new content delta, in arrival order.
    fn on_chunk(&self, delta: &str);

    /// The stream ended cleanly; `full_text` is the concatenation of every
    /// delivered delta.
    fn on_complete(&self, full_text: &str);

    /// The call failed after it started.
    fn on_error(&self, message: &str);
}

// ─────────────────────────────────────────────
// ChatClient
// ─────────────────────────────────────────────

/// HTTP client for one OpenAI-compatible chat completions endpoint.
///
/// The configuration is injected at construction and consulted per request;
/// there is no hidden global.
pub struct ChatClient {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    config: ApiConfig,
    /// Token for the most recent `send`. Replaced per call, so `abort`
    /// cancels only the call currently in flight.
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .finish()
    }
}

impl ChatClient {
    /// Create a client for the given configuration.
    pub fn new(config: ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(60))
            .read_timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        ChatClient {
            client,
            config,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Send the conversation history as one chat completion request.
    ///
    /// With `streaming`, content deltas are delivered through `sink` as they
    /// arrive (in arrival order) and the accumulated text is returned.
    /// Without it, the full reply is parsed from the response body and the
    /// sink is not consulted.
    pub async fn send(
        &self,
        history: &[Message],
        streaming: bool,
        sink: Option<&dyn ChatSink>,
    ) -> Result<String, ChatError> {
        let body = self.build_request(history, streaming);
        let cancel = self.arm_cancellation();

        debug!(
            model = %body.model,
            messages = body.messages.len(),
            streaming,
            "sending chat completion request"
        );

        if streaming {
            self.stream_request(body, cancel, sink).await
        } else {
            self.plain_request(body, cancel).await
        }
    }

    /// Cancel the call in flight, if any.
    ///
    /// Safe to call at any time; with nothing outstanding this is a no-op.
    /// The underlying socket may linger briefly, but the pending `send`
    /// resolves promptly to `Err(ChatError::Aborted)`.
    pub fn abort(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Project the history into the wire format, prepending the configured
    /// system prompt when non-empty. Only `{role, content}` leave the
    /// process.
    fn build_request(&self, history: &[Message], streaming: bool) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages.push(RequestMessage {
                role: Role::System,
                content: self.config.system_prompt.clone(),
            });
        }
        messages.extend(history.iter().map(RequestMessage::from));

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: streaming,
        }
    }

    /// Install a fresh token for this call and return it.
    fn arm_cancellation(&self) -> CancellationToken {
        let mut slot = self.cancel.lock().unwrap();
        *slot = CancellationToken::new();
        slot.clone()
    }

    /// Issue the POST, racing it against cancellation.
    async fn dispatch(
        &self,
        body: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ChatError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Aborted),
            result = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send() => Ok(result?),
        }
    }

    // ── Non-streaming path ──

    async fn plain_request(
        &self,
        body: ChatCompletionRequest,
        cancel: CancellationToken,
    ) -> Result<String, ChatError> {
        let response = self.dispatch(&body, &cancel).await?;

        let status = response.status();
        if !status.is_success() {
            let message = read_error_body(response).await;
            error!(status = status.as_u16(), "chat completion request failed");
            return Err(ChatError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let completion = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Aborted),
            result = response.json::<ChatCompletionResponse>() => {
                result.map_err(|e| ChatError::Parse(e.to_string()))?
            }
        };

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatError::Parse("missing choices[0].message.content".to_string()))
    }

    // ── Streaming path ──

    async fn stream_request(
        &self,
        body: ChatCompletionRequest,
        cancel: CancellationToken,
        sink: Option<&dyn ChatSink>,
    ) -> Result<String, ChatError> {
        let response = match self.dispatch(&body, &cancel).await {
            Ok(response) => response,
            Err(ChatError::Aborted) => return Err(ChatError::Aborted),
            Err(e) => {
                fail(sink, &e);
                return Err(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = read_error_body(response).await;
            let err = ChatError::Http {
                status: status.as_u16(),
                message,
            };
            error!(status = status.as_u16(), "chat completion request failed");
            fail(sink, &err);
            return Err(err);
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        let mut full_text = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Aborted),
                next = stream.next() => next,
            };

            let bytes = match next {
                None => break,
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    let err = ChatError::Transport(e);
                    fail(sink, &err);
                    return Err(err);
                }
            };

            lines.push_chunk(&bytes);
            while let Some(line) = lines.next_line() {
                match sse::parse_line(&line) {
                    Some(SseEvent::Done) => {
                        if let Some(sink) = sink {
                            sink.on_complete(&full_text);
                        }
                        return Ok(full_text);
                    }
                    Some(SseEvent::Delta(delta)) => {
                        full_text.push_str(&delta);
                        if let Some(sink) = sink {
                            sink.on_chunk(&delta);
                        }
                    }
                    None => {}
                }
            }
        }

        // The transport may close without a trailing newline; the last
        // partial line still counts.
        if let Some(line) = lines.take_remaining() {
            if let Some(SseEvent::Delta(delta)) = sse::parse_line(&line) {
                full_text.push_str(&delta);
                if let Some(sink) = sink {
                    sink.on_chunk(&delta);
                }
            }
        }

        if let Some(sink) = sink {
            sink.on_complete(&full_text);
        }
        Ok(full_text)
    }
}

/// Best-effort read of a non-2xx response body for the error message.
async fn read_error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string())
}

fn fail(sink: Option<&dyn ChatSink>, err: &ChatError) {
    if let Some(sink) = sink {
        sink.on_error(&err.to_string());
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(server_uri: &str) -> ApiConfig {
        ApiConfig {
            endpoint: format!("{}/v1/chat/completions", server_uri),
            api_key: "test-key-123".to_string(),
            ..Default::default()
        }
    }

    /// Records every callback for later assertions.
    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<String>>,
        completions: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn chunks(&self) -> Vec<String> {
            self.chunks.lock().unwrap().clone()
        }

        fn completions(&self) -> Vec<String> {
            self.completions.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl ChatSink for RecordingSink {
        fn on_chunk(&self, delta: &str) {
            self.chunks.lock().unwrap().push(delta.to_string());
        }

        fn on_complete(&self, full_text: &str) {
            self.completions.lock().unwrap().push(full_text.to_string());
        }

        fn on_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    async fn mount_sse_body(server: &MockServer, body: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(server)
            .await;
    }

    // ── Streaming ──

    #[tokio::test]
    async fn test_streaming_accumulates_chunks_in_order() {
        let mock_server = MockServer::start().await;
        mount_sse_body(
            &mock_server,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"4\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\".\"}}]}\n\n",
                "data: [DONE]\n\n",
            ),
        )
        .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let sink = RecordingSink::default();

        let result = client
            .send(&[Message::user("2+2?")], true, Some(&sink))
            .await
            .unwrap();

        assert_eq!(result, "4.");
        assert_eq!(sink.chunks(), vec!["4", "."]);
        assert_eq!(sink.completions(), vec!["4."]);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_done_terminates_despite_trailing_bytes() {
        let mock_server = MockServer::start().await;
        mount_sse_body(
            &mock_server,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
            ),
        )
        .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let sink = RecordingSink::default();

        let result = client
            .send(&[Message::user("hi")], true, Some(&sink))
            .await
            .unwrap();

        assert_eq!(result, "first");
        assert_eq!(sink.chunks(), vec!["first"]);
        assert_eq!(sink.completions(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped_silently() {
        let mock_server = MockServer::start().await;
        mount_sse_body(
            &mock_server,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
                "data: {not json\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n",
                "data: [DONE]\n\n",
            ),
        )
        .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let sink = RecordingSink::default();

        let result = client
            .send(&[Message::user("hi")], true, Some(&sink))
            .await
            .unwrap();

        assert_eq!(result, "ok!");
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_and_foreign_lines_ignored() {
        let mock_server = MockServer::start().await;
        mount_sse_body(
            &mock_server,
            concat!(
                ": keep-alive\n",
                "\n",
                "event: message\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"text\"}}]}\n\n",
                "data: [DONE]\n\n",
            ),
        )
        .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let result = client.send(&[Message::user("hi")], true, None).await.unwrap();
        assert_eq!(result, "text");
    }

    #[tokio::test]
    async fn test_stream_without_done_completes_at_eof() {
        let mock_server = MockServer::start().await;
        // No [DONE], and the final line has no trailing newline.
        mount_sse_body(
            &mock_server,
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"partial \"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"stream\"}}]}",
            ),
        )
        .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let sink = RecordingSink::default();

        let result = client
            .send(&[Message::user("hi")], true, Some(&sink))
            .await
            .unwrap();

        assert_eq!(result, "partial stream");
        assert_eq!(sink.completions(), vec!["partial stream"]);
    }

    #[tokio::test]
    async fn test_streaming_http_error_fires_on_error_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({"error": {"message": "Rate limit exceeded"}})),
            )
            .mount(&mock_server)
            .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let sink = RecordingSink::default();

        let err = client
            .send(&[Message::user("hi")], true, Some(&sink))
            .await
            .unwrap_err();

        match err {
            ChatError::Http { status, ref message } => {
                assert_eq!(status, 429);
                assert!(message.contains("Rate limit exceeded"));
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.errors()[0].contains("429"));
        assert!(sink.chunks().is_empty());
        assert!(sink.completions().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_connection_refused_fires_on_error() {
        // Nothing listens on port 1.
        let client = ChatClient::new(make_config("http://127.0.0.1:1"));
        let sink = RecordingSink::default();

        let err = client
            .send(&[Message::user("hi")], true, Some(&sink))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.completions().is_empty());
    }

    // ── Request construction ──

    #[tokio::test]
    async fn test_wire_body_projects_role_and_content_only() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .and(body_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi"}
                ],
                "temperature": 0.7,
                "max_tokens": 4096,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&mock_server)
            .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let history = vec![Message::user("hello"), Message::assistant("hi")];

        // An exact body match proves ids and timestamps never hit the wire.
        let result = client.send(&history, false, None).await.unwrap();
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn test_system_prompt_prepended() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&mock_server)
            .await;

        let mut config = make_config(&mock_server.uri());
        config.system_prompt = "Be brief.".to_string();

        let client = ChatClient::new(config);
        let result = client.send(&[Message::user("hi")], false, None).await.unwrap();
        assert_eq!(result, "ok");
    }

    // ── Non-streaming ──

    #[tokio::test]
    async fn test_plain_request_http_error_carries_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let err = client.send(&[Message::user("hi")], false, None).await.unwrap_err();

        match err {
            ChatError::Http { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_request_shape_mismatch_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&mock_server)
            .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        let err = client.send(&[Message::user("hi")], false, None).await.unwrap_err();

        assert!(matches!(err, ChatError::Parse(_)));
    }

    // ── Cancellation ──

    #[tokio::test]
    async fn test_abort_with_nothing_outstanding_is_noop() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "still works"}}]
            })))
            .mount(&mock_server)
            .await;

        let client = ChatClient::new(make_config(&mock_server.uri()));
        client.abort();
        client.abort();

        // A later send is unaffected: each call arms a fresh token.
        let result = client.send(&[Message::user("hi")], false, None).await.unwrap();
        assert_eq!(result, "still works");
    }

    #[tokio::test]
    async fn test_abort_resolves_pending_send() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "too late"}}]
                    })),
            )
            .mount(&mock_server)
            .await;

        let client = Arc::new(ChatClient::new(make_config(&mock_server.uri())));

        let task_client = client.clone();
        let handle =
            tokio::spawn(async move { task_client.send(&[Message::user("hi")], false, None).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        client.abort();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ChatError::Aborted)));
    }

    #[tokio::test]
    async fn test_abort_during_stream_fires_no_callbacks() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_raw("data: [DONE]\n\n", "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let client = Arc::new(ChatClient::new(make_config(&mock_server.uri())));
        let sink = Arc::new(RecordingSink::default());

        let task_client = client.clone();
        let task_sink = sink.clone();
        let handle = tokio::spawn(async move {
            task_client
                .send(&[Message::user("hi")], true, Some(task_sink.as_ref()))
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        client.abort();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ChatError::Aborted)));
        assert!(sink.chunks().is_empty());
        assert!(sink.completions().is_empty());
        assert!(sink.errors().is_empty());
    }
}

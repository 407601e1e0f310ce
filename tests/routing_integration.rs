use chatrelay::config::{Config, ProviderEndpoint};
use chatrelay::core::{MemoryPromptStore, Router};
use chatrelay::llm::{ChatMessage, Role, StreamCallbacks, EMPTY_RESPONSE_PLACEHOLDER};
use chatrelay::{llm::ProviderKind, RelayError};
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;

fn endpoint(url: &str, key: &str) -> ProviderEndpoint {
    ProviderEndpoint {
        endpoint: Some(url.to_string()),
        api_key: Some(key.to_string()),
        api_version: None,
    }
}

/// All three providers pointed at the mock server, with fast retries.
fn test_config(server: &ServerGuard) -> Config {
    let mut config = Config::default();
    config.providers.hosted = endpoint(&server.url(), "ghp-test");
    config.providers.fast = endpoint(&server.url(), "gsk-test");
    config.providers.gemini = endpoint(&server.url(), "gemini-test");
    config.providers.retry.initial_backoff_ms = 1;
    config.providers.retry.max_backoff_ms = 2;
    config
}

fn router(config: &Config) -> Router {
    Router::with_prompt_store(config, Arc::new(MemoryPromptStore::new()))
}

fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "test",
            "choices": [{ "index": 0, "delta": { "content": chunk }, "finish_reason": null }]
        });
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[derive(Default)]
struct Recorder {
    started: bool,
    tokens: Vec<String>,
    completed: Option<(String, Option<String>)>,
    errors: Vec<String>,
}

impl StreamCallbacks for Recorder {
    fn on_start(&mut self) {
        self.started = true;
    }

    fn on_token(&mut self, token: &str) {
        self.tokens.push(token.to_string());
    }

    fn on_complete(&mut self, content: &str, reasoning: Option<&str>) {
        self.completed = Some((content.to_string(), reasoning.map(str::to_string)));
    }

    fn on_error(&mut self, error: &RelayError) {
        self.errors.push(error.to_string());
    }
}

#[tokio::test]
async fn test_hosted_response_is_cached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer ghp-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("Hi! How can I help?"))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let messages = vec![ChatMessage::user("hi")];

    let first = router
        .handle_chat(Some("gpt-4o"), messages.clone())
        .await
        .unwrap();
    assert_eq!(first.content, "Hi! How can I help?");
    assert!(!first.cached);

    let second = router.handle_chat(Some("gpt-4o"), messages).await.unwrap();
    assert_eq!(second.content, first.content);
    assert!(second.cached);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_hosted_stream_token_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "max_tokens": 600
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["Hel", "lo", " world"]))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();

    let response = router
        .handle_chat_stream(None, vec![ChatMessage::user("greet me")], &mut recorder)
        .await
        .unwrap();

    assert!(recorder.started);
    assert_eq!(recorder.tokens, vec!["Hel", "lo", " world"]);
    assert_eq!(
        recorder.completed,
        Some(("Hello world".to_string(), None))
    );
    assert_eq!(response.content, "Hello world");
    assert!(recorder.errors.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_hosted_role_translation() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""role":"assistant","content":"earlier answer""#.to_string()),
            Matcher::Regex(r#""role":"developer","content":"use bullet points""#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["ok"]))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let messages = vec![
        ChatMessage::user("question"),
        ChatMessage::new(Role::Agent, "earlier answer"),
        ChatMessage::new(Role::Developer, "use bullet points"),
    ];

    let mut recorder = Recorder::default();
    router
        .handle_chat_stream(Some("Phi-4"), messages, &mut recorder)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fast_stream_splits_reasoning() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer gsk-test")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["<think>", "compare options", "</think>", "Pick A"]))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();

    let response = router
        .handle_chat_stream(
            Some("qwen-qwq-32b"),
            vec![ChatMessage::user("A or B?")],
            &mut recorder,
        )
        .await
        .unwrap();

    assert_eq!(recorder.tokens, vec!["Pick A"]);
    assert_eq!(response.content, "Pick A");
    assert_eq!(response.reasoning.as_deref(), Some("compare options"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_stream_delivers_single_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/models/gemini-2.0-flash-001:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), "gemini-test".into()))
        .match_body(Matcher::Regex(
            r#""role":"model","parts":\[\{"text":"earlier"\}\]"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Full answer at once" }] },
                    "finishReason": "STOP"
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();
    let messages = vec![
        ChatMessage::user("first"),
        ChatMessage::assistant("earlier"),
        ChatMessage::system("be brief"),
    ];

    router
        .handle_chat_stream(Some("gemini-flash"), messages, &mut recorder)
        .await
        .unwrap();

    assert_eq!(recorder.tokens, vec!["Full answer at once"]);
    assert_eq!(
        recorder.completed.map(|(content, _)| content).as_deref(),
        Some("Full answer at once")
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_retries_then_fails() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/models/gemini-1.5-pro-002:generateContent")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body(r#"{"error":{"code":503,"message":"The model is overloaded"}}"#)
        .expect(4)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let err = router
        .handle_chat(Some("gemini-1.5-pro"), vec![ChatMessage::user("hi")])
        .await
        .unwrap_err();

    match err {
        RelayError::Upstream {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, ProviderKind::Gemini);
            assert_eq!(status, Some(503));
            assert_eq!(message, "The model is overloaded");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_error_reported_through_callbacks() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Bad credentials"}}"#)
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();

    let err = router
        .handle_chat_stream(Some("gpt-4o"), vec![ChatMessage::user("hi")], &mut recorder)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Bad credentials"));
    assert_eq!(recorder.errors.len(), 1);
    assert!(recorder.completed.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_response_becomes_placeholder_and_is_not_cached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "gpt-4o",
                "choices": []
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    for _ in 0..2 {
        let response = router
            .handle_chat(Some("gpt-4o"), vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(response.content, EMPTY_RESPONSE_PLACEHOLDER);
        assert!(!response.cached);
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_credential_makes_no_network_call() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut config = test_config(&server);
    config.providers.fast.api_key = None;
    let router = router(&config);

    let err = router
        .handle_chat(Some("llama-3.3-70b-versatile"), vec![ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Configuration {
            provider: ProviderKind::FastInference
        }
    ));

    let mut recorder = Recorder::default();
    assert!(router
        .handle_chat_stream(
            Some("llama-3.3-70b-versatile"),
            vec![ChatMessage::user("hi")],
            &mut recorder
        )
        .await
        .is_err());
    assert_eq!(recorder.errors.len(), 1);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_model_override_and_prompt_override() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(serde_json::json!({ "model": "openai/gpt-4o" })),
            Matcher::Regex(r#""role":"system","content":"Answer in French""#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("Bonjour"))
        .expect(1)
        .create_async()
        .await;

    let mut config = test_config(&server);
    config
        .models
        .overrides
        .insert("gpt-4o".to_string(), "openai/gpt-4o".to_string());
    let router = router(&config);
    router.set_prompt_override("Answer in French").await.unwrap();

    let response = router
        .handle_chat(Some("gpt-4o"), vec![ChatMessage::user("hello")])
        .await
        .unwrap();
    assert_eq!(response.content, "Bonjour");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_hosted_buffered_retries_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("upstream overloaded")
        .expect(4)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let err = router
        .handle_chat(Some("gpt-4o"), vec![ChatMessage::user("hi")])
        .await
        .unwrap_err();

    match err {
        RelayError::Upstream {
            provider, status, ..
        } => {
            assert_eq!(provider, ProviderKind::HostedInference);
            assert_eq!(status, Some(503));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_hosted_buffered_uses_speed_optimized_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gpt-4o",
            "max_tokens": 600,
            "frequency_penalty": 0.1,
            "presence_penalty": 0.1
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("Quick answer"))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let response = router
        .handle_chat(Some("gpt-4o"), vec![ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(response.content, "Quick answer");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fast_buffered_request_without_reasoning_hint() {
    let mut server = Server::new_async().await;
    let hinted = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("reasoning_format".to_string()))
        .expect(0)
        .create_async()
        .await;
    let plain = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer gsk-test")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "llama-3.1-8b-instant"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("Fast hello"))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let response = router
        .handle_chat(Some("llama-3.1-8b-instant"), vec![ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(response.content, "Fast hello");
    assert!(response.reasoning.is_none());

    hinted.assert_async().await;
    plain.assert_async().await;
}

#[tokio::test]
async fn test_fast_reasoning_model_sends_format_hint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "qwen-qwq-32b",
            "reasoning_format": "raw"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("<think>weigh it</think>B"))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let response = router
        .handle_chat(Some("qwen-qwq-32b"), vec![ChatMessage::user("A or B?")])
        .await
        .unwrap();
    assert_eq!(response.content, "B");
    assert_eq!(response.reasoning.as_deref(), Some("weigh it"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_stream_chunk_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {garbage\n\n",
            "data: [DONE]\n\n"
        ))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();
    let err = router
        .handle_chat_stream(Some("gpt-4o"), vec![ChatMessage::user("hi")], &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Upstream { .. }));
    assert_eq!(recorder.tokens, vec!["Hel"]);
    assert_eq!(recorder.errors.len(), 1);
    assert!(recorder.completed.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_truncated_stream_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n")
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();
    let err = router
        .handle_chat_stream(Some("gpt-4o"), vec![ChatMessage::user("hi")], &mut recorder)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("[DONE]"));
    assert_eq!(recorder.errors.len(), 1);
    assert!(recorder.completed.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unterminated_think_streams_as_answer_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&["<think>", "still", " thinking"]))
        .expect(1)
        .create_async()
        .await;

    let router = router(&test_config(&server));
    let mut recorder = Recorder::default();
    let response = router
        .handle_chat_stream(
            Some("DeepSeek-R1"),
            vec![ChatMessage::user("hmm?")],
            &mut recorder,
        )
        .await
        .unwrap();

    assert_eq!(recorder.tokens, vec!["still thinking"]);
    assert_eq!(response.content, "still thinking");
    assert!(response.reasoning.is_none());
    assert_eq!(
        recorder.completed,
        Some(("still thinking".to_string(), None))
    );

    mock.assert_async().await;
}

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use openrouter_pipe_sdk::prelude::*;
use serde_json::{json, Value};

struct StubPipe {
    healthy: bool,
}

#[async_trait]
impl Pipe for StubPipe {
    async fn pipes(&self) -> Vec<ModelDescriptor> {
        if self.healthy {
            vec![
                ModelDescriptor::new("openrouter.auto", "Auto"),
                ModelDescriptor::new("openrouter.openai/gpt-4", "GPT-4"),
            ]
        } else {
            vec![ModelDescriptor::new("openrouter.error", "API Key not provided")]
        }
    }

    async fn pipe(&self, request: ChatRequest) -> ChatResponse {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if request.stream {
            let parts = vec!["echo: ".to_string(), last];
            ChatResponse::Stream(Box::pin(stream::iter(parts)))
        } else {
            ChatResponse::Text(format!("echo: {}", last))
        }
    }
}

async fn spawn_server(pipe: StubPipe) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(Arc::new(pipe));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn models_endpoint_lists_descriptors() {
    let base = spawn_server(StubPipe { healthy: true }).await;
    let body: Value = reqwest::get(format!("{}/api/models", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["models"][0]["id"], "openrouter.auto");
    assert_eq!(body["models"][1]["name"], "GPT-4");
}

#[tokio::test]
async fn chat_endpoint_returns_plain_content() {
    let base = spawn_server(StubPipe { healthy: true }).await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({
            "model": "openrouter.auto",
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"content": "echo: ping"}));
}

#[tokio::test]
async fn chat_endpoint_streams_sse_then_done() {
    let base = spawn_server(StubPipe { healthy: true }).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({
            "messages": [{"role": "user", "content": "ping"}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    let data = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect::<Vec<_>>();
    assert_eq!(data, vec!["echo: ", "ping", "[DONE]"]);
    assert!(text.contains("event: done"));
}

#[tokio::test]
async fn health_reports_error_descriptor() {
    let base = spawn_server(StubPipe { healthy: false }).await;
    let body: Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": false, "error": "API Key not provided"}));

    let base = spawn_server(StubPipe { healthy: true }).await;
    let body: Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": true, "models": 2}));
}

use std::{convert::Infallible, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    models::{ChatRequest, ChatResponse},
    pipe::{Pipe, ERROR_ID},
    telemetry,
};

pub type SharedPipe = Arc<dyn Pipe>;

/**
 * \brief 启动本地 HTTP 服务，向宿主暴露模型列表与聊天接口。
 * \param addr 监听地址，如 "127.0.0.1:5180"
 */
pub async fn run(addr: &str, pipe: SharedPipe) -> Result<()> {
    let app = router(pipe);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    telemetry::log_event("server", &format!("listening on http://{}", addr));
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(pipe: SharedPipe) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/chat", post(chat))
        .route("/api/health", get(health_check))
        .with_state(pipe)
}

async fn list_models(State(pipe): State<SharedPipe>) -> Json<serde_json::Value> {
    let models = pipe.pipes().await;
    Json(json!({ "models": models }))
}

/**
 * \brief 聊天接口：stream=true 时以 SSE 推送增量，结束时发送 done 事件。
 */
async fn chat(State(pipe): State<SharedPipe>, Json(request): Json<ChatRequest>) -> Response {
    let streaming = request.stream;
    telemetry::log_event(
        "server.chat",
        &format!("messages={} stream={}", request.messages.len(), streaming),
    );

    let mut stream = match pipe.pipe(request).await {
        ChatResponse::Text(content) if !streaming => {
            return Json(json!({ "content": content })).into_response();
        }
        ChatResponse::Text(content) => futures_util::stream::once(async move { content }).boxed(),
        ChatResponse::Stream(s) => s,
    };

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    tokio::spawn(async move {
        while let Some(delta) = stream.next().await {
            if tx.send(Ok(Event::default().data(delta))).is_err() {
                // client went away
                return;
            }
        }
        let _ = tx.send(Ok(Event::default().event("done").data("[DONE]")));
    });

    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new())
        .into_response()
}

/**
 * \brief 健康检查：尝试列出模型并返回状态。
 */
async fn health_check(State(pipe): State<SharedPipe>) -> Json<serde_json::Value> {
    let models = pipe.pipes().await;
    match models.first() {
        Some(first) if first.id == ERROR_ID => Json(json!({
            "ok": false,
            "error": first.name,
        })),
        _ => Json(json!({
            "ok": true,
            "models": models.len(),
        })),
    }
}

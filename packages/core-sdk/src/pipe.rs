use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Response;
use serde_json::{json, Value};

use crate::{
    config::PipeConfig,
    error::PipeError,
    models::{ChatRequest, ChatResponse, ModelDescriptor},
    sse, telemetry,
};

/** \brief 宿主侧模型 ID 的命名空间前缀 */
pub const MODEL_PREFIX: &str = "openrouter.";
/** \brief 上游自动路由模型 */
pub const AUTO_MODEL: &str = "openrouter/auto";

const AUTO_ID: &str = "openrouter.auto";
const AUTO_NAME: &str = "Auto (Selects best model for your prompt)";
/** \brief 列表失败时返回的占位条目 ID */
pub const ERROR_ID: &str = "openrouter.error";

/**
 * \brief 宿主插件约定：枚举可选模型、执行一次聊天。两者都不会向调用方抛出错误。
 */
#[async_trait]
pub trait Pipe: Send + Sync {
    async fn pipes(&self) -> Vec<ModelDescriptor>;

    async fn pipe(&self, request: ChatRequest) -> ChatResponse;
}

/**
 * \brief OpenRouter 适配器。
 */
#[derive(Debug, Clone)]
pub struct OpenRouterPipe {
    config: PipeConfig,
}

impl OpenRouterPipe {
    pub fn new(config: PipeConfig) -> Self {
        Self { config }
    }

    /**
     * \brief 列出可选模型，首项固定为 Auto；失败时返回单个错误条目。
     */
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        if !self.config.has_api_key() {
            return vec![ModelDescriptor::new(ERROR_ID, "API Key not provided")];
        }
        match self.try_list_models().await {
            Ok(models) => models,
            Err(e) => {
                telemetry::log_error("pipe.models", &format!("list models failed: {}", e));
                let detail = e.to_string();
                let detail = detail.strip_prefix("Error: ").unwrap_or(&detail);
                vec![ModelDescriptor::new(
                    ERROR_ID,
                    format!("Error fetching models: {}", detail),
                )]
            }
        }
    }

    pub async fn try_list_models(&self) -> Result<Vec<ModelDescriptor>, PipeError> {
        let api_key = self.config.api_key().ok_or(PipeError::MissingApiKey)?;
        let url = format!("{}/models", self.config.base_url());
        let client = reqwest::Client::builder().build()?;
        let resp = client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let body = resp.bytes().await?;
        let v: Value = serde_json::from_slice(&body)?;

        let models = self.filter_models(&v);
        telemetry::log_event(
            "pipe.models",
            &format!(
                "fetched models listed={} allow_list={}",
                models.len() - 1,
                self.config.allowed_models().len()
            ),
        );
        Ok(models)
    }

    fn filter_models(&self, v: &Value) -> Vec<ModelDescriptor> {
        let mut models = vec![ModelDescriptor::new(AUTO_ID, AUTO_NAME)];
        let Some(data) = v.get("data").and_then(|d| d.as_array()) else {
            return models;
        };
        for item in data {
            let Some(id) = item.get("id").and_then(|s| s.as_str()) else {
                continue;
            };
            if id.is_empty() || !self.config.is_model_allowed(id) {
                continue;
            }
            let name = item.get("name").and_then(|s| s.as_str()).unwrap_or(id);
            models.push(ModelDescriptor::new(format!("{}{}", MODEL_PREFIX, id), name));
        }
        models
    }

    /**
     * \brief 执行聊天请求；任何失败都转换为文本结果。
     */
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        match self.try_chat(request).await {
            Ok(response) => response,
            Err(e) => {
                if !matches!(e, PipeError::MissingApiKey | PipeError::ModelNotAllowed(_)) {
                    telemetry::log_error("pipe.chat", &format!("chat failed: {}", e));
                }
                ChatResponse::Text(e.to_string())
            }
        }
    }

    pub async fn try_chat(&self, request: ChatRequest) -> Result<ChatResponse, PipeError> {
        let api_key = self.config.api_key().ok_or(PipeError::MissingApiKey)?;
        let model = self.resolve_model(request.model.as_deref())?;

        let mut payload = json!({
            "model": model,
            "messages": request.messages,
            "stream": request.stream,
        });
        if let Some(provider) = request.provider {
            payload["provider"] = provider;
        }

        telemetry::log_event(
            "pipe.chat",
            &format!(
                "model={} messages={} stream={}",
                model,
                request.messages.len(),
                request.stream
            ),
        );

        let url = format!("{}/chat/completions", self.config.base_url());
        let client = reqwest::Client::builder().build()?;
        let resp = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        if request.stream {
            let upstream = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(PipeError::from));
            return Ok(ChatResponse::Stream(sse::text_fragments(upstream)));
        }

        let body = resp.bytes().await?;
        let v: Value = serde_json::from_slice(&body)?;
        extract_message_content(&v).map(ChatResponse::Text)
    }

    /**
     * \brief 去除命名空间前缀、映射 auto，并校验允许列表。
     */
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, PipeError> {
        let requested = requested.unwrap_or(self.config.default_model());
        let model = requested.strip_prefix(MODEL_PREFIX).unwrap_or(requested);
        let model = if model == "auto" { AUTO_MODEL } else { model };

        if model != AUTO_MODEL && !self.config.is_model_allowed(model) {
            return Err(PipeError::ModelNotAllowed(model.to_string()));
        }
        Ok(model.to_string())
    }
}

#[async_trait]
impl Pipe for OpenRouterPipe {
    async fn pipes(&self) -> Vec<ModelDescriptor> {
        self.list_models().await
    }

    async fn pipe(&self, request: ChatRequest) -> ChatResponse {
        self.chat(request).await
    }
}

async fn check_status(resp: Response) -> Result<Response, PipeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let fallback = resp
        .error_for_status_ref()
        .err()
        .map(|e| e.to_string())
        .unwrap_or_else(|| status.to_string());
    let body = resp.text().await.unwrap_or_default();
    Err(PipeError::from_upstream(status, &body, &fallback))
}

/**
 * \brief 取 choices[0].message.content；content 为 null 时视为空文本。
 */
fn extract_message_content(v: &Value) -> Result<String, PipeError> {
    let content = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"));
    match content {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Null) => Ok(String::new()),
        _ => Err(PipeError::Unexpected(
            "response has no choices[0].message.content".to_string(),
        )),
    }
}

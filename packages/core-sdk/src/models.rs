use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/**
 * \brief 可供宿主选择的模型条目。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /** \brief 带 `openrouter.` 前缀的模型 ID */
    pub id: String,
    /** \brief 显示名称 */
    pub name: String,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: String,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/**
 * \brief 宿主传入的一次聊天请求。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /** \brief 模型 ID，缺省时使用配置中的默认模型 */
    #[serde(default)]
    pub model: Option<String>,
    /** \brief 按顺序排列的消息，原样转发 */
    #[serde(default)]
    pub messages: Vec<Message>,
    /** \brief 是否流式返回 */
    #[serde(default)]
    pub stream: bool,
    /** \brief Provider 路由配置，不做解析直接透传 */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_provider(mut self, provider: Value) -> Self {
        self.provider = Some(provider);
        self
    }
}

/**
 * \brief 单次消费的文本增量流。
 */
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/**
 * \brief 聊天结果：完整文本，或逐段产出的文本流。错误同样以文本形式返回。
 */
pub enum ChatResponse {
    Text(String),
    Stream(TextStream),
}

impl ChatResponse {
    /**
     * \brief 取出完整文本；流式结果返回 None。
     */
    pub fn into_text(self) -> Option<String> {
        match self {
            ChatResponse::Text(text) => Some(text),
            ChatResponse::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatResponse::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ChatResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

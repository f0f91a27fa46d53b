use std::collections::BTreeSet;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/**
 * \brief 宿主提供的原始配置项，字段名与宿主界面一致。
 */
#[derive(Debug, Clone, Deserialize)]
pub struct Valves {
    /** \brief OpenRouter API Key，默认为空 */
    #[serde(rename = "OPENROUTER_API_KEY", default)]
    pub openrouter_api_key: String,
    /** \brief 以空白分隔的允许模型列表，留空表示不限制 */
    #[serde(rename = "ALLOWED_MODELS", default)]
    pub allowed_models: String,
    /** \brief 请求未指定模型时使用的模型 */
    #[serde(rename = "DEFAULT_MODEL", default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Valves {
    fn default() -> Self {
        Self {
            openrouter_api_key: String::new(),
            allowed_models: String::new(),
            default_model: default_model(),
        }
    }
}

/**
 * \brief 适配器配置。构造时完成解析，之后只读。
 */
#[derive(Clone)]
pub struct PipeConfig {
    api_key: Option<SecretString>,
    allowed_models: BTreeSet<String>,
    default_model: String,
    base_url: String,
}

impl PipeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_valves(Valves {
            openrouter_api_key: api_key.into(),
            ..Valves::default()
        })
    }

    /**
     * \brief 由宿主配置项构造；空白 Key 视为未配置。
     */
    pub fn from_valves(valves: Valves) -> Self {
        let key = valves.openrouter_api_key.trim();
        let api_key = if key.is_empty() {
            None
        } else {
            Some(SecretString::from(key.to_string()))
        };
        let default_model = match valves.default_model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            model => model.to_string(),
        };
        Self {
            api_key,
            allowed_models: parse_allowed_models(&valves.allowed_models),
            default_model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /**
     * \brief 从环境变量读取配置。
     */
    pub fn from_env() -> Self {
        let valves = Valves {
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            allowed_models: std::env::var("ALLOWED_MODELS").unwrap_or_default(),
            default_model: std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| default_model()),
        };
        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::from_valves(valves).with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_allowed_models(mut self, allowed: &str) -> Self {
        self.allowed_models = parse_allowed_models(allowed);
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.default_model = model.trim().to_string();
        }
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn allowed_models(&self) -> &BTreeSet<String> {
        &self.allowed_models
    }

    /**
     * \brief 允许列表为空时不做限制。
     */
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.contains(model)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::from_valves(Valves::default())
    }
}

impl std::fmt::Debug for PipeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("allowed_models", &self.allowed_models)
            .field("default_model", &self.default_model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse_allowed_models(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valves_default_to_unrestricted_without_key() {
        let config = PipeConfig::default();
        assert!(!config.has_api_key());
        assert!(config.allowed_models().is_empty());
        assert!(config.is_model_allowed("anything/at-all"));
        assert_eq!(config.default_model(), DEFAULT_MODEL);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn allow_list_splits_on_any_whitespace() {
        let config =
            PipeConfig::new("sk-test").with_allowed_models("  openai/gpt-4\n\tanthropic/claude-3 ");
        assert_eq!(config.allowed_models().len(), 2);
        assert!(config.is_model_allowed("openai/gpt-4"));
        assert!(config.is_model_allowed("anthropic/claude-3"));
        assert!(!config.is_model_allowed("openai/gpt-3.5-turbo"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(!PipeConfig::new("   ").has_api_key());
        assert_eq!(PipeConfig::new(" sk-1 ").api_key(), Some("sk-1"));
    }

    #[test]
    fn valves_deserialize_from_host_names() {
        let valves: Valves = serde_json::from_value(serde_json::json!({
            "OPENROUTER_API_KEY": "sk-host",
            "ALLOWED_MODELS": "openai/gpt-4"
        }))
        .unwrap();
        assert_eq!(valves.default_model, DEFAULT_MODEL);

        let config = PipeConfig::from_valves(valves);
        assert_eq!(config.api_key(), Some("sk-host"));
        assert!(!config.is_model_allowed("openai/gpt-3.5-turbo"));
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", PipeConfig::new("sk-very-secret"));
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = PipeConfig::new("k").with_base_url("http://127.0.0.1:9000/api/v1/");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000/api/v1");
    }
}

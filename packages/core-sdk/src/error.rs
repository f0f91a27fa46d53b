use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/**
 * \brief 适配器内部错误。`Display` 即返回给宿主的文本。
 */
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Error: OpenRouter API key not provided")]
    MissingApiKey,

    #[error("Error: Model {0} is not allowed")]
    ModelNotAllowed(String),

    #[error("Rate limit exceeded. Please wait a moment before trying again.")]
    RateLimited,

    #[error("API quota exceeded. Please check your OpenRouter account.")]
    QuotaExceeded,

    #[error("Invalid API key. Please check your OpenRouter API key.")]
    InvalidApiKey,

    #[error("Content was flagged by moderation. Please revise your input.")]
    Moderated,

    #[error("Input exceeds model's context length. Please reduce the input size.")]
    ContextLength,

    #[error("Provider service is currently unavailable. Please try again later.")]
    ProviderUnavailable,

    #[error("Request timed out. The model may be overloaded, please try again.")]
    GatewayTimeout,

    /** \brief 未单独映射的上游状态码 */
    #[error("Error: {0}")]
    Upstream(String),

    /** \brief 未收到响应的传输层错误 */
    #[error("Error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Error: Invalid response from OpenRouter - {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Error: Unexpected error occurred - {0}")]
    Unexpected(String),
}

impl PipeError {
    /**
     * \brief 按状态码与错误体归类上游失败。错误体不是 JSON 时一律使用 fallback。
     * \param status   HTTP 状态码
     * \param body     原始响应体
     * \param fallback 错误体不可解析时使用的描述
     */
    pub fn from_upstream(status: StatusCode, body: &str, fallback: &str) -> Self {
        let Ok(v) = serde_json::from_str::<Value>(body) else {
            return PipeError::Upstream(fallback.to_string());
        };
        let message = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string());
        match status.as_u16() {
            429 => return PipeError::RateLimited,
            402 => return PipeError::QuotaExceeded,
            401 => return PipeError::InvalidApiKey,
            502 => return PipeError::ProviderUnavailable,
            504 => return PipeError::GatewayTimeout,
            400 => {
                if let Some(msg) = message.as_deref() {
                    let lower = msg.to_lowercase();
                    if lower.contains("moderation") {
                        return PipeError::Moderated;
                    }
                    if lower.contains("context_length") {
                        return PipeError::ContextLength;
                    }
                }
            }
            _ => {}
        }
        PipeError::Upstream(message.unwrap_or_else(|| fallback.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> String {
        PipeError::from_upstream(StatusCode::from_u16(status).unwrap(), body, "fallback").to_string()
    }

    #[test]
    fn well_known_statuses_use_fixed_text() {
        assert_eq!(
            classify(429, r#"{"error":{"message":"slow down"}}"#),
            "Rate limit exceeded. Please wait a moment before trying again."
        );
        assert_eq!(
            classify(402, "{}"),
            "API quota exceeded. Please check your OpenRouter account."
        );
        assert_eq!(
            classify(401, r#"{"error":{"code":401}}"#),
            "Invalid API key. Please check your OpenRouter API key."
        );
        assert_eq!(
            classify(502, r#"{"error":{"message":"bad gateway"}}"#),
            "Provider service is currently unavailable. Please try again later."
        );
        assert_eq!(
            classify(504, "{}"),
            "Request timed out. The model may be overloaded, please try again."
        );
    }

    #[test]
    fn unparseable_body_falls_back_for_every_status() {
        for status in [429, 402, 401, 502, 504, 400] {
            assert_eq!(classify(status, "<html>busy</html>"), "Error: fallback");
            assert_eq!(classify(status, ""), "Error: fallback");
        }
    }

    #[test]
    fn bad_request_is_split_by_message() {
        assert_eq!(
            classify(400, r#"{"error":{"message":"Flagged by Moderation"}}"#),
            "Content was flagged by moderation. Please revise your input."
        );
        assert_eq!(
            classify(400, r#"{"error":{"message":"exceeds context_length of 4096"}}"#),
            "Input exceeds model's context length. Please reduce the input size."
        );
        assert_eq!(
            classify(400, r#"{"error":{"message":"messages is required"}}"#),
            "Error: messages is required"
        );
    }

    #[test]
    fn unmapped_status_uses_body_message_or_fallback() {
        assert_eq!(classify(418, r#"{"error":{"message":"teapot"}}"#), "Error: teapot");
        assert_eq!(classify(500, "<html>oops</html>"), "Error: fallback");
        assert_eq!(classify(400, "<html>bad</html>"), "Error: fallback");
    }
}

//! 模型网关抽象
//!
//! 所有后端（OpenAI 兼容 / Together / Mock）实现 LlmClient::complete：
//! 输入带角色的消息列表与采样参数，返回生成文本；网关本身无状态、不重试、不缓存。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::llm::Message;

/// 默认采样温度
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// 默认最大生成 token 数
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
/// 默认 top_p
pub const DEFAULT_TOP_P: f32 = 0.9;
/// 未指定模型时使用的默认模型
pub const DEFAULT_MODEL: &str = "meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo";

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 传输 / 鉴权 / 限流等提供方错误；status 为 HTTP 状态码（传输层失败时为空）
    #[error("Provider error{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Provider { status: Option<u16>, detail: String },

    /// 请求参数不合法（空消息、温度越界等），未发出网络请求
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    pub fn provider(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Provider {
            status,
            detail: detail.into(),
        }
    }
}

/// 单次生成的采样参数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            stop: None,
        }
    }
}

impl GenerateOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// 调用前的参数校验：消息非空、temperature ∈ [0, 2]、max_tokens > 0
pub fn validate_request(messages: &[Message], options: &GenerateOptions) -> Result<(), LlmError> {
    if messages.is_empty() {
        return Err(LlmError::InvalidRequest("messages must not be empty".into()));
    }
    if !(0.0..=2.0).contains(&options.temperature) {
        return Err(LlmError::InvalidRequest(format!(
            "temperature {} out of range [0, 2]",
            options.temperature
        )));
    }
    if options.max_tokens == 0 {
        return Err(LlmError::InvalidRequest("max_tokens must be positive".into()));
    }
    if options.model.trim().is_empty() {
        return Err(LlmError::InvalidRequest("model must not be empty".into()));
    }
    Ok(())
}

/// 模型网关 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 给定消息与采样参数生成文本；失败时返回 LlmError，由调用方决定如何处理
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_gateway_contract() {
        let opts = GenerateOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 1024);
        assert_eq!(opts.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let err = validate_request(&[], &GenerateOptions::default()).unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_rejects_temperature_out_of_range() {
        let msgs = vec![Message::user("hi")];
        let opts = GenerateOptions::default().with_temperature(2.5);
        assert!(validate_request(&msgs, &opts).is_err());
        let opts = GenerateOptions::default().with_temperature(2.0);
        assert!(validate_request(&msgs, &opts).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        let msgs = vec![Message::user("hi")];
        let opts = GenerateOptions::default().with_max_tokens(0);
        assert!(validate_request(&msgs, &opts).is_err());
    }

    #[test]
    fn test_provider_error_display() {
        let err = LlmError::provider(Some(429), "rate limited");
        assert_eq!(err.to_string(), "Provider error (429): rate limited");
        let err = LlmError::provider(None, "connection reset");
        assert_eq!(err.to_string(), "Provider error: connection reset");
    }
}

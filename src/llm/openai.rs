//! OpenAI 兼容 Chat Completions 客户端
//!
//! 直接以 reqwest 调用 `POST {base_url}/chat/completions`，保留 HTTP 状态码以便构造 ProviderError；
//! Together AI、OpenAI、自建代理等任意兼容端点均可使用。
//!
//! 请求 / 响应类型在本模块手写，不使用 async-openai：它的错误类型不暴露非 2xx 响应的
//! HTTP 状态码，而 ProviderError 需要携带状态码（401 / 429 / 5xx）。这里只用到
//! chat/completions 的少数字段。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::traits::validate_request;
use crate::llm::{GenerateOptions, LlmClient, LlmError, Message};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容客户端：持有 reqwest::Client、base_url 与 API Key
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("Chat completions API key not configured");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// 从错误响应体中提取可读信息：优先 `error.message` / `error`，否则原文
fn error_detail(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("error")).and_then(|e| {
        e.get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .or_else(|| e.as_str().map(String::from))
    });
    detail.unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        validate_request(messages, options)?;

        let body = ChatRequest {
            model: &options.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop.as_deref(),
        };

        tracing::debug!(model = %options.model, base_url = %self.base_url, "Chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::provider(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = error_detail(&text);
            tracing::error!(status = status.as_u16(), %detail, "Chat completion API error");
            return Err(LlmError::provider(Some(status.as_u16()), detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::provider(Some(status.as_u16()), format!("invalid response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::provider(Some(status.as_u16()), "response contained no choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_error_message() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(error_detail(body), "Invalid API key");
    }

    #[test]
    fn test_error_detail_plain_error_string() {
        let body = r#"{"error": "rate limit exceeded"}"#;
        assert_eq!(error_detail(body), "rate limit exceeded");
    }

    #[test]
    fn test_error_detail_falls_back_to_body() {
        assert_eq!(error_detail("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let stop = vec!["END".to_string()];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.3,
            max_tokens: 512,
            top_p: 0.9,
            stop: Some(&stop),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert_eq!(v["max_tokens"], 512);
        assert_eq!(v["stop"][0], "END");
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_network() {
        let client = ChatCompletionsClient::new(Some("http://127.0.0.1:1"), Some("k"), 1);
        let err = client
            .complete(&[], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_kept_in_provider_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let body = r#"{"error": {"message": "slow down"}}"#;
            let reply = format!(
                "HTTP/1.1 429 Too Many Requests\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });

        let base = format!("http://{}", addr);
        let client = ChatCompletionsClient::new(Some(&base), Some("k"), 5);
        let err = client
            .complete(&[Message::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();
        match err {
            LlmError::Provider { status, detail } => {
                assert_eq!(status, Some(429));
                assert_eq!(detail, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! 模型网关层：客户端抽象与实现（OpenAI 兼容 / Together / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod together;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use message::{Message, Role};
pub use mock::{MockLlmClient, RecordedCall, ScriptedLlmClient, ScriptedReply};
pub use openai::ChatCompletionsClient;
pub use together::{create_together_client, TOGETHER_BASE_URL};
pub use traits::{GenerateOptions, LlmClient, LlmError, DEFAULT_MODEL};

/// 根据配置与环境变量选择模型后端（Together / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let has_together = std::env::var("TOGETHER_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM (configured)");
            Arc::new(MockLlmClient)
        }
        "together" if has_together => {
            tracing::info!("Using Together AI LLM");
            let client = match cfg.llm.base_url.as_deref() {
                Some(base) => ChatCompletionsClient::new(
                    Some(base),
                    std::env::var("TOGETHER_API_KEY").ok().as_deref(),
                    timeout,
                ),
                None => create_together_client(None, timeout),
            };
            Arc::new(client)
        }
        "openai" if has_openai => {
            let client = ChatCompletionsClient::new(cfg.llm.base_url.as_deref(), None, timeout);
            tracing::info!("Using OpenAI-compatible LLM ({})", client.base_url());
            Arc::new(client)
        }
        _ => {
            tracing::warn!(
                "No API key set for provider '{}', using Mock LLM",
                cfg.llm.provider
            );
            Arc::new(MockLlmClient)
        }
    }
}

//! Together AI 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.together.xyz/v1
//! - 默认模型: meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo（按智能体定义中的 model 覆盖）

use crate::llm::ChatCompletionsClient;

pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

/// 创建 Together AI 客户端
///
/// - 优先使用传入的 api_key，其次环境变量 `TOGETHER_API_KEY`
/// - 模型不绑定在客户端上，每次调用由 GenerateOptions 指定
pub fn create_together_client(api_key: Option<&str>, timeout_secs: u64) -> ChatCompletionsClient {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("TOGETHER_API_KEY").ok());
    ChatCompletionsClient::new(Some(TOGETHER_BASE_URL), api_key.as_deref(), timeout_secs)
}

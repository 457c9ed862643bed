//! 运行错误类型
//!
//! 区分致命错误（ProviderError / IterationCapExceeded，导致运行 FAILED）
//! 与可本地恢复的错误（ToolError / UnknownToolReference，记录日志后继续）。

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

/// 智能体运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Unknown tool reference: {0}")]
    UnknownToolReference(String),

    #[error("Iteration cap exceeded after {0} steps")]
    IterationCapExceeded(usize),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

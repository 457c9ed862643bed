//! 工具执行协作方：ToolInvoker 契约、Tool trait、注册表与带超时的执行器
//!
//! 核心只依赖 ToolInvoker::invoke 的请求 / 响应契约；工具本身的实现不在核心范围内。

pub mod echo;
pub mod executor;
pub mod registry;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};

/// 单次工具调用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not registered: {0}")]
    NotFound(String),

    #[error("Tool {tool} failed: {reason}")]
    Failed { tool: String, reason: String },

    #[error("Tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// 工具描述（写入 prompt 的 Available tools 段落）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub tool_id: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具执行协作方：执行器视角下的同步请求 / 响应
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool_id: &str, params: Value) -> Result<Value, ToolError>;

    /// 工具描述；未注册时返回 None
    fn describe(&self, tool_id: &str) -> Option<ToolDescriptor>;
}

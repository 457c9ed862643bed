//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，invoke(tool_id, params) 在超时内执行工具，
//! 超时或失败时转为 ToolError；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{ToolDescriptor, ToolError, ToolInvoker, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    async fn invoke(&self, tool_id: &str, params: Value) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_id)
            .ok_or_else(|| ToolError::NotFound(tool_id.to_string()))?;

        let start = Instant::now();
        let params_preview = params_preview(&params);
        let result = timeout(self.timeout, tool.execute(params)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(ToolError::Failed {
                tool: tool_id.to_string(),
                reason,
            }),
            Err(_) => Err(ToolError::Timeout {
                tool: tool_id.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    fn describe(&self, tool_id: &str) -> Option<ToolDescriptor> {
        self.registry.descriptor(tool_id)
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _params: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _params: Value) -> Result<Value, String> {
            Err("disk on fire".to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        registry.register(BrokenTool);
        ToolExecutor::new(registry, timeout_secs)
    }

    #[tokio::test]
    async fn test_invoke_echo() {
        let out = executor(5)
            .invoke("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let err = executor(5).invoke("nope", Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_invoke_failure_maps_to_tool_error() {
        let err = executor(5).invoke("broken", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { ref reason, .. } if reason == "disk on fire"));
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let err = executor(1).invoke("slow", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { secs: 1, .. }));
    }

    #[test]
    fn test_describe_uses_registry() {
        let exec = executor(5);
        let d = exec.describe("echo").unwrap();
        assert_eq!(d.tool_id, "echo");
        assert!(exec.describe("missing").is_none());
        assert_eq!(exec.tool_names(), vec!["broken", "echo", "slow"]);
    }
}

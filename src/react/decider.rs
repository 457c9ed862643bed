//! Step Decider：根据当前运行状态选择下一个工具调用，或宣告完成

use std::sync::Arc;

use serde_json::Value;

use crate::llm::{GenerateOptions, LlmClient, LlmError, Message};
use crate::tools::ToolDescriptor;

use super::parser::{parse_next_step, NextStep, Parsed};

const DECIDE_INSTRUCTION: &str = "You are deciding which tool to use next based on the current state and available tools. Respond with JSON: { \"toolId\": \"tool-id\", \"params\": {...} } or null if no tool is needed.";

pub struct StepDecider {
    llm: Arc<dyn LlmClient>,
}

impl StepDecider {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// temperature 0.2 / 256 tokens
    pub async fn decide(
        &self,
        state: &Value,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<Parsed<NextStep>, LlmError> {
        let messages = vec![
            Message::system(DECIDE_INSTRUCTION),
            Message::user(format!(
                "Current state: {}\n\nAvailable tools: {}",
                state,
                serde_json::to_string(tools).unwrap_or_default()
            )),
        ];
        let options = GenerateOptions::for_model(model)
            .with_temperature(0.2)
            .with_max_tokens(256);

        let reply = self.llm.complete(&messages, &options).await?;
        Ok(parse_next_step(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_decide_call_and_done() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"toolId": "echo", "params": {"text": "a"}}"#,
            "null",
        ]));
        let decider = StepDecider::new(llm.clone());
        let state = serde_json::json!({"input": "a", "cursor": 0});

        let first = decider.decide(&state, &[], "m").await.unwrap();
        assert!(matches!(first.value, NextStep::Call(ref c) if c.tool_id == "echo"));
        let second = decider.decide(&state, &[], "m").await.unwrap();
        assert_eq!(second.value, NextStep::Done);
        assert!(!second.fell_back());

        let call = &llm.calls()[0];
        assert_eq!(call.options.temperature, 0.2);
        assert_eq!(call.options.max_tokens, 256);
        assert!(call.messages[1].content.starts_with("Current state: {"));
    }
}

//! Synthesizer：把工具输出汇总为最终回答

use std::sync::Arc;

use crate::core::ToolOutput;
use crate::llm::{GenerateOptions, LlmClient, LlmError, Message};

const SYNTHESIZE_INSTRUCTION: &str =
    "You are synthesizing results from multiple tool executions into a coherent final answer for the user.";

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// temperature 0.5 / 1024 tokens；prompt 含智能体指令、原始输入与全部工具输出
    pub async fn synthesize(
        &self,
        instructions: &str,
        input: &str,
        outputs: &[ToolOutput],
        model: &str,
    ) -> Result<String, LlmError> {
        let system = if instructions.trim().is_empty() {
            SYNTHESIZE_INSTRUCTION.to_string()
        } else {
            format!("{}\n\n{}", instructions.trim(), SYNTHESIZE_INSTRUCTION)
        };
        let outputs_json = serde_json::to_string_pretty(outputs).unwrap_or_default();
        let messages = vec![
            Message::system(system),
            Message::user(format!(
                "User input: {}\n\nTool outputs: {}",
                input, outputs_json
            )),
        ];
        let options = GenerateOptions::for_model(model)
            .with_temperature(0.5)
            .with_max_tokens(1024);

        let answer = self.llm.complete(&messages, &options).await?;
        Ok(answer.trim().to_string())
    }
}

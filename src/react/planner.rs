//! Planner：意图分析与执行计划
//!
//! 两次模型调用：analyze 得到 Intent，plan 得到 ExecutionPlan。
//! 不校验计划中的 tool id，未知工具由执行器在派发前跳过。

use std::sync::Arc;

use crate::llm::{GenerateOptions, LlmClient, LlmError, Message};
use crate::tools::ToolDescriptor;

use super::parser::{parse_intent, parse_plan, ExecutionPlan, Intent, Parsed};

const ANALYZE_INSTRUCTION: &str = "You are analyzing user input to determine the user's intent and what actions should be taken. Respond with a JSON object containing: { \"intent\": \"description\", \"actions\": [\"action1\", \"action2\"] }";

const PLAN_INSTRUCTION: &str = "You are creating a step-by-step execution plan. Respond with JSON: { \"steps\": [{ \"toolId\": \"id\", \"params\": {...}, \"description\": \"...\" }] }";

/// Planner：持有 LLM，按阶段设定采样参数
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 意图分析（temperature 0.3 / 512 tokens）；system = 智能体指令 + 分析指令
    pub async fn analyze(
        &self,
        input: &str,
        instructions: &str,
        model: &str,
    ) -> Result<Parsed<Intent>, LlmError> {
        let system = if instructions.trim().is_empty() {
            ANALYZE_INSTRUCTION.to_string()
        } else {
            format!("{}\n\n{}", instructions.trim(), ANALYZE_INSTRUCTION)
        };
        let messages = vec![Message::system(system), Message::user(input)];
        let options = GenerateOptions::for_model(model)
            .with_temperature(0.3)
            .with_max_tokens(512);

        let reply = self.llm.complete(&messages, &options).await?;
        Ok(parse_intent(&reply))
    }

    /// 生成执行计划（temperature 0.3 / 1024 tokens）
    pub async fn plan(
        &self,
        intent: &Intent,
        tools: &[ToolDescriptor],
        model: &str,
    ) -> Result<Parsed<ExecutionPlan>, LlmError> {
        let intent_json = serde_json::to_string(intent).unwrap_or_default();
        let tools_json = serde_json::to_string(tools).unwrap_or_default();
        let messages = vec![
            Message::system(PLAN_INSTRUCTION),
            Message::user(format!(
                "Intent: {}\n\nAvailable tools: {}",
                intent_json, tools_json
            )),
        ];
        let options = GenerateOptions::for_model(model)
            .with_temperature(0.3)
            .with_max_tokens(1024);

        let reply = self.llm.complete(&messages, &options).await?;
        Ok(parse_plan(&reply))
    }
}

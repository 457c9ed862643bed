//! 结构化回复解析：把模型文本解码为 Intent / ExecutionPlan / NextStep
//!
//! 模型输出不可信，解析失败时一律返回约定的兜底值而不是错误：
//! - 意图：`{intent: 原文, actions: []}`
//! - 计划：`{steps: []}`（直接进入汇总）
//! - 下一步：Done（不再调用工具）
//! Parsed::fallback 记录兜底原因，供执行器写一条 info 日志。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 输入意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    #[serde(alias = "tool_id", alias = "tool")]
    pub tool_id: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub description: String,
}

/// 执行计划（有序，可为空）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 一次工具调用决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_id: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl From<&PlanStep> for ToolCall {
    fn from(step: &PlanStep) -> Self {
        Self {
            tool_id: step.tool_id.clone(),
            params: step.params.clone(),
        }
    }
}

/// Step Decider 输出
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Call(ToolCall),
    /// 不再需要工具
    Done,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

/// 解析结果：fallback 为 Some(原因) 表示解码失败、value 为兜底值
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub fallback: Option<String>,
}

impl<T> Parsed<T> {
    fn decoded(value: T) -> Self {
        Self {
            value,
            fallback: None,
        }
    }

    fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            fallback: Some(reason.into()),
        }
    }

    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

/// 从文本中提取 JSON 片段（```json ... ``` 代码块或最外层 {...}）；
/// 整段文本本身是 JSON 字面量（如 null）时原样返回
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return Some(&trimmed[start..=end]);
        }
    }
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed);
    }
    None
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 解析意图；失败时 intent 为原文、actions 为空
pub fn parse_intent(text: &str) -> Parsed<Intent> {
    let fallback = || Intent {
        intent: text.trim().to_string(),
        actions: Vec::new(),
    };

    let Some(json) = extract_json(text) else {
        return Parsed::fallback(fallback(), "no JSON object in intent reply");
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => return Parsed::fallback(fallback(), format!("invalid intent JSON: {e}")),
    };
    let Some(intent) = value.get("intent").filter(|v| !v.is_null()) else {
        return Parsed::fallback(fallback(), "intent field missing");
    };
    let actions = value
        .get("actions")
        .and_then(|a| a.as_array())
        .map(|a| a.iter().map(value_to_text).collect())
        .unwrap_or_default();

    Parsed::decoded(Intent {
        intent: value_to_text(intent),
        actions,
    })
}

/// 解析执行计划；失败时为空计划。tool_id 为空的步骤被丢弃
pub fn parse_plan(text: &str) -> Parsed<ExecutionPlan> {
    let Some(json) = extract_json(text) else {
        return Parsed::fallback(ExecutionPlan::default(), "no JSON object in plan reply");
    };
    match serde_json::from_str::<ExecutionPlan>(json) {
        Ok(mut plan) => {
            plan.steps.retain(|s| !s.tool_id.trim().is_empty());
            Parsed::decoded(plan)
        }
        Err(e) => Parsed::fallback(ExecutionPlan::default(), format!("invalid plan JSON: {e}")),
    }
}

/// 解析下一步决策：`null` / `{"toolId": null}` / 空 toolId 为显式完成；无法解码为兜底完成
pub fn parse_next_step(text: &str) -> Parsed<NextStep> {
    let Some(json) = extract_json(text) else {
        return Parsed::fallback(NextStep::Done, "no JSON in step decision");
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => return Parsed::fallback(NextStep::Done, format!("invalid step JSON: {e}")),
    };
    if value.is_null() {
        return Parsed::decoded(NextStep::Done);
    }
    let Some(obj) = value.as_object() else {
        return Parsed::fallback(NextStep::Done, "step decision is not an object");
    };
    let tool_field = ["toolId", "tool_id", "tool"]
        .iter()
        .find_map(|k| obj.get(*k));
    match tool_field {
        None => Parsed::fallback(NextStep::Done, "step decision has no toolId"),
        Some(Value::Null) => Parsed::decoded(NextStep::Done),
        Some(Value::String(id)) if id.trim().is_empty() => Parsed::decoded(NextStep::Done),
        Some(Value::String(id)) => {
            let params = obj.get("params").cloned().unwrap_or_else(empty_params);
            Parsed::decoded(NextStep::Call(ToolCall {
                tool_id: id.trim().to_string(),
                params,
            }))
        }
        Some(other) => Parsed::fallback(
            NextStep::Done,
            format!("toolId is not a string: {other}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Sure!\n```json\n{\"a\": 1}\n```\nbye";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_outer_braces() {
        assert_eq!(extract_json("plan: {\"steps\": []} done"), Some("{\"steps\": []}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("  null "), Some("null"));
    }

    #[test]
    fn test_parse_intent_ok() {
        let p = parse_intent(r#"{"intent": "weather lookup", "actions": ["search", "summarize"]}"#);
        assert!(!p.fell_back());
        assert_eq!(p.value.intent, "weather lookup");
        assert_eq!(p.value.actions, vec!["search", "summarize"]);
    }

    #[test]
    fn test_parse_intent_object_intent_is_stringified() {
        let p = parse_intent(r#"{"intent": {"goal": "x"}}"#);
        assert!(!p.fell_back());
        assert_eq!(p.value.intent, r#"{"goal":"x"}"#);
        assert!(p.value.actions.is_empty());
    }

    #[test]
    fn test_parse_intent_fallback_uses_raw_text() {
        let p = parse_intent("The user just says hello.");
        assert!(p.fell_back());
        assert_eq!(p.value.intent, "The user just says hello.");
        assert!(p.value.actions.is_empty());
    }

    #[test]
    fn test_parse_plan_ok_with_aliases() {
        let p = parse_plan(
            r#"{"steps": [
                {"toolId": "search", "params": {"q": "rust"}, "description": "look it up"},
                {"tool_id": "echo"},
                {"toolId": "  "}
            ]}"#,
        );
        assert!(!p.fell_back());
        assert_eq!(p.value.len(), 2);
        assert_eq!(p.value.steps[0].params["q"], "rust");
        assert_eq!(p.value.steps[1].tool_id, "echo");
        assert!(p.value.steps[1].params.is_object());
    }

    #[test]
    fn test_parse_plan_non_json_is_empty() {
        let p = parse_plan("I would first search the web and then summarise.");
        assert!(p.fell_back());
        assert!(p.value.is_empty());
    }

    #[test]
    fn test_parse_plan_wrong_shape_is_empty() {
        let p = parse_plan(r#"{"steps": "search then echo"}"#);
        assert!(p.fell_back());
        assert!(p.value.is_empty());
    }

    #[test]
    fn test_parse_next_step_call() {
        let p = parse_next_step(r#"{"toolId": "echo", "params": {"text": "hi"}}"#);
        assert_eq!(
            p.value,
            NextStep::Call(ToolCall {
                tool_id: "echo".into(),
                params: serde_json::json!({"text": "hi"}),
            })
        );
        assert!(!p.fell_back());
    }

    #[test]
    fn test_parse_next_step_explicit_null_is_done() {
        for text in ["null", "```json\nnull\n```", r#"{"toolId": null}"#, r#"{"toolId": ""}"#] {
            let p = parse_next_step(text);
            assert_eq!(p.value, NextStep::Done, "{text}");
            assert!(!p.fell_back(), "{text}");
        }
    }

    #[test]
    fn test_parse_next_step_garbage_falls_back_to_done() {
        for text in ["I think we are finished", "{not json}", "[1, 2]", r#"{"params": {}}"#] {
            let p = parse_next_step(text);
            assert_eq!(p.value, NextStep::Done, "{text}");
            assert!(p.fell_back(), "{text}");
        }
    }
}

//! 运行状态：RunState 及其组成（状态、日志、工具输出、失败原因）
//!
//! RunState 由单个执行任务独占写入；进入 SUCCESS / FAILED 后冻结，仅供查询与回放。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::react::{ExecutionPlan, Intent};

/// 运行状态：IDLE → RUNNING → {SUCCESS | FAILED}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Idle,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// 是否允许从 self 迁移到 next（只允许单调前进）
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Idle, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Success)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// 单条运行日志，追加后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// 计划步骤的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 一次成功的工具调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub tool_id: String,
    pub result: serde_json::Value,
}

/// 终止原因（FAILED 时区分 提供方错误 / 迭代超限 / 用户取消）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    ProviderError,
    IterationCapExceeded,
    CancelledByUser,
}

impl FailureCause {
    pub fn code(self) -> &'static str {
        match self {
            FailureCause::ProviderError => "provider_error",
            FailureCause::IterationCapExceeded => "iteration_cap_exceeded",
            FailureCause::CancelledByUser => "cancelled_by_user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub cause: FailureCause,
    pub detail: String,
}

/// 单次运行的完整状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    pub agent_id: String,
    pub input: String,
    pub status: RunStatus,
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    pub tool_outputs: Vec<ToolOutput>,
    pub intent: Option<Intent>,
    pub plan: ExecutionPlan,
    /// 已接受的工具调用决策数（含被跳过的未知工具）
    pub cursor: usize,
    /// 计划中下一个未消费步骤的下标
    pub plan_cursor: usize,
    /// 与 plan.steps 一一对应
    pub step_status: Vec<StepStatus>,
    pub answer: Option<String>,
    pub failure: Option<RunFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, agent_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            agent_id: agent_id.into(),
            input: input.into(),
            status: RunStatus::Idle,
            progress: 0,
            logs: Vec::new(),
            tool_outputs: Vec::new(),
            intent: None,
            plan: ExecutionPlan::default(),
            cursor: 0,
            plan_cursor: 0,
            step_status: Vec::new(),
            answer: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 写入计划，所有步骤置为 pending
    pub fn set_plan(&mut self, plan: ExecutionPlan) {
        self.step_status = vec![StepStatus::Pending; plan.len()];
        self.plan = plan;
    }

    /// 越界下标忽略
    pub fn set_step_status(&mut self, index: usize, status: StepStatus) {
        if let Some(slot) = self.step_status.get_mut(index) {
            *slot = status;
        }
    }

    /// 供 Step Decider 使用的精简视图：不含日志全文，只保留决策相关字段
    pub fn decision_view(&self) -> serde_json::Value {
        let errors: Vec<&str> = self
            .logs
            .iter()
            .filter(|l| matches!(l.level, LogLevel::Error | LogLevel::Warning))
            .map(|l| l.message.as_str())
            .collect();
        serde_json::json!({
            "input": self.input,
            "intent": self.intent,
            "plan": self.plan,
            "cursor": self.cursor,
            "planCursor": self.plan_cursor,
            "stepStatus": self.step_status,
            "toolOutputs": self.tool_outputs,
            "problems": errors,
        })
    }

    /// 导出日志为纯文本（每行 `[timestamp] LEVEL message`）
    pub fn export_logs(&self) -> String {
        self.logs
            .iter()
            .map(|l| {
                format!(
                    "[{}] {:<7} {}",
                    l.timestamp.to_rfc3339(),
                    l.level.as_str().to_uppercase(),
                    l.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//! 遥测事件：日志 / 状态 / 进度（可序列化为 JSON 供前端展示）

use serde::{Deserialize, Serialize};

use crate::core::{LogEntry, RunStatus};

/// 单个遥测事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// 追加一条运行日志（字段与 LogEntry 相同：timestamp / level / message）
    Log(LogEntry),
    /// 状态迁移
    Status { status: RunStatus },
    /// 进度更新（0-100）
    Progress { progress: u8 },
}

impl TelemetryEvent {
    /// 终态状态事件之后不会再有任何事件
    pub fn is_terminal(&self) -> bool {
        matches!(self, TelemetryEvent::Status { status } if status.is_terminal())
    }

    /// LiveMonitor 前端使用的载荷形状：`{"log": {...}}` / `{"status": ..}` / `{"progress": ..}`
    pub fn monitor_payload(&self) -> serde_json::Value {
        match self {
            TelemetryEvent::Log(entry) => serde_json::json!({ "log": entry }),
            TelemetryEvent::Status { status } => serde_json::json!({ "status": status }),
            TelemetryEvent::Progress { progress } => serde_json::json!({ "progress": progress }),
        }
    }
}

/// 带序号的事件：seq 从 0 开始，按发布顺序严格递增
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

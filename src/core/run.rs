//! 运行句柄：RunState 的唯一写入方
//!
//! 每次状态变更都在同一把锁内完成「修改 RunState + 发布遥测事件」，
//! 因此观察者看到的事件顺序与状态变更顺序一致。运行进入终态后所有变更被忽略，
//! stop 与执行器的完成路径在锁内竞争，只有一方能写入终态。
//! 锁不会跨越 await 点持有。

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::state::{FailureCause, LogEntry, LogLevel, RunFailure, RunState, RunStatus, ToolOutput};
use crate::telemetry::{Subscription, TelemetryChannel, TelemetryEvent};

/// stop 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    /// 运行已处于终态，未产生任何新事件
    AlreadyTerminal,
}

/// 单次运行：状态 + 遥测通道 + 取消令牌
pub struct RunHandle {
    run_id: String,
    agent_id: String,
    state: Mutex<RunState>,
    telemetry: Arc<TelemetryChannel>,
    cancel: CancellationToken,
}

impl RunHandle {
    /// 创建 IDLE 运行，并发布初始 IDLE 状态事件
    pub fn new(
        run_id: impl Into<String>,
        agent_id: impl Into<String>,
        input: impl Into<String>,
        telemetry_buffer: usize,
    ) -> Arc<Self> {
        let run_id = run_id.into();
        let agent_id = agent_id.into();
        let telemetry = TelemetryChannel::new(telemetry_buffer);
        telemetry.publish(TelemetryEvent::Status {
            status: RunStatus::Idle,
        });
        Arc::new(Self {
            state: Mutex::new(RunState::new(run_id.clone(), agent_id.clone(), input)),
            run_id,
            agent_id,
            telemetry,
            cancel: CancellationToken::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前状态的一致快照
    pub fn snapshot(&self) -> RunState {
        self.lock_state().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.lock_state().status
    }

    pub fn is_terminal(&self) -> bool {
        self.lock_state().is_terminal()
    }

    pub fn telemetry(&self) -> &Arc<TelemetryChannel> {
        &self.telemetry
    }

    pub fn subscribe(&self) -> Subscription {
        self.telemetry.subscribe()
    }

    pub fn subscribe_from(&self, cursor: u64) -> Subscription {
        self.telemetry.subscribe_from(cursor)
    }

    /// 执行器用于在挂起点感知 stop
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 在锁内执行变更；运行已终态时返回 None
    fn mutate<R>(&self, f: impl FnOnce(&mut RunState, &TelemetryChannel) -> R) -> Option<R> {
        let mut state = self.lock_state();
        if state.is_terminal() {
            return None;
        }
        Some(f(&mut *state, self.telemetry.as_ref()))
    }

    fn transition(state: &mut RunState, telemetry: &TelemetryChannel, next: RunStatus) -> bool {
        if !state.status.can_transition_to(next) {
            tracing::warn!(
                run_id = %state.run_id,
                from = %state.status,
                to = %next,
                "Illegal run status transition ignored"
            );
            return false;
        }
        state.status = next;
        if next == RunStatus::Running {
            state.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        telemetry.publish(TelemetryEvent::Status { status: next });
        true
    }

    fn append_log(state: &mut RunState, telemetry: &TelemetryChannel, level: LogLevel, message: String) {
        let entry = LogEntry::new(level, message);
        state.logs.push(entry.clone());
        telemetry.publish(TelemetryEvent::Log(entry));
    }

    fn raise_progress(state: &mut RunState, telemetry: &TelemetryChannel, progress: u8) -> bool {
        let progress = progress.min(100);
        if progress <= state.progress {
            return false;
        }
        state.progress = progress;
        telemetry.publish(TelemetryEvent::Progress { progress });
        true
    }

    fn record_failure(state: &mut RunState, telemetry: &TelemetryChannel, cause: FailureCause, detail: String) {
        Self::append_log(
            state,
            telemetry,
            LogLevel::Error,
            format!("[{}] {}", cause.code(), detail),
        );
        state.failure = Some(RunFailure { cause, detail });
        Self::transition(state, telemetry, RunStatus::Failed);
    }

    /// IDLE → RUNNING，进度与日志清零；非 IDLE 时返回 false
    pub fn start(&self) -> bool {
        self.mutate(|state, telemetry| {
            if state.status != RunStatus::Idle {
                return false;
            }
            state.progress = 0;
            state.logs.clear();
            Self::transition(state, telemetry, RunStatus::Running)
        })
        .unwrap_or(false)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate(|state, telemetry| Self::append_log(state, telemetry, level, message))
            .is_some()
    }

    /// 只在进度上升时发布
    pub fn set_progress(&self, progress: u8) -> bool {
        self.mutate(|state, telemetry| Self::raise_progress(state, telemetry, progress))
            .unwrap_or(false)
    }

    /// 不产生遥测事件的字段更新（intent / plan / cursor）
    pub fn update(&self, f: impl FnOnce(&mut RunState)) -> bool {
        self.mutate(|state, _| f(state)).is_some()
    }

    /// 追加成功的工具输出与对应的 success 日志
    pub fn record_tool_output(&self, output: ToolOutput, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate(|state, telemetry| {
            state.tool_outputs.push(output);
            Self::append_log(state, telemetry, LogLevel::Success, message);
        })
        .is_some()
    }

    /// RUNNING → SUCCESS：进度 100，回答写入 success 日志
    pub fn succeed(&self, answer: impl Into<String>) -> bool {
        let answer = answer.into();
        self.mutate(|state, telemetry| {
            if state.status != RunStatus::Running {
                return false;
            }
            Self::raise_progress(state, telemetry, 100);
            Self::append_log(state, telemetry, LogLevel::Success, answer.clone());
            state.answer = Some(answer);
            Self::transition(state, telemetry, RunStatus::Success)
        })
        .unwrap_or(false)
    }

    /// RUNNING → FAILED，错误日志以原因码开头
    pub fn fail(&self, cause: FailureCause, detail: impl Into<String>) -> bool {
        let detail = detail.into();
        self.mutate(|state, telemetry| {
            if state.status != RunStatus::Running {
                return false;
            }
            Self::record_failure(state, telemetry, cause, detail);
            true
        })
        .unwrap_or(false)
    }

    /// 用户停止：未终态时立即置为 FAILED（cancelled_by_user）并取消进行中的调用
    pub fn stop(&self, reason: impl Into<String>) -> StopOutcome {
        let reason = reason.into();
        let outcome = self.mutate(|state, telemetry| {
            if state.status == RunStatus::Idle {
                Self::transition(state, telemetry, RunStatus::Running);
            }
            Self::record_failure(state, telemetry, FailureCause::CancelledByUser, reason);
        });
        match outcome {
            Some(()) => {
                self.cancel.cancel();
                tracing::info!(run_id = %self.run_id, "Run stopped by user");
                StopOutcome::Stopped
            }
            None => StopOutcome::AlreadyTerminal,
        }
    }
}

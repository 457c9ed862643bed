//! 核心层：错误分类、运行状态模型、运行句柄与编排器

pub mod error;
pub mod orchestrator;
pub mod run;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{create_run_manager, RunManager, RunSettings, RunSummary};
pub use run::{RunHandle, StopOutcome};
pub use state::{FailureCause, LogEntry, LogLevel, RunFailure, RunState, RunStatus, StepStatus, ToolOutput};

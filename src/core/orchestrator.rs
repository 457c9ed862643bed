//! 运行编排器：运行控制面
//!
//! start_run 查找智能体、创建 RunHandle 并在独立 tokio 任务中驱动执行器；
//! stop_run / subscribe / snapshot 按 run id 找到句柄后转发。运行之间互不共享可变状态。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::Instrument;

use crate::agents::{load_agents_dir, AgentStore};
use crate::config::AppConfig;
use crate::core::{AgentError, RunHandle, RunState, RunStatus, StopOutcome};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::react::{execute_run, RunSession, DEFAULT_MAX_ITERATIONS};
use crate::telemetry::Subscription;
use crate::tools::{EchoTool, ToolExecutor, ToolInvoker, ToolRegistry};

/// 运行参数（来自配置 [runs] 段）
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_iterations: usize,
    pub telemetry_buffer: usize,
    pub retention: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            telemetry_buffer: 256,
            retention: Duration::from_secs(3600),
        }
    }
}

impl From<&AppConfig> for RunSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.runs.max_iterations,
            telemetry_buffer: cfg.runs.telemetry_buffer,
            retention: Duration::from_secs(cfg.runs.retention_secs),
        }
    }
}

/// 运行列表条目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub agent_id: String,
    pub status: RunStatus,
    pub progress: u8,
}

pub struct RunManager {
    agents: Arc<dyn AgentStore>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
    settings: RunSettings,
    runs: RwLock<HashMap<String, Arc<RunHandle>>>,
}

impl RunManager {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        settings: RunSettings,
    ) -> Self {
        Self {
            agents,
            llm,
            tools,
            settings,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn agents(&self) -> &Arc<dyn AgentStore> {
        &self.agents
    }

    /// 启动运行，返回 run id；运行在返回前已进入 RUNNING
    pub async fn start_run(&self, agent_id: &str, input: &str) -> Result<String, AgentError> {
        let agent = self
            .agents
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;

        let run_id = format!("run_{}", uuid::Uuid::new_v4());
        let handle = RunHandle::new(&run_id, &agent.id, input, self.settings.telemetry_buffer);
        handle.start();
        self.runs
            .write()
            .await
            .insert(run_id.clone(), Arc::clone(&handle));

        let session = RunSession::new(agent, input, Arc::clone(&self.llm), Arc::clone(&self.tools))
            .with_max_iterations(self.settings.max_iterations);
        let span = tracing::info_span!("run", run_id = %run_id, agent_id = %agent_id);
        tokio::spawn(execute_run(handle, session).instrument(span));

        tracing::info!(run_id = %run_id, agent_id, "Run started");
        Ok(run_id)
    }

    async fn handle(&self, run_id: &str) -> Result<Arc<RunHandle>, AgentError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))
    }

    pub async fn stop_run(&self, run_id: &str) -> Result<StopOutcome, AgentError> {
        let handle = self.handle(run_id).await?;
        Ok(handle.stop("Run stopped by user"))
    }

    /// 从头订阅（完整回放 + 实时）
    pub async fn subscribe(&self, run_id: &str) -> Result<Subscription, AgentError> {
        Ok(self.handle(run_id).await?.subscribe())
    }

    /// 从指定序号续订
    pub async fn subscribe_from(&self, run_id: &str, cursor: u64) -> Result<Subscription, AgentError> {
        Ok(self.handle(run_id).await?.subscribe_from(cursor))
    }

    pub async fn snapshot(&self, run_id: &str) -> Result<RunState, AgentError> {
        Ok(self.handle(run_id).await?.snapshot())
    }

    /// 等待运行进入终态并返回最终状态
    pub async fn wait(&self, run_id: &str) -> Result<RunState, AgentError> {
        let handle = self.handle(run_id).await?;
        let mut sub = handle.subscribe();
        while sub.next().await.is_some() {}
        Ok(handle.snapshot())
    }

    /// 运行列表，按 run id 排序
    pub async fn list_runs(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        let mut list: Vec<RunSummary> = runs
            .values()
            .map(|h| {
                let state = h.snapshot();
                RunSummary {
                    run_id: state.run_id,
                    agent_id: state.agent_id,
                    status: state.status,
                    progress: state.progress,
                }
            })
            .collect();
        list.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        list
    }

    /// 删除结束时间早于 max_age 的终态运行，返回删除数量
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - max_age;
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, h| {
            let state = h.snapshot();
            !(state.is_terminal() && state.finished_at.map(|t| t <= cutoff).unwrap_or(false))
        });
        let pruned = before - runs.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned finished runs");
        }
        pruned
    }
}

/// 按配置装配 RunManager：智能体目录、LLM 后端、内置工具
pub fn create_run_manager(cfg: &AppConfig) -> anyhow::Result<RunManager> {
    let agents = load_agents_dir(&cfg.app.agents_dir, Some(&cfg.llm.default_model))?;
    let llm = create_llm_from_config(cfg);

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let tools = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
    tracing::info!(tools = ?tools.tool_names(), "Tool executor ready");

    Ok(RunManager::new(
        Arc::new(agents),
        llm,
        Arc::new(tools),
        RunSettings::from(cfg),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, InMemoryAgentStore};
    use crate::llm::ScriptedLlmClient;

    fn manager(llm: ScriptedLlmClient, settings: RunSettings) -> RunManager {
        let store = InMemoryAgentStore::with_agents([
            AgentDefinition::new("helper", "Helper").with_tools(["echo"]),
        ]);
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        RunManager::new(
            Arc::new(store),
            Arc::new(llm),
            Arc::new(ToolExecutor::new(registry, 5)),
            settings,
        )
    }

    #[tokio::test]
    async fn test_unknown_agent_and_run() {
        let mgr = manager(ScriptedLlmClient::new(Vec::<String>::new()), RunSettings::default());
        let err = mgr.start_run("nobody", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::AgentNotFound(id) if id == "nobody"));
        assert!(matches!(
            mgr.stop_run("run_missing").await,
            Err(AgentError::RunNotFound(_))
        ));
        assert!(mgr.snapshot("run_missing").await.is_err());
    }

    #[tokio::test]
    async fn test_start_wait_list_and_prune() {
        let llm = ScriptedLlmClient::new([
            r#"{"intent": "greet", "actions": []}"#,
            r#"{"steps": []}"#,
            "Hello!",
        ]);
        let mgr = manager(llm, RunSettings::default());

        let run_id = mgr.start_run("helper", "hello").await.unwrap();
        assert!(run_id.starts_with("run_"));
        let state = mgr.wait(&run_id).await.unwrap();
        assert_eq!(state.status, RunStatus::Success);
        assert_eq!(state.answer.as_deref(), Some("Hello!"));

        let runs = mgr.list_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].progress, 100);

        assert_eq!(mgr.stop_run(&run_id).await.unwrap(), StopOutcome::AlreadyTerminal);
        assert_eq!(mgr.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(mgr.prune_finished(Duration::ZERO).await, 1);
        assert!(mgr.list_runs().await.is_empty());
    }
}

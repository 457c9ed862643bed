//! 智能体定义与 AgentStore 协作方
//!
//! 核心只读：按 id 取 AgentDefinition；定义的存储方式由协作方决定（内存 / TOML 目录）。

pub mod loader;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub use loader::{load_agents_dir, AgentLoader};

/// 触发方式（仅描述性数据，触发调度不在核心范围内）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Chat,
    Webhook,
    Schedule,
}

/// 智能体定义：指令 + 模型 + 可用工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

fn default_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            model: default_model(),
            tools: Vec::new(),
            triggers: Vec::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// tool_id 是否在该智能体声明的工具集中
    pub fn declares_tool(&self, tool_id: &str) -> bool {
        self.tools.iter().any(|t| t == tool_id)
    }
}

/// 智能体定义存储（核心只读）
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get(&self, agent_id: &str) -> Option<AgentDefinition>;

    async fn list(&self) -> Vec<AgentDefinition>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<String, AgentDefinition>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: impl IntoIterator<Item = AgentDefinition>) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }

    pub async fn insert(&self, agent: AgentDefinition) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(agent_id).cloned()
    }

    async fn list(&self) -> Vec<AgentDefinition> {
        let mut agents: Vec<AgentDefinition> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }
}

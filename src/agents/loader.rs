//! 智能体定义加载器
//!
//! 从 config/agents/ 目录加载 *.toml（每个文件一个 [agent] 段）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agents::{AgentDefinition, InMemoryAgentStore};

#[derive(Debug, Deserialize)]
struct AgentToml {
    agent: AgentDefinition,
}

/// 智能体加载器
pub struct AgentLoader {
    agents_dir: PathBuf,
    /// 定义文件未写 model 时使用
    default_model: Option<String>,
}

impl AgentLoader {
    pub fn new(agents_dir: impl AsRef<Path>) -> Self {
        Self {
            agents_dir: agents_dir.as_ref().to_path_buf(),
            default_model: None,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// 加载目录下全部定义；无法解析的文件记录警告后跳过
    pub fn load_all(&self) -> anyhow::Result<Vec<AgentDefinition>> {
        let mut agents = Vec::new();

        if !self.agents_dir.exists() {
            tracing::warn!("Agents dir {} does not exist", self.agents_dir.display());
            return Ok(agents);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.agents_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            match self.load_agent(&path) {
                Ok(agent) => agents.push(agent),
                Err(e) => tracing::warn!("Skip agent file {}: {}", path.display(), e),
            }
        }

        tracing::info!("Loaded {} agent definitions", agents.len());
        Ok(agents)
    }

    fn load_agent(&self, path: &Path) -> anyhow::Result<AgentDefinition> {
        let content = std::fs::read_to_string(path)?;
        let raw: toml::Value = toml::from_str(&content)?;
        let has_model = raw
            .get("agent")
            .and_then(|a| a.get("model"))
            .is_some();
        let parsed = raw.try_into::<AgentToml>()?;
        let mut agent = parsed.agent;
        if !has_model {
            if let Some(model) = &self.default_model {
                agent.model = model.clone();
            }
        }
        if agent.id.trim().is_empty() {
            anyhow::bail!("agent id must not be empty");
        }
        Ok(agent)
    }
}

/// 加载目录并构建内存存储
pub fn load_agents_dir(
    dir: impl AsRef<Path>,
    default_model: Option<&str>,
) -> anyhow::Result<InMemoryAgentStore> {
    let mut loader = AgentLoader::new(dir);
    if let Some(model) = default_model {
        loader = loader.with_default_model(model);
    }
    Ok(InMemoryAgentStore::with_agents(loader.load_all()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentStore, Trigger};

    #[tokio::test]
    async fn test_load_agents_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("helper.toml"),
            r#"
[agent]
id = "helper"
name = "Helper"
instructions = "Be helpful."
tools = ["echo"]
triggers = ["chat", "webhook"]
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[agent]\nname = 3\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = load_agents_dir(dir.path(), Some("small-model")).unwrap();
        let agents = store.list().await;
        assert_eq!(agents.len(), 1);
        let helper = store.get("helper").await.unwrap();
        assert_eq!(helper.model, "small-model");
        assert_eq!(helper.triggers, vec![Trigger::Chat, Trigger::Webhook]);
    }

    #[test]
    fn test_explicit_model_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "[agent]\nid = \"a\"\nname = \"A\"\nmodel = \"gpt-4\"\n",
        )
        .unwrap();
        let agents = AgentLoader::new(dir.path())
            .with_default_model("other")
            .load_all()
            .unwrap();
        assert_eq!(agents[0].model, "gpt-4");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let agents = AgentLoader::new("/definitely/not/here").load_all().unwrap();
        assert!(agents.is_empty());
    }
}

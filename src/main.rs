//! Hive - 智能体运行器 CLI
//!
//! 入口：初始化日志、加载配置与智能体目录，启动一次运行并把遥测事件实时打印到终端。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hive::config::{load_config, AppConfig};
use hive::core::{create_run_manager, RunStatus};
use hive::observability;
use hive::telemetry::TelemetryEvent;

#[derive(Parser)]
#[command(name = "hive", about = "Run planning agents with live telemetry", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run and stream its telemetry until it finishes
    Run {
        /// Agent id (from the agents directory)
        agent: String,

        /// User input for the run
        input: String,

        /// Print telemetry events as JSON lines
        #[arg(long)]
        json: bool,

        /// Write the run log to a text file when the run finishes
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List the configured agents
    Agents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let manager = create_run_manager(&cfg).context("Failed to create run manager")?;

    match cli.command {
        Commands::Agents => {
            for agent in manager.agents().list().await {
                println!(
                    "{:<16} {:<24} tools=[{}]  {}",
                    agent.id,
                    agent.name,
                    agent.tools.join(", "),
                    agent.model
                );
            }
        }
        Commands::Run {
            agent,
            input,
            json,
            export,
        } => {
            let run_id = manager
                .start_run(&agent, &input)
                .await
                .with_context(|| format!("Failed to start run for agent '{}'", agent))?;
            let mut sub = manager.subscribe(&run_id).await?;

            // Ctrl-C 转为 stop，随后继续消费直到终态事件
            let stop_on_ctrl_c = async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = manager.stop_run(&run_id).await;
                }
                std::future::pending::<()>().await
            };
            tokio::pin!(stop_on_ctrl_c);

            loop {
                let event = tokio::select! {
                    ev = sub.next() => ev,
                    _ = &mut stop_on_ctrl_c => None,
                };
                let Some(event) = event else { break };
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                    continue;
                }
                match &event.event {
                    TelemetryEvent::Log(entry) => println!(
                        "[{}] {:<7} {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level.as_str().to_uppercase(),
                        entry.message
                    ),
                    TelemetryEvent::Status { status } => println!("-- status: {}", status),
                    TelemetryEvent::Progress { progress } => println!("-- progress: {}%", progress),
                }
            }

            let state = manager.snapshot(&run_id).await?;
            if let Some(path) = export {
                std::fs::write(&path, state.export_logs())
                    .with_context(|| format!("Failed to write logs to {}", path.display()))?;
            }
            if state.status != RunStatus::Success {
                anyhow::bail!(
                    "Run {} finished with status {}",
                    run_id,
                    state.status
                );
            }
        }
    }

    Ok(())
}

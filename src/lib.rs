//! Hive - 智能体运行器
//!
//! 模块划分：
//! - **agents**: 智能体定义、AgentStore 与 TOML 目录加载
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、运行状态、运行句柄与编排器
//! - **llm**: 模型网关（OpenAI 兼容 HTTP / Together AI / Mock）
//! - **observability**: 进程日志初始化
//! - **react**: 响应解析、Planner、Step Decider、Synthesizer 与运行主循环
//! - **telemetry**: 单运行遥测通道（日志 / 状态 / 进度，支持回放）
//! - **tools**: 工具执行协作方（注册表、带超时的执行器、echo）

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod telemetry;
pub mod tools;

//! 认知层：响应解析、Planner、Step Decider、Synthesizer 与运行主循环

pub mod decider;
pub mod loop_;
pub mod parser;
pub mod planner;
pub mod synthesizer;

pub use decider::StepDecider;
pub use loop_::{compute_progress, execute_run, RunSession, DEFAULT_MAX_ITERATIONS};
pub use parser::{
    extract_json, parse_intent, parse_next_step, parse_plan, ExecutionPlan, Intent, NextStep,
    Parsed, PlanStep, ToolCall,
};
pub use planner::Planner;
pub use synthesizer::Synthesizer;

//! 运行主循环（执行器状态机）
//!
//! Intent -> Plan -> (Decide -> Act)* -> Synthesize，所有状态变更经 RunHandle 发布到遥测通道。
//! 模型与工具调用都与取消令牌竞争：stop 之后不会再派发工具，也不会进入汇总。

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::AgentDefinition;
use crate::core::{AgentError, FailureCause, LogLevel, RunHandle, StepStatus, ToolOutput};
use crate::llm::{LlmClient, LlmError};
use crate::react::{NextStep, Parsed, Planner, StepDecider, Synthesizer, ToolCall};
use crate::tools::{ToolDescriptor, ToolInvoker};

/// 默认迭代上限（工具调用决策次数）
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// 单次运行所需的协作方与参数
pub struct RunSession {
    pub agent: AgentDefinition,
    pub input: String,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<dyn ToolInvoker>,
    pub max_iterations: usize,
}

impl RunSession {
    pub fn new(
        agent: AgentDefinition,
        input: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            agent,
            input: input.into(),
            llm,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// 进度：completed / estimatedTotal，estimatedTotal 在超出计划后为 completed + 1
pub fn compute_progress(completed: usize, plan_len: usize) -> u8 {
    let estimated_total = if completed <= plan_len {
        plan_len
    } else {
        completed + 1
    };
    let pct = (100.0 * completed as f64 / estimated_total.max(1) as f64).round();
    pct.min(100.0) as u8
}

/// 与取消令牌竞争；取消后返回 Halt::Cancelled，调用在挂起点被放弃
async fn guarded<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, Halt>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Halt::Cancelled),
        out = fut => Ok(out),
    }
}

/// 智能体声明的工具描述；未注册的工具仍列出，便于模型引用
fn available_tools(agent: &AgentDefinition, tools: &dyn ToolInvoker) -> Vec<ToolDescriptor> {
    agent
        .tools
        .iter()
        .map(|id| {
            tools.describe(id).unwrap_or_else(|| ToolDescriptor {
                tool_id: id.clone(),
                description: String::new(),
                parameters: serde_json::json!({}),
            })
        })
        .collect()
}

fn note_fallback<T>(run: &RunHandle, what: &str, parsed: &Parsed<T>) {
    if let Some(reason) = &parsed.fallback {
        tracing::warn!(run_id = run.run_id(), what, %reason, "Model reply could not be decoded");
        run.log(
            LogLevel::Info,
            format!("Could not decode {} from model reply ({}), using fallback", what, reason),
        );
    }
}

fn describe_plan(steps: &[crate::react::PlanStep]) -> String {
    if steps.is_empty() {
        return "Plan has no tool steps".to_string();
    }
    let listed: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if s.description.is_empty() {
                format!("{}. {}", i + 1, s.tool_id)
            } else {
                format!("{}. {} ({})", i + 1, s.tool_id, s.description)
            }
        })
        .collect();
    format!("Plan with {} step(s): {}", steps.len(), listed.join("; "))
}

/// drive 的提前终止原因。工具错误与未知工具在循环内记录后继续，不会出现在这里
#[derive(Debug)]
enum Halt {
    Provider(LlmError),
    IterationCap(usize),
    /// stop() 已写入终态
    Cancelled,
}

impl From<LlmError> for Halt {
    fn from(e: LlmError) -> Self {
        Halt::Provider(e)
    }
}

impl Halt {
    /// 需要由执行器写入的失败原因；取消时为 None
    fn into_failure(self) -> Option<(FailureCause, String)> {
        match self {
            Halt::Provider(e) => Some((FailureCause::ProviderError, e.to_string())),
            Halt::IterationCap(max) => Some((
                FailureCause::IterationCapExceeded,
                AgentError::IterationCapExceeded(max).to_string(),
            )),
            Halt::Cancelled => None,
        }
    }
}

/// 驱动一次运行直到终态。错误不向上返回，全部体现在 RunState 与遥测中
pub async fn execute_run(run: Arc<RunHandle>, session: RunSession) {
    let cancel = run.cancel_token();
    run.start();

    match drive(&run, &session, &cancel).await {
        Ok(answer) => {
            run.succeed(answer);
            tracing::info!(run_id = run.run_id(), "Run succeeded");
        }
        Err(halt) => match halt.into_failure() {
            Some((cause, detail)) => {
                if cause == FailureCause::IterationCapExceeded {
                    tracing::warn!(run_id = run.run_id(), "Run hit iteration cap");
                } else {
                    tracing::error!(run_id = run.run_id(), error = %detail, "Run failed");
                }
                run.fail(cause, detail);
            }
            None => tracing::info!(run_id = run.run_id(), "Run cancelled"),
        },
    }
}

fn mark_step(run: &RunHandle, index: Option<usize>, status: StepStatus) {
    if let Some(i) = index {
        run.update(|s| s.set_step_status(i, status));
    }
}

async fn drive(run: &RunHandle, session: &RunSession, cancel: &CancellationToken) -> Result<String, Halt> {
    let agent = &session.agent;
    let model = agent.model.as_str();
    let tools = available_tools(agent, session.tools.as_ref());

    run.log(
        LogLevel::Info,
        format!("Starting run for agent '{}' with model {}", agent.name, model),
    );

    let planner = Planner::new(Arc::clone(&session.llm));
    let intent = guarded(cancel, planner.analyze(&session.input, &agent.instructions, model)).await??;
    note_fallback(run, "intent", &intent);
    let intent = intent.value;
    run.log(LogLevel::Info, format!("Intent: {}", intent.intent));
    run.update(|s| s.intent = Some(intent.clone()));

    let plan = guarded(cancel, planner.plan(&intent, &tools, model)).await??;
    note_fallback(run, "plan", &plan);
    let plan = plan.value;
    run.log(LogLevel::Info, describe_plan(&plan.steps));
    run.update(|s| s.set_plan(plan.clone()));

    if plan.is_empty() {
        run.log(LogLevel::Info, "No tool steps planned, answering directly");
    } else {
        let decider = StepDecider::new(Arc::clone(&session.llm));
        // cursor: 已接受的工具调用决策数；plan_cursor: 下一个未消费的计划步骤
        let mut cursor = 0usize;
        let mut plan_cursor = 0usize;
        let mut completed = 0usize;

        loop {
            let view = run.snapshot().decision_view();
            let decided = guarded(cancel, decider.decide(&view, &tools, model)).await??;
            let (call, from_fallback) = match decided.value {
                NextStep::Call(call) => (call, false),
                NextStep::Done => match &decided.fallback {
                    None => {
                        run.log(LogLevel::Info, "No further tools needed");
                        break;
                    }
                    Some(reason) => match plan.steps.get(plan_cursor) {
                        Some(step) => {
                            run.log(
                                LogLevel::Info,
                                format!(
                                    "Could not decode next step ({}), following plan step {}",
                                    reason,
                                    plan_cursor + 1
                                ),
                            );
                            (ToolCall::from(step), true)
                        }
                        None => {
                            run.log(
                                LogLevel::Info,
                                format!("Could not decode next step ({}), plan exhausted", reason),
                            );
                            break;
                        }
                    },
                },
            };

            // 上限只在请求下一次工具调用时检查
            if cursor >= session.max_iterations {
                return Err(Halt::IterationCap(session.max_iterations));
            }
            cursor += 1;

            let matches_plan = plan
                .steps
                .get(plan_cursor)
                .is_some_and(|step| step.tool_id == call.tool_id);
            let step_index = if from_fallback || matches_plan {
                plan_cursor += 1;
                Some(plan_cursor - 1)
            } else {
                None
            };
            run.update(|s| {
                s.cursor = cursor;
                s.plan_cursor = plan_cursor;
            });

            if !agent.declares_tool(&call.tool_id) {
                let err = AgentError::UnknownToolReference(call.tool_id.clone());
                run.log(LogLevel::Warning, format!("{}, skipping", err));
                mark_step(run, step_index, StepStatus::Failed);
                continue;
            }

            run.log(LogLevel::Info, format!("Calling tool '{}'", call.tool_id));
            mark_step(run, step_index, StepStatus::Running);
            let result = guarded(cancel, session.tools.invoke(&call.tool_id, call.params.clone())).await?;
            completed += 1;
            match result {
                Ok(value) => {
                    run.record_tool_output(
                        ToolOutput {
                            tool_id: call.tool_id.clone(),
                            result: value,
                        },
                        format!("Tool '{}' completed", call.tool_id),
                    );
                    mark_step(run, step_index, StepStatus::Completed);
                }
                Err(e) => {
                    run.log(LogLevel::Error, AgentError::Tool(e).to_string());
                    mark_step(run, step_index, StepStatus::Failed);
                }
            }
            run.set_progress(compute_progress(completed, plan.len()));
        }
    }

    if cancel.is_cancelled() {
        return Err(Halt::Cancelled);
    }
    run.log(LogLevel::Info, "Synthesizing final answer");
    let outputs = run.snapshot().tool_outputs;
    let synthesizer = Synthesizer::new(Arc::clone(&session.llm));
    let answer = guarded(
        cancel,
        synthesizer.synthesize(&agent.instructions, &session.input, &outputs, model),
    )
    .await??;
    Ok(answer)
}

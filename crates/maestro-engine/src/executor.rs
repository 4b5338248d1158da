use crate::decompose::decompose;
use crate::events::{EngineEvent, EventBus};
use crate::prompt::build_prompt;
use crate::state::{
    AgentExecution, AgentKind, AgentResult, ExecutionStatus, PhaseStatus, TaskState, TaskStatus,
};
use maestro_core::{Clock, MaestroResult};
use maestro_provider::{GenerateOptions, ProviderRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Generation knobs the engine passes on every agent call.
const AGENT_TEMPERATURE: f32 = 0.7;
const AGENT_MAX_TOKENS: u32 = 4096;

/// Runs one task from decomposition to a terminal status.
///
/// Holds the task's state behind its own lock; write scopes are kept short
/// and never span a provider call. Cancellation is cooperative: the flag
/// is consulted between phases and between sequential agents.
#[derive(Clone)]
pub(crate) struct TaskExecutor {
    pub task: Arc<RwLock<TaskState>>,
    pub bus: Arc<EventBus>,
    pub providers: Arc<ProviderRegistry>,
    pub clock: Arc<dyn Clock>,
    pub cancel: Arc<AtomicBool>,
}

impl TaskExecutor {
    /// Execute the task. Emits the terminal event itself except when the
    /// task was cancelled (cancel() already emitted `task_cancelled`).
    pub async fn run(&self) {
        if let Err(e) = self.run_inner().await {
            let snapshot = {
                let mut task = self.task.write().await;
                if task.status.is_terminal() {
                    return;
                }
                let now = self.clock.now();
                task.push_error("execution_error", e.to_string(), now);
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                task.clone()
            };
            error!(task_id = %snapshot.task_id, error = %e, "Task execution failed");
            self.bus.emit(&EngineEvent::TaskFailed(snapshot)).await;
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn cost_exceeded(&self) -> bool {
        let task = self.task.read().await;
        task.mode_config
            .cost_limit
            .is_some_and(|limit| task.estimated_cost > limit)
    }

    async fn run_inner(&self) -> MaestroResult<()> {
        let snapshot = {
            let mut task = self.task.write().await;
            // The task can be cancelled between admission and startup.
            if task.status != TaskStatus::Pending {
                return Ok(());
            }
            task.status = TaskStatus::Decomposing;
            task.started_at = Some(self.clock.now());
            task.clone()
        };
        info!(task_id = %snapshot.task_id, mode = %snapshot.mode, "Task started");
        self.bus.emit(&EngineEvent::TaskStarted(snapshot)).await;

        let snapshot = {
            let mut task = self.task.write().await;
            task.phases = decompose(&task.mode_config);
            task.status = TaskStatus::Running;
            task.clone()
        };
        info!(
            task_id = %snapshot.task_id,
            phases = snapshot.phases.len(),
            "Task decomposed"
        );
        self.bus.emit(&EngineEvent::TaskDecomposed(snapshot)).await;

        let phase_count = self.task.read().await.phases.len();
        for idx in 0..phase_count {
            if self.cancelled() {
                return Ok(());
            }
            self.task.write().await.current_phase = idx;

            self.run_phase(idx).await;

            let (phase_failed, cost_overrun) = {
                let task = self.task.read().await;
                let failed = task.phases[idx].status == PhaseStatus::Failed;
                let overrun = task
                    .mode_config
                    .cost_limit
                    .is_some_and(|limit| task.estimated_cost > limit);
                (failed, overrun)
            };

            if phase_failed {
                let mut task = self.task.write().await;
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Failed;
                }
                break;
            }
            if cost_overrun {
                let mut task = self.task.write().await;
                if !task.status.is_terminal() {
                    let message = format!(
                        "estimated cost {:.4} exceeds the mode cost limit",
                        task.estimated_cost
                    );
                    task.push_error("cost_limit_exceeded", message, self.clock.now());
                    task.status = TaskStatus::Failed;
                }
                break;
            }
        }

        let snapshot = {
            let mut task = self.task.write().await;
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Completed;
            }
            if task.status.is_terminal() && task.completed_at.is_none() {
                task.completed_at = Some(self.clock.now());
            }
            task.clone()
        };
        match snapshot.status {
            TaskStatus::Completed => {
                info!(
                    task_id = %snapshot.task_id,
                    tokens = snapshot.tokens_used,
                    cost = snapshot.estimated_cost,
                    "Task completed"
                );
                self.bus.emit(&EngineEvent::TaskCompleted(snapshot)).await;
            }
            TaskStatus::Failed => {
                warn!(task_id = %snapshot.task_id, "Task failed");
                self.bus.emit(&EngineEvent::TaskFailed(snapshot)).await;
            }
            // Cancelled: cancel() already set the terminal state and
            // emitted task_cancelled.
            _ => {}
        }
        Ok(())
    }

    /// Run one phase. All failures are recorded into the phase; nothing
    /// propagates past it.
    async fn run_phase(&self, idx: usize) {
        let (task_id, snapshot) = {
            let mut task = self.task.write().await;
            let now = self.clock.now();
            {
                let phase = &mut task.phases[idx];
                phase.status = PhaseStatus::Running;
                phase.started_at = Some(now);
            }
            (task.task_id.clone(), task.phases[idx].clone())
        };
        info!(
            task_id = %task_id,
            phase = snapshot.number,
            name = %snapshot.name,
            parallel = snapshot.parallel,
            "Phase started"
        );
        self.bus
            .emit(&EngineEvent::PhaseStarted {
                task_id: task_id.clone(),
                phase: snapshot.clone(),
            })
            .await;

        let agents = snapshot.agents.clone();
        if snapshot.parallel && agents.len() > 1 {
            // Parallel agents run to natural completion; cancellation is
            // observed once the whole set has finished.
            let mut handles = Vec::with_capacity(agents.len());
            for agent in agents {
                let executor = self.clone();
                handles.push(tokio::spawn(
                    async move { executor.run_agent(idx, agent).await },
                ));
            }
            for handle in handles {
                if let Err(join_err) = handle.await {
                    let mut task = self.task.write().await;
                    let number = task.phases[idx].number;
                    task.push_error(
                        "phase_error",
                        format!("phase {number} agent panicked: {join_err}"),
                        self.clock.now(),
                    );
                    task.phases[idx].status = PhaseStatus::Failed;
                }
            }
        } else {
            for agent in agents {
                if self.cancelled() {
                    break;
                }
                let completed = self.run_agent(idx, agent).await;
                if !completed {
                    // Remaining agents in the phase are never started.
                    break;
                }
                if self.cost_exceeded().await {
                    break;
                }
            }
        }

        let (task_id, snapshot) = {
            let mut task = self.task.write().await;
            let now = self.clock.now();
            {
                let phase = &mut task.phases[idx];
                let any_failed = phase
                    .executions
                    .iter()
                    .any(|execution| execution.status == ExecutionStatus::Failed);
                if phase.status != PhaseStatus::Failed {
                    if any_failed {
                        phase.status = PhaseStatus::Failed;
                    } else if phase.executions.len() == phase.agents.len() {
                        // Completed requires one execution per agent; a
                        // phase cut short by cancellation or a cost stop
                        // stays non-terminal.
                        phase.status = PhaseStatus::Completed;
                    }
                }
                phase.completed_at = Some(now);
            }
            (task.task_id.clone(), task.phases[idx].clone())
        };
        info!(
            task_id = %task_id,
            phase = snapshot.number,
            status = ?snapshot.status,
            "Phase completed"
        );
        self.bus
            .emit(&EngineEvent::PhaseCompleted {
                task_id,
                phase: snapshot,
            })
            .await;
    }

    /// Run one agent. Returns whether the execution completed.
    ///
    /// The post-call update of execution fields, task accumulators, and
    /// the results map happens under a single write lock, so readers never
    /// observe a partial update.
    async fn run_agent(&self, phase_idx: usize, agent: AgentKind) -> bool {
        let (task_id, phase_number, description, results, model_ref, exec_idx) = {
            let mut task = self.task.write().await;
            let now = self.clock.now();
            let task_id = task.task_id.clone();
            let description = task.description.clone();
            let results = task.results.clone();
            let model_ref = task.mode_config.primary_model.clone();
            let phase_number = task.phases[phase_idx].number;

            let mut execution = AgentExecution::new(agent.clone());
            execution.status = ExecutionStatus::Running;
            execution.started_at = Some(now);
            execution.input = json!({ "description": &description, "agent": &agent });
            task.phases[phase_idx].executions.push(execution);
            let exec_idx = task.phases[phase_idx].executions.len() - 1;

            (task_id, phase_number, description, results, model_ref, exec_idx)
        };
        info!(task_id = %task_id, phase = phase_number, agent = %agent, "Agent started");
        self.bus
            .emit(&EngineEvent::AgentStarted {
                task_id: task_id.clone(),
                phase: phase_number,
                agent: agent.clone(),
            })
            .await;

        let prompt = build_prompt(&description, &agent, &results);
        let options = GenerateOptions {
            model: Some(model_ref.model.clone()),
            system: None,
            temperature: Some(AGENT_TEMPERATURE),
            max_tokens: Some(AGENT_MAX_TOKENS),
        };

        // The provider call happens with no state lock held.
        let outcome = match self.providers.get(&model_ref.provider) {
            Ok(provider) => provider.generate(&prompt, &options).await,
            Err(e) => Err(e),
        };
        let discarded = self.cancelled();

        let now = self.clock.now();
        let (execution_snapshot, completed) = {
            let mut task = self.task.write().await;
            let mut completed = false;
            match &outcome {
                Ok(generation) if !discarded => {
                    {
                        let execution = &mut task.phases[phase_idx].executions[exec_idx];
                        execution.status = ExecutionStatus::Completed;
                        execution.output = Some(json!({ "response": generation.content }));
                        execution.model_used = Some(generation.model.clone());
                        execution.tokens_input = generation.tokens_input;
                        execution.tokens_output = generation.tokens_output;
                        execution.cost = generation.cost;
                    }
                    task.tokens_used += generation.tokens_input + generation.tokens_output;
                    task.estimated_cost += generation.cost;
                    task.results.insert(
                        agent.clone(),
                        AgentResult {
                            output: generation.content.clone(),
                            tokens: generation.tokens_input + generation.tokens_output,
                            cost: generation.cost,
                        },
                    );
                    completed = true;
                }
                Ok(_) => {
                    // Provider returned after cancellation: discard the
                    // output, leave the accumulators untouched.
                    let execution = &mut task.phases[phase_idx].executions[exec_idx];
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some("task cancelled".to_string());
                }
                Err(e) => {
                    let execution = &mut task.phases[phase_idx].executions[exec_idx];
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(e.to_string());
                }
            }
            let execution = &mut task.phases[phase_idx].executions[exec_idx];
            execution.completed_at = Some(now);
            execution.duration_ms = execution
                .started_at
                .map(|started| (now - started).num_milliseconds().max(0) as u64);
            (execution.clone(), completed)
        };

        if let Err(e) = &outcome {
            error!(task_id = %task_id, agent = %agent, error = %e, "Agent execution failed");
        }
        self.bus
            .emit(&EngineEvent::AgentCompleted {
                task_id,
                phase: phase_number,
                agent,
                execution: execution_snapshot,
            })
            .await;
        completed
    }
}

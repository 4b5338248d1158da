use crate::modes::ModeConfig;
use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The role an agent plays within a task.
///
/// The nine known kinds each select a prompt template and a slot in deep
/// decomposition. Kinds arriving from custom mode configs that the engine
/// does not know are preserved as [`AgentKind::Other`] and receive the
/// generic prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Requirement analysis and scoping.
    Concept,
    /// Technical architecture design.
    Architect,
    /// Code generation.
    Implement,
    /// Test creation.
    Test,
    /// Code review.
    Review,
    /// Security audit.
    Security,
    /// Performance optimization.
    Optimize,
    /// Documentation generation.
    Docs,
    /// Deployment configuration.
    Deploy,
    /// An agent kind outside the built-in set.
    Other(String),
}

impl AgentKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            AgentKind::Concept => "concept",
            AgentKind::Architect => "architect",
            AgentKind::Implement => "implement",
            AgentKind::Test => "test",
            AgentKind::Review => "review",
            AgentKind::Security => "security",
            AgentKind::Optimize => "optimize",
            AgentKind::Docs => "docs",
            AgentKind::Deploy => "deploy",
            AgentKind::Other(name) => name,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AgentKind {
    fn from(name: &str) -> Self {
        match name {
            "concept" => AgentKind::Concept,
            "architect" => AgentKind::Architect,
            "implement" => AgentKind::Implement,
            "test" => AgentKind::Test,
            "review" => AgentKind::Review,
            "security" => AgentKind::Security,
            "optimize" => AgentKind::Optimize,
            "docs" => AgentKind::Docs,
            "deploy" => AgentKind::Deploy,
            other => AgentKind::Other(other.to_string()),
        }
    }
}

// Serialized as a bare string so the kind can key JSON maps.
impl Serialize for AgentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(AgentKind::from(name.as_str()))
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting in the queue.
    Pending,
    /// A worker picked the task up and is decomposing it.
    Decomposing,
    /// Phases are executing.
    Running,
    /// Execution is suspended. Reserved; no operation currently pauses.
    Paused,
    /// All phases succeeded.
    Completed,
    /// A phase failed or an error ended the task.
    Failed,
    /// Cancelled by the client.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Lifecycle status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not yet reached.
    Pending,
    /// Agents are executing.
    Running,
    /// All executions succeeded.
    Completed,
    /// At least one execution failed.
    Failed,
    /// Skipped without executing.
    Skipped,
}

/// Lifecycle status of a single agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Recorded but not yet started.
    Pending,
    /// Provider call in flight.
    Running,
    /// Provider returned successfully.
    Completed,
    /// Provider returned an error, or the output was discarded.
    Failed,
}

/// A typed error record appended to a task's error list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    /// Error kind, e.g. `execution_error`, `timeout`, `cost_limit_exceeded`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

impl TaskError {
    /// Create an error record stamped at `at`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            timestamp: at,
        }
    }
}

/// The per-agent summary stored in a task's results map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// The agent's generated output text.
    pub output: String,
    /// Total tokens (input + output) the agent consumed.
    pub tokens: u64,
    /// Cost of the agent's provider call in USD.
    pub cost: f64,
}

/// The record of a single agent invocation against a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    /// The agent kind that ran.
    pub agent: AgentKind,
    /// Lifecycle status.
    pub status: ExecutionStatus,
    /// Snapshot of the input the agent received.
    pub input: serde_json::Value,
    /// Structured output (`{"response": content}`) on success.
    pub output: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// The model that actually served the call.
    pub model_used: Option<String>,
    /// Prompt tokens consumed.
    pub tokens_input: u64,
    /// Completion tokens produced.
    pub tokens_output: u64,
    /// Cost of the call in USD.
    pub cost: f64,
    /// When the execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution finished (success or failure).
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`, when both are present.
    pub duration_ms: Option<u64>,
}

impl AgentExecution {
    /// Create a pending execution record for `agent`.
    pub fn new(agent: AgentKind) -> Self {
        Self {
            agent,
            status: ExecutionStatus::Pending,
            input: serde_json::Value::Object(serde_json::Map::new()),
            output: None,
            error: None,
            model_used: None,
            tokens_input: 0,
            tokens_output: 0,
            cost: 0.0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// An ordered group of agents executed together within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    /// 1-based phase number, unique within the task.
    pub number: u32,
    /// Display name, e.g. `Implementation`.
    pub name: String,
    /// Short description of the phase's purpose.
    pub description: String,
    /// Lifecycle status.
    pub status: PhaseStatus,
    /// Whether the agents run concurrently.
    pub parallel: bool,
    /// The agents to run, in declared order.
    pub agents: Vec<AgentKind>,
    /// Execution records, in start order.
    pub executions: Vec<AgentExecution>,
    /// When the phase started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the phase finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseState {
    /// Create a pending phase.
    pub fn new(
        number: u32,
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<AgentKind>,
        parallel: bool,
    ) -> Self {
        Self {
            number,
            name: name.into(),
            description: description.into(),
            status: PhaseStatus::Pending,
            parallel,
            agents,
            executions: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// The full state of one task.
///
/// Owned exclusively by the engine; external consumers only ever see
/// cloned snapshots via queries and event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Externally supplied task id.
    pub task_id: String,
    /// The natural-language task description.
    pub description: String,
    /// Optional project reference.
    pub project_id: Option<String>,
    /// Name of the mode the task runs under.
    pub mode: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Scheduling priority; higher starts first.
    pub priority: i32,
    /// Decomposed phases, in execution order.
    pub phases: Vec<PhaseState>,
    /// Index of the phase currently (or last) executing.
    pub current_phase: usize,
    /// Per-agent result summaries, keyed by agent kind.
    pub results: HashMap<AgentKind, AgentResult>,
    /// Typed error records, in emission order.
    pub errors: Vec<TaskError>,
    /// Total tokens consumed by completed agents. Monotonically nondecreasing.
    pub tokens_used: u64,
    /// Accumulated cost in USD. Monotonically nondecreasing.
    pub estimated_cost: f64,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When a worker picked the task up. Present iff the task ever left pending.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Snapshot of the mode config taken at submission time.
    pub mode_config: ModeConfig,
}

impl TaskState {
    /// Create a pending task state.
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        mode: impl Into<String>,
        mode_config: ModeConfig,
        project_id: Option<String>,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            project_id,
            mode: mode.into(),
            status: TaskStatus::Pending,
            priority,
            phases: Vec::new(),
            current_phase: 0,
            results: HashMap::new(),
            errors: Vec::new(),
            tokens_used: 0,
            estimated_cost: 0.0,
            created_at,
            started_at: None,
            completed_at: None,
            mode_config,
        }
    }

    /// Append a typed error record.
    pub fn push_error(&mut self, kind: &str, message: impl Into<String>, at: DateTime<Utc>) {
        self.errors.push(TaskError::new(kind, message, at));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::modes::ModeRegistry;

    fn quality_config() -> ModeConfig {
        ModeRegistry::builtin().get("QUALITY").unwrap().clone()
    }

    #[test]
    fn test_agent_kind_round_trip() {
        for name in [
            "concept",
            "architect",
            "implement",
            "test",
            "review",
            "security",
            "optimize",
            "docs",
            "deploy",
        ] {
            let kind = AgentKind::from(name);
            assert!(!matches!(kind, AgentKind::Other(_)), "{name} parsed as Other");
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_agent_kind_other_preserved() {
        let kind = AgentKind::from("migrate");
        assert_eq!(kind, AgentKind::Other("migrate".to_string()));
        assert_eq!(kind.to_string(), "migrate");
    }

    #[test]
    fn test_agent_kind_serializes_as_string() {
        let json = serde_json::to_string(&AgentKind::Implement).unwrap();
        assert_eq!(json, "\"implement\"");
        let parsed: AgentKind = serde_json::from_str("\"review\"").unwrap();
        assert_eq!(parsed, AgentKind::Review);
    }

    #[test]
    fn test_agent_kind_as_map_key() {
        let mut results = HashMap::new();
        results.insert(
            AgentKind::Concept,
            AgentResult {
                output: "requirements".to_string(),
                tokens: 10,
                cost: 0.01,
            },
        );
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["concept"]["tokens"], 10);
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }

    #[test]
    fn test_task_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Decomposing).unwrap();
        assert_eq!(json, "\"decomposing\"");
    }

    #[test]
    fn test_initial_task_state() {
        let state = TaskState::new(
            "t-1",
            "Build a login page",
            "QUALITY",
            quality_config(),
            None,
            5,
            Utc::now(),
        );
        assert_eq!(state.status, TaskStatus::Pending);
        assert_eq!(state.priority, 5);
        assert_eq!(state.current_phase, 0);
        assert!(state.phases.is_empty());
        assert!(state.results.is_empty());
        assert!(state.errors.is_empty());
        assert_eq!(state.tokens_used, 0);
        assert_eq!(state.estimated_cost, 0.0);
        assert!(state.started_at.is_none());
        assert!(state.completed_at.is_none());
    }

    #[test]
    fn test_task_error_serializes_type_key() {
        let err = TaskError::new("timeout", "task timed out", Utc::now());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "timeout");
        assert_eq!(json["message"], "task timed out");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_execution_starts_pending() {
        let execution = AgentExecution::new(AgentKind::Test);
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(execution.output.is_none());
        assert!(execution.error.is_none());
        assert_eq!(execution.cost, 0.0);
    }
}

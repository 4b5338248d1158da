use crate::state::AgentKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How aggressively a task is broken into phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionDepth {
    /// One phase containing all required agents.
    Shallow,
    /// Canonical multi-phase breakdown.
    Deep,
}

/// How willing a mode is to run agents concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelizationLevel {
    /// Sequential wherever possible.
    Conservative,
    /// Parallel only where the decomposition groups agents together.
    Balanced,
    /// Parallel whenever more than one agent shares a phase.
    Aggressive,
}

/// How much validation the mode asks of its agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationDepth {
    /// Smoke-level checks only.
    Minimal,
    /// Standard validation.
    Standard,
    /// Full validation including review agents.
    Comprehensive,
}

/// A provider/model pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider registry name, e.g. `"claude"` or `"ollama"`.
    pub provider: String,
    /// Model identifier passed to the provider.
    pub model: String,
}

impl ModelRef {
    /// Create a model reference.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// A named execution preset.
///
/// Tasks cache the config of their mode at submission time, so later mode
/// switches never affect tasks already submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Phase decomposition strategy.
    pub decomposition_depth: DecompositionDepth,
    /// Concurrency appetite.
    pub parallelization_level: ParallelizationLevel,
    /// Validation thoroughness.
    pub validation_depth: ValidationDepth,
    /// Whether results should be gated on human approval.
    pub requires_human_approval: bool,
    /// The provider/model agents run against.
    pub primary_model: ModelRef,
    /// Fallback provider/model. Present for future use; the engine does
    /// not consult it.
    pub fallback_model: ModelRef,
    /// Agents every task in this mode runs, in order.
    pub required_agents: Vec<AgentKind>,
    /// Agents a task may additionally run.
    pub optional_agents: Vec<AgentKind>,
    /// Wall-clock budget for one task, in milliseconds.
    pub task_timeout_ms: u64,
    /// Provider retry budget. Informational to the core.
    pub max_retries: u32,
    /// Cost ceiling in USD; the task fails once its accumulated cost
    /// exceeds this.
    pub cost_limit: Option<f64>,
}

/// Read-only lookup from mode name to config.
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    modes: HashMap<String, ModeConfig>,
}

impl ModeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modes: HashMap::new(),
        }
    }

    /// The built-in registry carrying SPEED, QUALITY, AUTONOMY, and COST.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("SPEED", speed_mode());
        registry.register("QUALITY", quality_mode());
        registry.register("AUTONOMY", autonomy_mode());
        registry.register("COST", cost_mode());
        registry
    }

    /// Register (or replace) a mode.
    pub fn register(&mut self, name: impl Into<String>, config: ModeConfig) {
        self.modes.insert(name.into(), config);
    }

    /// Look up a mode config by name.
    pub fn get(&self, name: &str) -> Option<&ModeConfig> {
        self.modes.get(name)
    }

    /// Whether a mode is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    /// Names of all registered modes, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn agents(names: &[&str]) -> Vec<AgentKind> {
    names.iter().map(|name| AgentKind::from(*name)).collect()
}

fn speed_mode() -> ModeConfig {
    ModeConfig {
        decomposition_depth: DecompositionDepth::Shallow,
        parallelization_level: ParallelizationLevel::Aggressive,
        validation_depth: ValidationDepth::Minimal,
        requires_human_approval: false,
        primary_model: ModelRef::new("claude", "claude-3-5-sonnet-20241022"),
        fallback_model: ModelRef::new("ollama", "codellama:7b"),
        required_agents: agents(&["implement"]),
        optional_agents: Vec::new(),
        task_timeout_ms: 300_000,
        max_retries: 1,
        cost_limit: None,
    }
}

fn quality_mode() -> ModeConfig {
    ModeConfig {
        decomposition_depth: DecompositionDepth::Deep,
        parallelization_level: ParallelizationLevel::Balanced,
        validation_depth: ValidationDepth::Comprehensive,
        requires_human_approval: true,
        primary_model: ModelRef::new("claude", "claude-opus-4-5-20251101"),
        fallback_model: ModelRef::new("claude", "claude-3-5-sonnet-20241022"),
        required_agents: agents(&["concept", "architect", "implement", "test", "review", "docs"]),
        optional_agents: agents(&["security", "optimize"]),
        task_timeout_ms: 900_000,
        max_retries: 3,
        cost_limit: None,
    }
}

fn autonomy_mode() -> ModeConfig {
    ModeConfig {
        decomposition_depth: DecompositionDepth::Deep,
        parallelization_level: ParallelizationLevel::Balanced,
        validation_depth: ValidationDepth::Standard,
        requires_human_approval: false,
        primary_model: ModelRef::new("claude", "claude-opus-4-5-20251101"),
        fallback_model: ModelRef::new("claude", "claude-3-5-sonnet-20241022"),
        required_agents: agents(&[
            "concept",
            "architect",
            "implement",
            "test",
            "review",
            "docs",
            "deploy",
        ]),
        optional_agents: agents(&["security", "optimize"]),
        task_timeout_ms: 1_200_000,
        max_retries: 3,
        cost_limit: None,
    }
}

fn cost_mode() -> ModeConfig {
    ModeConfig {
        decomposition_depth: DecompositionDepth::Shallow,
        parallelization_level: ParallelizationLevel::Conservative,
        validation_depth: ValidationDepth::Minimal,
        requires_human_approval: false,
        primary_model: ModelRef::new("ollama", "codellama:7b"),
        fallback_model: ModelRef::new("claude", "claude-3-5-haiku-20241022"),
        required_agents: agents(&["implement", "test"]),
        optional_agents: Vec::new(),
        task_timeout_ms: 600_000,
        max_retries: 2,
        cost_limit: Some(1.0),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_modes_present() {
        let registry = ModeRegistry::builtin();
        assert_eq!(registry.names(), vec!["AUTONOMY", "COST", "QUALITY", "SPEED"]);
        assert!(registry.contains("QUALITY"));
        assert!(!registry.contains("TURBO"));
    }

    #[test]
    fn test_speed_mode_shape() {
        let registry = ModeRegistry::builtin();
        let speed = registry.get("SPEED").unwrap();
        assert_eq!(speed.decomposition_depth, DecompositionDepth::Shallow);
        assert_eq!(
            speed.parallelization_level,
            ParallelizationLevel::Aggressive
        );
        assert_eq!(speed.required_agents, vec![AgentKind::Implement]);
        assert_eq!(speed.task_timeout_ms, 300_000);
        assert!(speed.cost_limit.is_none());
    }

    #[test]
    fn test_quality_mode_shape() {
        let registry = ModeRegistry::builtin();
        let quality = registry.get("QUALITY").unwrap();
        assert_eq!(quality.decomposition_depth, DecompositionDepth::Deep);
        assert_eq!(quality.required_agents.len(), 6);
        assert_eq!(quality.primary_model.provider, "claude");
        assert_eq!(quality.primary_model.model, "claude-opus-4-5-20251101");
        assert!(quality.requires_human_approval);
        assert_eq!(
            quality.optional_agents,
            vec![AgentKind::Security, AgentKind::Optimize]
        );
    }

    #[test]
    fn test_cost_mode_has_limit() {
        let registry = ModeRegistry::builtin();
        let cost = registry.get("COST").unwrap();
        assert_eq!(cost.cost_limit, Some(1.0));
        assert_eq!(cost.primary_model.provider, "ollama");
        assert_eq!(
            cost.required_agents,
            vec![AgentKind::Implement, AgentKind::Test]
        );
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let registry = ModeRegistry::builtin();
        let quality = registry.get("QUALITY").unwrap();
        let json = serde_json::to_string(quality).unwrap();
        let parsed: ModeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.required_agents, quality.required_agents);
        assert_eq!(parsed.task_timeout_ms, quality.task_timeout_ms);
    }

    #[test]
    fn test_register_custom_mode() {
        let mut registry = ModeRegistry::builtin();
        let mut custom = registry.get("SPEED").unwrap().clone();
        custom.required_agents = vec![AgentKind::from("migrate")];
        registry.register("MIGRATE", custom);
        assert!(registry.contains("MIGRATE"));
        assert_eq!(
            registry.get("MIGRATE").unwrap().required_agents,
            vec![AgentKind::Other("migrate".to_string())]
        );
    }
}

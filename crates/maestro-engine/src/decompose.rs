use crate::modes::{DecompositionDepth, ModeConfig, ParallelizationLevel};
use crate::state::{AgentKind, PhaseState};

/// The canonical deep-decomposition groups, in execution order.
const PHASE_GROUPS: &[(&str, &str, &[&str])] = &[
    ("Concept", "Analyze requirements", &["concept"]),
    ("Architecture", "Design system architecture", &["architect"]),
    ("Implementation", "Generate code", &["implement"]),
    ("Testing", "Create and run tests", &["test"]),
    (
        "Review",
        "Code review and security audit",
        &["review", "security"],
    ),
    ("Optimization", "Performance optimization", &["optimize"]),
    ("Documentation", "Generate documentation", &["docs"]),
    ("Deployment", "Deploy changes", &["deploy"]),
];

/// Decompose a task into phases from its mode config.
///
/// Deterministic: ignores the task description entirely. Shallow depth
/// yields a single "Execution" phase with every required agent; deep depth
/// intersects the required agents with the canonical groups, skipping
/// empty groups and renumbering from 1.
pub fn decompose(config: &ModeConfig) -> Vec<PhaseState> {
    match config.decomposition_depth {
        DecompositionDepth::Shallow => {
            let agents = config.required_agents.clone();
            // A single agent is never meaningfully parallel.
            let parallel = config.parallelization_level == ParallelizationLevel::Aggressive
                && agents.len() > 1;
            vec![PhaseState::new(
                1,
                "Execution",
                "Execute all agents",
                agents,
                parallel,
            )]
        }
        DecompositionDepth::Deep => {
            let mut phases = Vec::new();
            let mut number = 1;
            for (name, description, group) in PHASE_GROUPS {
                let agents: Vec<AgentKind> = group
                    .iter()
                    .map(|name| AgentKind::from(*name))
                    .filter(|agent| config.required_agents.contains(agent))
                    .collect();
                if agents.is_empty() {
                    continue;
                }
                let parallel = agents.len() > 1;
                phases.push(PhaseState::new(number, *name, *description, agents, parallel));
                number += 1;
            }
            phases
        }
    }
}

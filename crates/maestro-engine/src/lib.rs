//! Multi-agent task orchestration engine.
//!
//! Tasks are submitted with a natural-language description and an execution
//! mode; the engine decomposes them into ordered phases of specialized
//! agents, dispatches the agents to pluggable model providers, threads
//! earlier outputs into later prompts, and streams typed events to channel
//! subscribers while accounting tokens and cost.
//!
//! # Main types
//!
//! - [`Engine`] — The facade: submit, query, cancel, switch mode, stats.
//! - [`TaskState`] / [`PhaseState`] / [`AgentExecution`] — The state model.
//! - [`ModeRegistry`] / [`ModeConfig`] — Execution mode presets.
//! - [`EventBus`] / [`EngineEvent`] — Typed event fan-out.
//! - [`decompose`] — Mode-driven phase decomposition.
//! - [`build_prompt`] — Per-agent prompt construction.

/// Mode-driven decomposition into phases.
pub mod decompose;
/// The engine facade and worker pool.
pub mod engine;
/// Typed events and the channel-based event bus.
pub mod events;
/// Single-task execution: phases and agents.
mod executor;
/// Execution mode presets and registry.
pub mod modes;
/// Per-agent prompt templates.
pub mod prompt;
/// The priority admission queue.
pub mod queue;
/// Task, phase, and execution state types.
pub mod state;

pub use decompose::decompose;
pub use engine::{Engine, EngineConfig, EngineStats, ModeSwitch};
pub use events::{EngineEvent, EventBus, EventHandler, Subscription};
pub use modes::{
    DecompositionDepth, ModeConfig, ModeRegistry, ModelRef, ParallelizationLevel, ValidationDepth,
};
pub use prompt::build_prompt;
pub use queue::TaskQueue;
pub use state::{
    AgentExecution, AgentKind, AgentResult, ExecutionStatus, PhaseState, PhaseStatus, TaskError,
    TaskState, TaskStatus,
};

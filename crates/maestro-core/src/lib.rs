//! Core types and error definitions for the Maestro orchestrator.
//!
//! This crate provides the foundational types shared across all Maestro
//! crates: the unified error enum and the injectable clock used for
//! timestamping task state transitions.
//!
//! # Main types
//!
//! - [`MaestroError`] — Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`] — Convenience alias for `Result<T, MaestroError>`.
//! - [`Clock`] — Timestamp source, injectable for tests.
//! - [`SystemClock`] — The default wall-clock implementation.

/// Injectable timestamp sources.
pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Top-level error type for the Maestro orchestrator.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// An error from the orchestration engine itself.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A submitted mode name is not present in the mode registry.
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    /// A task was submitted with an id the engine already knows.
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    /// An error surfaced by a model provider adapter.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An error from an outbound HTTP request (e.g. a provider API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

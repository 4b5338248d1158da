//! Model provider adapters for the Maestro orchestrator.
//!
//! Each provider turns a prompt plus generation options into a structured
//! [`Generation`] carrying the content, token counts, and cost. The engine
//! only depends on the [`ModelProvider`] trait; concrete adapters are
//! registered by name in a [`ProviderRegistry`].
//!
//! # Main types
//!
//! - [`ModelProvider`] — Uniform generation capability.
//! - [`Generation`] / [`GenerateOptions`] — Request/response value types.
//! - [`CloudProvider`] — Remote Anthropic-style messages API adapter.
//! - [`LocalProvider`] — Local Ollama-style generate API adapter.
//! - [`ProviderRegistry`] — Name → adapter lookup.

/// Remote cloud provider adapter.
pub mod cloud;
/// Local provider adapter.
pub mod local;
/// Per-model pricing for the cloud provider.
pub mod pricing;
/// The provider trait and its value types.
pub mod provider;
/// Name-keyed adapter registry.
pub mod registry;

pub use cloud::CloudProvider;
pub use local::LocalProvider;
pub use provider::{GenerateOptions, Generation, ModelProvider};
pub use registry::ProviderRegistry;

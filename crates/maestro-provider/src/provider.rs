use async_trait::async_trait;
use maestro_core::MaestroResult;
use serde::{Deserialize, Serialize};

/// Options for a single generation call.
///
/// Unset fields fall back to the adapter's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Model identifier; the adapter's default model when `None`.
    pub model: Option<String>,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
}

/// The structured result of a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text content.
    pub content: String,
    /// The model that actually served the request.
    pub model: String,
    /// Prompt tokens consumed.
    pub tokens_input: u64,
    /// Completion tokens produced.
    pub tokens_output: u64,
    /// Monetary cost of the call in USD (0.0 for local models).
    pub cost: f64,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
    /// Provider-reported finish reason (e.g. `end_turn`, `stop`).
    pub finish_reason: String,
}

/// A model provider: turns a prompt into a [`Generation`].
///
/// Implementations handle their own API communication and error surfacing;
/// the engine never retries or falls back on their behalf.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// The registry name of this provider (e.g. `"claude"`, `"ollama"`).
    fn name(&self) -> &str;

    /// Generate text for the given prompt.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> MaestroResult<Generation>;
}

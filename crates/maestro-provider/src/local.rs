use crate::provider::{GenerateOptions, Generation, ModelProvider};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use std::time::Instant;
use tracing::info;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "codellama:7b";

/// Local provider speaking the Ollama generate API.
///
/// Registered under the name `"ollama"`. Local models are free, so every
/// generation reports a cost of 0.0.
pub struct LocalProvider {
    base_url: String,
    default_model: String,
    http: reqwest::Client,
}

impl LocalProvider {
    /// Create a provider against the default local endpoint.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model used when a call does not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for LocalProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> MaestroResult<Generation> {
        let url = format!("{}/api/generate", self.base_url);
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature.unwrap_or(0.7),
                "num_predict": options.max_tokens.unwrap_or(2048),
            },
        });
        if let Some(system) = &options.system {
            body["system"] = serde_json::json!(system);
        }

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(MaestroError::Provider(format!(
                "local API error {status}: {data}"
            )));
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let content = data["response"].as_str().unwrap_or("").to_string();
        let tokens_input = data["prompt_eval_count"].as_u64().unwrap_or(0);
        let tokens_output = data["eval_count"].as_u64().unwrap_or(0);
        let finish_reason = data["done_reason"].as_str().unwrap_or("stop").to_string();

        info!(
            model = %model,
            tokens_in = tokens_input,
            tokens_out = tokens_output,
            duration_ms = duration_ms,
            "Local generation completed"
        );

        Ok(Generation {
            content,
            model,
            tokens_input,
            tokens_output,
            cost: 0.0,
            duration_ms,
            finish_reason,
        })
    }
}

use crate::pricing;
use crate::provider::{GenerateOptions, Generation, ModelProvider};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant specialized in software development.";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Remote cloud provider speaking the Anthropic messages API.
///
/// Registered under the name `"claude"`. Costs are computed from the
/// per-model pricing table in [`pricing`].
pub struct CloudProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    http: reqwest::Client,
}

impl CloudProvider {
    /// Create a provider against the public API endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (used by tests and proxies).
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

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[async_trait]
impl ModelProvider for CloudProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> MaestroResult<Generation> {
        let url = format!("{}/v1/messages", self.base_url);
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let system = options
            .system
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let messages = vec![ApiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        let body = serde_json::json!({
            "model": model,
            "max_tokens": options.max_tokens.unwrap_or(4096),
            "temperature": options.temperature.unwrap_or(0.7),
            "system": system,
            "messages": messages,
        });

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(MaestroError::Provider(format!(
                "cloud API error {status}: {resp_body}"
            )));
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        // Concatenate the text blocks of the content array.
        let content = resp_body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| {
                MaestroError::Provider("missing content in cloud response".to_string())
            })?;

        let tokens_input = resp_body["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let tokens_output = resp_body["usage"]["output_tokens"].as_u64().unwrap_or(0);
        let cost = pricing::cost(&model, tokens_input, tokens_output);
        let finish_reason = resp_body["stop_reason"]
            .as_str()
            .unwrap_or("end_turn")
            .to_string();

        info!(
            model = %model,
            tokens_in = tokens_input,
            tokens_out = tokens_output,
            cost = cost,
            duration_ms = duration_ms,
            "Cloud generation completed"
        );

        Ok(Generation {
            content,
            model,
            tokens_input,
            tokens_output,
            cost,
            duration_ms,
            finish_reason,
        })
    }
}

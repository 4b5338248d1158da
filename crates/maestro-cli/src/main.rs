//! The `maestro` binary: submit a task to an in-process engine and stream
//! its events to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use maestro_engine::{Engine, EngineConfig, ModeRegistry, TaskStatus};
use maestro_provider::{CloudProvider, LocalProvider, ProviderRegistry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro — multi-agent task orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a task and stream its events as line JSON
    Run {
        /// Natural-language task description
        description: String,
        /// Execution mode (defaults to the configured default mode)
        #[arg(long)]
        mode: Option<String>,
        /// Scheduling priority; higher starts first
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Optional project reference attached to the task
        #[arg(long)]
        project: Option<String>,
    },
    /// List the registered execution modes
    Modes,
}

#[derive(Deserialize, Default)]
struct MaestroConfig {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    providers: ProviderSection,
}

#[derive(Deserialize)]
struct EngineSection {
    #[serde(default = "default_mode")]
    default_mode: String,
    #[serde(default = "default_max_workers")]
    max_workers: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            max_workers: default_max_workers(),
        }
    }
}

#[derive(Deserialize)]
struct ProviderSection {
    #[serde(default)]
    anthropic_api_key: String,
    #[serde(default)]
    anthropic_base_url: Option<String>,
    #[serde(default = "default_ollama_url")]
    ollama_base_url: String,
    #[serde(default = "default_ollama_model")]
    ollama_model: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            anthropic_base_url: None,
            ollama_base_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
        }
    }
}

fn default_mode() -> String {
    "QUALITY".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "codellama:7b".to_string()
}

fn load_config(path: &Path) -> anyhow::Result<MaestroConfig> {
    if !path.exists() {
        return Ok(MaestroConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn build_engine(config: &MaestroConfig) -> Engine {
    // The environment overrides the config file for the API key.
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .unwrap_or_else(|_| config.providers.anthropic_api_key.clone());

    let mut cloud = CloudProvider::new(api_key);
    if let Some(base_url) = &config.providers.anthropic_base_url {
        cloud = cloud.with_base_url(base_url.clone());
    }
    let local = LocalProvider::new()
        .with_base_url(config.providers.ollama_base_url.clone())
        .with_default_model(config.providers.ollama_model.clone());

    let providers = Arc::new(
        ProviderRegistry::new()
            .with_provider(Arc::new(cloud))
            .with_provider(Arc::new(local)),
    );

    Engine::new(
        EngineConfig {
            default_mode: config.engine.default_mode.clone(),
            max_workers: config.engine.max_workers,
        },
        ModeRegistry::builtin(),
        providers,
    )
}

async fn run_task(
    config: MaestroConfig,
    description: String,
    mode: Option<String>,
    priority: i32,
    project: Option<String>,
) -> anyhow::Result<()> {
    let engine = build_engine(&config);
    let task_id = Uuid::new_v4().to_string();

    let mut subscription = engine.subscribe(&format!("task:{task_id}")).await;
    engine
        .submit(&task_id, &description, mode.as_deref(), project, priority)
        .await?;
    info!(task_id = %task_id, "Task submitted");

    while let Some(message) = subscription.recv().await {
        println!("{message}");
        if matches!(
            message["type"].as_str().unwrap_or(""),
            "task_completed" | "task_failed" | "task_cancelled"
        ) {
            break;
        }
    }

    let state = engine
        .get_state(&task_id)
        .await
        .context("task state missing after terminal event")?;
    info!(
        task_id = %task_id,
        status = ?state.status,
        tokens = state.tokens_used,
        cost = state.estimated_cost,
        "Task finished"
    );

    if state.status != TaskStatus::Completed {
        anyhow::bail!("task ended as {:?}", state.status);
    }
    Ok(())
}

fn list_modes() {
    let registry = ModeRegistry::builtin();
    for name in registry.names() {
        if let Some(config) = registry.get(&name) {
            let agents: Vec<&str> = config
                .required_agents
                .iter()
                .map(maestro_engine::AgentKind::as_str)
                .collect();
            println!(
                "{name}: depth={:?} parallelization={:?} model={}/{} agents=[{}] timeout={}ms",
                config.decomposition_depth,
                config.parallelization_level,
                config.primary_model.provider,
                config.primary_model.model,
                agents.join(", "),
                config.task_timeout_ms,
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            description,
            mode,
            priority,
            project,
        } => run_task(config, description, mode, priority, project).await,
        Commands::Modes => {
            list_modes();
            Ok(())
        }
    }
}

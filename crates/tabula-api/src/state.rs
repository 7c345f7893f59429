//! Application state wiring the engine to its concrete collaborators.
//!
//! The engine is generic over its ports; AppState pins it to the infra
//! implementations and shares one instance between the terminal and
//! HTTP adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;

use tabula_core::session::registry::SessionRegistry;
use tabula_core::workflow::engine::{EngineSettings, WorkflowEngine};
use tabula_infra::config::load_global_config;
use tabula_infra::dataset::CsvCodec;
use tabula_infra::filesystem::{ensure_layout, resolve_data_dir};
use tabula_infra::llm::create_provider;
use tabula_infra::proposal::LlmProposalGenerator;
use tabula_infra::runner::PythonCodeRunner;
use tabula_infra::secret::EnvSecretProvider;
use tabula_infra::snapshot::SnapshotBackend;
use tabula_types::config::GlobalConfig;

/// The engine pinned to infra implementations.
pub type ConcreteEngine =
    WorkflowEngine<SnapshotBackend, LlmProposalGenerator, PythonCodeRunner, CsvCodec>;

/// Command-line values that take precedence over `config.toml`.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub max_retries: Option<u32>,
    pub model: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut GlobalConfig) {
        if let Some(max_retries) = self.max_retries {
            config.engine.max_retries = max_retries;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
    }
}

/// Shared application state.
///
/// Used by both the chat loop and the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load config and wire the engine.
    ///
    /// Exports resolve against `export_dir`.
    pub async fn init(overrides: &ConfigOverrides, export_dir: PathBuf) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_layout(&data_dir)
            .await
            .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

        let mut config = load_global_config(&data_dir).await;
        overrides.apply(&mut config);

        let api_key = EnvSecretProvider::new()
            .get(&config.llm.api_key_env)
            .with_context(|| {
                format!(
                    "the proposal generator needs an API key; export {}",
                    config.llm.api_key_env
                )
            })?;

        Self::build(config, data_dir, export_dir, api_key).await
    }

    /// Wire state from already-resolved inputs.
    pub async fn build(
        config: GlobalConfig,
        data_dir: PathBuf,
        export_dir: PathBuf,
        api_key: SecretString,
    ) -> anyhow::Result<Self> {
        let store = SnapshotBackend::from_config(&config.storage, &data_dir)
            .await
            .context("cannot open snapshot store")?;
        let provider =
            create_provider(&config.llm, api_key).context("cannot create LLM provider")?;
        let proposals = LlmProposalGenerator::new(provider, &config.llm);
        let runner = PythonCodeRunner::new(&config.runner);
        let settings = EngineSettings::from_config(&config.engine, export_dir);

        tracing::debug!(
            model = %config.llm.model,
            interpreter = runner.interpreter(),
            store = store.name(),
            max_retries = settings.max_retries,
            "engine wired"
        );

        let engine = WorkflowEngine::new(store, proposals, runner, CsvCodec::new(), settings);

        Ok(Self {
            engine: Arc::new(engine),
            sessions: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
            data_dir,
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.engine.settings().export_dir
    }
}

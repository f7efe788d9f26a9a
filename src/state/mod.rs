use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::history::HistoryStore;
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::rag::{
    embedder_from_settings, store_from_settings, Embedder, KnowledgeStore, LinearScanSearch,
    RagService,
};
use crate::server::rate_limit::{spawn_pruner, ClientRateLimiter};

pub mod error;

use error::InitializationError;

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<AppConfig>,
    pub history: HistoryStore,
    pub llm: Arc<dyn LlmProvider>,
    pub rag: Arc<RagService>,
    pub rate_limiter: Arc<ClientRateLimiter>,
}

impl AppState {
    /// Loads configuration from disk and wires the stores, embedder and
    /// LLM provider it names.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_app_config()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let knowledge = store_from_settings(settings.rag.store, paths.knowledge_db_path.clone())
            .await
            .map_err(|e| InitializationError::Knowledge(e.into()))?;

        let embedder = embedder_from_settings(&settings.embedding)
            .map_err(|e| InitializationError::Embedder(e.into()))?;

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiCompatProvider::new(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        Self::from_parts(paths, config, settings, embedder, knowledge, llm).await
    }

    /// Builds the state around caller-supplied collaborators. The history
    /// database is opened at `paths.history_db_path`.
    pub async fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppConfig,
        embedder: Arc<dyn Embedder>,
        knowledge: Arc<dyn KnowledgeStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        let history = HistoryStore::new(paths.history_db_path.clone())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let search = Arc::new(LinearScanSearch::new(
            knowledge.clone(),
            settings.rag.min_similarity,
        ));
        let rag = Arc::new(
            RagService::new(&settings.rag, embedder, knowledge, search, llm.clone())
                .map_err(|e| InitializationError::Rag(e.into()))?,
        );

        let rate_limiter = Arc::new(ClientRateLimiter::per_minute(
            settings.server.rate_limit_per_minute,
        ));
        spawn_pruner(&rate_limiter, RATE_LIMIT_PRUNE_INTERVAL);

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            history,
            llm,
            rag,
            rate_limiter,
        }))
    }
}

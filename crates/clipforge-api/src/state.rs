//! Application state.

use std::sync::Arc;

use clipforge_media::{FfmpegTranscoder, InvokerConfig, Transcoder};
use clipforge_pipeline::{JobStore, JsonJobStore, Orchestrator, PipelineConfig};
use clipforge_storage::{StorageConfig, StorageManager};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<StorageManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub pipeline_config: PipelineConfig,
}

impl AppState {
    /// Create new application state from the environment.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = Arc::new(StorageManager::new(StorageConfig::from_env())?);
        let transcoder =
            Arc::new(FfmpegTranscoder::new(InvokerConfig::from_env())) as Arc<dyn Transcoder>;
        let store = Arc::new(JsonJobStore::new(&config.job_store_dir)?) as Arc<dyn JobStore>;
        let pipeline_config = PipelineConfig::from_env();

        let orchestrator = Arc::new(Orchestrator::new(
            pipeline_config.clone(),
            Arc::clone(&storage),
            transcoder,
            store,
        ));

        Ok(Self {
            config,
            storage,
            orchestrator,
            pipeline_config,
        })
    }
}

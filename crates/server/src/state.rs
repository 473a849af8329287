use crate::config::AppConfig;
use crate::federation::Aggregator;
use crate::metrics::StreamMetrics;
use anyhow::Context;
use reader::JsonLinesFramer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared application state (thread-safe)
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub aggregator: Arc<Aggregator>,
    pub metrics: StreamMetrics,
    /// Framer for `/logs` records, carrying the configured metadata
    pub framer: JsonLinesFramer,
    pub base_path: PathBuf,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let metrics = StreamMetrics::new();

        // One pooled client shared by every peer fetch
        let client = reqwest::Client::builder()
            .user_agent(concat!("logtail/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build peer HTTP client")?;

        let aggregator = Arc::new(Aggregator::new(client, &config.federation, metrics.clone()));
        let framer = JsonLinesFramer::new(config.record_metadata());
        let base_path = PathBuf::from(&config.logs.base_path);

        info!(
            base_path = %base_path.display(),
            peers = aggregator.peers().len(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            aggregator,
            metrics,
            framer,
            base_path,
        })
    }
}

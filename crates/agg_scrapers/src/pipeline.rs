use agg_core::{ArticleCache, ArticleStorage, Config, Result};
use std::sync::Arc;
use tracing::info;
use crate::gate::PersistenceGate;
use crate::health::HealthChecker;
use crate::http::HttpFetcher;
use crate::orchestrator::ScrapeOrchestrator;
use crate::report::RunReporter;
use crate::scheduler::Scheduler;
use crate::scrapers::{build_sources, ConfiguredSource};
use crate::shutdown::Shutdown;

/// Everything the ingestion side needs, wired from one `Config`.
pub struct Pipeline {
    pub config: Config,
    pub storage: Arc<dyn ArticleStorage>,
    pub cache: Option<Arc<dyn ArticleCache>>,
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub reporter: Arc<RunReporter>,
    pub scheduler: Arc<Scheduler>,
    pub health: Arc<HealthChecker>,
    pub shutdown: Shutdown,
}

impl Pipeline {
    pub fn new(
        config: Config,
        storage: Arc<dyn ArticleStorage>,
        cache: Option<Arc<dyn ArticleCache>>,
    ) -> Result<Self> {
        config.validate()?;
        let http = HttpFetcher::new(config.pipeline.request_timeout)?;
        let sources = build_sources(&config.sources, &http);
        Self::with_sources(config, sources, storage, cache)
    }

    /// Like `new`, with adapters supplied by the caller.
    pub fn with_sources(
        config: Config,
        sources: Vec<ConfiguredSource>,
        storage: Arc<dyn ArticleStorage>,
        cache: Option<Arc<dyn ArticleCache>>,
    ) -> Result<Self> {
        let gate = Arc::new(PersistenceGate::from_config(storage.clone(), &config.pipeline));
        let orchestrator = Arc::new(ScrapeOrchestrator::new(sources, gate, &config.pipeline)?);
        let reporter = Arc::new(RunReporter::new(config.pipeline.run_history));
        let shutdown = Shutdown::new();
        let scheduler = Arc::new(Scheduler::new(
            orchestrator.clone(),
            reporter.clone(),
            cache.clone(),
            shutdown.clone(),
        ));
        let health = Arc::new(HealthChecker::new(storage.clone(), cache.clone(), &config.health));

        info!(
            sources = orchestrator.sources().len(),
            nodes = orchestrator.assigner().node_count(),
            "🧩 Pipeline ready"
        );

        Ok(Self {
            config,
            storage,
            cache,
            orchestrator,
            reporter,
            scheduler,
            health,
            shutdown,
        })
    }

    /// `(source id, node label)` for every configured source, in order.
    pub fn source_nodes(&self) -> Vec<(String, String)> {
        let assigner = self.orchestrator.assigner();
        self.orchestrator
            .sources()
            .iter()
            .map(|source| (source.id().to_string(), assigner.assign(source.id())))
            .collect()
    }

    pub fn start(&self) {
        self.scheduler.start(self.config.pipeline.interval);
    }

    /// Cancel the in-flight run and stop the periodic driver.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agg_core::{SourceConfig, SourceKind};
    use agg_storage::MemoryStorage;
    use crate::scheduler::TriggerOutcome;

    fn mock_config() -> Config {
        let mut demo = SourceConfig::new("demo", SourceKind::Mock);
        demo.max_items = 10;
        Config {
            sources: vec![demo, SourceConfig::new("inshorts", SourceKind::Mock)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_manual_trigger_with_mock_sources() {
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = Pipeline::new(mock_config(), storage.clone(), None).unwrap();

        assert_eq!(
            pipeline.source_nodes(),
            vec![
                ("demo".to_string(), "node_0".to_string()),
                ("inshorts".to_string(), "node_1".to_string()),
            ]
        );

        let TriggerOutcome::Completed(record) = pipeline.scheduler.trigger().await else {
            panic!("expected a completed run");
        };
        assert_eq!(record.items_inserted(), 30);
        assert_eq!(storage.len().await, 30);
        assert!(pipeline.health.check().await.status.is_healthy());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = mock_config();
        config.pipeline.node_count = 0;
        assert!(Pipeline::new(config, Arc::new(MemoryStorage::new()), None).is_err());
    }
}

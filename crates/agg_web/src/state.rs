use agg_core::{ArticleCache, ArticleStorage, SourceKind};
use agg_scrapers::{HealthChecker, Pipeline, RunReporter, Scheduler};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub kind: SourceKind,
    pub node: String,
    pub name: &'static str,
    pub emoji: &'static str,
    pub region: &'static str,
    pub listing_url: Option<String>,
}

pub struct AppState {
    pub storage: Arc<dyn ArticleStorage>,
    pub cache: Option<Arc<dyn ArticleCache>>,
    pub scheduler: Arc<Scheduler>,
    pub reporter: Arc<RunReporter>,
    pub health: Arc<HealthChecker>,
    pub sources: Vec<SourceInfo>,
}

impl AppState {
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let assigner = pipeline.orchestrator.assigner();
        let sources = pipeline
            .orchestrator
            .sources()
            .iter()
            .map(|source| {
                let meta = source.scraper.source_metadata();
                SourceInfo {
                    id: source.id().to_string(),
                    kind: source.config.kind,
                    node: assigner.assign(source.id()),
                    name: meta.name,
                    emoji: meta.emoji,
                    region: meta.region.name,
                    listing_url: source.config.listing_url().map(str::to_string),
                }
            })
            .collect();

        Self {
            storage: pipeline.storage.clone(),
            cache: pipeline.cache.clone(),
            scheduler: pipeline.scheduler.clone(),
            reporter: pipeline.reporter.clone(),
            health: pipeline.health.clone(),
            sources,
        }
    }
}

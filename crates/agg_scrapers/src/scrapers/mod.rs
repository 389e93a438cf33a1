use async_trait::async_trait;
use agg_core::{CandidateArticle, Result, SourceConfig, SourceKind};
use std::fmt;
use std::sync::Arc;
use crate::http::HttpFetcher;

pub mod india;
pub mod listing;
pub mod mock;

use india::{HindustanTimesScraper, InshortsScraper};
use mock::MockScraper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub emoji: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub name: &'static str,
    pub emoji: &'static str,
    pub region: Region,
}

/// What one adapter call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutput {
    pub candidates: Vec<CandidateArticle>,
    /// Listing entries dropped because a required field was missing
    pub malformed: usize,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the display metadata of the news source
    fn source_metadata(&self) -> SourceMetadata;

    /// Fetches and parses the source's listing page. An unreachable page is
    /// `Error::Fetch`, an unrecognisable one `Error::Parse`; individual bad
    /// entries are only counted.
    async fn fetch(&self, config: &SourceConfig) -> Result<FetchOutput>;
}

pub type ScraperFactory = fn(HttpFetcher) -> Arc<dyn Scraper>;

fn inshorts_scraper(http: HttpFetcher) -> Arc<dyn Scraper> {
    Arc::new(InshortsScraper::new(http))
}

fn hindustan_times_scraper(http: HttpFetcher) -> Arc<dyn Scraper> {
    Arc::new(HindustanTimesScraper::new(http))
}

fn mock_scraper(_http: HttpFetcher) -> Arc<dyn Scraper> {
    Arc::new(MockScraper::new())
}

pub fn factory_for(kind: SourceKind) -> ScraperFactory {
    match kind {
        SourceKind::Inshorts => inshorts_scraper,
        SourceKind::HindustanTimes => hindustan_times_scraper,
        SourceKind::Mock => mock_scraper,
    }
}

pub fn get_scraper_factories() -> Vec<(SourceKind, ScraperFactory)> {
    [SourceKind::Inshorts, SourceKind::HindustanTimes, SourceKind::Mock]
        .into_iter()
        .map(|kind| (kind, factory_for(kind)))
        .collect()
}

/// A configured source bound to the adapter chosen for its kind.
#[derive(Clone)]
pub struct ConfiguredSource {
    pub config: SourceConfig,
    pub scraper: Arc<dyn Scraper>,
}

impl ConfiguredSource {
    pub fn new(config: SourceConfig, scraper: Arc<dyn Scraper>) -> Self {
        Self { config, scraper }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }
}

impl fmt::Debug for ConfiguredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredSource")
            .field("config", &self.config)
            .field("scraper", &self.scraper.source_metadata().name)
            .finish()
    }
}

pub fn build_sources(configs: &[SourceConfig], http: &HttpFetcher) -> Vec<ConfiguredSource> {
    configs
        .iter()
        .map(|config| ConfiguredSource::new(config.clone(), factory_for(config.kind)(http.clone())))
        .collect()
}

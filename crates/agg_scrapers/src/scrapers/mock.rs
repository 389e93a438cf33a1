use async_trait::async_trait;
use agg_core::{CandidateArticle, Result, SourceConfig};
use chrono::{Duration, Utc};
use url::Url;
use crate::scrapers::{FetchOutput, Region, Scraper, SourceMetadata};

const REGION: Region = Region {
    name: "synthetic",
    emoji: "🧪",
};

/// Deterministic listing for demos and offline runs. The same config always
/// yields the same urls, so repeated runs exercise the dedup path.
#[derive(Debug, Clone, Default)]
pub struct MockScraper;

impl MockScraper {
    pub fn new() -> Self {
        Self
    }

    fn base_url(config: &SourceConfig) -> Result<Url> {
        let raw = config
            .listing_url()
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://{}.example.com/", config.id));
        Ok(Url::parse(&raw)?)
    }
}

#[async_trait]
impl Scraper for MockScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "Mock",
            emoji: "🧪",
            region: REGION,
        }
    }

    async fn fetch(&self, config: &SourceConfig) -> Result<FetchOutput> {
        let base = Self::base_url(config)?;
        let now = Utc::now();
        let candidates = (1..=config.max_items)
            .map(|i| -> Result<CandidateArticle> {
                let url = base.join(&format!("news/article-{}", i))?;
                Ok(CandidateArticle::new(
                    format!("{} Breaking News {}: Important Development", config.id, i),
                    url.to_string(),
                    config.id.clone(),
                )
                .with_summary(format!(
                    "This is a mock summary for {} article {}.",
                    config.id, i
                ))
                .with_published_at(now - Duration::hours(i as i64)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FetchOutput {
            candidates,
            malformed: 0,
        })
    }
}

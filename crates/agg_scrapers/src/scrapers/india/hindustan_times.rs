use async_trait::async_trait;
use agg_core::{Error, Result, SourceConfig};
use url::Url;
use crate::http::HttpFetcher;
use crate::scrapers::listing::{parse_listing, ListingRules, SummaryRule};
use crate::scrapers::{FetchOutput, Scraper, SourceMetadata};
use super::REGION;

const RULES: ListingRules = ListingRules {
    container: "div.cartHolder",
    title: "h3.hdg3",
    // Cards without a standfirst reuse the headline
    summary: SummaryRule::FallbackToTitle("p.anch"),
    link: "a",
    published: Some("div.dateTime"),
};

#[derive(Debug, Clone)]
pub struct HindustanTimesScraper {
    http: HttpFetcher,
}

impl HindustanTimesScraper {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    pub fn parse(html: &str, base: &Url, config: &SourceConfig) -> Result<FetchOutput> {
        parse_listing(html, base, &config.id, &RULES, config.max_items)
    }
}

#[async_trait]
impl Scraper for HindustanTimesScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "Hindustan Times",
            emoji: "🗞️",
            region: REGION,
        }
    }

    async fn fetch(&self, config: &SourceConfig) -> Result<FetchOutput> {
        let listing = config
            .listing_url()
            .ok_or_else(|| Error::Config(format!("{} has no listing url", config.id)))?;
        let base = Url::parse(listing)?;
        let html = self.http.get_text(listing).await?;
        Self::parse(&html, &base, config)
    }
}

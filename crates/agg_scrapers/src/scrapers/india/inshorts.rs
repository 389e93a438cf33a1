use async_trait::async_trait;
use agg_core::{Error, Result, SourceConfig};
use url::Url;
use crate::http::HttpFetcher;
use crate::scrapers::listing::{parse_listing, ListingRules, SummaryRule};
use crate::scrapers::{FetchOutput, Scraper, SourceMetadata};
use super::REGION;

const RULES: ListingRules = ListingRules {
    container: "div.news-card",
    title: "span[itemprop='headline']",
    summary: SummaryRule::Required("div[itemprop='articleBody']"),
    link: "a.clickable",
    published: Some("span[itemprop='datePublished']"),
};

#[derive(Debug, Clone)]
pub struct InshortsScraper {
    http: HttpFetcher,
}

impl InshortsScraper {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    pub fn parse(html: &str, base: &Url, config: &SourceConfig) -> Result<FetchOutput> {
        parse_listing(html, base, &config.id, &RULES, config.max_items)
    }
}

#[async_trait]
impl Scraper for InshortsScraper {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "Inshorts",
            emoji: "📰",
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

#[cfg(test)]
mod tests {
    use super::*;
    use agg_core::SourceKind;

    const PAGE: &str = r#"
        <html><body>
        <div class="news-card">
            <a class="clickable" href="/en/news/rbi-keeps-repo-rate-unchanged-1">
                <span itemprop="headline">RBI keeps repo rate unchanged</span>
            </a>
            <span itemprop="datePublished" content="2024-04-05T04:30:00.000Z"></span>
            <div itemprop="articleBody">The central bank held the policy rate at 6.5%.</div>
        </div>
        <div class="news-card">
            <a class="clickable" href="/en/news/monsoon-forecast-2">
                <span itemprop="headline">IMD forecasts above-normal monsoon</span>
            </a>
            <div itemprop="articleBody">Rainfall is expected at 106% of the long period average.</div>
        </div>
        <div class="news-card">
            <a class="clickable" href="/en/news/no-body-3">
                <span itemprop="headline">Card without a body</span>
            </a>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_cards() {
        let config = SourceConfig::new("inshorts", SourceKind::Inshorts);
        let base = Url::parse(config.listing_url().unwrap()).unwrap();
        let output = InshortsScraper::parse(PAGE, &base, &config).unwrap();

        assert_eq!(output.candidates.len(), 2);
        assert_eq!(output.malformed, 1);

        let first = &output.candidates[0];
        assert_eq!(first.title, "RBI keeps repo rate unchanged");
        assert_eq!(first.url, "https://inshorts.com/en/news/rbi-keeps-repo-rate-unchanged-1");
        assert_eq!(first.source, "inshorts");
        assert!(first.published_at.is_some());
        assert!(output.candidates[1].published_at.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_fetch_error() {
        let http = HttpFetcher::new(std::time::Duration::from_millis(500)).unwrap();
        let scraper = InshortsScraper::new(http);
        let mut config = SourceConfig::new("inshorts", SourceKind::Inshorts);
        config.listing_url = Some("http://127.0.0.1:9/en/read".to_string());
        let err = scraper.fetch(&config).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::types::{Article, ArticleFilter, ArticlePage, CandidateArticle, InsertOutcome, Page, StoreStats};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert the candidate unless an article with the same `(url, source)`
    /// already exists. Must be atomic with respect to concurrent callers.
    async fn insert_if_absent(&self, candidate: &CandidateArticle) -> Result<InsertOutcome>;

    /// Get a single article by id
    async fn get(&self, id: i64) -> Result<Option<Article>>;

    /// Filtered, paginated listing, newest first
    async fn query(&self, filter: &ArticleFilter, page: Page) -> Result<ArticlePage>;

    /// Most recently inserted articles
    async fn latest(&self, limit: usize) -> Result<Vec<Article>>;

    /// Number of articles inserted at or after `since`
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64>;

    /// Totals per source
    async fn stats(&self) -> Result<StoreStats>;

    /// Cheap reachability probe used by health checks
    async fn ping(&self) -> Result<()>;
}

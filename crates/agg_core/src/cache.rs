use async_trait::async_trait;
use serde_json::Value;
use crate::Result;

/// Read-path cache in front of the article store. Never written by the
/// ingestion pipeline other than through `invalidate`.
#[async_trait]
pub trait ArticleCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Drop every cached entry
    async fn invalidate(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

//! Insert-or-skip decision for candidate articles.
//!
//! The gate is the only writer of articles. Uniqueness of `(url, source)` is
//! enforced by the store's atomic `insert_if_absent`; the gate never checks
//! first and inserts second.

use agg_core::config::PipelineConfig;
use agg_core::{ArticleStorage, CandidateArticle, Error, InsertOutcome, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Inserted(i64),
    /// The row exists, but the attempt that wrote it timed out before the
    /// store acknowledged it. Counted as an insert.
    Unconfirmed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub max_title_len: usize,
    pub max_url_len: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_title_len: 500,
            max_url_len: 2048,
        }
    }
}

pub struct PersistenceGate {
    storage: Arc<dyn ArticleStorage>,
    limits: GateLimits,
    attempts: u32,
    backoff: Duration,
    store_timeout: Duration,
}

impl PersistenceGate {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self::from_config(storage, &PipelineConfig::default())
    }

    pub fn from_config(storage: Arc<dyn ArticleStorage>, config: &PipelineConfig) -> Self {
        Self {
            storage,
            limits: GateLimits {
                max_title_len: config.max_title_len,
                max_url_len: config.max_url_len,
            },
            attempts: config.persist_attempts.max(1),
            backoff: config.persist_backoff,
            store_timeout: config.store_timeout,
        }
    }

    pub fn storage(&self) -> &Arc<dyn ArticleStorage> {
        &self.storage
    }

    pub fn validate(&self, candidate: &CandidateArticle) -> Option<String> {
        if candidate.url.trim().is_empty() {
            return Some("empty url".to_string());
        }
        if candidate.source.trim().is_empty() {
            return Some("empty source".to_string());
        }
        if candidate.title.trim().is_empty() {
            return Some("empty title".to_string());
        }
        let title_len = candidate.title.chars().count();
        if title_len > self.limits.max_title_len {
            return Some(format!(
                "title is {} chars, limit {}",
                title_len, self.limits.max_title_len
            ));
        }
        let url_len = candidate.url.chars().count();
        if url_len > self.limits.max_url_len {
            return Some(format!("url is {} chars, limit {}", url_len, self.limits.max_url_len));
        }
        None
    }

    async fn insert_once(&self, candidate: &CandidateArticle) -> Result<InsertOutcome> {
        tokio::time::timeout(self.store_timeout, self.storage.insert_if_absent(candidate))
            .await
            .map_err(|_| Error::Timeout(format!("insert timed out after {:?}", self.store_timeout)))?
    }

    /// Offer a candidate. Duplicates and invalid candidates are skips, not
    /// errors. Persistence failures are retried before being returned.
    pub async fn offer(&self, candidate: &CandidateArticle) -> Result<Offer> {
        if let Some(reason) = self.validate(candidate) {
            debug!(url = %candidate.url, source = %candidate.source, %reason, "skipping invalid candidate");
            return Ok(Offer::Skipped(SkipReason::Invalid(reason)));
        }

        let mut attempt = 1;
        let mut timed_out = false;
        loop {
            match self.insert_once(candidate).await {
                Ok(InsertOutcome::Inserted(id)) => return Ok(Offer::Inserted(id)),
                // A timed-out attempt may still have committed.
                Ok(InsertOutcome::Conflict) if timed_out => {
                    warn!(url = %candidate.url, "row present after a timed-out insert");
                    return Ok(Offer::Unconfirmed);
                }
                Ok(InsertOutcome::Conflict) => return Ok(Offer::Skipped(SkipReason::Duplicate)),
                Err(e) if attempt < self.attempts && e.is_retryable() => {
                    timed_out |= matches!(e, Error::Timeout(_));
                    warn!(url = %candidate.url, attempt, error = %e, "insert failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agg_core::{Article, ArticleFilter, ArticlePage, Page, StoreStats};
    use agg_storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn candidate(url: &str) -> CandidateArticle {
        CandidateArticle::new("Headline", url, "inshorts")
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            persist_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Fails the first `failures` inserts, then delegates to memory.
    struct FlakyStorage {
        inner: MemoryStorage,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ArticleStorage for FlakyStorage {
        async fn insert_if_absent(&self, candidate: &CandidateArticle) -> Result<InsertOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::Persistence("database is locked".into()));
            }
            self.inner.insert_if_absent(candidate).await
        }
        async fn get(&self, id: i64) -> Result<Option<Article>> {
            self.inner.get(id).await
        }
        async fn query(&self, filter: &ArticleFilter, page: Page) -> Result<ArticlePage> {
            self.inner.query(filter, page).await
        }
        async fn latest(&self, limit: usize) -> Result<Vec<Article>> {
            self.inner.latest(limit).await
        }
        async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
            self.inner.count_since(since).await
        }
        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Commits the first insert, then stalls past the store timeout before
    /// acknowledging it.
    struct SlowAckStorage {
        inner: MemoryStorage,
        stall: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ArticleStorage for SlowAckStorage {
        async fn insert_if_absent(&self, candidate: &CandidateArticle) -> Result<InsertOutcome> {
            let outcome = self.inner.insert_if_absent(candidate).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.stall).await;
            }
            outcome
        }
        async fn get(&self, id: i64) -> Result<Option<Article>> {
            self.inner.get(id).await
        }
        async fn query(&self, filter: &ArticleFilter, page: Page) -> Result<ArticlePage> {
            self.inner.query(filter, page).await
        }
        async fn latest(&self, limit: usize) -> Result<Vec<Article>> {
            self.inner.latest(limit).await
        }
        async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
            self.inner.count_since(since).await
        }
        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let gate = PersistenceGate::new(Arc::new(MemoryStorage::new()));
        assert_eq!(gate.offer(&candidate("https://a/1")).await.unwrap(), Offer::Inserted(1));
        assert_eq!(
            gate.offer(&candidate("https://a/1")).await.unwrap(),
            Offer::Skipped(SkipReason::Duplicate)
        );
    }

    #[tokio::test]
    async fn test_empty_url_is_never_persisted() {
        let storage = Arc::new(MemoryStorage::new());
        let gate = PersistenceGate::new(storage.clone());
        let offer = gate.offer(&candidate("   ")).await.unwrap();
        assert!(matches!(offer, Offer::Skipped(SkipReason::Invalid(_))));
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test]
    async fn test_length_bounds() {
        let config = PipelineConfig {
            max_title_len: 10,
            max_url_len: 20,
            ..fast_config()
        };
        let gate = PersistenceGate::from_config(Arc::new(MemoryStorage::new()), &config);

        let long_title = CandidateArticle::new("x".repeat(11), "https://a/1", "inshorts");
        assert!(matches!(gate.offer(&long_title).await.unwrap(), Offer::Skipped(SkipReason::Invalid(_))));

        let long_url = CandidateArticle::new("ok", format!("https://a/{}", "p".repeat(30)), "inshorts");
        assert!(matches!(gate.offer(&long_url).await.unwrap(), Offer::Skipped(SkipReason::Invalid(_))));

        let fits = CandidateArticle::new("x".repeat(10), "https://a/1", "inshorts");
        assert!(matches!(gate.offer(&fits).await.unwrap(), Offer::Inserted(_)));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let gate = PersistenceGate::from_config(storage.clone(), &fast_config());
        assert!(matches!(gate.offer(&candidate("https://a/1")).await.unwrap(), Offer::Inserted(_)));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_persistent_failure_surfaces() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let gate = PersistenceGate::from_config(storage.clone(), &fast_config());
        let err = gate.offer(&candidate("https://a/1")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_commit_behind_timeout_is_not_a_duplicate() {
        let storage = Arc::new(SlowAckStorage {
            inner: MemoryStorage::new(),
            stall: Duration::from_millis(200),
            calls: AtomicU32::new(0),
        });
        let config = PipelineConfig {
            store_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let gate = PersistenceGate::from_config(storage.clone(), &config);

        assert_eq!(gate.offer(&candidate("https://a/1")).await.unwrap(), Offer::Unconfirmed);
        assert_eq!(storage.calls.load(Ordering::SeqCst), 2);
        assert_eq!(storage.inner.len().await, 1);

        assert_eq!(
            gate.offer(&candidate("https://a/1")).await.unwrap(),
            Offer::Skipped(SkipReason::Duplicate)
        );
    }
}

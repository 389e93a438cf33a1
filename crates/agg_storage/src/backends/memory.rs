use async_trait::async_trait;
use agg_core::{
    Article, ArticleFilter, ArticlePage, ArticleStorage, CandidateArticle, InsertOutcome, Page,
    Result, SourceStats, StoreStats,
};
use agg_core::config::StorageConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<Article>,
    index: HashMap<(String, String), usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and insert happen under the caller's write lock.
    fn insert_if_absent(&mut self, candidate: &CandidateArticle) -> InsertOutcome {
        let key = (candidate.url.clone(), candidate.source.clone());
        if self.index.contains_key(&key) {
            return InsertOutcome::Conflict;
        }
        let id = self.articles.len() as i64 + 1;
        self.articles
            .push(Article::from_candidate(id, candidate, Utc::now()));
        self.index.insert(key, self.articles.len() - 1);
        InsertOutcome::Inserted(id)
    }

    fn newest_first<'a>(&'a self, filter: &'a ArticleFilter) -> impl Iterator<Item = &'a Article> + 'a {
        self.articles.iter().rev().filter(move |a| filter.matches(a))
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name() -> &'static str {
        "memory"
    }

    async fn open(_config: &StorageConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    async fn insert_if_absent(&self, candidate: &CandidateArticle) -> Result<InsertOutcome> {
        let mut store = self.store.write().await;
        Ok(store.insert_if_absent(candidate))
    }

    async fn get(&self, id: i64) -> Result<Option<Article>> {
        let store = self.store.read().await;
        Ok(store.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn query(&self, filter: &ArticleFilter, page: Page) -> Result<ArticlePage> {
        let store = self.store.read().await;
        let total = store.newest_first(filter).count() as u64;
        let items = store
            .newest_first(filter)
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok(ArticlePage {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn latest(&self, limit: usize) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store.articles.iter().rev().take(limit).cloned().collect())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let store = self.store.read().await;
        Ok(store.articles.iter().filter(|a| a.created_at >= since).count() as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let store = self.store.read().await;
        let mut per_source: BTreeMap<&str, SourceStats> = BTreeMap::new();
        for article in &store.articles {
            let entry = per_source
                .entry(article.source.as_str())
                .or_insert_with(|| SourceStats {
                    source: article.source.clone(),
                    count: 0,
                    latest: None,
                });
            entry.count += 1;
            entry.latest = entry.latest.max(Some(article.created_at));
        }
        Ok(StoreStats {
            total: store.articles.len() as u64,
            per_source: per_source.into_values().collect(),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

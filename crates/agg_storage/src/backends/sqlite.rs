use async_trait::async_trait;
use agg_core::{
    Article, ArticleFilter, ArticlePage, ArticleStorage, CandidateArticle, Error, InsertOutcome,
    Page, Result, SourceStats, StoreStats,
};
use agg_core::config::StorageConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        summary TEXT,
        url TEXT NOT NULL,
        source TEXT NOT NULL,
        published_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (url, source)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles (source)",
];

const COLUMNS: &str = "id, title, summary, url, source, published_at, created_at, updated_at";

fn persistence(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Persistence(format!("{}: {}", context, e))
}

/// Fixed-width RFC 3339 so that text comparison orders like time.
fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("Failed to parse stored date '{}': {}", raw, e)))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let published_at: Option<String> = row
        .try_get("published_at")
        .map_err(persistence("Failed to read published_at"))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(persistence("Failed to read created_at"))?;
    let updated_at: String = row
        .try_get("updated_at")
        .map_err(persistence("Failed to read updated_at"))?;

    Ok(Article {
        id: row.try_get("id").map_err(persistence("Failed to read id"))?,
        title: row.try_get("title").map_err(persistence("Failed to read title"))?,
        summary: row.try_get("summary").map_err(persistence("Failed to read summary"))?,
        url: row.try_get("url").map_err(persistence("Failed to read url"))?,
        source: row.try_get("source").map_err(persistence("Failed to read source"))?,
        published_at: published_at.as_deref().map(from_db_time).transpose()?,
        created_at: from_db_time(&created_at)?,
        updated_at: from_db_time(&updated_at)?,
    })
}

/// Escape LIKE wildcards so `q` matches literally, as the memory backend does.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ArticleFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(source) = &filter.source {
        builder.push(" AND source = ").push_bind(source.clone());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ").push_bind(to_db_time(since));
    }
    if let Some(query) = &filter.query {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        builder
            .push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(COALESCE(summary, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn name() -> &'static str {
        "sqlite"
    }

    async fn open(config: &StorageConfig) -> Result<Self> {
        Self::new_with_path(&config.path).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(persistence("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Persistence(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn insert_if_absent(&self, candidate: &CandidateArticle) -> Result<InsertOutcome> {
        let now = to_db_time(Utc::now());
        // The unique (url, source) constraint decides; a conflict inserts nothing.
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (title, summary, url, source, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (url, source) DO NOTHING
            "#,
        )
        .bind(&candidate.title)
        .bind(candidate.summary.as_deref())
        .bind(&candidate.url)
        .bind(&candidate.source)
        .bind(candidate.published_at.map(to_db_time))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(persistence("Failed to store article"))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Conflict)
        } else {
            Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
        }
    }

    async fn get(&self, id: i64) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {} FROM articles WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence("Failed to get article"))?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn query(&self, filter: &ArticleFilter, page: Page) -> Result<ArticlePage> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM articles");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(persistence("Failed to count articles"))?
            .try_get("total")
            .map_err(persistence("Failed to read count"))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM articles", COLUMNS));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(persistence("Failed to query articles"))?;

        Ok(ArticlePage {
            items: rows.iter().map(row_to_article).collect::<Result<Vec<_>>>()?,
            total: total as u64,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn latest(&self, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles ORDER BY created_at DESC, id DESC LIMIT ?",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence("Failed to get latest articles"))?;
        rows.iter().map(row_to_article).collect()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE created_at >= ?")
            .bind(to_db_time(since))
            .fetch_one(&self.pool)
            .await
            .map_err(persistence("Failed to count recent articles"))?;
        Ok(count as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query(
            r#"
            SELECT source, COUNT(*) AS count, MAX(created_at) AS latest
            FROM articles
            GROUP BY source
            ORDER BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(persistence("Failed to compute stats"))?;

        let mut per_source = Vec::with_capacity(rows.len());
        for row in &rows {
            let latest: Option<String> = row.try_get("latest").map_err(persistence("Failed to read latest"))?;
            let count: i64 = row.try_get("count").map_err(persistence("Failed to read count"))?;
            per_source.push(SourceStats {
                source: row.try_get("source").map_err(persistence("Failed to read source"))?,
                count: count as u64,
                latest: latest.as_deref().map(from_db_time).transpose()?,
            });
        }

        Ok(StoreStats {
            total: per_source.iter().map(|s| s.count).sum(),
            per_source,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(persistence("Database unreachable"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn candidate(url: &str, source: &str) -> CandidateArticle {
        CandidateArticle::new("Test Article", url, source).with_summary("Test summary")
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();

        let outcome = storage
            .insert_if_absent(&candidate("http://example.com/1", "test"))
            .await
            .unwrap();
        let id = match outcome {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Conflict => panic!("first insert conflicted"),
        };

        let article = storage.get(id).await.unwrap().unwrap();
        assert_eq!(article.url, "http://example.com/1");
        assert_eq!(article.summary.as_deref(), Some("Test summary"));
        assert!(article.published_at.is_none());

        let again = storage
            .insert_if_absent(&candidate("http://example.com/1", "test"))
            .await
            .unwrap();
        assert_eq!(again, InsertOutcome::Conflict);
        assert!(storage.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_uniqueness_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("articles.db");
        {
            let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();
            storage.insert_if_absent(&candidate("http://example.com/a", "inshorts")).await.unwrap();
        }
        let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();
        let outcome = storage
            .insert_if_absent(&candidate("http://example.com/a", "inshorts"))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_row() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(
            SQLiteStorage::new_with_path(&temp_dir.path().join("race.db"))
                .await
                .unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                tokio::spawn(async move {
                    storage
                        .insert_if_absent(&candidate("http://example.com/race", "inshorts"))
                        .await
                })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if let Ok(InsertOutcome::Inserted(_)) = handle.await.unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        let page = storage.query(&ArticleFilter::default(), Page::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_query_filters_and_stats() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("q.db")).await.unwrap();
        storage
            .insert_if_absent(&CandidateArticle::new("Monsoon arrives early", "http://a/1", "inshorts"))
            .await
            .unwrap();
        storage
            .insert_if_absent(
                &CandidateArticle::new("Markets rally", "http://b/1", "hindustantimes")
                    .with_summary("Sensex closes at a record after monsoon forecast"),
            )
            .await
            .unwrap();
        storage
            .insert_if_absent(&CandidateArticle::new("Election dates", "http://b/2", "hindustantimes"))
            .await
            .unwrap();

        let by_source = storage
            .query(
                &ArticleFilter {
                    source: Some("hindustantimes".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_source.total, 2);

        let search = storage
            .query(
                &ArticleFilter {
                    query: Some("MONSOON".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(search.total, 2);

        let paged = storage
            .query(&ArticleFilter::default(), Page::new(2, 2))
            .await
            .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.items.len(), 1);

        let latest = storage.latest(1).await.unwrap();
        assert_eq!(latest[0].url, "http://b/2");

        assert_eq!(storage.count_since(Utc::now() - Duration::hours(24)).await.unwrap(), 3);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.per_source[0].source, "hindustantimes");
        assert_eq!(stats.per_source[0].count, 2);
        assert!(stats.per_source[1].latest.is_some());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn test_query_treats_wildcards_literally() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("like.db"))
            .await
            .unwrap();
        storage
            .insert_if_absent(&CandidateArticle::new("Sales up 50% this year", "http://a/1", "test"))
            .await
            .unwrap();
        storage
            .insert_if_absent(&CandidateArticle::new("Plain headline", "http://a/2", "test"))
            .await
            .unwrap();

        let search = |q: &str| ArticleFilter {
            query: Some(q.to_string()),
            ..Default::default()
        };
        assert_eq!(storage.query(&search("%"), Page::default()).await.unwrap().total, 1);
        assert_eq!(storage.query(&search("50%"), Page::default()).await.unwrap().total, 1);
        assert_eq!(storage.query(&search("_"), Page::default()).await.unwrap().total, 0);
        assert_eq!(storage.query(&search("plain"), Page::default()).await.unwrap().total, 1);
    }
}

pub mod cache;
pub mod config;
pub mod error;
pub mod node;
pub mod run;
pub mod storage;
pub mod types;

pub use cache::ArticleCache;
pub use config::{Config, HumanDuration, SourceConfig, SourceKind};
pub use error::{Error, Result};
pub use node::NodeAssigner;
pub use run::{RunRecord, SourceError, SourceOutcome, Trigger};
pub use storage::ArticleStorage;
pub use types::{
    Article, ArticleFilter, ArticlePage, CandidateArticle, InsertOutcome, Page, SourceStats,
    StoreStats,
};

pub mod cli;
pub mod gate;
pub mod health;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod scrapers;
pub mod shutdown;

pub use cli::{handle_command, ScraperArgs, ScraperCommands};
pub use gate::{Offer, PersistenceGate, SkipReason};
pub use health::{ComponentStatus, HealthChecker, HealthReport, HealthStatus};
pub use orchestrator::{RetryPolicy, ScrapeOrchestrator};
pub use pipeline::Pipeline;
pub use report::{RunReporter, RunTotals};
pub use scheduler::{Scheduler, TriggerOutcome};
pub use scrapers::{ConfiguredSource, Scraper};
pub use shutdown::Shutdown;

pub mod prelude {
    pub use super::scrapers::Scraper;
    pub use super::{Pipeline, Shutdown, TriggerOutcome};
    pub use agg_core::{Article, Error, Result};
}

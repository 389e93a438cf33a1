//! Liveness and freshness reporting.
//!
//! A store outage never fails the check itself; it turns the status into
//! `Degraded` with a reason attached.

use agg_core::config::HealthConfig;
use agg_core::{ArticleCache, ArticleStorage, HumanDuration};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(Vec<String>),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
        }
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            HealthStatus::Healthy => &[],
            HealthStatus::Degraded(reasons) => reasons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub database: ComponentStatus,
    pub cache: ComponentStatus,
    pub fresh_within_window: bool,
    pub freshness_window: Duration,
    pub status: HealthStatus,
}

#[derive(Serialize)]
struct HealthReportBody<'a> {
    database: ComponentStatus,
    cache: ComponentStatus,
    fresh_within_window: bool,
    /// Present only when the window is the default day.
    #[serde(rename = "freshWithin24h", skip_serializing_if = "Option::is_none")]
    fresh_within_24h: Option<bool>,
    freshness_window: String,
    status: &'static str,
    reasons: &'a [String],
}

impl Serialize for HealthReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        HealthReportBody {
            database: self.database,
            cache: self.cache,
            fresh_within_window: self.fresh_within_window,
            fresh_within_24h: (self.freshness_window == DAY).then_some(self.fresh_within_window),
            freshness_window: HumanDuration(self.freshness_window).to_string(),
            status: self.status.label(),
            reasons: self.status.reasons(),
        }
        .serialize(serializer)
    }
}

pub struct HealthChecker {
    storage: Arc<dyn ArticleStorage>,
    cache: Option<Arc<dyn ArticleCache>>,
    window: Duration,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        storage: Arc<dyn ArticleStorage>,
        cache: Option<Arc<dyn ArticleCache>>,
        config: &HealthConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            window: config.freshness_window,
            timeout: config.check_timeout,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let mut reasons = Vec::new();

        let database = match tokio::time::timeout(self.timeout, self.storage.ping()).await {
            Ok(Ok(())) => ComponentStatus::Up,
            Ok(Err(e)) => {
                warn!(error = %e, "database ping failed");
                reasons.push(format!("database: {}", e));
                ComponentStatus::Down
            }
            Err(_) => {
                warn!("database ping timed out");
                reasons.push("database: ping timed out".to_string());
                ComponentStatus::Down
            }
        };

        let cache = match &self.cache {
            None => ComponentStatus::Disabled,
            Some(cache) => match tokio::time::timeout(self.timeout, cache.ping()).await {
                Ok(Ok(())) => ComponentStatus::Up,
                Ok(Err(e)) => {
                    reasons.push(format!("cache: {}", e));
                    ComponentStatus::Down
                }
                Err(_) => {
                    reasons.push("cache: ping timed out".to_string());
                    ComponentStatus::Down
                }
            },
        };

        let fresh_within_window = if database == ComponentStatus::Up {
            self.is_fresh(&mut reasons).await
        } else {
            false
        };

        let status = if reasons.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(reasons)
        };

        HealthReport {
            database,
            cache,
            fresh_within_window,
            freshness_window: self.window,
            status,
        }
    }

    async fn is_fresh(&self, reasons: &mut Vec<String>) -> bool {
        let window = chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::days(1));
        let since = Utc::now() - window;
        match tokio::time::timeout(self.timeout, self.storage.count_since(since)).await {
            Ok(Ok(count)) if count > 0 => true,
            Ok(Ok(_)) => {
                reasons.push(format!(
                    "stale: no articles in the last {}",
                    HumanDuration(self.window)
                ));
                false
            }
            Ok(Err(e)) => {
                reasons.push(format!("database: {}", e));
                false
            }
            Err(_) => {
                reasons.push("database: freshness query timed out".to_string());
                false
            }
        }
    }
}

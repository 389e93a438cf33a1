//! Periodic and manual triggering of scrape runs.
//!
//! At most one run is in flight at any time. A trigger that arrives while a
//! run is active is coalesced rather than queued.

use agg_core::{ArticleCache, RunRecord, Trigger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use crate::orchestrator::ScrapeOrchestrator;
use crate::report::RunReporter;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed(RunRecord),
    AlreadyRunning,
}

struct SchedulerInner {
    orchestrator: Arc<ScrapeOrchestrator>,
    reporter: Arc<RunReporter>,
    cache: Option<Arc<dyn ArticleCache>>,
    in_flight: AtomicBool,
    shutdown: Shutdown,
}

/// Releases the in-flight flag when the run ends, including on panic or abort.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SchedulerInner {
    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.in_flight))
    }

    async fn run(&self, trigger: Trigger) -> TriggerOutcome {
        let Some(_guard) = self.try_begin() else {
            return TriggerOutcome::AlreadyRunning;
        };

        let record = self.orchestrator.run_once(trigger, &self.shutdown).await;
        self.reporter.record(&record).await;

        if record.items_inserted() > 0 {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.invalidate().await {
                    warn!(error = %e, "failed to invalidate read cache");
                }
            }
        }
        TriggerOutcome::Completed(record)
    }
}

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<ScrapeOrchestrator>,
        reporter: Arc<RunReporter>,
        cache: Option<Arc<dyn ArticleCache>>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                orchestrator,
                reporter,
                cache,
                in_flight: AtomicBool::new(false),
                shutdown,
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the periodic driver. The first tick fires immediately. Calling
    /// `start` on a started scheduler does nothing.
    pub fn start(&self, interval: Duration) {
        let mut task = self.task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("scheduler already started");
            return;
        }

        let inner = self.inner.clone();
        info!(interval = ?interval, "⏰ Scheduler started");
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = inner.shutdown.cancelled() => break,
                }
                if let TriggerOutcome::AlreadyRunning = inner.run(Trigger::Scheduled).await {
                    info!("previous run still in flight, skipping scheduled tick");
                }
            }
            debug!("scheduler loop exited");
        }));
    }

    /// Stop the periodic driver. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.task().take() {
            handle.abort();
            info!("⏹️ Scheduler stopped");
        }
    }

    /// Manual entry point.
    pub async fn trigger(&self) -> TriggerOutcome {
        self.inner.run(Trigger::Manual).await
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.task().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn reporter(&self) -> &Arc<RunReporter> {
        &self.inner.reporter
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::PersistenceGate;
    use crate::scrapers::{ConfiguredSource, FetchOutput, Region, Scraper, SourceMetadata};
    use agg_core::config::PipelineConfig;
    use agg_core::{CandidateArticle, Result, SourceConfig, SourceKind};
    use agg_storage::{MemoryCache, MemoryStorage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Blocks inside `fetch` until released, so a run can be held open.
    struct GatedScraper {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Scraper for GatedScraper {
        fn source_metadata(&self) -> SourceMetadata {
            SourceMetadata {
                name: "Gated",
                emoji: "🚧",
                region: Region {
                    name: "test",
                    emoji: "🧪",
                },
            }
        }

        async fn fetch(&self, config: &SourceConfig) -> Result<FetchOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(FetchOutput {
                candidates: vec![CandidateArticle::new(
                    "Gated story",
                    format!("https://gated/{}", call),
                    config.id.clone(),
                )],
                malformed: 0,
            })
        }
    }

    fn scheduler_with(
        scraper: Arc<dyn Scraper>,
        cache: Option<Arc<dyn ArticleCache>>,
    ) -> Scheduler {
        let config = PipelineConfig::default();
        let storage = Arc::new(MemoryStorage::new());
        let gate = Arc::new(PersistenceGate::from_config(storage, &config));
        let sources = vec![ConfiguredSource::new(
            SourceConfig::new("gated", SourceKind::Mock),
            scraper,
        )];
        let orchestrator = Arc::new(ScrapeOrchestrator::new(sources, gate, &config).unwrap());
        Scheduler::new(orchestrator, Arc::new(RunReporter::new(5)), cache, Shutdown::new())
    }

    fn gated() -> Arc<GatedScraper> {
        Arc::new(GatedScraper {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_coalesced() {
        let scraper = gated();
        let scheduler = Arc::new(scheduler_with(scraper.clone(), None));

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger().await })
        };
        scraper.entered.notified().await;
        assert!(scheduler.is_running());

        assert_eq!(scheduler.trigger().await, TriggerOutcome::AlreadyRunning);

        scraper.release.notify_one();
        let outcome = first.await.unwrap();
        let TriggerOutcome::Completed(record) = outcome else {
            panic!("first trigger should complete");
        };
        assert_eq!(record.trigger, Trigger::Manual);
        assert_eq!(record.items_inserted(), 1);
        assert!(!scheduler.is_running());
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.reporter().totals().await.runs, 1);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_stop_is_idempotent() {
        let scraper = gated();
        let scheduler = scheduler_with(scraper.clone(), None);

        scheduler.start(Duration::from_secs(3600));
        assert!(scheduler.is_started());
        scraper.entered.notified().await;
        scraper.release.notify_one();

        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.reporter().last_run().await.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let last = scheduler.reporter().last_run().await.unwrap();
        assert_eq!(last.trigger, Trigger::Scheduled);

        scheduler.stop();
        scheduler.stop();
        tokio::task::yield_now().await;
        assert!(!scheduler.is_started());
    }

    #[tokio::test]
    async fn test_inserts_invalidate_cache() {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        cache.put("latest:10", json!([])).await.unwrap();

        let scraper = gated();
        let scheduler = scheduler_with(scraper.clone(), Some(cache.clone()));
        let run = {
            let scraper = scraper.clone();
            async move {
                scraper.entered.notified().await;
                scraper.release.notify_one();
            }
        };
        let (outcome, _) = tokio::join!(scheduler.trigger(), run);
        assert!(matches!(outcome, TriggerOutcome::Completed(_)));
        assert_eq!(cache.len().await, 0);
    }
}

use agg_core::config::PipelineConfig;
use agg_core::{Error, NodeAssigner, Result, RunRecord, SourceOutcome, Trigger};
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};
use crate::gate::{Offer, PersistenceGate, SkipReason};
use crate::scrapers::{ConfiguredSource, FetchOutput};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    /// `base * 2^(attempt - 1)` plus up to `jitter` of random slack.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16));
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return exp;
        }
        let slack = rand::thread_rng().gen_range(0..=jitter_ms);
        exp + Duration::from_millis(slack)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Runs every configured source through fetch, retry and the persistence
/// gate. `run_once` never fails: each source's outcome, good or bad, ends up
/// in the returned record.
pub struct ScrapeOrchestrator {
    sources: Vec<ConfiguredSource>,
    gate: Arc<PersistenceGate>,
    assigner: NodeAssigner,
    retry: RetryPolicy,
    pool: Arc<Semaphore>,
    request_timeout: Duration,
    source_deadline: Duration,
}

impl ScrapeOrchestrator {
    pub fn new(
        sources: Vec<ConfiguredSource>,
        gate: Arc<PersistenceGate>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            sources,
            gate,
            assigner: NodeAssigner::new(config.node_count)?,
            retry: RetryPolicy {
                attempts: config.fetch_attempts.max(1),
                base: config.backoff_base,
                jitter: config.backoff_jitter,
            },
            pool: Arc::new(Semaphore::new(config.max_concurrent_sources.max(1))),
            request_timeout: config.request_timeout,
            source_deadline: config.source_deadline,
        })
    }

    pub fn with_assigner(mut self, assigner: NodeAssigner) -> Self {
        self.assigner = assigner;
        self
    }

    pub fn sources(&self) -> &[ConfiguredSource] {
        &self.sources
    }

    pub fn assigner(&self) -> &NodeAssigner {
        &self.assigner
    }

    pub async fn run_once(&self, trigger: Trigger, shutdown: &Shutdown) -> RunRecord {
        let mut record = RunRecord::new(trigger);
        info!(run_id = %record.run_id, ?trigger, sources = self.sources.len(), "🦗 Starting scrape run");

        // join_all keeps configuration order in the output.
        let outcomes = join_all(self.sources.iter().map(|source| {
            let span = tracing::info_span!("source", source = %source.id());
            self.run_source(source, shutdown).instrument(span)
        }))
        .await;

        record.sources = outcomes;
        record.cancelled = shutdown.is_cancelled();
        record.finish();

        let failed = record.failed_sources().len();
        info!(
            run_id = %record.run_id,
            found = record.items_found(),
            inserted = record.items_inserted(),
            skipped = record.items_skipped(),
            failed_sources = failed,
            cancelled = record.cancelled,
            "✅ Scrape run finished"
        );
        record
    }

    async fn run_source(&self, source: &ConfiguredSource, shutdown: &Shutdown) -> SourceOutcome {
        let node = self.assigner.assign(source.id());
        let mut outcome = SourceOutcome::new(source.id(), node.as_str());
        info!(%node, "source assigned");

        let _permit = tokio::select! {
            permit = self.pool.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    outcome.fail(&Error::Cancelled);
                    return outcome;
                }
            },
            _ = shutdown.cancelled() => {
                outcome.fail(&Error::Cancelled);
                return outcome;
            }
        };
        outcome.attempted = true;

        let result = {
            let work = self.process_source(source, &mut outcome, shutdown);
            tokio::select! {
                res = tokio::time::timeout(self.source_deadline, work) => res.unwrap_or_else(|_| {
                    Err(Error::Timeout(format!("source exceeded {:?} deadline", self.source_deadline)))
                }),
                _ = shutdown.cancelled() => Err(Error::Cancelled),
            }
        };

        match result {
            Ok(()) => {
                outcome.succeeded = true;
                info!(
                    found = outcome.items_found,
                    inserted = outcome.items_inserted,
                    skipped = outcome.items_skipped,
                    "source done"
                );
            }
            Err(e) => {
                error!(error = %e, attempts = outcome.attempts, "source failed");
                outcome.fail(&e);
            }
        }
        outcome
    }

    async fn process_source(
        &self,
        source: &ConfiguredSource,
        outcome: &mut SourceOutcome,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let output = self.fetch_with_retry(source, outcome, shutdown).await?;
        outcome.items_found = output.candidates.len();
        outcome.items_malformed = output.malformed;
        if output.malformed > 0 {
            warn!(malformed = output.malformed, "dropped malformed listing entries");
        }

        for candidate in &output.candidates {
            if shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.gate.offer(candidate).await {
                Ok(Offer::Inserted(_)) | Ok(Offer::Unconfirmed) => outcome.items_inserted += 1,
                Ok(Offer::Skipped(SkipReason::Duplicate)) => outcome.record_duplicate(),
                Ok(Offer::Skipped(SkipReason::Invalid(_))) => outcome.record_invalid(),
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "candidate not persisted");
                    outcome.items_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        source: &ConfiguredSource,
        outcome: &mut SourceOutcome,
        shutdown: &Shutdown,
    ) -> Result<FetchOutput> {
        loop {
            if shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            outcome.attempts += 1;
            let attempt = outcome.attempts;

            let result = tokio::time::timeout(self.request_timeout, source.scraper.fetch(&source.config))
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(format!("fetch exceeded {:?}", self.request_timeout))));

            match result {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, error = %e, ?delay, "fetch failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => return Err(Error::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

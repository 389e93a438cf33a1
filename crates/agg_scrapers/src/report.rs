use agg_core::RunRecord;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Lifetime counters across every run seen by a reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub runs: u64,
    pub cancelled_runs: u64,
    pub items_found: u64,
    pub items_inserted: u64,
    pub items_skipped: u64,
    pub failed_sources: u64,
}

#[derive(Default)]
struct ReporterState {
    history: VecDeque<RunRecord>,
    totals: RunTotals,
}

/// Keeps the last `capacity` run records, newest first.
pub struct RunReporter {
    capacity: usize,
    state: RwLock<ReporterState>,
}

impl RunReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(ReporterState::default()),
        }
    }

    pub async fn record(&self, run: &RunRecord) {
        let mut state = self.state.write().await;
        let totals = &mut state.totals;
        totals.runs += 1;
        if run.cancelled {
            totals.cancelled_runs += 1;
        }
        totals.items_found += run.items_found() as u64;
        totals.items_inserted += run.items_inserted() as u64;
        totals.items_skipped += run.items_skipped() as u64;
        totals.failed_sources += run.failed_sources().len() as u64;

        state.history.push_front(run.clone());
        state.history.truncate(self.capacity);
    }

    pub async fn last_run(&self) -> Option<RunRecord> {
        self.state.read().await.history.front().cloned()
    }

    pub async fn recent_runs(&self, limit: usize) -> Vec<RunRecord> {
        self.state
            .read()
            .await
            .history
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn totals(&self) -> RunTotals {
        self.state.read().await.totals
    }
}

impl Default for RunReporter {
    fn default() -> Self {
        Self::new(20)
    }
}

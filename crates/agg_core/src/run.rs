use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// Terminal error recorded for a failed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for SourceError {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: String,
    pub node: String,
    pub attempted: bool,
    pub succeeded: bool,
    /// Adapter attempts made, including the successful one
    pub attempts: u32,
    pub items_found: usize,
    /// Listing entries the adapter dropped as malformed
    pub items_malformed: usize,
    pub items_inserted: usize,
    pub items_skipped: usize,
    pub items_duplicate: usize,
    pub items_invalid: usize,
    /// Candidates whose persistence still failed after retries
    pub items_failed: usize,
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    pub fn new(source: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            node: node.into(),
            attempted: false,
            succeeded: false,
            attempts: 0,
            items_found: 0,
            items_malformed: 0,
            items_inserted: 0,
            items_skipped: 0,
            items_duplicate: 0,
            items_invalid: 0,
            items_failed: 0,
            error: None,
        }
    }

    pub fn record_duplicate(&mut self) {
        self.items_skipped += 1;
        self.items_duplicate += 1;
    }

    pub fn record_invalid(&mut self) {
        self.items_skipped += 1;
        self.items_invalid += 1;
    }

    pub fn fail(&mut self, error: &Error) {
        self.succeeded = false;
        self.error = Some(SourceError::from(error));
    }

    /// A source fails when it ran without succeeding, or when it was stopped
    /// with an error before it could start.
    pub fn failed(&self) -> bool {
        !self.succeeded && (self.attempted || self.error.is_some())
    }
}

/// Summary of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub sources: Vec<SourceOutcome>,
}

impl RunRecord {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            sources: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.sources.iter().find(|o| o.source == source)
    }

    pub fn failed_sources(&self) -> Vec<&SourceOutcome> {
        self.sources.iter().filter(|o| o.failed()).collect()
    }

    pub fn items_found(&self) -> usize {
        self.sources.iter().map(|o| o.items_found).sum()
    }

    pub fn items_inserted(&self) -> usize {
        self.sources.iter().map(|o| o.items_inserted).sum()
    }

    pub fn items_skipped(&self) -> usize {
        self.sources.iter().map(|o| o.items_skipped).sum()
    }
}

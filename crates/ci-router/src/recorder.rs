//! Outcome recorder
//!
//! Per-concept cumulative counters plus structured logs for every write:
//! - `<concept>-SUCCESS` on a primary write returning 200
//! - `<concept>-FAILURE` on any failed primary write (including no writer)
//! - `<concept>-elasticsearch-FAILURE` on a failed secondary-index write
//!
//! Counters live in an injected [`OutcomeCounters`] so that each router, and
//! each test, owns an isolated set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::dispatcher::WriteOutcome;
use crate::router_metrics;

/// Label used when a message carries no concept type
pub const UNKNOWN_CONCEPT: &str = "unknown";

pub fn success_counter_name(concept: &str) -> String {
    format!("{}-SUCCESS", concept_label(concept))
}

pub fn failure_counter_name(concept: &str) -> String {
    format!("{}-FAILURE", concept_label(concept))
}

pub fn secondary_failure_counter_name(concept: &str) -> String {
    format!("{}-elasticsearch-FAILURE", concept_label(concept))
}

fn concept_label(concept: &str) -> &str {
    if concept.is_empty() {
        UNKNOWN_CONCEPT
    } else {
        concept
    }
}

/// Monotonic named counters, safe for concurrent increments.
/// Never reset for the lifetime of the process.
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    counters: DashMap<String, AtomicU64>,
}

impl OutcomeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current count; zero for a counter never incremented
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

/// Which downstream a write went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Writer,
    SecondaryIndex,
}

impl WriteTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteTarget::Writer => "writer",
            WriteTarget::SecondaryIndex => "elasticsearch",
        }
    }
}

#[derive(Clone, Default)]
pub struct OutcomeRecorder {
    counters: Arc<OutcomeCounters>,
}

impl OutcomeRecorder {
    pub fn new(counters: Arc<OutcomeCounters>) -> Self {
        Self { counters }
    }

    pub fn counters(&self) -> &Arc<OutcomeCounters> {
        &self.counters
    }

    pub fn record(&self, concept: &str, id: &str, target: WriteTarget, outcome: &WriteOutcome) {
        let label = concept_label(concept);
        router_metrics::record_write(label, target.as_str(), outcome.is_ok());

        match (outcome, target) {
            (Ok(url), WriteTarget::Writer) => {
                self.counters.increment(&success_counter_name(concept));
                debug!(concept = %label, message_id = %id, url = %url, "Concept written");
            }
            (Ok(url), WriteTarget::SecondaryIndex) => {
                debug!(concept = %label, message_id = %id, url = %url, "Concept indexed");
            }
            (Err(e), _) => {
                let name = match target {
                    WriteTarget::Writer => failure_counter_name(concept),
                    WriteTarget::SecondaryIndex => secondary_failure_counter_name(concept),
                };
                self.counters.increment(&name);
                error!(
                    concept = %label,
                    message_id = %id,
                    target = target.as_str(),
                    url = e.url().unwrap_or(""),
                    status_code = e.status_code(),
                    kind = e.kind(),
                    error = %e,
                    "Concept write failed"
                );
            }
        }
    }
}

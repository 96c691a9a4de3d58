//! Report State: the deduplicating aggregator
//!
//! Owns the growing report body, the set of messages already merged into
//! it, and the most recently accepted message that escalation timers
//! compare against.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Separator placed before every accepted message in the body
pub const SEPARATOR: &str = "\n\n";

/// Shared reference to the report state
pub type SharedReportState = Arc<Mutex<ReportState>>;

/// Outcome of offering a message to the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// New content, appended to the body
    Accepted,
    /// Already in the body; nothing changed
    Duplicate,
}

/// Accumulated report for the life of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportState {
    /// Every message merged into the body so far
    seen: HashSet<String>,
    /// Most recently accepted message
    last_message: Option<String>,
    /// Append-only report body
    body: String,
    /// Messages accepted
    accepted: u64,
    /// Messages rejected as duplicates
    duplicates: u64,
    /// Escalations that reached the consent step
    escalations: u64,
}

impl ReportState {
    /// Create a state whose body starts with `preamble`
    pub fn new(preamble: &str) -> Self {
        Self {
            body: preamble.to_string(),
            ..Default::default()
        }
    }

    /// Create a shared reference to this state
    pub fn shared(self) -> SharedReportState {
        Arc::new(Mutex::new(self))
    }

    /// Merge a stringified message into the report unless already present.
    pub fn accept(&mut self, message: &str) -> Acceptance {
        if self.seen.contains(message) {
            self.duplicates += 1;
            return Acceptance::Duplicate;
        }

        self.body.push_str(SEPARATOR);
        self.body.push_str(message);
        self.seen.insert(message.to_string());
        self.last_message = Some(message.to_string());
        self.accepted += 1;
        Acceptance::Accepted
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Whether a timer's snapshot still names the latest message
    pub fn is_current(&self, snapshot: Option<&str>) -> bool {
        self.last_message.as_deref() == snapshot
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }

    pub fn escalation_count(&self) -> u64 {
        self.escalations
    }

    /// Close the current coalescing window; returns its 1-based number.
    pub fn record_escalation(&mut self) -> u64 {
        self.escalations += 1;
        self.escalations
    }
}

/// Lock the shared state, recovering the data if a holder panicked.
pub fn lock_state(state: &SharedReportState) -> MutexGuard<'_, ReportState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

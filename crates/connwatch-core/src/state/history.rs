// # State Change History
//
// Bounded ring buffer of online/offline transitions, kept for flap
// diagnostics only. Nothing in the engine's decisions reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Flapping threshold: this many transitions...
const FLAP_TRANSITIONS: usize = 4;

/// ...inside this window
const FLAP_WINDOW: Duration = Duration::from_secs(60);

/// One recorded online/offline transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEntry {
    /// When the transition was recorded
    pub timestamp: DateTime<Utc>,
    /// Previous verdict
    pub was_online: bool,
    /// New verdict
    pub is_online: bool,
    /// How long the previous verdict lasted, if it had a known start
    pub duration_in_previous_state: Option<Duration>,
}

/// Ring buffer of the most recent transitions
#[derive(Debug, Clone)]
pub struct StateChangeHistory {
    entries: VecDeque<StateChangeEntry>,
    capacity: usize,
}

impl StateChangeHistory {
    /// Create an empty history holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a transition, evicting the oldest entry when full
    pub fn record(
        &mut self,
        was_online: bool,
        is_online: bool,
        previous_change: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let duration_in_previous_state =
            previous_change.and_then(|since| now.signed_duration_since(since).to_std().ok());

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(StateChangeEntry {
            timestamp: now,
            was_online,
            is_online,
            duration_in_previous_state,
        });
    }

    /// Entries, oldest first
    pub fn entries(&self) -> Vec<StateChangeEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the connection has been flipping repeatedly in the last minute
    pub fn is_flapping(&self, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(FLAP_WINDOW).unwrap_or(chrono::Duration::zero());
        self.entries
            .iter()
            .filter(|e| now.signed_duration_since(e.timestamp) <= window)
            .count()
            >= FLAP_TRANSITIONS
    }
}

//! AuditLog - Capped In-Memory Ring of Access Decisions
//!
//! Every validation step appends here; only denials and cross-context passes
//! are persisted by the layer.

use std::collections::VecDeque;

use crate::constants::AUDIT_RING_ENTRIES_COUNT_MAX;
use crate::store::AuditEntry;

/// Append-only ring buffer of audit entries.
///
/// When full, the oldest entry is dropped. Persistence of security-relevant
/// entries happens before they enter the ring, so the cap never loses them.
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
    total_recorded: u64,
    denial_count: u64,
    cross_context_count: u64,
}

impl AuditLog {
    /// Create a log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(AUDIT_RING_ENTRIES_COUNT_MAX)
    }

    /// Create a log with a custom capacity.
    ///
    /// # Panics
    /// Panics if capacity is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        // Precondition
        assert!(capacity > 0, "capacity must be positive");

        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_recorded: 0,
            denial_count: 0,
            cross_context_count: 0,
        }
    }

    /// Record an entry, evicting the oldest if at capacity.
    pub fn record(&mut self, entry: AuditEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }

        self.total_recorded += 1;
        if !entry.allowed {
            self.denial_count += 1;
        }
        if entry.is_cross_context() {
            self.cross_context_count += 1;
        }

        self.entries.push_back(entry);

        // Postcondition
        assert!(self.entries.len() <= self.capacity, "ring must stay capped");
    }

    /// The most recent `n` entries, newest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Entries currently held in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries ever recorded (including evicted ones).
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Total denials ever recorded.
    #[must_use]
    pub fn denial_count(&self) -> u64 {
        self.denial_count
    }

    /// Total cross-context accesses ever recorded.
    #[must_use]
    pub fn cross_context_count(&self) -> u64 {
        self.cross_context_count
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

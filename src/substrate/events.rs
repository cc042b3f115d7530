//! Memory Events - Explicit Notification Channel
//!
//! `TigerStyle`: Completed discovery and evolution cycles are announced over
//! a bounded channel the orchestration layer subscribes to. Backpressure is
//! explicit: when the channel is full the event is dropped with a warning,
//! since events are advisory notifications, never state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::evolution::EvolutionOutcome;
use crate::isolation::ContaminationReport;

/// One substrate notification.
#[derive(Debug, Clone, Serialize)]
pub enum MemoryEvent {
    /// A pattern analysis pass persisted new or updated patterns
    PatternsDiscovered {
        /// Owning agent
        agent_id: i64,
        /// Owning user
        user_id: String,
        /// Patterns persisted by the pass
        count: usize,
        /// Their descriptors
        descriptors: Vec<String>,
    },
    /// An evolution cycle completed
    EvolutionCompleted {
        /// Owning agent
        agent_id: i64,
        /// Owning user
        user_id: String,
        /// The cycle outcome
        outcome: EvolutionOutcome,
    },
    /// A security scan found foreign records in a context's boundary
    ContaminationDetected {
        /// The scan report
        report: ContaminationReport,
    },
}

/// Cloneable emitting half of the event channel.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<MemoryEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventEmitter {
    /// Emit an event without blocking.
    ///
    /// A full channel drops the event and counts it.
    pub fn emit(&self, event: MemoryEvent) {
        if let Err(error) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%error, "event channel full, notification dropped");
        }
    }

    /// Events dropped due to backpressure.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The bounded notification channel.
pub struct EventBus {
    emitter: EventEmitter,
    rx: Mutex<Option<mpsc::Receiver<MemoryEvent>>>,
}

impl EventBus {
    /// Create a bus with the given capacity.
    ///
    /// # Panics
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        // Precondition
        assert!(capacity > 0, "capacity must be positive");

        let (tx, rx) = mpsc::channel(capacity);
        Self {
            emitter: EventEmitter {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx: Mutex::new(Some(rx)),
        }
    }

    /// A cloneable emitter handle.
    #[must_use]
    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Take the receiving half. Only the first caller gets it.
    #[must_use]
    pub fn subscribe(&self) -> Option<mpsc::Receiver<MemoryEvent>> {
        self.rx.lock().unwrap().take()
    }

    /// Events dropped due to backpressure.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.emitter.dropped_count()
    }
}

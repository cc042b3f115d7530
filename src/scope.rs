//! Scope - Composite Instance Keys and Per-Scope State
//!
//! `TigerStyle`: No process-wide mutable maps. Per-(agent, user) state lives
//! in an explicit registry with creation-on-demand and idle eviction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::constants::SCOPE_IDLE_EVICT_MS_DEFAULT;
use crate::dst::Clock;

// =============================================================================
// ScopeKey
// =============================================================================

/// The composite key an isolation boundary is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Optional thread within the agent/user pair
    pub thread_id: Option<String>,
}

impl ScopeKey {
    /// Create a scope key without a thread.
    ///
    /// # Panics
    /// Panics if the user id is empty.
    #[must_use]
    pub fn new(agent_id: i64, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();

        // Precondition
        assert!(!user_id.is_empty(), "user_id must not be empty");

        Self {
            agent_id,
            user_id,
            thread_id: None,
        }
    }

    /// Add a thread id.
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Deterministic context id derived from the key.
    ///
    /// The same key always derives the same id, which makes context creation
    /// idempotent.
    #[must_use]
    pub fn derived_id(&self) -> String {
        match &self.thread_id {
            Some(thread_id) => format!(
                "agent:{}:user:{}:thread:{}",
                self.agent_id, self.user_id, thread_id
            ),
            None => format!("agent:{}:user:{}", self.agent_id, self.user_id),
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.derived_id())
    }
}

// =============================================================================
// ScopeRegistry
// =============================================================================

struct ScopeEntry<S> {
    state: Arc<S>,
    last_touched_ms: u64,
}

/// Registry of per-(agent, user) state with idle eviction.
///
/// `TigerStyle`:
/// - Creation-on-demand via a caller-supplied factory
/// - Explicit eviction policy, never unbounded growth
/// - Thread-safe with `RwLock`
pub struct ScopeRegistry<S> {
    entries: RwLock<HashMap<(i64, String), ScopeEntry<S>>>,
    clock: Clock,
    idle_evict_ms: u64,
}

impl<S> ScopeRegistry<S> {
    /// Create a registry with the default idle-eviction window.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self::with_idle_evict_ms(clock, SCOPE_IDLE_EVICT_MS_DEFAULT)
    }

    /// Create a registry with a custom idle-eviction window.
    ///
    /// # Panics
    /// Panics if the window is zero.
    #[must_use]
    pub fn with_idle_evict_ms(clock: Clock, idle_evict_ms: u64) -> Self {
        // Precondition
        assert!(idle_evict_ms > 0, "idle_evict_ms must be positive");

        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            idle_evict_ms,
        }
    }

    /// Get the state for a scope, creating it on demand.
    pub fn get_or_create(
        &self,
        agent_id: i64,
        user_id: &str,
        factory: impl FnOnce() -> S,
    ) -> Arc<S> {
        let now_ms = self.clock.now_ms();
        let key = (agent_id, user_id.to_string());

        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            entry.last_touched_ms = now_ms;
            return Arc::clone(&entry.state);
        }

        let state = Arc::new(factory());
        entries.insert(
            key,
            ScopeEntry {
                state: Arc::clone(&state),
                last_touched_ms: now_ms,
            },
        );
        state
    }

    /// Get the state for a scope if it exists, refreshing its idle timer.
    #[must_use]
    pub fn get(&self, agent_id: i64, user_id: &str) -> Option<Arc<S>> {
        let now_ms = self.clock.now_ms();
        let key = (agent_id, user_id.to_string());

        let mut entries = self.entries.write().unwrap();
        entries.get_mut(&key).map(|entry| {
            entry.last_touched_ms = now_ms;
            Arc::clone(&entry.state)
        })
    }

    /// Evict scopes idle longer than the eviction window.
    ///
    /// Returns the number of evicted scopes.
    pub fn evict_idle(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();

        entries.retain(|_, entry| now_ms.saturating_sub(entry.last_touched_ms) < self.idle_evict_ms);

        before - entries.len()
    }

    /// Number of live scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Snapshot of live scope keys.
    #[must_use]
    pub fn keys(&self) -> Vec<(i64, String)> {
        let mut keys: Vec<(i64, String)> =
            self.entries.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id_deterministic() {
        let a = ScopeKey::new(1, "u1");
        let b = ScopeKey::new(1, "u1");
        assert_eq!(a.derived_id(), b.derived_id());

        let threaded = ScopeKey::new(1, "u1").with_thread("t1");
        assert_ne!(a.derived_id(), threaded.derived_id());
        assert_eq!(threaded.derived_id(), "agent:1:user:u1:thread:t1");
    }

    #[test]
    #[should_panic(expected = "user_id must not be empty")]
    fn test_empty_user_id() {
        let _ = ScopeKey::new(1, "");
    }

    #[test]
    fn test_get_or_create_reuses_state() {
        let clock = Clock::simulated(0);
        let registry: ScopeRegistry<RwLock<u64>> = ScopeRegistry::new(clock);

        let first = registry.get_or_create(1, "u1", || RwLock::new(0));
        *first.write().unwrap() = 7;

        let second = registry.get_or_create(1, "u1", || RwLock::new(0));
        assert_eq!(*second.read().unwrap(), 7);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_scopes_distinct_state() {
        let clock = Clock::simulated(0);
        let registry: ScopeRegistry<RwLock<u64>> = ScopeRegistry::new(clock);

        registry.get_or_create(1, "u1", || RwLock::new(1));
        registry.get_or_create(2, "u1", || RwLock::new(2));
        registry.get_or_create(1, "u2", || RwLock::new(3));

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_evict_idle() {
        let clock = Clock::simulated(0);
        let registry: ScopeRegistry<()> =
            ScopeRegistry::with_idle_evict_ms(clock.clone(), 1000);

        registry.get_or_create(1, "u1", || ());
        clock.advance_ms(500);
        registry.get_or_create(2, "u2", || ());

        clock.advance_ms(600);
        // u1 idle for 1100ms, u2 idle for 600ms
        let evicted = registry.evict_idle();

        assert_eq!(evicted, 1);
        assert!(registry.get(1, "u1").is_none());
        assert!(registry.get(2, "u2").is_some());
    }

    #[test]
    fn test_touch_refreshes_idle_timer() {
        let clock = Clock::simulated(0);
        let registry: ScopeRegistry<()> =
            ScopeRegistry::with_idle_evict_ms(clock.clone(), 1000);

        registry.get_or_create(1, "u1", || ());
        clock.advance_ms(900);
        assert!(registry.get(1, "u1").is_some());

        clock.advance_ms(900);
        // Refreshed at 900, now 1800: idle 900 < 1000
        assert_eq!(registry.evict_idle(), 0);
    }
}

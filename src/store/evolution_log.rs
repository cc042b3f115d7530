//! Evolution Log Records
//!
//! One entry per applied evolution cycle, keyed by (agent, user, generation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one applied evolution cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionLogEntry {
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Generation this entry produced
    pub generation: u64,
    /// Explicit reason the cycle was triggered
    pub reason: String,
    /// Names of the strategies that changed
    pub strategies_changed: Vec<String>,
    /// Average fitness across the registry after the cycle
    pub average_fitness: f64,
    /// When the cycle completed
    pub occurred_at: DateTime<Utc>,
}

impl EvolutionLogEntry {
    /// Create a log entry.
    ///
    /// # Panics
    /// Panics if the reason is empty or average fitness is out of bounds.
    #[must_use]
    pub fn new(
        agent_id: i64,
        user_id: impl Into<String>,
        generation: u64,
        reason: impl Into<String>,
        strategies_changed: Vec<String>,
        average_fitness: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let reason = reason.into();

        // Preconditions: evolution is never silent, fitness is a score
        assert!(!reason.is_empty(), "evolution reason must not be empty");
        assert!(
            (0.0..=1.0).contains(&average_fitness),
            "average_fitness {average_fitness} outside [0, 1]"
        );

        Self {
            agent_id,
            user_id: user_id.into(),
            generation,
            reason,
            strategies_changed,
            average_fitness,
            occurred_at,
        }
    }
}

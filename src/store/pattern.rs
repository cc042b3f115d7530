//! DiscoveredPattern - One Mined Behavioral Regularity
//!
//! `TigerStyle`: Explicit thresholds live with the engine; the record type
//! only guarantees its own bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Pattern Category
// =============================================================================

/// The four analysis families that produce patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Time-of-day, session-duration, and storage-interval regularities
    Temporal,
    /// Domain, initiation, and complexity regularities
    Contextual,
    /// Tier co-occurrence and promotion-rate regularities
    CrossMemory,
    /// Success-rate and preferred-behavior regularities
    Behavioral,
}

impl PatternCategory {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Contextual => "contextual",
            Self::CrossMemory => "cross_memory",
            Self::Behavioral => "behavioral",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "temporal" => Some(Self::Temporal),
            "contextual" => Some(Self::Contextual),
            "cross_memory" => Some(Self::CrossMemory),
            "behavioral" => Some(Self::Behavioral),
            _ => None,
        }
    }

    /// All categories in order.
    #[must_use]
    pub fn all() -> &'static [PatternCategory] {
        &[
            Self::Temporal,
            Self::Contextual,
            Self::CrossMemory,
            Self::Behavioral,
        ]
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// DiscoveredPattern
// =============================================================================

/// One mined regularity for an (agent, user) scope.
///
/// Upsert identity is (agent, user, category, description); a newer analysis
/// replaces a stored pattern only with equal-or-higher confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPattern {
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Analysis family
    pub category: PatternCategory,
    /// Descriptor within the family (e.g. "time_of_day", "domain_preference")
    pub descriptor: String,
    /// Natural-key description text
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Number of supporting occurrences
    pub support: u64,
    /// Category-specific numeric payload
    pub parameters: Value,
    /// When this version of the pattern was produced
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredPattern {
    /// Create a pattern record.
    ///
    /// # Panics
    /// Panics if confidence is outside [0, 1].
    #[must_use]
    pub fn new(
        agent_id: i64,
        user_id: impl Into<String>,
        category: PatternCategory,
        descriptor: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        support: u64,
        parameters: Value,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence {confidence} outside [0, 1]"
        );

        Self {
            agent_id,
            user_id: user_id.into(),
            category,
            descriptor: descriptor.into(),
            description: description.into(),
            confidence,
            support,
            parameters,
            discovered_at,
        }
    }

    /// The upsert key for this pattern within its scope.
    #[must_use]
    pub fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.agent_id, self.user_id, self.category, self.description
        )
    }
}

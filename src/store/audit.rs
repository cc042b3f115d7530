//! Audit and Sharing Records
//!
//! `TigerStyle`: Append-only audit entries and explicit, time-boundable
//! sharing grants. Operation names are stored as stable strings so the
//! records survive enum evolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// AuditEntry
// =============================================================================

/// Immutable record of one access decision.
///
/// Held in a capped in-memory ring; denials and cross-context passes are
/// additionally persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Operation name as supplied by the caller
    pub operation: String,
    /// Source context id
    pub context_id: String,
    /// Target context id, when the operation crossed contexts
    pub target_context_id: Option<String>,
    /// Whether the operation was allowed
    pub allowed: bool,
    /// Stable reason string for the decision
    pub reason: String,
    /// When the decision was made
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an audit entry.
    #[must_use]
    pub fn new(
        agent_id: i64,
        user_id: impl Into<String>,
        operation: impl Into<String>,
        context_id: impl Into<String>,
        target_context_id: Option<String>,
        allowed: bool,
        reason: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id,
            user_id: user_id.into(),
            operation: operation.into(),
            context_id: context_id.into(),
            target_context_id,
            allowed,
            reason: reason.into(),
            occurred_at,
        }
    }

    /// Whether this entry records a cross-context access.
    #[must_use]
    pub fn is_cross_context(&self) -> bool {
        self.target_context_id
            .as_deref()
            .is_some_and(|target| target != self.context_id)
    }
}

// =============================================================================
// SharingRule
// =============================================================================

/// An explicit, time-boundable grant (or denial) between two contexts.
///
/// Consulted only for same-user cross-agent validation; cross-user access is
/// never grantable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingRule {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Granting context
    pub from_context_id: String,
    /// Receiving context
    pub to_context_id: String,
    /// Operation names the rule covers (empty = all operations)
    pub operations: Vec<String>,
    /// Whether the rule allows (true) or denies (false) the covered operations
    pub allow: bool,
    /// When the rule was created
    pub created_at: DateTime<Utc>,
    /// Optional expiry; an expired rule is ignored
    pub expires_at: Option<DateTime<Utc>>,
}

impl SharingRule {
    /// Create a sharing rule.
    #[must_use]
    pub fn new(
        from_context_id: impl Into<String>,
        to_context_id: impl Into<String>,
        operations: Vec<String>,
        allow: bool,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_context_id: from_context_id.into(),
            to_context_id: to_context_id.into(),
            operations,
            allow,
            created_at,
            expires_at,
        }
    }

    /// Whether this rule is expired at the given instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Whether this rule covers the given operation name.
    #[must_use]
    pub fn covers(&self, operation: &str) -> bool {
        self.operations.is_empty() || self.operations.iter().any(|op| op == operation)
    }

    /// Whether this rule applies to the given context pair (either direction).
    #[must_use]
    pub fn applies_to(&self, context_a: &str, context_b: &str) -> bool {
        (self.from_context_id == context_a && self.to_context_id == context_b)
            || (self.from_context_id == context_b && self.to_context_id == context_a)
    }
}

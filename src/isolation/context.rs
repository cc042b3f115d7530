//! Isolation Contexts, Operations, and Permissions
//!
//! `TigerStyle`: Explicit permission model; unknown operations are denied,
//! not guessed.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeKey;

// =============================================================================
// Operation
// =============================================================================

/// A memory operation as named by the caller.
///
/// Each verb maps to one permission kind; `update`, `delete`, and `remove`
/// are additionally destructive and never allowed across contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read a record
    Read,
    /// Retrieve ranked records
    Retrieve,
    /// Write a new record
    Write,
    /// Store a new episode
    Store,
    /// Update an existing record
    Update,
    /// Delete a record
    Delete,
    /// Remove a record
    Remove,
    /// Grant access to another context
    Share,
}

/// The permission a verb requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    /// Requires the read permission
    Read,
    /// Requires the write permission
    Write,
    /// Requires the delete permission
    Delete,
    /// Requires the share permission
    Share,
}

impl Operation {
    /// Parse a caller-supplied operation name.
    ///
    /// Returns None for unknown names; callers must treat None as a denial.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" => Some(Self::Read),
            "retrieve" => Some(Self::Retrieve),
            "write" => Some(Self::Write),
            "store" => Some(Self::Store),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "remove" => Some(Self::Remove),
            "share" => Some(Self::Share),
            _ => None,
        }
    }

    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Retrieve => "retrieve",
            Self::Write => "write",
            Self::Store => "store",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Remove => "remove",
            Self::Share => "share",
        }
    }

    /// The permission this verb requires.
    #[must_use]
    pub fn kind(&self) -> PermissionKind {
        match self {
            Self::Read | Self::Retrieve => PermissionKind::Read,
            Self::Write | Self::Store | Self::Update => PermissionKind::Write,
            Self::Delete | Self::Remove => PermissionKind::Delete,
            Self::Share => PermissionKind::Share,
        }
    }

    /// Whether this verb mutates or destroys existing records.
    ///
    /// Destructive verbs are never allowed cross-context, regardless of
    /// sharing rules.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Update | Self::Delete | Self::Remove)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Permission flags for one isolation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// May read/retrieve
    pub read: bool,
    /// May write/store/update
    pub write: bool,
    /// May delete/remove
    pub delete: bool,
    /// May create sharing grants
    pub share: bool,
    /// May access same-user contexts of other agents
    pub cross_agent: bool,
}

impl Permissions {
    /// Full permissions (the default for a new context).
    #[must_use]
    pub fn full() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
            share: true,
            cross_agent: true,
        }
    }

    /// Read-only permissions.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            delete: false,
            share: false,
            cross_agent: false,
        }
    }

    /// Whether the given permission kind is granted.
    #[must_use]
    pub fn grants(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Read => self.read,
            PermissionKind::Write => self.write,
            PermissionKind::Delete => self.delete,
            PermissionKind::Share => self.share,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::full()
    }
}

// =============================================================================
// IsolationContext
// =============================================================================

/// One scoped access boundary.
///
/// Derived deterministically from its [`ScopeKey`]; creation is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationContext {
    /// Derived context id
    pub context_id: String,
    /// The composite key this context is scoped to
    pub key: ScopeKey,
    /// Permission flags
    pub permissions: Permissions,
    /// Number of validated accesses
    pub access_count: u64,
    /// Creation time (ms since epoch)
    pub created_ms: u64,
    /// Last validated access (ms since epoch)
    pub last_access_ms: u64,
    /// Set when a contamination scan found foreign records
    pub contaminated: bool,
}

impl IsolationContext {
    /// Create a context for a scope key at the given instant.
    #[must_use]
    pub fn new(key: ScopeKey, permissions: Permissions, now_ms: u64) -> Self {
        Self {
            context_id: key.derived_id(),
            key,
            permissions,
            access_count: 0,
            created_ms: now_ms,
            last_access_ms: now_ms,
            contaminated: false,
        }
    }

    /// Accesses per second since creation.
    #[must_use]
    pub fn access_rate_per_sec(&self, now_ms: u64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.created_ms).max(1);
        self.access_count as f64 * 1000.0 / elapsed_ms as f64
    }
}

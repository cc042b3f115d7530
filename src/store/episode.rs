//! Episode - One Recorded Interaction Event
//!
//! `TigerStyle`: Explicit types, validation, builder pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{EPISODE_IMPORTANCE_MAX, EPISODE_IMPORTANCE_MIN};

// =============================================================================
// Memory Tier
// =============================================================================

/// The four memory tiers with distinct retention semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Short-lived scratch state for the current exchange
    Working,
    /// Recorded interaction events (the primary write path)
    Episodic,
    /// Distilled knowledge promoted out of episodes
    Semantic,
    /// Learned procedures and behavior routines
    Procedural,
}

impl MemoryTier {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "working" => Some(Self::Working),
            "episodic" => Some(Self::Episodic),
            "semantic" => Some(Self::Semantic),
            "procedural" => Some(Self::Procedural),
            _ => None,
        }
    }

    /// All tiers in order.
    #[must_use]
    pub fn all() -> &'static [MemoryTier] {
        &[
            Self::Working,
            Self::Episodic,
            Self::Semantic,
            Self::Procedural,
        ]
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Episode Type
// =============================================================================

/// Dynamic classification of a stored interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeType {
    /// Plain conversational exchange (the default)
    Conversation,
    /// Task execution
    Task,
    /// Something went wrong
    Error,
    /// Something was accomplished
    Success,
    /// The user learned or was taught something
    Learning,
    /// Something new was found
    Discovery,
}

impl EpisodeType {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Task => "task",
            Self::Error => "error",
            Self::Success => "success",
            Self::Learning => "learning",
            Self::Discovery => "discovery",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversation" => Some(Self::Conversation),
            "task" => Some(Self::Task),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            "learning" => Some(Self::Learning),
            "discovery" => Some(Self::Discovery),
            _ => None,
        }
    }

    /// All episode types in order.
    #[must_use]
    pub fn all() -> &'static [EpisodeType] {
        &[
            Self::Conversation,
            Self::Task,
            Self::Error,
            Self::Success,
            Self::Learning,
            Self::Discovery,
        ]
    }
}

impl std::fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Episode
// =============================================================================

/// One stored interaction event in episodic memory.
///
/// `TigerStyle`: Explicit fields, no Option where not needed.
///
/// Episodes are created on store and mutated only by the promotion step,
/// which flips `promoted_to_semantic` exactly once. Retention and expiry
/// are external concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Session this episode belongs to
    pub session_id: Option<String>,
    /// Tier this record lives in
    pub tier: MemoryTier,
    /// Dynamic classification
    pub episode_type: EpisodeType,
    /// Opaque structured payload (query/response pair or arbitrary JSON)
    pub content: Value,
    /// Sanitized metadata (large blobs stripped before persistence)
    pub context: Value,
    /// Importance score in [0, 1], computed at write time
    pub importance: f64,
    /// Explicit or inferred user satisfaction in [0, 1]
    pub satisfaction: Option<f64>,
    /// One-way visibility flag into semantic memory
    pub promoted_to_semantic: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Episode {
    /// Start building an episode for the given owner.
    #[must_use]
    pub fn builder(agent_id: i64, user_id: impl Into<String>) -> EpisodeBuilder {
        EpisodeBuilder::new(agent_id, user_id)
    }
}

// =============================================================================
// EpisodeBuilder
// =============================================================================

/// Builder for [`Episode`].
///
/// `TigerStyle`: Validation at build time, sensible defaults.
#[derive(Debug, Clone)]
pub struct EpisodeBuilder {
    agent_id: i64,
    user_id: String,
    session_id: Option<String>,
    tier: MemoryTier,
    episode_type: EpisodeType,
    content: Value,
    context: Value,
    importance: f64,
    satisfaction: Option<f64>,
    created_at: Option<DateTime<Utc>>,
}

impl EpisodeBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(agent_id: i64, user_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            user_id: user_id.into(),
            session_id: None,
            tier: MemoryTier::Episodic,
            episode_type: EpisodeType::Conversation,
            content: Value::Null,
            context: Value::Null,
            importance: crate::constants::EPISODE_IMPORTANCE_BASE,
            satisfaction: None,
            created_at: None,
        }
    }

    /// Set the session id.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the memory tier.
    #[must_use]
    pub fn tier(mut self, tier: MemoryTier) -> Self {
        self.tier = tier;
        self
    }

    /// Set the episode type.
    #[must_use]
    pub fn episode_type(mut self, episode_type: EpisodeType) -> Self {
        self.episode_type = episode_type;
        self
    }

    /// Set the content payload.
    #[must_use]
    pub fn content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Set the sanitized context.
    #[must_use]
    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Set the importance score.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Set the satisfaction score.
    #[must_use]
    pub fn satisfaction(mut self, satisfaction: Option<f64>) -> Self {
        self.satisfaction = satisfaction;
        self
    }

    /// Set the creation timestamp.
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Build the episode.
    ///
    /// # Panics
    /// Panics if the user id is empty or scores are out of bounds.
    #[must_use]
    pub fn build(self) -> Episode {
        // Preconditions
        assert!(!self.user_id.is_empty(), "user_id must not be empty");
        assert!(
            (EPISODE_IMPORTANCE_MIN..=EPISODE_IMPORTANCE_MAX).contains(&self.importance),
            "importance {} outside [{EPISODE_IMPORTANCE_MIN}, {EPISODE_IMPORTANCE_MAX}]",
            self.importance
        );
        if let Some(satisfaction) = self.satisfaction {
            assert!(
                (0.0..=1.0).contains(&satisfaction),
                "satisfaction {satisfaction} outside [0, 1]"
            );
        }

        Episode {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: self.agent_id,
            user_id: self.user_id,
            session_id: self.session_id,
            tier: self.tier,
            episode_type: self.episode_type,
            content: self.content,
            context: self.context,
            importance: self.importance,
            satisfaction: self.satisfaction,
            promoted_to_semantic: false,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

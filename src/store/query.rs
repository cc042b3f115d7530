//! EpisodeQuery - Filter Description for Episode Retrieval
//!
//! `TigerStyle`: One filter type shared by every backend so the predicate
//! semantics cannot drift between the sim and Postgres paths.

use chrono::{DateTime, Utc};

use super::episode::{Episode, EpisodeType};
use crate::constants::{RETRIEVAL_RESULTS_COUNT_DEFAULT, RETRIEVAL_RESULTS_COUNT_MAX};

/// Filters for querying episodes owned by one (agent, user) pair.
#[derive(Debug, Clone)]
pub struct EpisodeQuery {
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Minimum importance (inclusive)
    pub min_importance: f64,
    /// Restrict to one session
    pub session_id: Option<String>,
    /// Restrict to one episode type
    pub episode_type: Option<EpisodeType>,
    /// Only episodes created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only episodes created before this instant
    pub until: Option<DateTime<Utc>>,
    /// Include episodes already promoted to semantic memory
    pub include_promoted: bool,
    /// Maximum number of results
    pub limit: usize,
}

impl EpisodeQuery {
    /// Create a query for the given owner with defaults.
    #[must_use]
    pub fn new(agent_id: i64, user_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            user_id: user_id.into(),
            min_importance: 0.0,
            session_id: None,
            episode_type: None,
            since: None,
            until: None,
            include_promoted: false,
            limit: RETRIEVAL_RESULTS_COUNT_DEFAULT,
        }
    }

    /// Set the minimum importance.
    #[must_use]
    pub fn with_min_importance(mut self, min_importance: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&min_importance),
            "min_importance must be in [0, 1]"
        );
        self.min_importance = min_importance;
        self
    }

    /// Restrict to one session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict to one episode type.
    #[must_use]
    pub fn with_type(mut self, episode_type: EpisodeType) -> Self {
        self.episode_type = Some(episode_type);
        self
    }

    /// Only episodes created at or after this instant.
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only episodes created before this instant.
    #[must_use]
    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Include episodes already promoted to semantic memory.
    #[must_use]
    pub fn with_promoted(mut self) -> Self {
        self.include_promoted = true;
        self
    }

    /// Set the result limit, clamped to the maximum.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "limit must be positive");
        self.limit = limit.min(RETRIEVAL_RESULTS_COUNT_MAX);
        self
    }

    /// Whether an episode satisfies this query.
    ///
    /// Shared by in-memory backends; the Postgres backend compiles the same
    /// predicate into SQL.
    #[must_use]
    pub fn matches(&self, episode: &Episode) -> bool {
        if episode.agent_id != self.agent_id || episode.user_id != self.user_id {
            return false;
        }
        if episode.importance < self.min_importance {
            return false;
        }
        if let Some(ref session_id) = self.session_id {
            if episode.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(episode_type) = self.episode_type {
            if episode.episode_type != episode_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if episode.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if episode.created_at >= until {
                return false;
            }
        }
        if !self.include_promoted && episode.promoted_to_semantic {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn episode_at(hour: u32) -> Episode {
        Episode::builder(1, "u1")
            .session("s1")
            .importance(0.6)
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap())
            .build()
    }

    #[test]
    fn test_owner_filter() {
        let episode = episode_at(10);
        assert!(EpisodeQuery::new(1, "u1").matches(&episode));
        assert!(!EpisodeQuery::new(2, "u1").matches(&episode));
        assert!(!EpisodeQuery::new(1, "u2").matches(&episode));
    }

    #[test]
    fn test_importance_filter() {
        let episode = episode_at(10);
        assert!(EpisodeQuery::new(1, "u1")
            .with_min_importance(0.6)
            .matches(&episode));
        assert!(!EpisodeQuery::new(1, "u1")
            .with_min_importance(0.7)
            .matches(&episode));
    }

    #[test]
    fn test_time_range_filter() {
        let episode = episode_at(10);
        let before = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();

        assert!(EpisodeQuery::new(1, "u1").with_since(before).matches(&episode));
        assert!(!EpisodeQuery::new(1, "u1").with_since(after).matches(&episode));
        assert!(EpisodeQuery::new(1, "u1").with_until(after).matches(&episode));
        assert!(!EpisodeQuery::new(1, "u1").with_until(before).matches(&episode));
    }

    #[test]
    fn test_promoted_excluded_by_default() {
        let mut episode = episode_at(10);
        episode.promoted_to_semantic = true;

        assert!(!EpisodeQuery::new(1, "u1").matches(&episode));
        assert!(EpisodeQuery::new(1, "u1").with_promoted().matches(&episode));
    }

    #[test]
    fn test_limit_clamped() {
        let query = EpisodeQuery::new(1, "u1").with_limit(10_000);
        assert_eq!(query.limit, RETRIEVAL_RESULTS_COUNT_MAX);
    }
}

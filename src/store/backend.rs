//! TierStore Trait
//!
//! `TigerStyle`: Abstract interface over the five logical tables
//! (episodes, patterns, evolution log, audit, sharing rules).
//!
//! # Simulation-First
//!
//! Tests are written against `SimTierStore` before `PostgresTierStore`.
//! All implementations must satisfy the same trait contract, including
//! time-range filtering and substring content search.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::audit::{AuditEntry, SharingRule};
use super::episode::{Episode, EpisodeType, MemoryTier};
use super::error::StoreResult;
use super::evolution_log::EvolutionLogEntry;
use super::pattern::DiscoveredPattern;
use super::query::EpisodeQuery;

/// Per-type historical aggregate used by consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAggregate {
    /// Episode type the aggregate covers
    pub episode_type: EpisodeType,
    /// Number of episodes of this type
    pub count: u64,
    /// Mean importance across those episodes
    pub avg_importance: f64,
    /// Mean satisfaction across episodes that carry one
    pub avg_satisfaction: Option<f64>,
}

/// Abstract store for all memory tiers.
///
/// `TigerStyle`: All operations are async and return explicit errors.
/// Every write carries the owning (agent, user); the store itself performs
/// no access control; that is the isolation layer's job.
#[async_trait]
pub trait TierStore: Send + Sync {
    // =========================================================================
    // Episodes
    // =========================================================================

    /// Insert an episode. Returns the episode id.
    async fn insert_episode(&self, episode: &Episode) -> StoreResult<String>;

    /// Get an episode by id. Returns None if it does not exist.
    async fn get_episode(&self, id: &str) -> StoreResult<Option<Episode>>;

    /// Query episodes matching the filter, newest first.
    async fn query_episodes(&self, query: &EpisodeQuery) -> StoreResult<Vec<Episode>>;

    /// Case-insensitive substring search over JSON-encoded episode content.
    async fn search_episodes(
        &self,
        agent_id: i64,
        user_id: &str,
        needle: &str,
        limit: usize,
    ) -> StoreResult<Vec<Episode>>;

    /// Flip `promoted_to_semantic` to true (one-way).
    ///
    /// Returns true if the flag transitioned, false if it was already set.
    async fn mark_promoted(&self, id: &str) -> StoreResult<bool>;

    /// Count episodes owned by (agent, user).
    async fn count_episodes(&self, agent_id: i64, user_id: &str) -> StoreResult<u64>;

    /// Count promoted episodes owned by (agent, user).
    async fn count_promoted(&self, agent_id: i64, user_id: &str) -> StoreResult<u64>;

    /// Count records in a tier visible to `agent_id` but owned by a
    /// different user. Non-zero means contamination.
    async fn count_foreign_records(
        &self,
        agent_id: i64,
        user_id: &str,
        tier: MemoryTier,
    ) -> StoreResult<u64>;

    /// Per-type historical aggregates for (agent, user).
    async fn type_aggregates(&self, agent_id: i64, user_id: &str)
        -> StoreResult<Vec<TypeAggregate>>;

    // =========================================================================
    // Patterns
    // =========================================================================

    /// Insert or replace a pattern keyed by (agent, user, category, description).
    async fn upsert_pattern(&self, pattern: &DiscoveredPattern) -> StoreResult<()>;

    /// List patterns for (agent, user), highest confidence first.
    async fn list_patterns(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<DiscoveredPattern>>;

    /// Count patterns for (agent, user).
    async fn count_patterns(&self, agent_id: i64, user_id: &str) -> StoreResult<u64>;

    // =========================================================================
    // Audit
    // =========================================================================

    /// Append an audit entry.
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// List audit entries for (agent, user), newest first.
    async fn list_audit(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<AuditEntry>>;

    // =========================================================================
    // Sharing Rules
    // =========================================================================

    /// Insert or replace a sharing rule by id.
    async fn upsert_sharing_rule(&self, rule: &SharingRule) -> StoreResult<()>;

    /// List sharing rules, newest first.
    async fn list_sharing_rules(&self, limit: usize) -> StoreResult<Vec<SharingRule>>;

    // =========================================================================
    // Evolution Log
    // =========================================================================

    /// Append an evolution log entry.
    async fn append_evolution_log(&self, entry: &EvolutionLogEntry) -> StoreResult<()>;

    /// List evolution log entries for (agent, user), newest first.
    async fn list_evolution_log(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<EvolutionLogEntry>>;

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Clear all tables. Primarily for testing.
    async fn clear(&self) -> StoreResult<()>;
}

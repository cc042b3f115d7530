//! `SimTierStore` - In-Memory Storage for Testing
//!
//! `TigerStyle`: Deterministic testing with fault injection.
//!
//! # Simulation-First
//!
//! 1. Tests are written FIRST against this backend
//! 2. `PostgresTierStore` follows the same trait contract
//! 3. Fault injection exercises every degradation path

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::dst::{Clock, DeterministicRng, FaultConfig, FaultInjector, SimConfig};

use super::audit::{AuditEntry, SharingRule};
use super::backend::{TierStore, TypeAggregate};
use super::episode::{Episode, EpisodeType, MemoryTier};
use super::error::{StoreError, StoreResult};
use super::evolution_log::EvolutionLogEntry;
use super::pattern::DiscoveredPattern;
use super::query::EpisodeQuery;

// =============================================================================
// SimTierStore
// =============================================================================

/// In-memory tier store for testing.
///
/// `TigerStyle`:
/// - Deterministic via `Clock` and `DeterministicRng`
/// - Fault injection via `FaultInjector`
/// - Thread-safe with `RwLock`
/// - Result ordering is always deterministic (newest first, id tiebreak)
#[derive(Debug, Clone)]
pub struct SimTierStore {
    episodes: Arc<RwLock<HashMap<String, Episode>>>,
    patterns: Arc<RwLock<HashMap<String, DiscoveredPattern>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
    rules: Arc<RwLock<HashMap<String, SharingRule>>>,
    evolution_log: Arc<RwLock<Vec<EvolutionLogEntry>>>,
    fault_injector: Arc<FaultInjector>,
    clock: Clock,
}

impl SimTierStore {
    /// Create a new `SimTierStore` with the given config.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let mut rng = DeterministicRng::new(config.seed());
        let fault_rng = rng.fork();

        Self {
            episodes: Arc::new(RwLock::new(HashMap::new())),
            patterns: Arc::new(RwLock::new(HashMap::new())),
            audit: Arc::new(RwLock::new(Vec::new())),
            rules: Arc::new(RwLock::new(HashMap::new())),
            evolution_log: Arc::new(RwLock::new(Vec::new())),
            fault_injector: Arc::new(FaultInjector::new(fault_rng)),
            clock: Clock::simulated(0),
        }
    }

    /// Create a store sharing an external fault injector and clock.
    ///
    /// Used when a test coordinates faults across several components.
    #[must_use]
    pub fn with_fault_injector(fault_injector: Arc<FaultInjector>, clock: Clock) -> Self {
        Self {
            episodes: Arc::new(RwLock::new(HashMap::new())),
            patterns: Arc::new(RwLock::new(HashMap::new())),
            audit: Arc::new(RwLock::new(Vec::new())),
            rules: Arc::new(RwLock::new(HashMap::new())),
            evolution_log: Arc::new(RwLock::new(Vec::new())),
            fault_injector,
            clock,
        }
    }

    /// Add a fault configuration.
    ///
    /// Only valid before the backend is shared.
    ///
    /// # Panics
    /// Panics if the fault injector is already shared.
    #[must_use]
    pub fn with_faults(mut self, config: FaultConfig) -> Self {
        Arc::get_mut(&mut self.fault_injector)
            .expect("cannot add faults after backend is shared")
            .register(config);
        self
    }

    /// Get the clock driving this store.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Get the fault injector for inspection.
    #[must_use]
    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.fault_injector
    }

    /// Episode count across all owners (for testing).
    #[must_use]
    pub fn episode_count(&self) -> usize {
        self.episodes.read().unwrap().len()
    }

    /// Check if a fault should be injected for an operation.
    fn maybe_inject_fault(&self, operation: &str) -> StoreResult<()> {
        if let Some(fault_type) = self.fault_injector.should_inject(operation) {
            Err(StoreError::simulated_fault(format!(
                "{fault_type:?} during {operation}"
            )))
        } else {
            Ok(())
        }
    }

    /// Sort newest first with id tiebreak for deterministic output.
    fn sort_episodes(episodes: &mut [Episode]) {
        episodes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[async_trait]
impl TierStore for SimTierStore {
    #[tracing::instrument(skip(self, episode), fields(episode_id = %episode.id))]
    async fn insert_episode(&self, episode: &Episode) -> StoreResult<String> {
        self.maybe_inject_fault("insert_episode")?;

        // Preconditions
        assert!(!episode.id.is_empty(), "episode must have id");
        assert!(
            (0.0..=1.0).contains(&episode.importance),
            "importance out of bounds"
        );

        let mut episodes = self.episodes.write().unwrap();
        episodes.insert(episode.id.clone(), episode.clone());

        Ok(episode.id.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn get_episode(&self, id: &str) -> StoreResult<Option<Episode>> {
        self.maybe_inject_fault("get_episode")?;

        let episodes = self.episodes.read().unwrap();
        Ok(episodes.get(id).cloned())
    }

    #[tracing::instrument(skip(self, query), fields(agent_id = query.agent_id))]
    async fn query_episodes(&self, query: &EpisodeQuery) -> StoreResult<Vec<Episode>> {
        self.maybe_inject_fault("query_episodes")?;

        let episodes = self.episodes.read().unwrap();
        let mut results: Vec<Episode> = episodes
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        Self::sort_episodes(&mut results);
        results.truncate(query.limit);
        Ok(results)
    }

    #[tracing::instrument(skip(self), fields(needle_len = needle.len()))]
    async fn search_episodes(
        &self,
        agent_id: i64,
        user_id: &str,
        needle: &str,
        limit: usize,
    ) -> StoreResult<Vec<Episode>> {
        self.maybe_inject_fault("search_episodes")?;

        let needle_lower = needle.to_lowercase();
        let episodes = self.episodes.read().unwrap();
        let mut results: Vec<Episode> = episodes
            .values()
            .filter(|e| e.agent_id == agent_id && e.user_id == user_id)
            .filter(|e| e.content.to_string().to_lowercase().contains(&needle_lower))
            .cloned()
            .collect();

        Self::sort_episodes(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn mark_promoted(&self, id: &str) -> StoreResult<bool> {
        self.maybe_inject_fault("mark_promoted")?;

        let mut episodes = self.episodes.write().unwrap();
        let episode = episodes
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id))?;

        if episode.promoted_to_semantic {
            return Ok(false);
        }
        episode.promoted_to_semantic = true;
        Ok(true)
    }

    async fn count_episodes(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        self.maybe_inject_fault("count_episodes")?;

        let episodes = self.episodes.read().unwrap();
        Ok(episodes
            .values()
            .filter(|e| e.agent_id == agent_id && e.user_id == user_id)
            .count() as u64)
    }

    async fn count_promoted(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        self.maybe_inject_fault("count_promoted")?;

        let episodes = self.episodes.read().unwrap();
        Ok(episodes
            .values()
            .filter(|e| e.agent_id == agent_id && e.user_id == user_id && e.promoted_to_semantic)
            .count() as u64)
    }

    async fn count_foreign_records(
        &self,
        agent_id: i64,
        user_id: &str,
        tier: MemoryTier,
    ) -> StoreResult<u64> {
        self.maybe_inject_fault("count_foreign_records")?;

        let episodes = self.episodes.read().unwrap();
        Ok(episodes
            .values()
            .filter(|e| e.agent_id == agent_id && e.tier == tier && e.user_id != user_id)
            .count() as u64)
    }

    async fn type_aggregates(
        &self,
        agent_id: i64,
        user_id: &str,
    ) -> StoreResult<Vec<TypeAggregate>> {
        self.maybe_inject_fault("type_aggregates")?;

        let episodes = self.episodes.read().unwrap();
        let mut aggregates = Vec::new();

        for episode_type in EpisodeType::all() {
            let owned: Vec<&Episode> = episodes
                .values()
                .filter(|e| {
                    e.agent_id == agent_id
                        && e.user_id == user_id
                        && e.episode_type == *episode_type
                })
                .collect();

            if owned.is_empty() {
                continue;
            }

            let count = owned.len() as u64;
            let avg_importance =
                owned.iter().map(|e| e.importance).sum::<f64>() / owned.len() as f64;

            let rated: Vec<f64> = owned.iter().filter_map(|e| e.satisfaction).collect();
            let avg_satisfaction = if rated.is_empty() {
                None
            } else {
                Some(rated.iter().sum::<f64>() / rated.len() as f64)
            };

            aggregates.push(TypeAggregate {
                episode_type: *episode_type,
                count,
                avg_importance,
                avg_satisfaction,
            });
        }

        Ok(aggregates)
    }

    #[tracing::instrument(skip(self, pattern), fields(key = %pattern.natural_key()))]
    async fn upsert_pattern(&self, pattern: &DiscoveredPattern) -> StoreResult<()> {
        self.maybe_inject_fault("upsert_pattern")?;

        let mut patterns = self.patterns.write().unwrap();
        patterns.insert(pattern.natural_key(), pattern.clone());
        Ok(())
    }

    async fn list_patterns(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<DiscoveredPattern>> {
        self.maybe_inject_fault("list_patterns")?;

        let patterns = self.patterns.read().unwrap();
        let mut results: Vec<DiscoveredPattern> = patterns
            .values()
            .filter(|p| p.agent_id == agent_id && p.user_id == user_id)
            .cloned()
            .collect();

        // Highest confidence first, description tiebreak for determinism
        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.description.cmp(&b.description))
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn count_patterns(&self, agent_id: i64, user_id: &str) -> StoreResult<u64> {
        self.maybe_inject_fault("count_patterns")?;

        let patterns = self.patterns.read().unwrap();
        Ok(patterns
            .values()
            .filter(|p| p.agent_id == agent_id && p.user_id == user_id)
            .count() as u64)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.maybe_inject_fault("append_audit")?;

        let mut audit = self.audit.write().unwrap();
        audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<AuditEntry>> {
        self.maybe_inject_fault("list_audit")?;

        let audit = self.audit.read().unwrap();
        let mut results: Vec<AuditEntry> = audit
            .iter()
            .filter(|a| a.agent_id == agent_id && a.user_id == user_id)
            .cloned()
            .collect();

        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    async fn upsert_sharing_rule(&self, rule: &SharingRule) -> StoreResult<()> {
        self.maybe_inject_fault("upsert_sharing_rule")?;

        let mut rules = self.rules.write().unwrap();
        rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn list_sharing_rules(&self, limit: usize) -> StoreResult<Vec<SharingRule>> {
        self.maybe_inject_fault("list_sharing_rules")?;

        let rules = self.rules.read().unwrap();
        let mut results: Vec<SharingRule> = rules.values().cloned().collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);
        Ok(results)
    }

    async fn append_evolution_log(&self, entry: &EvolutionLogEntry) -> StoreResult<()> {
        self.maybe_inject_fault("append_evolution_log")?;

        let mut log = self.evolution_log.write().unwrap();
        log.push(entry.clone());
        Ok(())
    }

    async fn list_evolution_log(
        &self,
        agent_id: i64,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<EvolutionLogEntry>> {
        self.maybe_inject_fault("list_evolution_log")?;

        let log = self.evolution_log.read().unwrap();
        let mut results: Vec<EvolutionLogEntry> = log
            .iter()
            .filter(|e| e.agent_id == agent_id && e.user_id == user_id)
            .cloned()
            .collect();

        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.episodes.write().unwrap().clear();
        self.patterns.write().unwrap().clear();
        self.audit.write().unwrap().clear();
        self.rules.write().unwrap().clear();
        self.evolution_log.write().unwrap().clear();
        Ok(())
    }
}

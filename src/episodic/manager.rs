//! Episodic Memory Manager
//!
//! `TigerStyle`: Classify, score, persist, promote. Storage failures degrade
//! to soft outcomes; retrieval failures degrade to empty results. The caller
//! is never crashed by this module.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Duration;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{
    CONSOLIDATION_ADAPTATION_RATE_DEFAULT, CONSOLIDATION_REEVALUATION_WINDOW_MS,
    EPISODE_CONTEXT_BLOB_BYTES_MAX, EPISODE_CONTEXT_STRING_BYTES_MAX,
    PROMOTION_IMPORTANCE_THRESHOLD_DEFAULT, PROMOTION_LEARNING_SATISFACTION_MIN,
    PROMOTION_SIMILAR_COUNT_MIN, PROMOTION_SIMILAR_IMPORTANCE_DELTA_MAX,
    PROMOTION_SIMILAR_WINDOW_MS, PROMOTION_SUCCESS_SATISFACTION_MIN,
    RETRIEVAL_RESULTS_COUNT_MAX, RETRIEVAL_SESSION_AFFINITY_OTHER,
    RETRIEVAL_SESSION_AFFINITY_SAME,
};
use crate::dst::Clock;
use crate::scope::{ScopeKey, ScopeRegistry};
use crate::store::{Episode, EpisodeQuery, EpisodeType, TierStore};

use super::classify::{classify, default_chain, EpisodeClassifier};
use super::importance::{infer_satisfaction, ImportanceScorer, TypeWeights};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the episodic manager.
#[derive(Debug, Clone)]
pub struct EpisodicConfig {
    /// Importance at or above which promotion is evaluated
    pub promotion_threshold: f64,
    /// Rate at which type weights move toward their target
    pub adaptation_rate: f64,
    /// Similar episodes required for similarity-based promotion
    pub similar_count_min: u64,
    /// Maximum importance distance between similar episodes
    pub similar_importance_delta_max: f64,
    /// Look-back window for the similarity criterion
    pub similar_window_ms: u64,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: PROMOTION_IMPORTANCE_THRESHOLD_DEFAULT,
            adaptation_rate: CONSOLIDATION_ADAPTATION_RATE_DEFAULT,
            similar_count_min: PROMOTION_SIMILAR_COUNT_MIN,
            similar_importance_delta_max: PROMOTION_SIMILAR_IMPORTANCE_DELTA_MAX,
            similar_window_ms: PROMOTION_SIMILAR_WINDOW_MS,
        }
    }
}

impl EpisodicConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the promotion threshold.
    #[must_use]
    pub fn with_promotion_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "promotion threshold must be in [0, 1]"
        );
        self.promotion_threshold = threshold;
        self
    }

    /// Set the adaptation rate.
    #[must_use]
    pub fn with_adaptation_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "adaptation rate must be in [0, 1]");
        self.adaptation_rate = rate;
        self
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of one store call.
///
/// `stored: false` with an error message is a soft failure, not a crash.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    /// Whether the episode was persisted
    pub stored: bool,
    /// Episode id when stored
    pub id: Option<String>,
    /// Classified type
    pub episode_type: EpisodeType,
    /// Computed importance
    pub importance: f64,
    /// Explicit or inferred satisfaction
    pub satisfaction: Option<f64>,
    /// Error message for soft failures
    pub error: Option<String>,
}

/// Result of one consolidation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationReport {
    /// Episode types whose weights were adjusted
    pub weights_adjusted: usize,
    /// High-importance episodes re-evaluated
    pub reevaluated: usize,
    /// Episodes promoted during re-evaluation
    pub promoted: usize,
}

/// Aggregate episodic statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodicStats {
    /// Episodes stored
    pub stored_count: u64,
    /// Episodes promoted
    pub promoted_count: u64,
    /// Consolidation cycles run
    pub consolidation_count: u64,
    /// Soft store failures
    pub store_failure_count: u64,
    /// Configured promotion threshold
    pub promotion_threshold: f64,
}

// =============================================================================
// EpisodicMemory
// =============================================================================

/// The episodic tier manager.
///
/// Per-scope learned type weights live in a [`ScopeRegistry`]; everything
/// else is shared.
pub struct EpisodicMemory {
    store: Arc<dyn TierStore>,
    clock: Clock,
    config: EpisodicConfig,
    chain: Vec<Box<dyn EpisodeClassifier>>,
    scorer: ImportanceScorer,
    weights: ScopeRegistry<RwLock<TypeWeights>>,
    stored_count: AtomicU64,
    promoted_count: AtomicU64,
    consolidation_count: AtomicU64,
    store_failure_count: AtomicU64,
}

impl EpisodicMemory {
    /// Create a manager with default configuration and classifier chain.
    #[must_use]
    pub fn new(store: Arc<dyn TierStore>, clock: Clock) -> Self {
        Self::with_config(store, clock, EpisodicConfig::default())
    }

    /// Create a manager with explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn TierStore>, clock: Clock, config: EpisodicConfig) -> Self {
        Self {
            store,
            weights: ScopeRegistry::new(clock.clone()),
            clock,
            config,
            chain: default_chain(),
            scorer: ImportanceScorer::new(),
            stored_count: AtomicU64::new(0),
            promoted_count: AtomicU64::new(0),
            consolidation_count: AtomicU64::new(0),
            store_failure_count: AtomicU64::new(0),
        }
    }

    /// Replace the classifier chain.
    #[must_use]
    pub fn with_chain(mut self, chain: Vec<Box<dyn EpisodeClassifier>>) -> Self {
        assert!(!chain.is_empty(), "classifier chain must not be empty");
        self.chain = chain;
        self
    }

    /// The learned weight for a type within a scope.
    #[must_use]
    pub fn type_weight(&self, agent_id: i64, user_id: &str, episode_type: EpisodeType) -> f64 {
        let weights = self
            .weights
            .get_or_create(agent_id, user_id, || RwLock::new(TypeWeights::new()));
        let weight = weights.read().unwrap().get(episode_type);
        weight
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Classify, score, and persist one episode.
    ///
    /// Storage failures produce a soft `StoreOutcome` with `stored: false`.
    #[tracing::instrument(skip(self, content, metadata), fields(scope = %key))]
    pub async fn store_episode(
        &self,
        key: &ScopeKey,
        session_id: Option<&str>,
        content: Value,
        metadata: &Value,
    ) -> StoreOutcome {
        let now_ms = self.clock.now_ms();

        let episode_type = classify(&self.chain, &content, metadata);
        let type_weight = self.type_weight(key.agent_id, &key.user_id, episode_type);
        let importance = self
            .scorer
            .score(episode_type, type_weight, &content, metadata, now_ms);
        let satisfaction = infer_satisfaction(metadata);
        let context = sanitize_context(metadata);

        let mut builder = Episode::builder(key.agent_id, key.user_id.clone())
            .episode_type(episode_type)
            .content(content)
            .context(context)
            .importance(importance)
            .satisfaction(satisfaction)
            .created_at(self.clock.now());
        if let Some(session_id) = session_id {
            builder = builder.session(session_id);
        }
        // Callers may direct the record to a specific tier
        if let Some(tier) = metadata
            .get("tier")
            .and_then(Value::as_str)
            .and_then(crate::store::MemoryTier::parse)
        {
            builder = builder.tier(tier);
        }
        let episode = builder.build();

        match self.store.insert_episode(&episode).await {
            Ok(id) => {
                self.stored_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%id, %episode_type, importance, "episode stored");
                StoreOutcome {
                    stored: true,
                    id: Some(id),
                    episode_type,
                    importance,
                    satisfaction,
                    error: None,
                }
            }
            Err(error) => {
                self.store_failure_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%error, "episode store failed");
                StoreOutcome {
                    stored: false,
                    id: None,
                    episode_type,
                    importance,
                    satisfaction,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    // =========================================================================
    // Retrieve
    // =========================================================================

    /// Retrieve episodes ranked by importance plus session affinity, with
    /// recency as the tiebreaker.
    ///
    /// Storage failures degrade to an empty result.
    #[tracing::instrument(skip(self, query), fields(agent_id = query.agent_id))]
    pub async fn retrieve(
        &self,
        query: &EpisodeQuery,
        current_session: Option<&str>,
    ) -> Vec<Episode> {
        // Over-fetch so ranking sees more than one page
        let mut wide = query.clone();
        wide.limit = RETRIEVAL_RESULTS_COUNT_MAX;

        let episodes = match self.store.query_episodes(&wide).await {
            Ok(episodes) => episodes,
            Err(error) => {
                tracing::warn!(%error, "retrieve degraded to empty result");
                return Vec::new();
            }
        };

        rank_episodes(episodes, current_session, query.limit)
    }

    /// Retrieve episodes matching a text query, ranked like [`Self::retrieve`].
    ///
    /// The substring search runs in the store; the query filters still
    /// apply. Storage failures degrade to an empty result.
    #[tracing::instrument(skip(self, query), fields(agent_id = query.agent_id))]
    pub async fn retrieve_text(
        &self,
        query: &EpisodeQuery,
        needle: &str,
        current_session: Option<&str>,
    ) -> Vec<Episode> {
        let hits = match self
            .store
            .search_episodes(
                query.agent_id,
                &query.user_id,
                needle,
                RETRIEVAL_RESULTS_COUNT_MAX,
            )
            .await
        {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(%error, "text retrieve degraded to empty result");
                return Vec::new();
            }
        };

        let filtered: Vec<Episode> = hits.into_iter().filter(|e| query.matches(e)).collect();
        rank_episodes(filtered, current_session, query.limit)
    }

    // =========================================================================
    // Promotion
    // =========================================================================

    /// Evaluate an episode for promotion using the configured threshold.
    pub async fn evaluate_promotion(&self, episode_id: &str) -> bool {
        self.evaluate_promotion_with_threshold(episode_id, self.config.promotion_threshold)
            .await
    }

    /// Evaluate an episode for promotion to semantic visibility.
    ///
    /// The threshold is supplied by the caller so the evolution engine's
    /// live consolidation strategy can tune it. Returns true if the episode
    /// was promoted by this call. All failures are soft: they log and
    /// return false.
    #[tracing::instrument(skip(self))]
    pub async fn evaluate_promotion_with_threshold(
        &self,
        episode_id: &str,
        promotion_threshold: f64,
    ) -> bool {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&promotion_threshold),
            "promotion_threshold must be in [0, 1]"
        );

        let episode = match self.store.get_episode(episode_id).await {
            Ok(Some(episode)) => episode,
            Ok(None) => return false,
            Err(error) => {
                tracing::warn!(%error, "promotion evaluation read failed");
                return false;
            }
        };

        if episode.promoted_to_semantic {
            return false;
        }
        if episode.importance < promotion_threshold {
            return false;
        }

        let qualifies = match (episode.episode_type, episode.satisfaction) {
            (EpisodeType::Success, Some(satisfaction)) => {
                satisfaction > PROMOTION_SUCCESS_SATISFACTION_MIN
            }
            (EpisodeType::Learning, Some(satisfaction)) => {
                satisfaction > PROMOTION_LEARNING_SATISFACTION_MIN
            }
            (EpisodeType::Discovery, _) => true,
            _ => self.has_similar_episodes(&episode).await,
        };

        if !qualifies {
            return false;
        }

        match self.store.mark_promoted(episode_id).await {
            Ok(true) => {
                self.promoted_count.fetch_add(1, Ordering::Relaxed);
                tracing::info!(episode_id, "episode promoted to semantic memory");
                true
            }
            Ok(false) => false,
            Err(error) => {
                tracing::warn!(%error, "promotion write failed");
                false
            }
        }
    }

    /// Whether enough similar episodes exist to justify promotion.
    async fn has_similar_episodes(&self, episode: &Episode) -> bool {
        let since = self.clock.now() - Duration::milliseconds(self.config.similar_window_ms as i64);
        let query = EpisodeQuery::new(episode.agent_id, episode.user_id.clone())
            .with_type(episode.episode_type)
            .with_since(since)
            .with_promoted()
            .with_limit(RETRIEVAL_RESULTS_COUNT_MAX);

        let similar = match self.store.query_episodes(&query).await {
            Ok(episodes) => episodes,
            Err(error) => {
                tracing::warn!(%error, "similarity query failed");
                return false;
            }
        };

        let count = similar
            .iter()
            .filter(|candidate| candidate.id != episode.id)
            .filter(|candidate| {
                (candidate.importance - episode.importance).abs()
                    <= self.config.similar_importance_delta_max
            })
            .count() as u64;

        count >= self.config.similar_count_min
    }

    // =========================================================================
    // Consolidation
    // =========================================================================

    /// Re-learn type weights from history and re-evaluate recent
    /// high-importance episodes for promotion.
    #[tracing::instrument(skip(self))]
    pub async fn consolidate(&self, agent_id: i64, user_id: &str) -> ConsolidationReport {
        self.consolidation_count.fetch_add(1, Ordering::Relaxed);

        // Re-learn weights
        let weights_adjusted = match self.store.type_aggregates(agent_id, user_id).await {
            Ok(aggregates) => {
                let weights = self
                    .weights
                    .get_or_create(agent_id, user_id, || RwLock::new(TypeWeights::new()));
                weights
                    .write()
                    .unwrap()
                    .learn_from(&aggregates, self.config.adaptation_rate);
                aggregates.len()
            }
            Err(error) => {
                tracing::warn!(%error, "type aggregate query failed");
                0
            }
        };

        // Re-evaluate unpromoted high-importance episodes from the window
        let since =
            self.clock.now() - Duration::milliseconds(CONSOLIDATION_REEVALUATION_WINDOW_MS as i64);
        let query = EpisodeQuery::new(agent_id, user_id)
            .with_min_importance(self.config.promotion_threshold)
            .with_since(since)
            .with_limit(RETRIEVAL_RESULTS_COUNT_MAX);

        let candidates = match self.store.query_episodes(&query).await {
            Ok(episodes) => episodes,
            Err(error) => {
                tracing::warn!(%error, "consolidation query failed");
                Vec::new()
            }
        };

        let reevaluated = candidates.len();
        let mut promoted = 0;
        for candidate in candidates {
            if self.evaluate_promotion(&candidate.id).await {
                promoted += 1;
            }
        }

        tracing::debug!(weights_adjusted, reevaluated, promoted, "consolidation complete");
        ConsolidationReport {
            weights_adjusted,
            reevaluated,
            promoted,
        }
    }

    /// Evict idle per-scope weight state. Returns the number evicted.
    pub fn evict_idle_scopes(&self) -> usize {
        self.weights.evict_idle()
    }

    /// Aggregate statistics. Read-only, no side effects.
    #[must_use]
    pub fn stats(&self) -> EpisodicStats {
        EpisodicStats {
            stored_count: self.stored_count.load(Ordering::Relaxed),
            promoted_count: self.promoted_count.load(Ordering::Relaxed),
            consolidation_count: self.consolidation_count.load(Ordering::Relaxed),
            store_failure_count: self.store_failure_count.load(Ordering::Relaxed),
            promotion_threshold: self.config.promotion_threshold,
        }
    }
}

/// Sort by importance plus session affinity, recency as tiebreaker.
fn rank_episodes(
    mut episodes: Vec<Episode>,
    current_session: Option<&str>,
    limit: usize,
) -> Vec<Episode> {
    episodes.sort_by(|a, b| {
        let rank_a = rank_key(a, current_session);
        let rank_b = rank_key(b, current_session);
        rank_b
            .partial_cmp(&rank_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    episodes.truncate(limit);
    episodes
}

/// Ranking key: importance plus session affinity.
fn rank_key(episode: &Episode, current_session: Option<&str>) -> f64 {
    let affinity = match (episode.session_id.as_deref(), current_session) {
        (Some(own), Some(current)) if own == current => RETRIEVAL_SESSION_AFFINITY_SAME,
        _ => RETRIEVAL_SESSION_AFFINITY_OTHER,
    };
    episode.importance + affinity
}

/// Strip large blobs and truncate long strings before persistence.
#[must_use]
pub fn sanitize_context(metadata: &Value) -> Value {
    match metadata {
        Value::String(text) => {
            if text.len() > EPISODE_CONTEXT_BLOB_BYTES_MAX {
                Value::String("[blob stripped]".to_string())
            } else if text.len() > EPISODE_CONTEXT_STRING_BYTES_MAX {
                let mut end = EPISODE_CONTEXT_STRING_BYTES_MAX;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                Value::String(text[..end].to_string())
            } else {
                metadata.clone()
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), sanitize_context(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_context).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::SimConfig;
    use crate::store::SimTierStore;
    use serde_json::json;

    fn manager() -> (EpisodicMemory, Arc<SimTierStore>, Clock) {
        let clock = Clock::simulated(1_700_000_000_000);
        let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
        let manager =
            EpisodicMemory::new(Arc::clone(&store) as Arc<dyn TierStore>, clock.clone());
        (manager, store, clock)
    }

    fn scope() -> ScopeKey {
        ScopeKey::new(1, "u1")
    }

    #[tokio::test]
    async fn test_store_classifies_and_scores() {
        let (manager, _store, _clock) = manager();

        let outcome = manager
            .store_episode(
                &scope(),
                Some("s1"),
                json!({"query": "why did the build error out?"}),
                &json!({"is_error": false}),
            )
            .await;

        assert!(outcome.stored);
        assert_eq!(outcome.episode_type, EpisodeType::Error);
        assert!((0.0..=1.0).contains(&outcome.importance));
    }

    #[tokio::test]
    async fn test_store_failure_is_soft() {
        use crate::dst::{FaultConfig, FaultType};

        let clock = Clock::simulated(0);
        let store = Arc::new(
            SimTierStore::new(SimConfig::with_seed(42))
                .with_faults(FaultConfig::new(FaultType::StorageWriteFail, 1.0)),
        );
        let manager = EpisodicMemory::new(store as Arc<dyn TierStore>, clock);

        let outcome = manager
            .store_episode(&scope(), None, json!({"query": "hi"}), &json!({}))
            .await;

        assert!(!outcome.stored);
        assert!(outcome.error.is_some());
        assert_eq!(manager.stats().store_failure_count, 1);
    }

    #[tokio::test]
    async fn test_retrieve_ranks_session_affinity() {
        let (manager, _store, _clock) = manager();

        manager
            .store_episode(&scope(), Some("s1"), json!({"query": "one"}), &json!({}))
            .await;
        manager
            .store_episode(&scope(), Some("s2"), json!({"query": "two"}), &json!({}))
            .await;

        let results = manager
            .retrieve(&EpisodeQuery::new(1, "u1"), Some("s2"))
            .await;

        assert_eq!(results.len(), 2);
        // Same importance, so the current session ranks first
        assert_eq!(results[0].session_id.as_deref(), Some("s2"));
    }

    #[tokio::test]
    async fn test_retrieve_failure_degrades_to_empty() {
        use crate::dst::{FaultConfig, FaultType};

        let clock = Clock::simulated(0);
        let store = Arc::new(
            SimTierStore::new(SimConfig::with_seed(42))
                .with_faults(FaultConfig::new(FaultType::StorageReadFail, 1.0).with_filter("query")),
        );
        let manager = EpisodicMemory::new(store as Arc<dyn TierStore>, clock);

        let results = manager.retrieve(&EpisodeQuery::new(1, "u1"), None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_promotion_discovery_unconditional() {
        let (manager, store, _clock) = manager();

        let episode = Episode::builder(1, "u1")
            .episode_type(EpisodeType::Discovery)
            .importance(0.9)
            .build();
        store.insert_episode(&episode).await.unwrap();

        assert!(manager.evaluate_promotion(&episode.id).await);
        // One-way: a second evaluation cannot promote again
        assert!(!manager.evaluate_promotion(&episode.id).await);
    }

    #[tokio::test]
    async fn test_promotion_below_threshold_skipped() {
        let (manager, store, _clock) = manager();

        let episode = Episode::builder(1, "u1")
            .episode_type(EpisodeType::Discovery)
            .importance(0.5)
            .build();
        store.insert_episode(&episode).await.unwrap();

        assert!(!manager.evaluate_promotion(&episode.id).await);
    }

    #[tokio::test]
    async fn test_promotion_success_needs_satisfaction() {
        let (manager, store, _clock) = manager();

        let low = Episode::builder(1, "u1")
            .episode_type(EpisodeType::Success)
            .importance(0.9)
            .satisfaction(Some(0.5))
            .build();
        store.insert_episode(&low).await.unwrap();
        assert!(!manager.evaluate_promotion(&low.id).await);

        let high = Episode::builder(1, "u1")
            .episode_type(EpisodeType::Success)
            .importance(0.9)
            .satisfaction(Some(0.8))
            .build();
        store.insert_episode(&high).await.unwrap();
        assert!(manager.evaluate_promotion(&high.id).await);
    }

    #[tokio::test]
    async fn test_promotion_by_similarity() {
        let (manager, store, clock) = manager();

        // Four similar conversation episodes within the window
        let mut target_id = String::new();
        for i in 0..4 {
            let episode = Episode::builder(1, "u1")
                .episode_type(EpisodeType::Conversation)
                .importance(0.85)
                .created_at(clock.now())
                .build();
            store.insert_episode(&episode).await.unwrap();
            if i == 3 {
                target_id = episode.id.clone();
            }
        }

        assert!(manager.evaluate_promotion(&target_id).await);
    }

    #[tokio::test]
    async fn test_similarity_requires_close_importance() {
        let (manager, store, clock) = manager();

        // Peers are high-importance but far from the target's score
        for _ in 0..3 {
            let episode = Episode::builder(1, "u1")
                .episode_type(EpisodeType::Conversation)
                .importance(1.0)
                .created_at(clock.now())
                .build();
            store.insert_episode(&episode).await.unwrap();
        }

        let target = Episode::builder(1, "u1")
            .episode_type(EpisodeType::Conversation)
            .importance(0.82)
            .created_at(clock.now())
            .build();
        store.insert_episode(&target).await.unwrap();

        assert!(!manager.evaluate_promotion(&target.id).await);
    }

    #[tokio::test]
    async fn test_consolidation_adjusts_weights_and_promotes() {
        let (manager, store, clock) = manager();

        for _ in 0..4 {
            let episode = Episode::builder(1, "u1")
                .episode_type(EpisodeType::Conversation)
                .importance(0.85)
                .satisfaction(Some(0.9))
                .created_at(clock.now())
                .build();
            store.insert_episode(&episode).await.unwrap();
        }

        let before = manager.type_weight(1, "u1", EpisodeType::Conversation);
        let report = manager.consolidate(1, "u1").await;
        let after = manager.type_weight(1, "u1", EpisodeType::Conversation);

        assert_eq!(report.weights_adjusted, 1);
        assert_eq!(report.reevaluated, 4);
        assert!(report.promoted >= 3, "similar episodes should promote");
        assert!(after > before, "strong history should raise the weight");
    }

    #[tokio::test]
    async fn test_metadata_tier_override() {
        let (manager, store, _clock) = manager();

        let outcome = manager
            .store_episode(
                &scope(),
                None,
                json!({"query": "scratch note"}),
                &json!({"tier": "working"}),
            )
            .await;

        let episode = store
            .get_episode(outcome.id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(episode.tier, crate::store::MemoryTier::Working);
    }

    #[test]
    fn test_sanitize_truncates_and_strips() {
        let long_string = "x".repeat(600);
        let blob = "y".repeat(20_000);
        let metadata = json!({
            "note": long_string,
            "screenshot": blob,
            "nested": {"inner": "ok"},
            "count": 3,
        });

        let sanitized = sanitize_context(&metadata);

        let note = sanitized["note"].as_str().unwrap();
        assert_eq!(note.len(), EPISODE_CONTEXT_STRING_BYTES_MAX);
        assert_eq!(sanitized["screenshot"].as_str().unwrap(), "[blob stripped]");
        assert_eq!(sanitized["nested"]["inner"].as_str().unwrap(), "ok");
        assert_eq!(sanitized["count"].as_u64().unwrap(), 3);
    }
}

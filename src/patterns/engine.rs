//! PatternEngine - Per-Scope Discovery and Retrieval Enhancement
//!
//! `TigerStyle`: One engine per (agent, user) scope. The four analyzers run
//! concurrently and independently; their merged candidates pass the
//! confidence/support gate before upsert, and the stored set is capped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Timelike;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{
    PATTERN_ANALYSIS_WINDOW_COUNT_MAX, PATTERN_BOOST_COMPLEXITY_MAX, PATTERN_BOOST_DOMAIN_MATCH,
    PATTERN_BOOST_PEAK_HOUR_MATCH, PATTERN_BOOST_TOTAL_MAX,
    PATTERN_CONFIDENCE_THRESHOLD_DEFAULT, PATTERN_SCOPE_COUNT_MAX,
    PATTERN_SUPPORT_COUNT_MIN_DEFAULT,
};
use crate::store::{
    DiscoveredPattern, Episode, EpisodeQuery, PatternCategory, TierStore,
};

use super::analyzer::{AnalysisWindow, CandidatePattern, PatternAnalyzer};
use super::behavioral::BehavioralAnalyzer;
use super::contextual::ContextualAnalyzer;
use super::cross_memory::CrossMemoryAnalyzer;
use super::temporal::TemporalAnalyzer;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for pattern discovery.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Confidence below which candidates are discarded
    pub confidence_threshold: f64,
    /// Support below which candidates are discarded
    pub support_min: u64,
    /// Maximum stored patterns per scope
    pub scope_pattern_cap: usize,
    /// Episodes examined per analysis pass
    pub window_limit: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: PATTERN_CONFIDENCE_THRESHOLD_DEFAULT,
            support_min: PATTERN_SUPPORT_COUNT_MIN_DEFAULT,
            scope_pattern_cap: PATTERN_SCOPE_COUNT_MAX,
            window_limit: PATTERN_ANALYSIS_WINDOW_COUNT_MAX,
        }
    }
}

impl PatternConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "confidence threshold must be in [0, 1]"
        );
        self.confidence_threshold = threshold;
        self
    }

    /// Set the minimum support.
    #[must_use]
    pub fn with_support_min(mut self, support_min: u64) -> Self {
        self.support_min = support_min;
        self
    }

    /// Set the per-scope pattern cap.
    #[must_use]
    pub fn with_scope_cap(mut self, cap: usize) -> Self {
        assert!(cap > 0, "scope cap must be positive");
        self.scope_pattern_cap = cap;
        self
    }
}

// =============================================================================
// Enhancement output
// =============================================================================

/// One retrieved episode with pattern-derived relevance.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedEpisode {
    /// The underlying episode
    pub episode: Episode,
    /// Importance plus the capped pattern boost
    pub relevance: f64,
    /// The boost contribution alone
    pub pattern_boost: f64,
    /// Descriptions of the patterns that matched
    pub matched_patterns: Vec<String>,
}

/// A pattern-derived suggestion synthesized during enhancement.
#[derive(Debug, Clone, Serialize)]
pub struct PatternSuggestion {
    /// Human-readable suggestion text
    pub description: String,
    /// Source pattern category
    pub category: PatternCategory,
    /// Source pattern confidence
    pub confidence: f64,
}

/// Output of `enhance_retrieval`.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedRetrieval {
    /// Episodes re-ranked by relevance
    pub memories: Vec<RetrievedEpisode>,
    /// Synthesized suggestions from the strongest patterns
    pub suggestions: Vec<PatternSuggestion>,
}

/// Aggregate pattern-engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PatternStats {
    /// Analysis passes run
    pub analyses_run: u64,
    /// Candidates produced across all passes
    pub candidates_seen: u64,
    /// Patterns written to the store
    pub patterns_persisted: u64,
    /// Periodic refresh cycles completed
    pub refresh_cycles: u64,
    /// Configured confidence threshold
    pub confidence_threshold: f64,
    /// Configured minimum support
    pub support_min: u64,
}

// =============================================================================
// PatternEngine
// =============================================================================

/// Per-scope pattern discovery engine.
pub struct PatternEngine {
    agent_id: i64,
    user_id: String,
    store: Arc<dyn TierStore>,
    config: PatternConfig,
    analyzers: Vec<Box<dyn PatternAnalyzer>>,
    analyses_run: AtomicU64,
    candidates_seen: AtomicU64,
    patterns_persisted: AtomicU64,
    refresh_cycles: AtomicU64,
}

impl PatternEngine {
    /// Create an engine for a scope with the default analyzer set.
    #[must_use]
    pub fn new(agent_id: i64, user_id: impl Into<String>, store: Arc<dyn TierStore>) -> Self {
        Self::with_config(agent_id, user_id, store, PatternConfig::default())
    }

    /// Create an engine with explicit configuration.
    #[must_use]
    pub fn with_config(
        agent_id: i64,
        user_id: impl Into<String>,
        store: Arc<dyn TierStore>,
        config: PatternConfig,
    ) -> Self {
        Self {
            agent_id,
            user_id: user_id.into(),
            store,
            config,
            analyzers: vec![
                Box::new(TemporalAnalyzer),
                Box::new(ContextualAnalyzer),
                Box::new(CrossMemoryAnalyzer),
                Box::new(BehavioralAnalyzer),
            ],
            analyses_run: AtomicU64::new(0),
            candidates_seen: AtomicU64::new(0),
            patterns_persisted: AtomicU64::new(0),
            refresh_cycles: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Analyze the recent window using the configured confidence threshold.
    pub async fn analyze_recent(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<DiscoveredPattern> {
        self.analyze_recent_tuned(now, self.config.confidence_threshold)
            .await
    }

    /// Analyze the recent episode window and upsert qualifying patterns.
    ///
    /// The confidence threshold is supplied by the caller so the evolution
    /// engine's live recognition strategy can tune it. Returns the patterns
    /// persisted by this pass. All storage failures are soft: they log and
    /// skip.
    #[tracing::instrument(skip(self), fields(agent_id = self.agent_id))]
    pub async fn analyze_recent_tuned(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        confidence_threshold: f64,
    ) -> Vec<DiscoveredPattern> {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&confidence_threshold),
            "confidence_threshold must be in [0, 1]"
        );
        let mut query = EpisodeQuery::new(self.agent_id, self.user_id.clone()).with_promoted();
        query.limit = self.config.window_limit;

        let episodes = match self.store.query_episodes(&query).await {
            Ok(episodes) => episodes,
            Err(error) => {
                tracing::warn!(%error, "pattern window query failed");
                return Vec::new();
            }
        };
        if episodes.is_empty() {
            return Vec::new();
        }

        self.analyses_run.fetch_add(1, Ordering::Relaxed);
        let window = AnalysisWindow::new(episodes);

        // The four analyzers run concurrently and independently; merge
        // order carries no meaning.
        let results = join_all(self.analyzers.iter().map(|analyzer| {
            let window = &window;
            async move { analyzer.analyze(window) }
        }))
        .await;

        let candidates: Vec<CandidatePattern> = results.into_iter().flatten().collect();
        self.candidates_seen
            .fetch_add(candidates.len() as u64, Ordering::Relaxed);

        self.persist_candidates(candidates, now, confidence_threshold)
            .await
    }

    /// Upsert candidates that pass the confidence/support gate.
    async fn persist_candidates(
        &self,
        candidates: Vec<CandidatePattern>,
        now: chrono::DateTime<chrono::Utc>,
        confidence_threshold: f64,
    ) -> Vec<DiscoveredPattern> {
        let qualifying: Vec<CandidatePattern> = candidates
            .into_iter()
            .filter(|c| {
                c.confidence >= confidence_threshold && c.support >= self.config.support_min
            })
            .collect();
        if qualifying.is_empty() {
            return Vec::new();
        }

        let existing = match self
            .store
            .list_patterns(self.agent_id, &self.user_id, self.config.scope_pattern_cap)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                tracing::warn!(%error, "existing pattern query failed");
                return Vec::new();
            }
        };
        let mut existing_confidence: std::collections::HashMap<(PatternCategory, String), f64> =
            existing
                .iter()
                .map(|p| ((p.category, p.description.clone()), p.confidence))
                .collect();
        let mut stored_count = existing.len();

        let mut persisted = Vec::new();
        for candidate in qualifying {
            let key = (candidate.category, candidate.description.clone());

            match existing_confidence.get(&key) {
                // Replace only with equal-or-higher confidence
                Some(previous) if candidate.confidence < *previous => continue,
                Some(_) => {}
                None => {
                    // New pattern: respect the per-scope cap
                    if stored_count >= self.config.scope_pattern_cap {
                        tracing::debug!("pattern cap reached, skipping new pattern");
                        continue;
                    }
                    stored_count += 1;
                }
            }

            let pattern = DiscoveredPattern::new(
                self.agent_id,
                self.user_id.clone(),
                candidate.category,
                candidate.descriptor,
                candidate.description,
                candidate.confidence,
                candidate.support,
                candidate.parameters,
                now,
            );

            match self.store.upsert_pattern(&pattern).await {
                Ok(()) => {
                    existing_confidence.insert(key, pattern.confidence);
                    self.patterns_persisted.fetch_add(1, Ordering::Relaxed);
                    persisted.push(pattern);
                }
                Err(error) => {
                    tracing::warn!(%error, "pattern upsert failed");
                }
            }
        }

        persisted
    }

    /// Periodic cycle: re-evaluate all patterns against the current window.
    pub async fn refresh_patterns(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<DiscoveredPattern> {
        self.refresh_cycles.fetch_add(1, Ordering::Relaxed);
        self.analyze_recent(now).await
    }

    // =========================================================================
    // Retrieval enhancement
    // =========================================================================

    /// Apply stored patterns to retrieved episodes.
    ///
    /// Each episode's relevance is its importance plus a capped boost from
    /// matching patterns; the result is re-ranked by relevance.
    pub async fn enhance_retrieval(&self, episodes: &[Episode]) -> EnhancedRetrieval {
        let patterns = match self
            .store
            .list_patterns(self.agent_id, &self.user_id, self.config.scope_pattern_cap)
            .await
        {
            Ok(patterns) => patterns,
            Err(error) => {
                tracing::warn!(%error, "pattern list failed, enhancement skipped");
                Vec::new()
            }
        };

        let mut memories: Vec<RetrievedEpisode> = episodes
            .iter()
            .map(|episode| {
                let (boost, matched) = pattern_boost(episode, &patterns);
                RetrievedEpisode {
                    relevance: (episode.importance + boost).min(1.0 + PATTERN_BOOST_TOTAL_MAX),
                    pattern_boost: boost,
                    matched_patterns: matched,
                    episode: episode.clone(),
                }
            })
            .collect();

        memories.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.episode.id.cmp(&b.episode.id))
        });

        let suggestions = synthesize_suggestions(&patterns);
        EnhancedRetrieval {
            memories,
            suggestions,
        }
    }

    /// Aggregate statistics. Read-only, no side effects.
    #[must_use]
    pub fn stats(&self) -> PatternStats {
        PatternStats {
            analyses_run: self.analyses_run.load(Ordering::Relaxed),
            candidates_seen: self.candidates_seen.load(Ordering::Relaxed),
            patterns_persisted: self.patterns_persisted.load(Ordering::Relaxed),
            refresh_cycles: self.refresh_cycles.load(Ordering::Relaxed),
            confidence_threshold: self.config.confidence_threshold,
            support_min: self.config.support_min,
        }
    }
}

/// Compute the capped boost for one episode against the stored patterns.
fn pattern_boost(episode: &Episode, patterns: &[DiscoveredPattern]) -> (f64, Vec<String>) {
    let mut boost = 0.0;
    let mut matched = Vec::new();

    for pattern in patterns {
        let contribution = match pattern.descriptor.as_str() {
            "domain_preference" => {
                let pattern_domain = pattern.parameters.get("domain").and_then(Value::as_str);
                let episode_domain = episode.context.get("domain").and_then(Value::as_str);
                match (pattern_domain, episode_domain) {
                    (Some(a), Some(b)) if a == b => PATTERN_BOOST_DOMAIN_MATCH,
                    _ => 0.0,
                }
            }
            "time_of_day" => {
                let peak_hour = pattern.parameters.get("peak_hour").and_then(Value::as_u64);
                match peak_hour {
                    Some(peak) if peak == u64::from(episode.created_at.hour()) => {
                        PATTERN_BOOST_PEAK_HOUR_MATCH
                    }
                    _ => 0.0,
                }
            }
            "complexity_profile" => {
                let mean = pattern
                    .parameters
                    .get("mean_complexity")
                    .and_then(Value::as_f64);
                let complexity = episode.context.get("complexity").and_then(Value::as_f64);
                match (mean, complexity) {
                    (Some(mean), Some(complexity)) => {
                        let similarity = (1.0 - 2.0 * (mean - complexity).abs()).max(0.0);
                        PATTERN_BOOST_COMPLEXITY_MAX * similarity
                    }
                    _ => 0.0,
                }
            }
            _ => 0.0,
        };

        if contribution > 0.0 {
            boost += contribution;
            matched.push(pattern.description.clone());
        }
    }

    (boost.min(PATTERN_BOOST_TOTAL_MAX), matched)
}

/// Build advisory suggestions from the strongest patterns.
fn synthesize_suggestions(patterns: &[DiscoveredPattern]) -> Vec<PatternSuggestion> {
    // Patterns arrive sorted by confidence descending
    patterns
        .iter()
        .take(3)
        .map(|pattern| {
            let description = match pattern.descriptor.as_str() {
                "time_of_day" => {
                    let hour = pattern
                        .parameters
                        .get("peak_hour")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    format!("user is typically active around hour {hour}")
                }
                "domain_preference" => {
                    let domain = pattern
                        .parameters
                        .get("domain")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    format!("user often works in the {domain} domain")
                }
                "preferred_behavior" => {
                    let behavior = pattern
                        .parameters
                        .get("episode_type")
                        .and_then(Value::as_str)
                        .unwrap_or("conversation");
                    format!("interactions tend toward {behavior}")
                }
                _ => pattern.description.clone(),
            };

            PatternSuggestion {
                description,
                category: pattern.category,
                confidence: pattern.confidence,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::SimConfig;
    use crate::store::{Episode, SimTierStore};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn engine_with_store() -> (PatternEngine, Arc<SimTierStore>) {
        let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
        let engine = PatternEngine::new(1, "u1", Arc::clone(&store) as Arc<dyn TierStore>);
        (engine, store)
    }

    fn episode_at_hour(hour: u32, minute: u32) -> Episode {
        Episode::builder(1, "u1")
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap())
            .build()
    }

    #[tokio::test]
    async fn test_same_hour_scenario_discovers_time_of_day() {
        let (engine, store) = engine_with_store();

        for minute in 0..5 {
            store
                .insert_episode(&episode_at_hour(14, minute))
                .await
                .unwrap();
        }

        let persisted = engine.analyze_recent(Utc::now()).await;
        let time_of_day = persisted
            .iter()
            .find(|p| p.descriptor == "time_of_day")
            .expect("time_of_day pattern must persist");

        assert_eq!(time_of_day.support, 5);
        assert_eq!(time_of_day.confidence, 1.0);
        assert_eq!(time_of_day.parameters["peak_hour"], 14);
    }

    #[tokio::test]
    async fn test_threshold_gate_blocks_weak_candidates() {
        let (engine, store) = engine_with_store();

        // Two episodes in different hours: every candidate has support < 3
        store.insert_episode(&episode_at_hour(9, 0)).await.unwrap();
        store.insert_episode(&episode_at_hour(15, 0)).await.unwrap();

        let persisted = engine.analyze_recent(Utc::now()).await;
        assert!(persisted.is_empty());
        assert_eq!(store.count_patterns(1, "u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lower_confidence_does_not_replace() {
        let (engine, store) = engine_with_store();

        // Five same-hour episodes: confidence 1.0
        for minute in 0..5 {
            store
                .insert_episode(&episode_at_hour(14, minute))
                .await
                .unwrap();
        }
        engine.analyze_recent(Utc::now()).await;

        // Dilute the cluster: confidence drops below 1.0
        for hour in [1, 2, 3] {
            store.insert_episode(&episode_at_hour(hour, 0)).await.unwrap();
        }
        engine.analyze_recent(Utc::now()).await;

        let patterns = store.list_patterns(1, "u1", 10).await.unwrap();
        let time_of_day = patterns
            .iter()
            .find(|p| p.descriptor == "time_of_day")
            .unwrap();
        assert_eq!(time_of_day.confidence, 1.0, "weaker version must not replace");
    }

    #[tokio::test]
    async fn test_scope_cap_blocks_new_patterns() {
        let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
        let engine = PatternEngine::with_config(
            1,
            "u1",
            Arc::clone(&store) as Arc<dyn TierStore>,
            PatternConfig::default().with_scope_cap(1),
        );

        for minute in 0..5 {
            store
                .insert_episode(&episode_at_hour(14, minute))
                .await
                .unwrap();
        }

        engine.analyze_recent(Utc::now()).await;
        assert_eq!(store.count_patterns(1, "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enhancement_boosts_matching_hour() {
        let (engine, store) = engine_with_store();

        for minute in 0..5 {
            store
                .insert_episode(&episode_at_hour(14, minute))
                .await
                .unwrap();
        }
        engine.analyze_recent(Utc::now()).await;

        let at_peak = episode_at_hour(14, 30);
        let off_peak = episode_at_hour(3, 0);
        let enhanced = engine
            .enhance_retrieval(&[at_peak.clone(), off_peak.clone()])
            .await;

        let peak_entry = enhanced
            .memories
            .iter()
            .find(|m| m.episode.id == at_peak.id)
            .unwrap();
        let off_entry = enhanced
            .memories
            .iter()
            .find(|m| m.episode.id == off_peak.id)
            .unwrap();

        assert!(peak_entry.pattern_boost >= PATTERN_BOOST_PEAK_HOUR_MATCH);
        assert_eq!(off_entry.pattern_boost, 0.0);
        assert!(peak_entry.relevance > off_entry.relevance);
        assert!(!enhanced.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_boost_capped() {
        let patterns = vec![
            DiscoveredPattern::new(
                1,
                "u1",
                PatternCategory::Contextual,
                "domain_preference",
                "preferred domain coding",
                0.9,
                5,
                json!({"domain": "coding"}),
                Utc::now(),
            ),
            DiscoveredPattern::new(
                1,
                "u1",
                PatternCategory::Temporal,
                "time_of_day",
                "peak activity at hour 14",
                0.9,
                5,
                json!({"peak_hour": 14}),
                Utc::now(),
            ),
            DiscoveredPattern::new(
                1,
                "u1",
                PatternCategory::Contextual,
                "complexity_profile",
                "consistent task complexity",
                0.9,
                5,
                json!({"mean_complexity": 0.5}),
                Utc::now(),
            ),
        ];

        let episode = Episode::builder(1, "u1")
            .context(json!({"domain": "coding", "complexity": 0.5}))
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap())
            .build();

        // 0.3 + 0.2 + 0.2 = 0.7, capped at the total max
        let (boost, matched) = pattern_boost(&episode, &patterns);
        assert_eq!(boost, PATTERN_BOOST_TOTAL_MAX);
        assert_eq!(matched.len(), 3);
    }

    #[tokio::test]
    async fn test_stats_track_activity() {
        let (engine, store) = engine_with_store();
        for minute in 0..5 {
            store
                .insert_episode(&episode_at_hour(14, minute))
                .await
                .unwrap();
        }

        engine.analyze_recent(Utc::now()).await;
        engine.refresh_patterns(Utc::now()).await;

        let stats = engine.stats();
        assert_eq!(stats.analyses_run, 2);
        assert_eq!(stats.refresh_cycles, 1);
        assert!(stats.patterns_persisted >= 1);
    }
}

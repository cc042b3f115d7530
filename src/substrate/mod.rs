//! Substrate - The Public Orchestrator
//!
//! `TigerStyle`: Every call passes the isolation gate before touching a
//! tier. Episode storage fires detached promotion and pattern-analysis
//! tasks whose failures are logged, never surfaced. Interval cycles
//! (consolidation, security scan, pattern refresh, evolution) are driven
//! off the injected clock by `run_maintenance`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       MemorySubstrate                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ IsolationLayer │ EpisodicMemory │ PatternEngine │ Evolution   │
//! │    (gate)      │  (store/rank)  │  (per scope)  │ (per scope) │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     TierStore (sim / postgres)                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;

pub use config::SubstrateConfig;
pub use events::{EventBus, EventEmitter, MemoryEvent};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dst::Clock;
use crate::episodic::{EpisodicMemory, EpisodicStats, StoreOutcome};
use crate::evolution::{EvolutionEngine, EvolutionStats, PerformanceSnapshot, StrategyKind};
use crate::isolation::{AccessDecision, IsolationLayer, IsolationStats};
use crate::patterns::{PatternEngine, PatternStats, PatternSuggestion, RetrievedEpisode};
use crate::scope::{ScopeKey, ScopeRegistry};
use crate::store::{EpisodeQuery, EpisodeType, MemoryTier, TierStore};

// =============================================================================
// Request context and options
// =============================================================================

/// The caller-supplied context every operation carries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Owning agent
    pub agent_id: i64,
    /// Owning user
    pub user_id: String,
    /// Session for affinity ranking
    pub session_id: Option<String>,
    /// Thread for context derivation
    pub thread_id: Option<String>,
}

impl RequestContext {
    /// Create a context for an agent/user pair.
    #[must_use]
    pub fn new(agent_id: i64, user_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            user_id: user_id.into(),
            session_id: None,
            thread_id: None,
        }
    }

    /// Attach a session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach a thread id.
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// The scope key this context derives to.
    #[must_use]
    pub fn scope_key(&self) -> ScopeKey {
        let key = ScopeKey::new(self.agent_id, self.user_id.clone());
        match &self.thread_id {
            Some(thread_id) => key.with_thread(thread_id.clone()),
            None => key,
        }
    }
}

/// Options for a retrieve call.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Substring text query over episode content
    pub text: Option<String>,
    /// Minimum importance
    pub min_importance: f64,
    /// Restrict to one episode type
    pub episode_type: Option<EpisodeType>,
    /// Restrict to one session
    pub session_id: Option<String>,
    /// Only episodes created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only episodes created before this instant
    pub until: Option<DateTime<Utc>>,
    /// Include promoted episodes
    pub include_promoted: bool,
    /// Result limit (0 = default)
    pub limit: usize,
}

impl RetrieveOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a text query.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
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

    /// Restrict to one episode type.
    #[must_use]
    pub fn with_type(mut self, episode_type: EpisodeType) -> Self {
        self.episode_type = Some(episode_type);
        self
    }

    /// Include promoted episodes.
    #[must_use]
    pub fn with_promoted(mut self) -> Self {
        self.include_promoted = true;
        self
    }

    /// Set the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "limit must be positive");
        self.limit = limit;
        self
    }
}

// =============================================================================
// Results and reports
// =============================================================================

/// Result of a retrieve call.
///
/// Denials arrive as a value in `decision`, never as an error.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResult {
    /// The isolation decision for this call
    pub decision: AccessDecision,
    /// Episodes ranked by pattern-enhanced relevance
    pub memories: Vec<RetrievedEpisode>,
    /// Pattern-derived suggestions
    pub suggestions: Vec<PatternSuggestion>,
}

impl RetrieveResult {
    fn denied(decision: AccessDecision) -> Self {
        Self {
            decision,
            memories: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    /// Consolidation cycles run
    pub consolidations: usize,
    /// Contexts scanned for contamination
    pub contexts_scanned: usize,
    /// Pattern refresh cycles run
    pub pattern_refreshes: usize,
    /// Evolution cycles run
    pub evolution_cycles: usize,
    /// Idle per-scope states evicted
    pub scopes_evicted: usize,
    /// Expired sharing rules pruned
    pub rules_pruned: usize,
}

/// Aggregate substrate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubstrateStats {
    /// Live pattern-engine scopes
    pub scope_count: usize,
    /// Store calls accepted
    pub store_count: u64,
    /// Retrieve calls accepted
    pub retrieve_count: u64,
    /// Fraction of retrievals returning at least one episode
    pub retrieval_hit_rate: f64,
    /// Mean response time across operations
    pub avg_response_time_ms: f64,
    /// Notifications dropped by backpressure
    pub events_dropped: u64,
}

#[derive(Debug, Default)]
struct TierOps {
    working: AtomicU64,
    episodic: AtomicU64,
    semantic: AtomicU64,
    procedural: AtomicU64,
}

impl TierOps {
    fn bump(&self, tier: MemoryTier) {
        let counter = match tier {
            MemoryTier::Working => &self.working,
            MemoryTier::Episodic => &self.episodic,
            MemoryTier::Semantic => &self.semantic,
            MemoryTier::Procedural => &self.procedural,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn shares(&self) -> std::collections::BTreeMap<String, f64> {
        let counts = [
            (MemoryTier::Working, self.working.load(Ordering::Relaxed)),
            (MemoryTier::Episodic, self.episodic.load(Ordering::Relaxed)),
            (MemoryTier::Semantic, self.semantic.load(Ordering::Relaxed)),
            (
                MemoryTier::Procedural,
                self.procedural.load(Ordering::Relaxed),
            ),
        ];
        let total: u64 = counts.iter().map(|(_, count)| count).sum();

        counts
            .iter()
            .map(|(tier, count)| {
                let share = if total == 0 {
                    0.25
                } else {
                    *count as f64 / total as f64
                };
                (tier.as_str().to_string(), share)
            })
            .collect()
    }
}

// =============================================================================
// MemorySubstrate
// =============================================================================

/// The self-tuning, isolated, multi-tier memory substrate.
pub struct MemorySubstrate {
    store: Arc<dyn TierStore>,
    clock: Clock,
    config: SubstrateConfig,
    isolation: Arc<IsolationLayer>,
    episodic: Arc<EpisodicMemory>,
    engines: ScopeRegistry<PatternEngine>,
    evolvers: ScopeRegistry<EvolutionEngine>,
    events: EventBus,
    tier_ops: TierOps,
    store_count: AtomicU64,
    retrieve_count: AtomicU64,
    retrieve_hit_count: AtomicU64,
    response_time_total_ms: AtomicU64,
    response_count: AtomicU64,
    last_consolidation_ms: AtomicU64,
    last_scan_ms: AtomicU64,
    last_refresh_ms: AtomicU64,
}

impl MemorySubstrate {
    /// Create a substrate with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn TierStore>, clock: Clock) -> Self {
        Self::with_config(store, clock, SubstrateConfig::default())
    }

    /// Create a substrate with explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn TierStore>, clock: Clock, config: SubstrateConfig) -> Self {
        let isolation = Arc::new(IsolationLayer::with_config(
            Arc::clone(&store),
            clock.clone(),
            config.isolation.clone(),
        ));
        let episodic = Arc::new(EpisodicMemory::with_config(
            Arc::clone(&store),
            clock.clone(),
            config.episodic.clone(),
        ));
        let now_ms = clock.now_ms();

        Self {
            isolation,
            episodic,
            engines: ScopeRegistry::new(clock.clone()),
            evolvers: ScopeRegistry::new(clock.clone()),
            events: EventBus::new(config.events_capacity),
            tier_ops: TierOps::default(),
            store_count: AtomicU64::new(0),
            retrieve_count: AtomicU64::new(0),
            retrieve_hit_count: AtomicU64::new(0),
            response_time_total_ms: AtomicU64::new(0),
            response_count: AtomicU64::new(0),
            last_consolidation_ms: AtomicU64::new(now_ms),
            last_scan_ms: AtomicU64::new(now_ms),
            last_refresh_ms: AtomicU64::new(now_ms),
            store,
            clock,
            config,
        }
    }

    /// The isolation layer, for context and sharing-rule management.
    #[must_use]
    pub fn isolation(&self) -> &Arc<IsolationLayer> {
        &self.isolation
    }

    /// Take the event receiver. Only the first caller gets it.
    #[must_use]
    pub fn subscribe(&self) -> Option<mpsc::Receiver<MemoryEvent>> {
        self.events.subscribe()
    }

    /// The pattern engine for a scope, created on demand.
    fn pattern_engine(&self, agent_id: i64, user_id: &str) -> Arc<PatternEngine> {
        self.engines.get_or_create(agent_id, user_id, || {
            PatternEngine::with_config(
                agent_id,
                user_id,
                Arc::clone(&self.store),
                self.config.patterns.clone(),
            )
        })
    }

    /// The evolution engine for a scope, created on demand.
    fn evolution_engine(&self, agent_id: i64, user_id: &str) -> Arc<EvolutionEngine> {
        self.evolvers.get_or_create(agent_id, user_id, || {
            EvolutionEngine::with_config(
                agent_id,
                user_id,
                Arc::clone(&self.store),
                self.clock.clone(),
                scope_seed(self.config.seed, agent_id, user_id),
                self.config.evolution.clone(),
            )
        })
    }

    fn track_response(&self, started_ms: u64) {
        let elapsed = self.clock.now_ms().saturating_sub(started_ms);
        self.response_time_total_ms
            .fetch_add(elapsed, Ordering::Relaxed);
        self.response_count.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Store one interaction event.
    ///
    /// The isolation check is synchronous; promotion evaluation and pattern
    /// analysis run as detached background tasks and never block or fail
    /// the caller.
    #[tracing::instrument(skip(self, content, metadata), fields(agent_id = ctx.agent_id))]
    pub async fn store(
        &self,
        ctx: &RequestContext,
        content: Value,
        metadata: Value,
    ) -> StoreOutcome {
        let started_ms = self.clock.now_ms();
        let key = ctx.scope_key();
        self.isolation.create_context(key.clone());

        let decision = self
            .isolation
            .validate_access(&key.derived_id(), "store", None, Some(&metadata))
            .await;
        if !decision.allowed {
            return StoreOutcome {
                stored: false,
                id: None,
                episode_type: EpisodeType::Conversation,
                importance: 0.0,
                satisfaction: None,
                error: Some(format!("access denied: {}", decision.reason)),
            };
        }

        let outcome = self
            .episodic
            .store_episode(&key, ctx.session_id.as_deref(), content, &metadata)
            .await;

        self.store_count.fetch_add(1, Ordering::Relaxed);
        self.tier_ops.bump(MemoryTier::Working);
        self.tier_ops.bump(MemoryTier::Episodic);
        self.track_response(started_ms);

        // The evolution engine's live strategies tune the thresholds the
        // background tasks run with; readers take cheap snapshots and
        // tolerate eventually-consistent values
        let evolver = self.evolution_engine(key.agent_id, &key.user_id);
        let promotion_threshold = evolver
            .strategies()
            .get(StrategyKind::MemoryConsolidation)
            .param("promotion_threshold");
        let confidence_threshold = evolver
            .strategies()
            .get(StrategyKind::PatternRecognition)
            .param("confidence_threshold");

        if outcome.stored {
            // Fire-and-forget: promotion evaluation
            if let Some(id) = outcome.id.clone() {
                if outcome.importance >= promotion_threshold {
                    let episodic = Arc::clone(&self.episodic);
                    tokio::spawn(async move {
                        let _ = episodic
                            .evaluate_promotion_with_threshold(&id, promotion_threshold)
                            .await;
                    });
                }
            }

            // Fire-and-forget: pattern analysis
            let engine = self.pattern_engine(key.agent_id, &key.user_id);
            let emitter = self.events.emitter();
            let now = self.clock.now();
            let (agent_id, user_id) = (key.agent_id, key.user_id.clone());
            self.tier_ops.bump(MemoryTier::Procedural);
            tokio::spawn(async move {
                let discovered = engine.analyze_recent_tuned(now, confidence_threshold).await;
                if !discovered.is_empty() {
                    emitter.emit(MemoryEvent::PatternsDiscovered {
                        agent_id,
                        user_id,
                        count: discovered.len(),
                        descriptors: discovered.iter().map(|p| p.descriptor.clone()).collect(),
                    });
                }
            });
        }

        outcome
    }

    // =========================================================================
    // Retrieve
    // =========================================================================

    /// Retrieve episodes for a context, pattern-enhanced and ranked.
    #[tracing::instrument(skip(self, options), fields(agent_id = ctx.agent_id))]
    pub async fn retrieve(&self, ctx: &RequestContext, options: RetrieveOptions) -> RetrieveResult {
        let started_ms = self.clock.now_ms();
        let key = ctx.scope_key();
        self.isolation.create_context(key.clone());

        let decision = self
            .isolation
            .validate_access(&key.derived_id(), "retrieve", None, None)
            .await;
        if !decision.allowed {
            return RetrieveResult::denied(decision);
        }

        let mut query = EpisodeQuery::new(ctx.agent_id, ctx.user_id.clone())
            .with_min_importance(options.min_importance);
        if let Some(episode_type) = options.episode_type {
            query = query.with_type(episode_type);
        }
        if let Some(ref session_id) = options.session_id {
            query = query.with_session(session_id.clone());
        }
        if let Some(since) = options.since {
            query = query.with_since(since);
        }
        if let Some(until) = options.until {
            query = query.with_until(until);
        }
        if options.include_promoted {
            query = query.with_promoted();
        }
        if options.limit > 0 {
            query = query.with_limit(options.limit);
        }

        let current_session = ctx.session_id.as_deref();
        let episodes = match options.text.as_deref() {
            Some(needle) => {
                self.episodic
                    .retrieve_text(&query, needle, current_session)
                    .await
            }
            None => self.episodic.retrieve(&query, current_session).await,
        };

        self.retrieve_count.fetch_add(1, Ordering::Relaxed);
        if !episodes.is_empty() {
            self.retrieve_hit_count.fetch_add(1, Ordering::Relaxed);
        }
        self.tier_ops.bump(MemoryTier::Episodic);
        if options.include_promoted {
            self.tier_ops.bump(MemoryTier::Semantic);
        }

        let engine = self.pattern_engine(key.agent_id, &key.user_id);
        let enhanced = engine.enhance_retrieval(&episodes).await;
        self.track_response(started_ms);

        RetrieveResult {
            decision,
            memories: enhanced.memories,
            suggestions: enhanced.suggestions,
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drive every due interval cycle.
    ///
    /// Call this periodically (or after advancing a simulated clock). Each
    /// cycle runs at most once per pass and reschedules from the current
    /// clock reading.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let now_ms = self.clock.now_ms();
        let mut report = MaintenanceReport::default();
        let scopes = self.engines.keys();

        // Consolidation cycle
        if due(&self.last_consolidation_ms, now_ms, self.config.consolidation_interval_ms) {
            for (agent_id, user_id) in &scopes {
                self.episodic.consolidate(*agent_id, user_id).await;
                report.consolidations += 1;
            }
        }

        // Comprehensive security scan
        if due(&self.last_scan_ms, now_ms, self.config.security_scan_interval_ms) {
            let reports = self.isolation.run_security_scan().await;
            report.contexts_scanned = reports.len();
            for scan in reports {
                if scan.contaminated {
                    self.events
                        .emitter()
                        .emit(MemoryEvent::ContaminationDetected { report: scan });
                }
            }
        }

        // Pattern refresh cycle
        if due(&self.last_refresh_ms, now_ms, self.config.pattern_refresh_interval_ms) {
            let now = self.clock.now();
            for (agent_id, user_id) in &scopes {
                let engine = self.pattern_engine(*agent_id, user_id);
                engine.refresh_patterns(now).await;
                report.pattern_refreshes += 1;
            }
        }

        // Evolution: per-scope trigger decisions, never silent
        for (agent_id, user_id) in &scopes {
            let evolver = self.evolution_engine(*agent_id, user_id);
            if let Some(reason) = evolver.should_trigger() {
                let snapshot = self.performance_snapshot(*agent_id, user_id).await;
                let outcome = evolver.run_cycle(reason, &snapshot).await;
                self.events.emitter().emit(MemoryEvent::EvolutionCompleted {
                    agent_id: *agent_id,
                    user_id: user_id.clone(),
                    outcome,
                });
                report.evolution_cycles += 1;
            }
        }

        // Idle-state eviction and rule pruning
        report.scopes_evicted = self.engines.evict_idle()
            + self.evolvers.evict_idle()
            + self.episodic.evict_idle_scopes();
        report.rules_pruned = self.isolation.prune_expired_rules();

        report
    }

    /// Build the performance snapshot one evolution cycle evaluates.
    pub async fn performance_snapshot(&self, agent_id: i64, user_id: &str) -> PerformanceSnapshot {
        let total = self
            .store
            .count_episodes(agent_id, user_id)
            .await
            .unwrap_or(0);
        let promoted = self
            .store
            .count_promoted(agent_id, user_id)
            .await
            .unwrap_or(0);
        let promotion_rate = if total == 0 {
            0.0
        } else {
            promoted as f64 / total as f64
        };

        let engine_stats = self.pattern_engine(agent_id, user_id).stats();

        let response_count = self.response_count.load(Ordering::Relaxed);
        let avg_response_time_ms = if response_count == 0 {
            50.0
        } else {
            self.response_time_total_ms.load(Ordering::Relaxed) as f64 / response_count as f64
        };

        let retrievals = self.retrieve_count.load(Ordering::Relaxed);
        let retrieval_hit_rate = if retrievals == 0 {
            0.5
        } else {
            self.retrieve_hit_count.load(Ordering::Relaxed) as f64 / retrievals as f64
        };

        PerformanceSnapshot {
            avg_response_time_ms,
            retrieval_hit_rate,
            avg_retrieval_latency_ms: avg_response_time_ms,
            tier_usage_share: self.tier_ops.shares(),
            promotion_rate,
            patterns_discovered: engine_stats.patterns_persisted,
            analyses_run: engine_stats.analyses_run,
        }
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Aggregate substrate statistics. Read-only, no side effects.
    #[must_use]
    pub fn stats(&self) -> SubstrateStats {
        let retrievals = self.retrieve_count.load(Ordering::Relaxed);
        let hits = self.retrieve_hit_count.load(Ordering::Relaxed);
        let response_count = self.response_count.load(Ordering::Relaxed);

        SubstrateStats {
            scope_count: self.engines.len(),
            store_count: self.store_count.load(Ordering::Relaxed),
            retrieve_count: retrievals,
            retrieval_hit_rate: if retrievals == 0 {
                0.0
            } else {
                hits as f64 / retrievals as f64
            },
            avg_response_time_ms: if response_count == 0 {
                0.0
            } else {
                self.response_time_total_ms.load(Ordering::Relaxed) as f64 / response_count as f64
            },
            events_dropped: self.events.dropped_count(),
        }
    }

    /// Isolation layer statistics.
    #[must_use]
    pub fn isolation_stats(&self) -> IsolationStats {
        self.isolation.stats()
    }

    /// Episodic manager statistics.
    #[must_use]
    pub fn episodic_stats(&self) -> EpisodicStats {
        self.episodic.stats()
    }

    /// Pattern engine statistics for a scope.
    #[must_use]
    pub fn pattern_stats(&self, agent_id: i64, user_id: &str) -> PatternStats {
        self.pattern_engine(agent_id, user_id).stats()
    }

    /// Evolution engine statistics for a scope.
    #[must_use]
    pub fn evolution_stats(&self, agent_id: i64, user_id: &str) -> EvolutionStats {
        self.evolution_engine(agent_id, user_id).stats()
    }
}

/// Check and reset an interval timestamp.
fn due(last_ms: &AtomicU64, now_ms: u64, interval_ms: u64) -> bool {
    let last = last_ms.load(Ordering::Relaxed);
    if now_ms.saturating_sub(last) >= interval_ms {
        last_ms.store(now_ms, Ordering::Relaxed);
        true
    } else {
        false
    }
}

/// Derive a deterministic per-scope seed (FNV-1a over the scope identity).
fn scope_seed(base: u64, agent_id: i64, user_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in user_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash ^ base ^ (agent_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::SimConfig;
    use crate::store::SimTierStore;
    use serde_json::json;

    fn substrate() -> (Arc<MemorySubstrate>, Clock) {
        let clock = Clock::simulated(1_700_000_000_000);
        let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
        let substrate = Arc::new(MemorySubstrate::new(
            store as Arc<dyn TierStore>,
            clock.clone(),
        ));
        (substrate, clock)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(1, "u1").with_session("s1")
    }

    #[tokio::test]
    async fn test_store_and_retrieve_roundtrip() {
        let (substrate, _clock) = substrate();

        let outcome = substrate
            .store(&ctx(), json!({"query": "how do I deploy?"}), json!({}))
            .await;
        assert!(outcome.stored);

        let result = substrate.retrieve(&ctx(), RetrieveOptions::new()).await;
        assert!(result.decision.allowed);
        assert_eq!(result.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_contaminated_store_denied() {
        let (substrate, _clock) = substrate();

        let outcome = substrate
            .store(
                &ctx(),
                json!({"query": "hello"}),
                json!({
                    "session_id": "s1",
                    "payload": {"user_id": "intruder", "session_id": "other"}
                }),
            )
            .await;

        assert!(!outcome.stored);
        assert!(outcome.error.as_deref().unwrap_or("").contains("access denied"));
    }

    #[tokio::test]
    async fn test_text_retrieval() {
        let (substrate, _clock) = substrate();

        substrate
            .store(&ctx(), json!({"query": "rust lifetimes"}), json!({}))
            .await;
        substrate
            .store(&ctx(), json!({"query": "gardening tips"}), json!({}))
            .await;

        let result = substrate
            .retrieve(&ctx(), RetrieveOptions::new().with_text("lifetimes"))
            .await;

        assert_eq!(result.memories.len(), 1);
        assert!(result.memories[0]
            .episode
            .content
            .to_string()
            .contains("lifetimes"));
    }

    #[tokio::test]
    async fn test_background_pattern_discovery_emits_event() {
        let (substrate, _clock) = substrate();
        let mut events = substrate.subscribe().expect("subscribe");

        for _ in 0..5 {
            substrate
                .store(&ctx(), json!({"query": "hello"}), json!({}))
                .await;
        }

        // Let detached analysis tasks run
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let event = events.try_recv().expect("a discovery event must arrive");
        match event {
            MemoryEvent::PatternsDiscovered { count, .. } => assert!(count > 0),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_maintenance_runs_cycles() {
        let (substrate, clock) = substrate();

        substrate
            .store(&ctx(), json!({"query": "hello"}), json!({}))
            .await;

        clock.advance_ms(crate::constants::EVOLUTION_INTERVAL_MS_DEFAULT);
        let report = substrate.run_maintenance().await;

        assert!(report.consolidations >= 1);
        assert!(report.contexts_scanned >= 1);
        assert!(report.pattern_refreshes >= 1);
        assert!(report.evolution_cycles >= 1);
    }

    #[tokio::test]
    async fn test_maintenance_not_due_does_nothing() {
        let (substrate, _clock) = substrate();

        substrate
            .store(&ctx(), json!({"query": "hello"}), json!({}))
            .await;

        let report = substrate.run_maintenance().await;
        assert_eq!(report.consolidations, 0);
        assert_eq!(report.contexts_scanned, 0);
        assert_eq!(report.pattern_refreshes, 0);
    }

    #[tokio::test]
    async fn test_stats_aggregate() {
        let (substrate, _clock) = substrate();

        substrate
            .store(&ctx(), json!({"query": "hello"}), json!({}))
            .await;
        substrate.retrieve(&ctx(), RetrieveOptions::new()).await;

        let stats = substrate.stats();
        assert_eq!(stats.store_count, 1);
        assert_eq!(stats.retrieve_count, 1);
        assert_eq!(stats.retrieval_hit_rate, 1.0);

        assert_eq!(substrate.episodic_stats().stored_count, 1);
        assert!(substrate.isolation_stats().validation_count >= 2);
    }

    #[tokio::test]
    async fn test_performance_snapshot_shapes() {
        let (substrate, _clock) = substrate();

        substrate
            .store(&ctx(), json!({"query": "hello"}), json!({}))
            .await;

        let snapshot = substrate.performance_snapshot(1, "u1").await;
        assert!((0.0..=1.0).contains(&snapshot.retrieval_hit_rate));
        assert!((0.0..=1.0).contains(&snapshot.promotion_rate));

        let share_sum: f64 = snapshot.tier_usage_share.values().sum();
        assert!((share_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scope_seed_deterministic() {
        assert_eq!(scope_seed(0, 1, "u1"), scope_seed(0, 1, "u1"));
        assert_ne!(scope_seed(0, 1, "u1"), scope_seed(0, 2, "u1"));
        assert_ne!(scope_seed(0, 1, "u1"), scope_seed(0, 1, "u2"));
        assert_ne!(scope_seed(0, 1, "u1"), scope_seed(7, 1, "u1"));
    }
}

//! Integration Tests for the Memory Substrate
//!
//! End-to-end workflow validation:
//! - Store -> classify -> retrieve with ranking
//! - Background promotion and pattern discovery
//! - Event notifications
//! - Maintenance cycles over a simulated clock
//! - Aggregate stats surfaces

use std::sync::Arc;

use serde_json::json;
use strata_memory::dst::{Clock, SimConfig};
use strata_memory::store::{EpisodeType, SimTierStore, TierStore};
use strata_memory::substrate::{
    MemoryEvent, MemorySubstrate, RequestContext, RetrieveOptions,
};

fn substrate_at(start_ms: u64) -> (Arc<MemorySubstrate>, Arc<SimTierStore>, Clock) {
    let clock = Clock::simulated(start_ms);
    let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
    let substrate = Arc::new(MemorySubstrate::new(
        Arc::clone(&store) as Arc<dyn TierStore>,
        clock.clone(),
    ));
    (substrate, store, clock)
}

async fn drain_background_tasks() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Store and Retrieve Workflow
// =============================================================================

#[tokio::test]
async fn test_full_store_retrieve_workflow() {
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1").with_session("session-1");

    let outcome = memory
        .store(
            &ctx,
            json!({"query": "how do I configure the database?", "response": "like this"}),
            json!({"user_initiated": true}),
        )
        .await;

    assert!(outcome.stored);
    assert!(outcome.id.is_some());
    assert!((0.0..=1.0).contains(&outcome.importance));

    let result = memory.retrieve(&ctx, RetrieveOptions::new()).await;
    assert!(result.decision.allowed);
    assert_eq!(result.memories.len(), 1);
    assert!(result.memories[0].relevance >= result.memories[0].episode.importance);
}

#[tokio::test]
async fn test_classification_scenario_error_then_success() {
    // Keyword detection beats a false explicit flag; an explicit completion
    // flag beats plain text
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1");

    let first = memory
        .store(
            &ctx,
            json!({"query": "why did this error happen?"}),
            json!({"is_error": false}),
        )
        .await;
    assert_eq!(first.episode_type, EpisodeType::Error);

    let second = memory
        .store(
            &ctx,
            json!({"query": "all wrapped up now"}),
            json!({"task_completed": true}),
        )
        .await;
    assert_eq!(second.episode_type, EpisodeType::Success);
}

#[tokio::test]
async fn test_session_affinity_ranking() {
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);

    let session_a = RequestContext::new(1, "user-1").with_session("a");
    let session_b = RequestContext::new(1, "user-1").with_session("b");

    memory
        .store(&session_a, json!({"query": "from session a"}), json!({}))
        .await;
    memory
        .store(&session_b, json!({"query": "from session b"}), json!({}))
        .await;

    // Querying as session b ranks its own episode first
    let result = memory.retrieve(&session_b, RetrieveOptions::new()).await;
    assert_eq!(result.memories.len(), 2);
    assert_eq!(
        result.memories[0].episode.session_id.as_deref(),
        Some("b")
    );
}

#[tokio::test]
async fn test_text_query_retrieval() {
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1");

    memory
        .store(&ctx, json!({"query": "rust borrow checker rules"}), json!({}))
        .await;
    memory
        .store(&ctx, json!({"query": "sourdough starter feeding"}), json!({}))
        .await;

    let result = memory
        .retrieve(&ctx, RetrieveOptions::new().with_text("borrow checker"))
        .await;

    assert_eq!(result.memories.len(), 1);
    assert!(result.memories[0]
        .episode
        .content
        .to_string()
        .contains("borrow checker"));
}

// =============================================================================
// Background Promotion
// =============================================================================

#[tokio::test]
async fn test_high_importance_discovery_promotes_in_background() {
    let (memory, store, _clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1");

    // A discovery with strong signals clears the promotion threshold
    let outcome = memory
        .store(
            &ctx,
            json!({
                "query": "look what we discovered in the deploy config?",
                "response": "a much faster path"
            }),
            json!({
                "user_initiated": true,
                "has_screenshot": true,
                "session_start": true,
                "conversation_turns": 12,
                "rating": 5.0,
            }),
        )
        .await;
    assert_eq!(outcome.episode_type, EpisodeType::Discovery);
    assert!(outcome.importance >= 0.8, "importance {}", outcome.importance);

    drain_background_tasks().await;

    let episode = store
        .get_episode(outcome.id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(episode.promoted_to_semantic);

    // Promotion is a visibility flag: default retrieval now excludes it
    let default_view = memory.retrieve(&ctx, RetrieveOptions::new()).await;
    assert!(default_view.memories.is_empty());

    let semantic_view = memory
        .retrieve(&ctx, RetrieveOptions::new().with_promoted())
        .await;
    assert_eq!(semantic_view.memories.len(), 1);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_pattern_discovery_event_arrives() {
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);
    let mut events = memory.subscribe().expect("first subscriber");
    let ctx = RequestContext::new(1, "user-1");

    for _ in 0..5 {
        memory.store(&ctx, json!({"query": "hello"}), json!({})).await;
    }
    drain_background_tasks().await;

    let event = events.try_recv().expect("discovery notification expected");
    match event {
        MemoryEvent::PatternsDiscovered {
            agent_id,
            user_id,
            count,
            ..
        } => {
            assert_eq!(agent_id, 1);
            assert_eq!(user_id, "user-1");
            assert!(count > 0);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The receiving half is handed out exactly once
    assert!(memory.subscribe().is_none());
}

// =============================================================================
// Maintenance
// =============================================================================

#[tokio::test]
async fn test_maintenance_cycles_over_simulated_time() {
    let (memory, _store, clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1");

    memory.store(&ctx, json!({"query": "hello"}), json!({})).await;
    drain_background_tasks().await;

    // Nothing is due immediately
    let idle = memory.run_maintenance().await;
    assert_eq!(idle.consolidations, 0);
    assert_eq!(idle.evolution_cycles, 0);

    // After twelve hours everything is due, including evolution
    clock.advance_ms(12 * 60 * 60 * 1000);
    let busy = memory.run_maintenance().await;
    assert!(busy.consolidations >= 1);
    assert!(busy.contexts_scanned >= 1);
    assert!(busy.pattern_refreshes >= 1);
    assert!(busy.evolution_cycles >= 1);
}

#[tokio::test]
async fn test_evolution_event_after_scheduled_cycle() {
    let (memory, _store, clock) = substrate_at(1_700_000_000_000);
    let mut events = memory.subscribe().expect("subscriber");
    let ctx = RequestContext::new(1, "user-1");

    memory.store(&ctx, json!({"query": "hello"}), json!({})).await;
    drain_background_tasks().await;
    while events.try_recv().is_ok() {} // drop discovery noise

    clock.advance_ms(12 * 60 * 60 * 1000);
    memory.run_maintenance().await;

    let mut saw_evolution = false;
    while let Ok(event) = events.try_recv() {
        if let MemoryEvent::EvolutionCompleted { outcome, .. } = event {
            assert!(!outcome.reason.is_empty(), "evolution is never silent");
            saw_evolution = true;
        }
    }
    assert!(saw_evolution, "an evolution notification must arrive");
}

// =============================================================================
// Stats
// =============================================================================

#[tokio::test]
async fn test_stats_surfaces_are_consistent() {
    let (memory, _store, _clock) = substrate_at(1_700_000_000_000);
    let ctx = RequestContext::new(1, "user-1");

    memory.store(&ctx, json!({"query": "one"}), json!({})).await;
    memory.store(&ctx, json!({"query": "two"}), json!({})).await;
    memory.retrieve(&ctx, RetrieveOptions::new()).await;
    drain_background_tasks().await;

    let substrate_stats = memory.stats();
    assert_eq!(substrate_stats.store_count, 2);
    assert_eq!(substrate_stats.retrieve_count, 1);
    assert_eq!(substrate_stats.retrieval_hit_rate, 1.0);

    let episodic = memory.episodic_stats();
    assert_eq!(episodic.stored_count, 2);

    let isolation = memory.isolation_stats();
    assert!(isolation.validation_count >= 3);
    assert_eq!(isolation.denial_count, 0);
    assert_eq!(isolation.context_count, 1);

    let patterns = memory.pattern_stats(1, "user-1");
    assert!(patterns.analyses_run >= 1);

    let evolution = memory.evolution_stats(1, "user-1");
    assert_eq!(evolution.cycles_run, 0);
    assert_eq!(evolution.strategies.len(), 4);
}

// =============================================================================
// Soft Failure Discipline
// =============================================================================

#[tokio::test]
async fn test_store_failures_degrade_softly() {
    use strata_memory::dst::{FaultConfig, FaultType};

    let clock = Clock::simulated(1_700_000_000_000);
    let store = Arc::new(
        SimTierStore::new(SimConfig::with_seed(42)).with_faults(
            FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("insert"),
        ),
    );
    let memory = MemorySubstrate::new(store as Arc<dyn TierStore>, clock);
    let ctx = RequestContext::new(1, "user-1");

    let outcome = memory.store(&ctx, json!({"query": "hello"}), json!({})).await;

    // The failure is reported, not thrown
    assert!(!outcome.stored);
    assert!(outcome.error.is_some());

    // And retrieval still works, returning empty
    let result = memory.retrieve(&ctx, RetrieveOptions::new()).await;
    assert!(result.decision.allowed);
    assert!(result.memories.is_empty());
}

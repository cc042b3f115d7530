//! DST Tests for the Evolution Engine
//!
//! Deterministic verification of the self-tuning loop:
//! - Explicit trigger reasons, never silent
//! - Candidates bounded to their parameter domains
//! - Apply only on strict improvement; live fitness never regresses at apply
//! - Identical seeds evolve identically
//! - Every cycle lands in the evolution log

use std::sync::Arc;

use strata_memory::dst::{Clock, SimConfig};
use strata_memory::evolution::{
    EvolutionConfig, EvolutionEngine, EvolutionReason, PerformanceSnapshot, StrategyKind,
};
use strata_memory::store::{SimTierStore, TierStore};

fn engine_with(seed: u64) -> (EvolutionEngine, Clock, Arc<SimTierStore>) {
    let clock = Clock::simulated(0);
    let store = Arc::new(SimTierStore::new(SimConfig::with_seed(7)));
    let engine = EvolutionEngine::new(
        1,
        "u1",
        Arc::clone(&store) as Arc<dyn TierStore>,
        clock.clone(),
        seed,
    );
    (engine, clock, store)
}

// =============================================================================
// Triggers
// =============================================================================

#[tokio::test]
async fn test_no_trigger_when_healthy_and_fresh() {
    let (engine, _clock, _store) = engine_with(42);
    assert_eq!(engine.should_trigger(), None);
}

#[tokio::test]
async fn test_scheduled_trigger_reason() {
    let (engine, clock, _store) = engine_with(42);

    clock.advance_ms(12 * 60 * 60 * 1000);
    let reason = engine.should_trigger().expect("interval elapsed");
    assert_eq!(reason, EvolutionReason::Scheduled);
    assert_eq!(reason.to_string(), "Scheduled evolution");
}

#[tokio::test]
async fn test_low_fitness_trigger_reason() {
    let (engine, _clock, _store) = engine_with(42);

    for kind in StrategyKind::all() {
        engine.strategies().refresh_fitness(*kind, 0.2);
    }

    match engine.should_trigger() {
        Some(EvolutionReason::LowFitness { average }) => {
            assert!((average - 0.2).abs() < 1e-9);
        }
        other => panic!("expected low-fitness trigger, got {other:?}"),
    }
}

// =============================================================================
// Cycle Behavior
// =============================================================================

#[tokio::test]
async fn test_cycle_applies_strict_improvements_only() {
    let (engine, _clock, _store) = engine_with(42);
    let snapshot = PerformanceSnapshot::default();

    let outcome = engine
        .run_cycle(EvolutionReason::Scheduled, &snapshot)
        .await;

    // Whatever was applied strictly beat the smoothed live fitness; the
    // StrategySet enforces this with hard asserts, so a completed cycle is
    // itself the proof. Changed strategies must have advanced a generation.
    for name in &outcome.strategies_changed {
        let kind = StrategyKind::all()
            .iter()
            .find(|k| k.as_str() == name)
            .expect("changed name must be a registry strategy");
        let strategy = engine.strategies().get(*kind);
        assert!(strategy.generation >= 1);
    }
    assert!((0.0..=1.0).contains(&outcome.average_fitness));
}

#[tokio::test]
async fn test_converged_strategies_stop_changing() {
    let (engine, _clock, _store) = engine_with(42);
    let snapshot = PerformanceSnapshot::default();

    // Drive several cycles against the same snapshot; once a strategy sits
    // at its optimum for this snapshot, further cycles stop applying it
    for _ in 0..6 {
        engine
            .run_cycle(EvolutionReason::Scheduled, &snapshot)
            .await;
    }
    let settled: Vec<u64> = engine
        .strategies()
        .snapshot()
        .iter()
        .map(|s| s.generation)
        .collect();

    let outcome = engine
        .run_cycle(EvolutionReason::Scheduled, &snapshot)
        .await;
    let after: Vec<u64> = engine
        .strategies()
        .snapshot()
        .iter()
        .map(|s| s.generation)
        .collect();

    // Generations may only move forward, and rarely at this point
    for (late, early) in after.iter().zip(&settled) {
        assert!(late >= early);
    }
    let _ = outcome;
}

#[tokio::test]
async fn test_parameters_stay_in_domain_across_many_cycles() {
    let (engine, _clock, _store) = engine_with(99);

    // Vary the snapshot so different candidates win over time
    for cycle in 0..10u64 {
        let mut snapshot = PerformanceSnapshot::default();
        snapshot.avg_response_time_ms = 20.0 + 80.0 * (cycle as f64 / 10.0);
        snapshot.retrieval_hit_rate = 0.3 + 0.05 * cycle as f64;
        snapshot.promotion_rate = 0.02 * cycle as f64;

        engine
            .run_cycle(EvolutionReason::Scheduled, &snapshot)
            .await;

        for strategy in engine.strategies().snapshot() {
            for (name, min, max) in strategy.kind.parameter_domains() {
                let value = strategy.params[*name];
                assert!(
                    (*min..=*max).contains(&value),
                    "{}.{name}={value} escaped [{min}, {max}]",
                    strategy.kind
                );
            }
        }
    }
}

// =============================================================================
// Determinism
// =============================================================================

#[tokio::test]
async fn test_same_seed_same_evolution() {
    let evolve = |seed: u64| async move {
        let (engine, _clock, _store) = engine_with(seed);
        let snapshot = PerformanceSnapshot::default();
        for _ in 0..3 {
            engine
                .run_cycle(EvolutionReason::Scheduled, &snapshot)
                .await;
        }
        engine
            .strategies()
            .snapshot()
            .iter()
            .map(|s| (s.kind.as_str(), s.fitness, s.generation, s.params.clone()))
            .collect::<Vec<_>>()
    };

    assert_eq!(evolve(1234).await, evolve(1234).await);
}

#[tokio::test]
async fn test_different_seeds_may_diverge() {
    let evolve = |seed: u64| async move {
        let (engine, _clock, _store) = engine_with(seed);
        let snapshot = PerformanceSnapshot::default();
        engine
            .run_cycle(EvolutionReason::Scheduled, &snapshot)
            .await;
        engine
            .strategies()
            .snapshot()
            .iter()
            .map(|s| s.params.clone())
            .collect::<Vec<_>>()
    };

    // Not a hard guarantee for any two seeds, but these differ
    assert_ne!(evolve(1).await, evolve(2).await);
}

// =============================================================================
// Evolution Log
// =============================================================================

#[tokio::test]
async fn test_every_cycle_is_logged_with_reason() {
    let (engine, _clock, store) = engine_with(42);
    let snapshot = PerformanceSnapshot::default();

    engine
        .run_cycle(EvolutionReason::Scheduled, &snapshot)
        .await;
    engine
        .run_cycle(EvolutionReason::LowFitness { average: 0.4 }, &snapshot)
        .await;
    engine
        .run_cycle(
            EvolutionReason::Degradation {
                previous: 0.8,
                current: 0.6,
            },
            &snapshot,
        )
        .await;

    let log = store.list_evolution_log(1, "u1", 10).await.unwrap();
    assert_eq!(log.len(), 3);

    // Newest first
    assert!(log[0].reason.contains("Performance degradation"));
    assert!(log[1].reason.contains("Low average fitness"));
    assert!(log[2].reason.contains("Scheduled evolution"));
    for entry in &log {
        assert!(!entry.reason.is_empty());
        assert!((0.0..=1.0).contains(&entry.average_fitness));
    }

    let history = engine.history().await;
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_stats_reflect_cycles() {
    let (engine, _clock, _store) = engine_with(42);
    let snapshot = PerformanceSnapshot::default();

    engine
        .run_cycle(EvolutionReason::Scheduled, &snapshot)
        .await;

    let stats = engine.stats();
    assert_eq!(stats.cycles_run, 1);
    assert_eq!(stats.strategies.len(), 4);
    assert!((0.0..=1.0).contains(&stats.average_fitness));
    assert_eq!(stats.interval_ms, EvolutionConfig::default().interval_ms);
}

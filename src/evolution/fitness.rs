//! Fitness Evaluation and Simulation
//!
//! `TigerStyle`: One deterministic function per strategy kind, shared by
//! live evaluation and candidate simulation. Candidates are scored against
//! an observed performance snapshot, never against live traffic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::EVOLUTION_PROMOTION_RATE_IDEAL;
use crate::store::MemoryTier;

use super::strategy::StrategyKind;

/// Response time at which allocation fitness bottoms out.
const RESPONSE_TIME_MS_CEILING: f64 = 1000.0;

/// Retrieval latency at which the latency reward bottoms out.
const RETRIEVAL_LATENCY_MS_CEILING: f64 = 500.0;

/// Weight spread beyond which the extremeness penalty starts.
const WEIGHT_SPREAD_PENALTY_START: f64 = 0.5;

// =============================================================================
// PerformanceSnapshot
// =============================================================================

/// Aggregate metrics one evolution cycle evaluates against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Mean store/retrieve response time
    pub avg_response_time_ms: f64,
    /// Fraction of retrievals returning at least one result
    pub retrieval_hit_rate: f64,
    /// Mean retrieval latency
    pub avg_retrieval_latency_ms: f64,
    /// Observed share of operations per tier (sums to ~1)
    pub tier_usage_share: BTreeMap<String, f64>,
    /// Episodic-to-semantic promotion rate
    pub promotion_rate: f64,
    /// Patterns discovered in the window
    pub patterns_discovered: u64,
    /// Analysis passes run in the window
    pub analyses_run: u64,
}

impl Default for PerformanceSnapshot {
    fn default() -> Self {
        let tier_usage_share = MemoryTier::all()
            .iter()
            .map(|tier| (tier.as_str().to_string(), 0.25))
            .collect();
        Self {
            avg_response_time_ms: 50.0,
            retrieval_hit_rate: 0.5,
            avg_retrieval_latency_ms: 50.0,
            tier_usage_share,
            promotion_rate: EVOLUTION_PROMOTION_RATE_IDEAL,
            patterns_discovered: 0,
            analyses_run: 0,
        }
    }
}

// =============================================================================
// Fitness
// =============================================================================

/// Score a parameter set against a snapshot.
///
/// Deterministic: identical inputs always yield identical fitness. The
/// returned value is always in [0, 1].
#[must_use]
pub fn fitness_of(
    kind: StrategyKind,
    params: &BTreeMap<String, f64>,
    snapshot: &PerformanceSnapshot,
) -> f64 {
    let fitness = match kind {
        StrategyKind::MemoryAllocation => allocation_fitness(params, snapshot),
        StrategyKind::RetrievalWeighting => weighting_fitness(params, snapshot),
        StrategyKind::PatternRecognition => recognition_fitness(params, snapshot),
        StrategyKind::MemoryConsolidation => consolidation_fitness(params, snapshot),
    };

    let fitness = fitness.clamp(0.0, 1.0);

    // Postcondition
    assert!((0.0..=1.0).contains(&fitness), "fitness must be in [0, 1]");
    fitness
}

/// Rewards low response time, weighted by how closely the intended tier
/// ratios track actual usage.
fn allocation_fitness(params: &BTreeMap<String, f64>, snapshot: &PerformanceSnapshot) -> f64 {
    let responsiveness =
        (1.0 - snapshot.avg_response_time_ms / RESPONSE_TIME_MS_CEILING).clamp(0.0, 1.0);

    // Total variation distance between intended and observed shares
    let mut deviation = 0.0;
    for tier in MemoryTier::all() {
        let intended = params
            .get(&format!("{}_ratio", tier.as_str()))
            .copied()
            .unwrap_or(0.25);
        let actual = snapshot
            .tier_usage_share
            .get(tier.as_str())
            .copied()
            .unwrap_or(0.0);
        deviation += (intended - actual).abs();
    }
    let deviation = (deviation / 2.0).clamp(0.0, 1.0);

    responsiveness * (1.0 - deviation)
}

/// Rewards hit rate and low latency, penalizing extreme weight spreads.
fn weighting_fitness(params: &BTreeMap<String, f64>, snapshot: &PerformanceSnapshot) -> f64 {
    let latency_reward =
        (1.0 - snapshot.avg_retrieval_latency_ms / RETRIEVAL_LATENCY_MS_CEILING).clamp(0.0, 1.0);
    let base = 0.6 * snapshot.retrieval_hit_rate + 0.4 * latency_reward;

    let weights: Vec<f64> = params.values().copied().collect();
    let max_weight = weights.iter().copied().fold(f64::MIN, f64::max);
    let min_weight = weights.iter().copied().fold(f64::MAX, f64::min);
    let spread = (max_weight - min_weight).max(0.0);
    let penalty = 0.3 * ((spread - WEIGHT_SPREAD_PENALTY_START).max(0.0)
        / (1.0 - WEIGHT_SPREAD_PENALTY_START));

    base - penalty
}

/// Rewards a discovery yield calibrated to roughly one pattern per pass at
/// the configured confidence threshold.
fn recognition_fitness(params: &BTreeMap<String, f64>, snapshot: &PerformanceSnapshot) -> f64 {
    let threshold = params
        .get("confidence_threshold")
        .copied()
        .unwrap_or(0.7)
        .max(0.05);
    let observed_yield =
        snapshot.patterns_discovered as f64 / snapshot.analyses_run.max(1) as f64;

    // A lower threshold would admit proportionally more candidates
    let projected_yield = observed_yield * (0.7 / threshold);
    1.0 - (projected_yield - 1.0).abs().min(1.0)
}

/// Rewards a promotion rate near the ideal.
fn consolidation_fitness(params: &BTreeMap<String, f64>, snapshot: &PerformanceSnapshot) -> f64 {
    let threshold = params
        .get("promotion_threshold")
        .copied()
        .unwrap_or(0.8)
        .max(0.05);

    // A lower threshold promotes proportionally more episodes
    let projected_rate = (snapshot.promotion_rate * (0.8 / threshold)).clamp(0.0, 1.0);
    1.0 - (projected_rate - EVOLUTION_PROMOTION_RATE_IDEAL).abs()
        / (1.0 - EVOLUTION_PROMOTION_RATE_IDEAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::strategy::Strategy;

    fn snapshot() -> PerformanceSnapshot {
        PerformanceSnapshot::default()
    }

    #[test]
    fn test_fitness_in_bounds_for_all_kinds() {
        let snapshot = snapshot();
        for kind in StrategyKind::all() {
            let strategy = Strategy::seeded(*kind);
            let fitness = fitness_of(*kind, &strategy.params, &snapshot);
            assert!((0.0..=1.0).contains(&fitness), "{kind}: {fitness}");
        }
    }

    #[test]
    fn test_allocation_rewards_matching_usage() {
        let mut snapshot = snapshot();
        snapshot.tier_usage_share = [
            ("working", 0.25),
            ("episodic", 0.35),
            ("semantic", 0.25),
            ("procedural", 0.15),
        ]
        .iter()
        .map(|(tier, share)| ((*tier).to_string(), *share))
        .collect();

        let matching = Strategy::seeded(StrategyKind::MemoryAllocation);
        let matched_fitness =
            fitness_of(StrategyKind::MemoryAllocation, &matching.params, &snapshot);

        let mut skewed = matching.params.clone();
        skewed.insert("working_ratio".to_string(), 0.7);
        skewed.insert("episodic_ratio".to_string(), 0.05);
        let skewed_fitness = fitness_of(StrategyKind::MemoryAllocation, &skewed, &snapshot);

        assert!(matched_fitness > skewed_fitness);
    }

    #[test]
    fn test_allocation_rewards_low_response_time() {
        let strategy = Strategy::seeded(StrategyKind::MemoryAllocation);

        let mut fast = snapshot();
        fast.avg_response_time_ms = 10.0;
        let mut slow = snapshot();
        slow.avg_response_time_ms = 900.0;

        assert!(
            fitness_of(StrategyKind::MemoryAllocation, &strategy.params, &fast)
                > fitness_of(StrategyKind::MemoryAllocation, &strategy.params, &slow)
        );
    }

    #[test]
    fn test_weighting_penalizes_extremes() {
        let snapshot = snapshot();
        let balanced = Strategy::seeded(StrategyKind::RetrievalWeighting);
        let balanced_fitness =
            fitness_of(StrategyKind::RetrievalWeighting, &balanced.params, &snapshot);

        let mut extreme = balanced.params.clone();
        extreme.insert("recency_weight".to_string(), 1.0);
        extreme.insert("importance_weight".to_string(), 0.0);
        extreme.insert("relevance_weight".to_string(), 0.0);
        extreme.insert("frequency_weight".to_string(), 0.0);
        let extreme_fitness =
            fitness_of(StrategyKind::RetrievalWeighting, &extreme, &snapshot);

        assert!(balanced_fitness > extreme_fitness);
    }

    #[test]
    fn test_weighting_rewards_hit_rate() {
        let strategy = Strategy::seeded(StrategyKind::RetrievalWeighting);

        let mut hits = snapshot();
        hits.retrieval_hit_rate = 0.95;
        let mut misses = snapshot();
        misses.retrieval_hit_rate = 0.1;

        assert!(
            fitness_of(StrategyKind::RetrievalWeighting, &strategy.params, &hits)
                > fitness_of(StrategyKind::RetrievalWeighting, &strategy.params, &misses)
        );
    }

    #[test]
    fn test_consolidation_peaks_at_ideal_rate() {
        let strategy = Strategy::seeded(StrategyKind::MemoryConsolidation);

        let mut ideal = snapshot();
        ideal.promotion_rate = EVOLUTION_PROMOTION_RATE_IDEAL;
        let mut excessive = snapshot();
        excessive.promotion_rate = 0.6;
        let mut starved = snapshot();
        starved.promotion_rate = 0.0;

        let ideal_fitness =
            fitness_of(StrategyKind::MemoryConsolidation, &strategy.params, &ideal);
        assert!(
            ideal_fitness
                > fitness_of(StrategyKind::MemoryConsolidation, &strategy.params, &excessive)
        );
        assert!(
            ideal_fitness
                > fitness_of(StrategyKind::MemoryConsolidation, &strategy.params, &starved)
        );
    }

    #[test]
    fn test_recognition_depends_on_threshold() {
        let mut snapshot = snapshot();
        snapshot.patterns_discovered = 15;
        snapshot.analyses_run = 10;

        // At yield 1.5, a stricter threshold projects closer to the target
        let strategy = Strategy::seeded(StrategyKind::PatternRecognition);
        let default_fitness =
            fitness_of(StrategyKind::PatternRecognition, &strategy.params, &snapshot);

        let mut strict = strategy.params.clone();
        strict.insert("confidence_threshold".to_string(), 0.95);
        let strict_fitness =
            fitness_of(StrategyKind::PatternRecognition, &strict, &snapshot);

        assert!(strict_fitness > default_fitness);
    }

    #[test]
    fn test_deterministic() {
        let snapshot = snapshot();
        for kind in StrategyKind::all() {
            let strategy = Strategy::seeded(*kind);
            let a = fitness_of(*kind, &strategy.params, &snapshot);
            let b = fitness_of(*kind, &strategy.params, &snapshot);
            assert_eq!(a, b);
        }
    }
}

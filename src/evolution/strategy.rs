//! Strategy - Versioned Tunable Parameter Sets
//!
//! `TigerStyle`: A strategy is an immutable value object. Appliers build a
//! new `Arc<Strategy>` and swap it atomically; concurrent readers never
//! observe a half-updated parameter set.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::constants::{EVOLUTION_FITNESS_MAX, EVOLUTION_FITNESS_MIN};

// =============================================================================
// StrategyKind
// =============================================================================

/// The fixed registry of tunable strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Tier allocation ratios
    MemoryAllocation,
    /// Retrieval ranking weights
    RetrievalWeighting,
    /// Pattern discovery thresholds
    PatternRecognition,
    /// Promotion/consolidation tuning
    MemoryConsolidation,
}

impl StrategyKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryAllocation => "memory_allocation",
            Self::RetrievalWeighting => "retrieval_weighting",
            Self::PatternRecognition => "pattern_recognition",
            Self::MemoryConsolidation => "memory_consolidation",
        }
    }

    /// All strategy kinds in order.
    #[must_use]
    pub fn all() -> &'static [StrategyKind] {
        &[
            Self::MemoryAllocation,
            Self::RetrievalWeighting,
            Self::PatternRecognition,
            Self::MemoryConsolidation,
        ]
    }

    /// Parameter names with their bounded domains (name, min, max).
    #[must_use]
    pub fn parameter_domains(&self) -> &'static [(&'static str, f64, f64)] {
        match self {
            Self::MemoryAllocation => &[
                ("working_ratio", 0.05, 0.7),
                ("episodic_ratio", 0.05, 0.7),
                ("semantic_ratio", 0.05, 0.7),
                ("procedural_ratio", 0.05, 0.7),
            ],
            Self::RetrievalWeighting => &[
                ("recency_weight", 0.0, 1.0),
                ("importance_weight", 0.0, 1.0),
                ("relevance_weight", 0.0, 1.0),
                ("frequency_weight", 0.0, 1.0),
            ],
            Self::PatternRecognition => &[
                ("confidence_threshold", 0.5, 0.95),
                ("support_min", 2.0, 10.0),
                ("analysis_window_hours", 1.0, 168.0),
            ],
            Self::MemoryConsolidation => &[
                ("promotion_threshold", 0.5, 0.95),
                ("consolidation_interval_hours", 0.25, 24.0),
                ("decay_rate", 0.01, 0.5),
            ],
        }
    }

    /// Seed parameter values.
    #[must_use]
    pub fn seed_params(&self) -> BTreeMap<String, f64> {
        let entries: &[(&str, f64)] = match self {
            Self::MemoryAllocation => &[
                ("working_ratio", 0.25),
                ("episodic_ratio", 0.35),
                ("semantic_ratio", 0.25),
                ("procedural_ratio", 0.15),
            ],
            Self::RetrievalWeighting => &[
                ("recency_weight", 0.3),
                ("importance_weight", 0.4),
                ("relevance_weight", 0.2),
                ("frequency_weight", 0.1),
            ],
            Self::PatternRecognition => &[
                ("confidence_threshold", 0.7),
                ("support_min", 3.0),
                ("analysis_window_hours", 24.0),
            ],
            Self::MemoryConsolidation => &[
                ("promotion_threshold", 0.8),
                ("consolidation_interval_hours", 1.0),
                ("decay_rate", 0.1),
            ],
        };
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), *value))
            .collect()
    }

    /// The domain of one parameter.
    #[must_use]
    pub fn domain_of(&self, name: &str) -> Option<(f64, f64)> {
        self.parameter_domains()
            .iter()
            .find(|(candidate, _, _)| *candidate == name)
            .map(|(_, min, max)| (*min, *max))
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// One tunable parameter set with its evolution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    /// Which strategy this is
    pub kind: StrategyKind,
    /// Named numeric parameters, each bounded to its domain
    pub params: BTreeMap<String, f64>,
    /// Exponentially-smoothed fitness in [0, 1]
    pub fitness: f64,
    /// Monotonically increasing generation counter
    pub generation: u64,
}

impl Strategy {
    /// Seed a strategy with its default parameters.
    #[must_use]
    pub fn seeded(kind: StrategyKind) -> Self {
        let strategy = Self {
            kind,
            params: kind.seed_params(),
            fitness: 0.5,
            generation: 0,
        };

        // Postcondition: every parameter sits inside its domain
        strategy.assert_in_domain();
        strategy
    }

    /// Get a parameter value.
    ///
    /// # Panics
    /// Panics if the parameter does not exist: a missing parameter is a
    /// registry bug, not a runtime condition.
    #[must_use]
    pub fn param(&self, name: &str) -> f64 {
        *self
            .params
            .get(name)
            .unwrap_or_else(|| panic!("unknown parameter {name} for {}", self.kind))
    }

    /// Build the successor strategy from evolved parameters.
    ///
    /// # Panics
    /// Panics if the fitness is out of bounds.
    #[must_use]
    pub fn evolved(&self, params: BTreeMap<String, f64>, fitness: f64) -> Self {
        // Preconditions
        assert!(
            (EVOLUTION_FITNESS_MIN..=EVOLUTION_FITNESS_MAX).contains(&fitness),
            "fitness {fitness} outside [0, 1]"
        );

        let successor = Self {
            kind: self.kind,
            params,
            fitness,
            generation: self.generation + 1,
        };
        successor.assert_in_domain();

        // Postcondition
        assert!(successor.generation > self.generation, "generation must advance");
        successor
    }

    fn assert_in_domain(&self) {
        for (name, value) in &self.params {
            let (min, max) = self
                .kind
                .domain_of(name)
                .unwrap_or_else(|| panic!("parameter {name} not in domain table"));
            assert!(
                (min..=max).contains(value),
                "parameter {name}={value} outside [{min}, {max}]"
            );
        }
    }
}

// =============================================================================
// StrategySet
// =============================================================================

/// The live registry of strategies.
///
/// Readers take cheap `Arc` snapshots; the evolution engine is the only
/// writer and always replaces whole objects.
pub struct StrategySet {
    slots: HashMap<StrategyKind, RwLock<Arc<Strategy>>>,
}

impl StrategySet {
    /// Create a registry seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        let slots = StrategyKind::all()
            .iter()
            .map(|kind| (*kind, RwLock::new(Arc::new(Strategy::seeded(*kind)))))
            .collect();
        Self { slots }
    }

    /// Snapshot one strategy.
    #[must_use]
    pub fn get(&self, kind: StrategyKind) -> Arc<Strategy> {
        Arc::clone(&self.slots[&kind].read().unwrap())
    }

    /// Atomically replace one strategy.
    ///
    /// # Panics
    /// Panics if the replacement regresses fitness or generation; the
    /// engine only applies strictly better candidates.
    pub fn apply(&self, next: Strategy) {
        let slot = &self.slots[&next.kind];
        let mut guard = slot.write().unwrap();

        // Preconditions: never regress
        assert!(
            next.generation > guard.generation,
            "generation must advance on apply"
        );
        assert!(
            next.fitness >= guard.fitness,
            "apply must never decrease fitness"
        );

        *guard = Arc::new(next);
    }

    /// Update only the smoothed fitness of a strategy.
    pub fn refresh_fitness(&self, kind: StrategyKind, fitness: f64) {
        assert!(
            (EVOLUTION_FITNESS_MIN..=EVOLUTION_FITNESS_MAX).contains(&fitness),
            "fitness {fitness} outside [0, 1]"
        );

        let slot = &self.slots[&kind];
        let mut guard = slot.write().unwrap();
        let mut refreshed = (**guard).clone();
        refreshed.fitness = fitness;
        *guard = Arc::new(refreshed);
    }

    /// Mean fitness across the registry.
    #[must_use]
    pub fn average_fitness(&self) -> f64 {
        let kinds = StrategyKind::all();
        let sum: f64 = kinds.iter().map(|kind| self.get(*kind).fitness).sum();
        sum / kinds.len() as f64
    }

    /// Snapshot of every strategy, in registry order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Strategy>> {
        StrategyKind::all()
            .iter()
            .map(|kind| self.get(*kind))
            .collect()
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_strategies_valid() {
        for kind in StrategyKind::all() {
            let strategy = Strategy::seeded(*kind);
            assert_eq!(strategy.generation, 0);
            assert_eq!(strategy.fitness, 0.5);
            assert_eq!(strategy.params.len(), kind.parameter_domains().len());
        }
    }

    #[test]
    fn test_allocation_seeds_sum_to_one() {
        let strategy = Strategy::seeded(StrategyKind::MemoryAllocation);
        let sum: f64 = strategy.params.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_evolved_advances_generation() {
        let strategy = Strategy::seeded(StrategyKind::RetrievalWeighting);
        let next = strategy.evolved(strategy.params.clone(), 0.8);

        assert_eq!(next.generation, 1);
        assert_eq!(next.fitness, 0.8);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_evolved_rejects_out_of_domain() {
        let strategy = Strategy::seeded(StrategyKind::PatternRecognition);
        let mut params = strategy.params.clone();
        params.insert("confidence_threshold".to_string(), 0.2);
        let _ = strategy.evolved(params, 0.8);
    }

    #[test]
    fn test_set_apply_replaces_snapshot() {
        let set = StrategySet::new();
        let current = set.get(StrategyKind::MemoryAllocation);

        let next = current.evolved(current.params.clone(), 0.9);
        set.apply(next);

        let fresh = set.get(StrategyKind::MemoryAllocation);
        assert_eq!(fresh.generation, 1);
        assert_eq!(fresh.fitness, 0.9);
        // The old snapshot is unchanged
        assert_eq!(current.generation, 0);
    }

    #[test]
    #[should_panic(expected = "never decrease fitness")]
    fn test_apply_rejects_fitness_regression() {
        let set = StrategySet::new();
        let current = set.get(StrategyKind::MemoryAllocation);
        let better = current.evolved(current.params.clone(), 0.9);
        set.apply(better);

        let current = set.get(StrategyKind::MemoryAllocation);
        let worse = current.evolved(current.params.clone(), 0.4);
        set.apply(worse);
    }

    #[test]
    fn test_average_fitness() {
        let set = StrategySet::new();
        assert!((set.average_fitness() - 0.5).abs() < 1e-9);

        set.refresh_fitness(StrategyKind::MemoryAllocation, 0.9);
        assert!(set.average_fitness() > 0.5);
    }

    #[test]
    #[should_panic(expected = "unknown parameter")]
    fn test_unknown_parameter_panics() {
        let strategy = Strategy::seeded(StrategyKind::MemoryAllocation);
        let _ = strategy.param("nonexistent");
    }
}

//! EvolutionEngine - Mutation, Simulation, Selection
//!
//! `TigerStyle`: Evolution is never silent. Every cycle carries an explicit
//! reason, candidates are simulated against an observed snapshot, and a
//! candidate is applied only when it strictly beats the live fitness.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::constants::{
    EVOLUTION_FITNESS_LOW_THRESHOLD, EVOLUTION_FITNESS_SMOOTHING_ALPHA,
    EVOLUTION_HISTORY_ENTRIES_COUNT_MAX, EVOLUTION_INTERVAL_MS_DEFAULT,
    EVOLUTION_MUTATION_STEP_RATIO_DEFAULT, EVOLUTION_PERTURBATION_COUNT,
    EVOLUTION_RANDOM_MUTATION_COUNT,
};
use crate::dst::{Clock, DeterministicRng};
use crate::store::{EvolutionLogEntry, TierStore};

use super::fitness::{fitness_of, PerformanceSnapshot};
use super::strategy::{StrategyKind, StrategySet};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the evolution engine.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Interval between scheduled cycles
    pub interval_ms: u64,
    /// Relative step for small perturbations
    pub mutation_step_ratio: f64,
    /// Small perturbations per parameter
    pub perturbation_count: usize,
    /// Fully random mutations per parameter
    pub random_mutation_count: usize,
    /// Exponential smoothing factor for fitness updates
    pub smoothing_alpha: f64,
    /// Average fitness below which evolution triggers
    pub low_fitness_threshold: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            interval_ms: EVOLUTION_INTERVAL_MS_DEFAULT,
            mutation_step_ratio: EVOLUTION_MUTATION_STEP_RATIO_DEFAULT,
            perturbation_count: EVOLUTION_PERTURBATION_COUNT,
            random_mutation_count: EVOLUTION_RANDOM_MUTATION_COUNT,
            smoothing_alpha: EVOLUTION_FITNESS_SMOOTHING_ALPHA,
            low_fitness_threshold: EVOLUTION_FITNESS_LOW_THRESHOLD,
        }
    }
}

impl EvolutionConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle interval.
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        assert!(interval_ms > 0, "interval_ms must be positive");
        self.interval_ms = interval_ms;
        self
    }

    /// Set the mutation step ratio.
    #[must_use]
    pub fn with_mutation_step_ratio(mut self, ratio: f64) -> Self {
        assert!((0.0..=1.0).contains(&ratio), "mutation step must be in [0, 1]");
        self.mutation_step_ratio = ratio;
        self
    }
}

// =============================================================================
// Reasons and outcomes
// =============================================================================

/// Why a cycle was triggered. Evolution is never silent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EvolutionReason {
    /// Average fitness fell below the threshold
    LowFitness {
        /// The observed average
        average: f64,
    },
    /// Fitness regressed versus the previous cycle
    Degradation {
        /// Average fitness at the previous cycle
        previous: f64,
        /// Average fitness now
        current: f64,
    },
    /// The scheduled interval elapsed
    Scheduled,
}

impl std::fmt::Display for EvolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowFitness { average } => write!(f, "Low average fitness ({average:.2})"),
            Self::Degradation { previous, current } => {
                write!(f, "Performance degradation ({previous:.2} -> {current:.2})")
            }
            Self::Scheduled => write!(f, "Scheduled evolution"),
        }
    }
}

/// Result of one evolution cycle.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionOutcome {
    /// Why the cycle ran
    pub reason: String,
    /// Strategies whose parameters changed
    pub strategies_changed: Vec<String>,
    /// Average fitness after the cycle
    pub average_fitness: f64,
    /// Cycle number
    pub cycle: u64,
}

/// Aggregate evolution statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionStats {
    /// Cycles run
    pub cycles_run: u64,
    /// Strategy applications across all cycles
    pub strategies_evolved: u64,
    /// Current average fitness
    pub average_fitness: f64,
    /// Per-strategy fitness and generation
    pub strategies: Vec<StrategySummary>,
    /// Configured cycle interval
    pub interval_ms: u64,
}

/// One strategy's reported state.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySummary {
    /// Strategy name
    pub kind: String,
    /// Current fitness
    pub fitness: f64,
    /// Current generation
    pub generation: u64,
}

// =============================================================================
// EvolutionEngine
// =============================================================================

/// Per-scope evolutionary optimizer over the strategy registry.
pub struct EvolutionEngine {
    agent_id: i64,
    user_id: String,
    store: Arc<dyn TierStore>,
    clock: Clock,
    config: EvolutionConfig,
    strategies: StrategySet,
    rng: Mutex<DeterministicRng>,
    last_run_ms: AtomicU64,
    cycles_run: AtomicU64,
    strategies_evolved: AtomicU64,
    previous_average: Mutex<Option<f64>>,
}

impl EvolutionEngine {
    /// Create an engine for a scope.
    #[must_use]
    pub fn new(
        agent_id: i64,
        user_id: impl Into<String>,
        store: Arc<dyn TierStore>,
        clock: Clock,
        seed: u64,
    ) -> Self {
        Self::with_config(agent_id, user_id, store, clock, seed, EvolutionConfig::default())
    }

    /// Create an engine with explicit configuration.
    #[must_use]
    pub fn with_config(
        agent_id: i64,
        user_id: impl Into<String>,
        store: Arc<dyn TierStore>,
        clock: Clock,
        seed: u64,
        config: EvolutionConfig,
    ) -> Self {
        let start_ms = clock.now_ms();
        Self {
            agent_id,
            user_id: user_id.into(),
            store,
            clock,
            config,
            strategies: StrategySet::new(),
            rng: Mutex::new(DeterministicRng::new(seed)),
            last_run_ms: AtomicU64::new(start_ms),
            cycles_run: AtomicU64::new(0),
            strategies_evolved: AtomicU64::new(0),
            previous_average: Mutex::new(None),
        }
    }

    /// The live strategy registry.
    #[must_use]
    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    // =========================================================================
    // Trigger decision
    // =========================================================================

    /// Decide whether evolution should run, and why.
    ///
    /// Returns None when no trigger condition holds.
    #[must_use]
    pub fn should_trigger(&self) -> Option<EvolutionReason> {
        let average = self.strategies.average_fitness();

        if average < self.config.low_fitness_threshold {
            return Some(EvolutionReason::LowFitness { average });
        }

        if let Some(previous) = *self.previous_average.lock().unwrap() {
            if average + 0.05 < previous {
                return Some(EvolutionReason::Degradation {
                    previous,
                    current: average,
                });
            }
        }

        let last_run = self.last_run_ms.load(Ordering::Relaxed);
        if self.clock.has_elapsed(last_run, self.config.interval_ms) {
            return Some(EvolutionReason::Scheduled);
        }

        None
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    /// Run one evolution cycle.
    ///
    /// Evaluates fitness, proposes mutations, simulates them, applies the
    /// strictly-better winners, and records a log entry.
    #[tracing::instrument(skip(self, snapshot), fields(agent_id = self.agent_id, reason = %reason))]
    pub async fn run_cycle(
        &self,
        reason: EvolutionReason,
        snapshot: &PerformanceSnapshot,
    ) -> EvolutionOutcome {
        let cycle = self.cycles_run.fetch_add(1, Ordering::Relaxed) + 1;
        let mut strategies_changed = Vec::new();

        for kind in StrategyKind::all() {
            let current = self.strategies.get(*kind);

            // Evaluate: exponentially smooth the measured fitness into the
            // live value
            let measured = fitness_of(*kind, &current.params, snapshot);
            let smoothed = (1.0 - self.config.smoothing_alpha) * current.fitness
                + self.config.smoothing_alpha * measured;
            self.strategies.refresh_fitness(*kind, smoothed);
            let current = self.strategies.get(*kind);

            // Propose and simulate candidates
            let candidates = self.propose_candidates(*kind, &current.params);
            let best = candidates
                .into_iter()
                .map(|params| {
                    let simulated = fitness_of(*kind, &params, snapshot);
                    (params, simulated)
                })
                .max_by(|a, b| {
                    a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
                });

            // Select only a strict improvement
            if let Some((params, simulated)) = best {
                if simulated > current.fitness {
                    let next = current.evolved(params, simulated);
                    self.strategies.apply(next);
                    self.strategies_evolved.fetch_add(1, Ordering::Relaxed);
                    strategies_changed.push(kind.as_str().to_string());
                    tracing::info!(strategy = %kind, fitness = simulated, "strategy evolved");
                }
            }
        }

        let average_fitness = self.strategies.average_fitness();
        let outcome = EvolutionOutcome {
            reason: reason.to_string(),
            strategies_changed: strategies_changed.clone(),
            average_fitness,
            cycle,
        };

        // Record the cycle; persistence is best-effort
        let entry = EvolutionLogEntry::new(
            self.agent_id,
            self.user_id.clone(),
            cycle,
            reason.to_string(),
            strategies_changed,
            average_fitness,
            self.clock.now(),
        );
        if let Err(error) = self.store.append_evolution_log(&entry).await {
            tracing::warn!(%error, "failed to persist evolution log entry");
        }

        self.last_run_ms.store(self.clock.now_ms(), Ordering::Relaxed);
        *self.previous_average.lock().unwrap() = Some(average_fitness);

        outcome
    }

    /// Propose the candidate generation for one strategy.
    ///
    /// For each parameter: small ±step perturbations plus fully random
    /// values, every candidate clamped to the parameter's domain.
    fn propose_candidates(
        &self,
        kind: StrategyKind,
        current: &BTreeMap<String, f64>,
    ) -> Vec<BTreeMap<String, f64>> {
        let mut rng = self.rng.lock().unwrap();
        let mut candidates = Vec::new();

        for (name, min, max) in kind.parameter_domains() {
            let value = current.get(*name).copied().unwrap_or((min + max) / 2.0);

            for _ in 0..self.config.perturbation_count {
                let direction = if rng.next_bool(0.5) { 1.0 } else { -1.0 };
                let perturbed =
                    (value * (1.0 + direction * self.config.mutation_step_ratio)).clamp(*min, *max);
                let mut params = current.clone();
                params.insert((*name).to_string(), perturbed);
                candidates.push(params);
            }

            for _ in 0..self.config.random_mutation_count {
                let random = rng.next_float_range(*min, *max);
                let mut params = current.clone();
                params.insert((*name).to_string(), random);
                candidates.push(params);
            }
        }

        candidates
    }

    /// Recent evolution history for this scope.
    pub async fn history(&self) -> Vec<EvolutionLogEntry> {
        match self
            .store
            .list_evolution_log(
                self.agent_id,
                &self.user_id,
                EVOLUTION_HISTORY_ENTRIES_COUNT_MAX,
            )
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, "evolution history query failed");
                Vec::new()
            }
        }
    }

    /// Aggregate statistics. Read-only, no side effects.
    #[must_use]
    pub fn stats(&self) -> EvolutionStats {
        let strategies = self
            .strategies
            .snapshot()
            .iter()
            .map(|strategy| StrategySummary {
                kind: strategy.kind.as_str().to_string(),
                fitness: strategy.fitness,
                generation: strategy.generation,
            })
            .collect();

        EvolutionStats {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            strategies_evolved: self.strategies_evolved.load(Ordering::Relaxed),
            average_fitness: self.strategies.average_fitness(),
            strategies,
            interval_ms: self.config.interval_ms,
        }
    }
}

//! Evolution - Self-Optimization of Strategy Parameters
//!
//! `TigerStyle`: A fixed registry of versioned strategies, mutated by
//! deterministic perturbation and random search, simulated against observed
//! performance, and applied only on strict improvement.

mod engine;
mod fitness;
mod strategy;

pub use engine::{
    EvolutionConfig, EvolutionEngine, EvolutionOutcome, EvolutionReason, EvolutionStats,
    StrategySummary,
};
pub use fitness::{fitness_of, PerformanceSnapshot};
pub use strategy::{Strategy, StrategyKind, StrategySet};

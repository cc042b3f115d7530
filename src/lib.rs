//! # Strata Memory
//!
//! A self-tuning, isolated, multi-tier memory substrate for AI agents.
//!
//! ## Features
//!
//! - **Tiered storage**: working, episodic, semantic, and procedural
//!   records keyed by (agent, user), with one-way promotion from episodic
//!   to semantic visibility
//! - **Hard isolation**: every operation passes an audited access-control
//!   gate; cross-user access is structurally impossible
//! - **Unsupervised pattern mining**: temporal, contextual, cross-memory,
//!   and behavioral analyzers feed discovered regularities back into
//!   retrieval ranking
//! - **Evolutionary self-tuning**: retrieval and consolidation parameters
//!   mutate under a simulated-fitness selection loop that only ever applies
//!   strict improvements
//! - **Graceful degradation**: storage failures produce soft results, never
//!   crashes
//! - **Deterministic testing**: simulated clock, seeded randomness, and
//!   fault injection make every code path replayable
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata_memory::dst::{Clock, SimConfig};
//! use strata_memory::store::{SimTierStore, TierStore};
//! use strata_memory::substrate::{MemorySubstrate, RequestContext, RetrieveOptions};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let clock = Clock::simulated(1_700_000_000_000);
//! let store = Arc::new(SimTierStore::new(SimConfig::with_seed(42)));
//! let memory = MemorySubstrate::new(store as Arc<dyn TierStore>, clock);
//!
//! let ctx = RequestContext::new(1, "user-1").with_session("session-1");
//!
//! // Store an interaction
//! let outcome = memory
//!     .store(&ctx, json!({"query": "how do I deploy?"}), json!({}))
//!     .await;
//! assert!(outcome.stored);
//!
//! // Retrieve it back, pattern-enhanced and ranked
//! let result = memory.retrieve(&ctx, RetrieveOptions::new()).await;
//! assert!(result.decision.allowed);
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       MemorySubstrate                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ IsolationLayer  │ validate, audit, contamination, sharing     │
//! │ EpisodicMemory  │ classify, score, promote, consolidate       │
//! │ PatternEngine   │ 4 concurrent analyzers, capped upserts      │
//! │ EvolutionEngine │ mutate, simulate, apply strict winners      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ TierStore       │ SimTierStore (testing) / Postgres (server)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation-First Philosophy
//!
//! Every time-, randomness-, and failure-dependent path flows through the
//! [`dst`] module, so the same seed always replays the same behavior:
//!
//! ```rust
//! use strata_memory::dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType};
//!
//! let mut injector = FaultInjector::new(DeterministicRng::new(42));
//! injector.register(FaultConfig::new(FaultType::StorageWriteFail, 0.1));
//! // Same seed = same faults = reproducible bugs
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL tier-store backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod dst;
pub mod episodic;
pub mod evolution;
pub mod isolation;
pub mod patterns;
pub mod scope;
pub mod store;
pub mod substrate;
pub mod telemetry;

// Re-export the main API surface
pub use dst::{Clock, DeterministicRng, FaultConfig, FaultInjector, FaultType, SimConfig};
pub use episodic::{EpisodicConfig, EpisodicMemory, StoreOutcome};
pub use evolution::{
    EvolutionConfig, EvolutionEngine, EvolutionReason, PerformanceSnapshot, Strategy, StrategyKind,
};
pub use isolation::{
    AccessDecision, IsolationConfig, IsolationContext, IsolationLayer, Operation, Permissions,
};
pub use patterns::{PatternConfig, PatternEngine, RetrievedEpisode};
pub use scope::{ScopeKey, ScopeRegistry};
pub use store::{
    DiscoveredPattern, Episode, EpisodeBuilder, EpisodeQuery, EpisodeType, MemoryTier,
    SimTierStore, StoreError, StoreResult, TierStore,
};
pub use substrate::{
    MemoryEvent, MemorySubstrate, RequestContext, RetrieveOptions, RetrieveResult, SubstrateConfig,
};

#[cfg(feature = "postgres")]
pub use store::PostgresTierStore;

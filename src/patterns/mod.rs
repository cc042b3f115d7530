//! Patterns - Unsupervised Discovery of Behavioral Regularities
//!
//! `TigerStyle`: Four deterministic analyzers (temporal, contextual,
//! cross-memory, behavioral) run concurrently over the recent episode
//! window; only candidates above the confidence/support gate are stored,
//! and stored patterns feed a capped relevance boost back into retrieval.

mod analyzer;
mod behavioral;
mod contextual;
mod cross_memory;
mod engine;
mod temporal;

pub use analyzer::{AnalysisWindow, CandidatePattern, PatternAnalyzer};
pub use behavioral::BehavioralAnalyzer;
pub use contextual::ContextualAnalyzer;
pub use cross_memory::CrossMemoryAnalyzer;
pub use engine::{
    EnhancedRetrieval, PatternConfig, PatternEngine, PatternStats, PatternSuggestion,
    RetrievedEpisode,
};
pub use temporal::TemporalAnalyzer;

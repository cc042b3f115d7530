//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `AUDIT_RING_ENTRIES_COUNT_MAX` (not `MAX_AUDIT_ENTRIES`)
//!
//! Every constant includes units in the name:
//! - _`BYTES_MAX/MIN` for size limits
//! - _`MS_DEFAULT` / _`SECS_MAX` for time durations
//! - _`COUNT_MAX` for quantity limits
//! - bare ratios and scores are dimensionless values in [0, 1]

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;

/// Milliseconds per day
pub const TIME_MS_PER_DAY: u64 = 24 * TIME_MS_PER_HOUR;

// =============================================================================
// Isolation Context Limits
// =============================================================================

/// Default session timeout for isolation contexts (30 minutes)
pub const CONTEXT_SESSION_TIMEOUT_MS_DEFAULT: u64 = 30 * TIME_MS_PER_MIN;

/// Access count above which the rate heuristic is consulted
pub const CONTEXT_RATE_CHECK_ACCESS_COUNT_MIN: u64 = 100;

/// Maximum sustained access rate before a context is considered suspicious
pub const CONTEXT_ACCESS_RATE_PER_SEC_MAX: f64 = 10.0;

/// Maximum number of audit entries held in the in-memory ring
pub const AUDIT_RING_ENTRIES_COUNT_MAX: usize = 10_000;

/// Contamination risk at or above which an operation is denied
pub const CONTAMINATION_RISK_THRESHOLD_DEFAULT: f64 = 0.7;

/// Contamination weight for a mismatched user identifier
pub const CONTAMINATION_WEIGHT_USER_ID: f64 = 0.5;

/// Contamination weight for a mismatched session identifier
pub const CONTAMINATION_WEIGHT_SESSION_ID: f64 = 0.3;

/// Contamination weight for a mismatched thread identifier
pub const CONTAMINATION_WEIGHT_THREAD_ID: f64 = 0.2;

/// Interval between comprehensive cross-contamination scans (1 hour)
pub const SECURITY_SCAN_INTERVAL_MS_DEFAULT: u64 = TIME_MS_PER_HOUR;

// =============================================================================
// Episode Limits
// =============================================================================

/// Base importance before type weighting and bonuses
pub const EPISODE_IMPORTANCE_BASE: f64 = 0.5;

/// Minimum importance score
pub const EPISODE_IMPORTANCE_MIN: f64 = 0.0;

/// Maximum importance score
pub const EPISODE_IMPORTANCE_MAX: f64 = 1.0;

/// Minimum learned type weight
pub const EPISODE_TYPE_WEIGHT_MIN: f64 = 0.5;

/// Maximum learned type weight
pub const EPISODE_TYPE_WEIGHT_MAX: f64 = 2.0;

/// Initial learned type weight
pub const EPISODE_TYPE_WEIGHT_DEFAULT: f64 = 1.0;

/// Strings in sanitized episode context are truncated to this length
pub const EPISODE_CONTEXT_STRING_BYTES_MAX: usize = 500;

/// Inline blobs larger than this are stripped from episode context
pub const EPISODE_CONTEXT_BLOB_BYTES_MAX: usize = 10_000;

// =============================================================================
// Importance Bonuses
// =============================================================================

/// Content length at which the depth bonus applies
pub const IMPORTANCE_CONTENT_DEPTH_BYTES_MIN: usize = 500;

/// Content length at which the second depth bonus applies
pub const IMPORTANCE_CONTENT_DEEP_BYTES_MIN: usize = 2000;

/// Bonus per content-depth threshold crossed
pub const IMPORTANCE_BONUS_CONTENT_DEPTH: f64 = 0.1;

/// Bonus for question/answer shaped content
pub const IMPORTANCE_BONUS_QUESTION_SHAPE: f64 = 0.05;

/// Bonus for domain keyword presence
pub const IMPORTANCE_BONUS_DOMAIN_KEYWORD: f64 = 0.1;

/// Bonus for a user-initiated interaction
pub const IMPORTANCE_BONUS_USER_INITIATED: f64 = 0.05;

/// Bonus for screenshot presence
pub const IMPORTANCE_BONUS_SCREENSHOT: f64 = 0.05;

/// Bonus for a session-start interaction
pub const IMPORTANCE_BONUS_SESSION_START: f64 = 0.05;

/// Conversation length (turns) at which the length bonus applies
pub const IMPORTANCE_CONVERSATION_TURNS_MIN: u64 = 10;

/// Bonus for a long conversation
pub const IMPORTANCE_BONUS_CONVERSATION_LENGTH: f64 = 0.05;

/// Bonus for explicit task completion
pub const IMPORTANCE_BONUS_TASK_COMPLETED: f64 = 0.15;

/// User rating at or above which the high-rating bonus applies
pub const IMPORTANCE_RATING_HIGH_MIN: f64 = 0.8;

/// Bonus for a high user rating
pub const IMPORTANCE_BONUS_HIGH_RATING: f64 = 0.1;

/// Bonus for a flagged learning moment
pub const IMPORTANCE_BONUS_LEARNING_MOMENT: f64 = 0.1;

/// Bonus for a flagged solved problem
pub const IMPORTANCE_BONUS_PROBLEM_SOLVED: f64 = 0.15;

/// Window within which an error episode earns the recency bonus (5 minutes)
pub const IMPORTANCE_ERROR_RECENCY_WINDOW_MS: u64 = 5 * TIME_MS_PER_MIN;

/// Bonus for a recent error episode
pub const IMPORTANCE_BONUS_ERROR_RECENCY: f64 = 0.1;

// =============================================================================
// Satisfaction Inference
// =============================================================================

/// Follow-ups quicker than this imply dissatisfaction (30 seconds)
pub const SATISFACTION_QUICK_FOLLOWUP_MS_MAX: u64 = 30 * TIME_MS_PER_SEC;

/// Sessions longer than this imply satisfaction (5 minutes)
pub const SATISFACTION_SESSION_LONG_MS_MIN: u64 = 5 * TIME_MS_PER_MIN;

/// Sessions shorter than this imply dissatisfaction (30 seconds)
pub const SATISFACTION_SESSION_SHORT_MS_MAX: u64 = 30 * TIME_MS_PER_SEC;

/// Inferred satisfaction for an explicitly completed task
pub const SATISFACTION_TASK_COMPLETED: f64 = 0.9;

/// Inferred satisfaction for a long session
pub const SATISFACTION_SESSION_LONG: f64 = 0.8;

/// Inferred satisfaction for a continued conversation
pub const SATISFACTION_CONVERSATION_CONTINUED: f64 = 0.7;

/// Inferred satisfaction for a quick follow-up or short session
pub const SATISFACTION_LOW: f64 = 0.3;

// =============================================================================
// Promotion
// =============================================================================

/// Importance at or above which promotion is evaluated
pub const PROMOTION_IMPORTANCE_THRESHOLD_DEFAULT: f64 = 0.8;

/// Satisfaction a success episode needs for immediate promotion
pub const PROMOTION_SUCCESS_SATISFACTION_MIN: f64 = 0.7;

/// Satisfaction a learning episode needs for immediate promotion
pub const PROMOTION_LEARNING_SATISFACTION_MIN: f64 = 0.6;

/// Similar episodes required for similarity-based promotion
pub const PROMOTION_SIMILAR_COUNT_MIN: u64 = 3;

/// Maximum importance distance for episodes to count as similar
pub const PROMOTION_SIMILAR_IMPORTANCE_DELTA_MAX: f64 = 0.1;

/// Look-back window for similarity-based promotion (30 days)
pub const PROMOTION_SIMILAR_WINDOW_MS: u64 = 30 * TIME_MS_PER_DAY;

// =============================================================================
// Retrieval
// =============================================================================

/// Ranking affinity for an episode from the querying session
pub const RETRIEVAL_SESSION_AFFINITY_SAME: f64 = 1.0;

/// Ranking affinity for an episode from another session
pub const RETRIEVAL_SESSION_AFFINITY_OTHER: f64 = 0.8;

/// Default number of retrieval results
pub const RETRIEVAL_RESULTS_COUNT_DEFAULT: usize = 20;

/// Maximum number of retrieval results
pub const RETRIEVAL_RESULTS_COUNT_MAX: usize = 100;

// =============================================================================
// Consolidation
// =============================================================================

/// Interval between consolidation cycles (1 hour)
pub const CONSOLIDATION_INTERVAL_MS_DEFAULT: u64 = TIME_MS_PER_HOUR;

/// Rate at which learned type weights move toward their target
pub const CONSOLIDATION_ADAPTATION_RATE_DEFAULT: f64 = 0.1;

/// Look-back window for promotion re-evaluation (24 hours)
pub const CONSOLIDATION_REEVALUATION_WINDOW_MS: u64 = TIME_MS_PER_DAY;

// =============================================================================
// Pattern Discovery
// =============================================================================

/// Confidence below which a candidate pattern is discarded
pub const PATTERN_CONFIDENCE_THRESHOLD_DEFAULT: f64 = 0.7;

/// Support below which a candidate pattern is discarded
pub const PATTERN_SUPPORT_COUNT_MIN_DEFAULT: u64 = 3;

/// Maximum stored patterns per scope
pub const PATTERN_SCOPE_COUNT_MAX: usize = 500;

/// Episodes examined per analysis pass
pub const PATTERN_ANALYSIS_WINDOW_COUNT_MAX: usize = 200;

/// Interval between pattern re-evaluation cycles (1 hour)
pub const PATTERN_DISCOVERY_INTERVAL_MS_DEFAULT: u64 = TIME_MS_PER_HOUR;

/// Retrieval boost for a matching domain preference
pub const PATTERN_BOOST_DOMAIN_MATCH: f64 = 0.3;

/// Retrieval boost for a matching peak activity hour
pub const PATTERN_BOOST_PEAK_HOUR_MATCH: f64 = 0.2;

/// Maximum retrieval boost from complexity similarity
pub const PATTERN_BOOST_COMPLEXITY_MAX: f64 = 0.2;

/// Cap on the total pattern-derived boost for one episode
pub const PATTERN_BOOST_TOTAL_MAX: f64 = 0.5;

// =============================================================================
// Evolution
// =============================================================================

/// Interval between scheduled evolution cycles (12 hours)
pub const EVOLUTION_INTERVAL_MS_DEFAULT: u64 = 12 * TIME_MS_PER_HOUR;

/// Relative step for small parameter perturbations
pub const EVOLUTION_MUTATION_STEP_RATIO_DEFAULT: f64 = 0.1;

/// Small perturbations proposed per parameter
pub const EVOLUTION_PERTURBATION_COUNT: usize = 3;

/// Fully random mutations proposed per parameter
pub const EVOLUTION_RANDOM_MUTATION_COUNT: usize = 2;

/// Exponential smoothing factor for fitness updates
pub const EVOLUTION_FITNESS_SMOOTHING_ALPHA: f64 = 0.3;

/// Average fitness below which evolution triggers
pub const EVOLUTION_FITNESS_LOW_THRESHOLD: f64 = 0.5;

/// Minimum fitness value
pub const EVOLUTION_FITNESS_MIN: f64 = 0.0;

/// Maximum fitness value
pub const EVOLUTION_FITNESS_MAX: f64 = 1.0;

/// Ideal episodic-to-semantic promotion rate for consolidation fitness
pub const EVOLUTION_PROMOTION_RATE_IDEAL: f64 = 0.10;

/// Evolution history entries retained per scope
pub const EVOLUTION_HISTORY_ENTRIES_COUNT_MAX: usize = 100;

// =============================================================================
// Scope Registry
// =============================================================================

/// Idle time after which per-scope state is evicted (1 hour)
pub const SCOPE_IDLE_EVICT_MS_DEFAULT: u64 = TIME_MS_PER_HOUR;

// =============================================================================
// Events
// =============================================================================

/// Capacity of the bounded notification channel
pub const EVENTS_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 30 * TIME_MS_PER_DAY;

/// Maximum probability for fault injection (1.0 = 100%)
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

// =============================================================================
// Telemetry
// =============================================================================

/// Default env-filter directive when `RUST_LOG` is unset
pub const TELEMETRY_FILTER_DEFAULT: &str = "strata_memory=info";

// =============================================================================
// Tests
// =============================================================================

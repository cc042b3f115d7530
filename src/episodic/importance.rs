//! Importance Scoring and Satisfaction Inference
//!
//! `TigerStyle`: Score starts at the base, is multiplied by the learned
//! per-type weight, accumulates additive bonuses, and is clamped to [0, 1].
//! All thresholds are named constants.

use std::collections::HashMap;

use serde_json::Value;

use crate::constants::*;
use crate::store::{EpisodeType, TypeAggregate};

// =============================================================================
// TypeWeights
// =============================================================================

/// Learned per-type importance multipliers in [0.5, 2.0].
///
/// Seeded at 1.0 and moved slowly toward historical performance by the
/// consolidation cycle.
#[derive(Debug, Clone)]
pub struct TypeWeights {
    weights: HashMap<EpisodeType, f64>,
}

impl TypeWeights {
    /// Create weights seeded at the default.
    #[must_use]
    pub fn new() -> Self {
        let weights = EpisodeType::all()
            .iter()
            .map(|t| (*t, EPISODE_TYPE_WEIGHT_DEFAULT))
            .collect();
        Self { weights }
    }

    /// The weight for a type.
    #[must_use]
    pub fn get(&self, episode_type: EpisodeType) -> f64 {
        self.weights
            .get(&episode_type)
            .copied()
            .unwrap_or(EPISODE_TYPE_WEIGHT_DEFAULT)
    }

    /// Set a weight, clamped to the valid domain.
    pub fn set(&mut self, episode_type: EpisodeType, weight: f64) {
        let clamped = weight.clamp(EPISODE_TYPE_WEIGHT_MIN, EPISODE_TYPE_WEIGHT_MAX);
        self.weights.insert(episode_type, clamped);

        // Postcondition
        assert!(
            (EPISODE_TYPE_WEIGHT_MIN..=EPISODE_TYPE_WEIGHT_MAX).contains(&self.get(episode_type)),
            "weight must stay in domain"
        );
    }

    /// Move each weight toward its historical target by the adaptation rate.
    ///
    /// The target combines average importance and satisfaction: types that
    /// consistently produce important, satisfying episodes drift up, others
    /// drift down. Types without history are untouched.
    pub fn learn_from(&mut self, aggregates: &[TypeAggregate], adaptation_rate: f64) {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&adaptation_rate),
            "adaptation_rate must be in [0, 1]"
        );

        for aggregate in aggregates {
            let avg_importance = aggregate.avg_importance;
            let signal = match aggregate.avg_satisfaction {
                Some(avg_satisfaction) => (avg_importance + avg_satisfaction) / 2.0,
                None => avg_importance,
            };

            let target = (EPISODE_TYPE_WEIGHT_MIN + 1.5 * signal)
                .clamp(EPISODE_TYPE_WEIGHT_MIN, EPISODE_TYPE_WEIGHT_MAX);

            let current = self.get(aggregate.episode_type);
            let updated = current + adaptation_rate * (target - current);
            self.set(aggregate.episode_type, updated);
        }
    }

    /// Snapshot of the weights for stats reporting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(EpisodeType, f64)> {
        let mut entries: Vec<(EpisodeType, f64)> =
            self.weights.iter().map(|(t, w)| (*t, *w)).collect();
        entries.sort_by_key(|(t, _)| t.as_str());
        entries
    }
}

impl Default for TypeWeights {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ImportanceScorer
// =============================================================================

/// Computes write-time importance for an episode.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    /// Keywords that mark domain-relevant content
    domain_keywords: Vec<String>,
}

impl ImportanceScorer {
    /// Create a scorer with the default domain vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain_keywords: [
                "code", "deploy", "config", "database", "api", "debug", "build", "test",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }

    /// Create a scorer with a custom domain vocabulary.
    #[must_use]
    pub fn with_domain_keywords(domain_keywords: Vec<String>) -> Self {
        Self { domain_keywords }
    }

    /// Score an episode's importance.
    ///
    /// Starts at the base, multiplies by the learned type weight, adds the
    /// bonus table, and clamps to [0, 1].
    #[must_use]
    pub fn score(
        &self,
        episode_type: EpisodeType,
        type_weight: f64,
        content: &Value,
        metadata: &Value,
        now_ms: u64,
    ) -> f64 {
        // Preconditions
        assert!(
            (EPISODE_TYPE_WEIGHT_MIN..=EPISODE_TYPE_WEIGHT_MAX).contains(&type_weight),
            "type_weight {type_weight} outside domain"
        );

        let mut score = EPISODE_IMPORTANCE_BASE * type_weight;

        let content_text = content.to_string();
        let content_lower = content_text.to_lowercase();

        // Content depth
        if content_text.len() >= IMPORTANCE_CONTENT_DEPTH_BYTES_MIN {
            score += IMPORTANCE_BONUS_CONTENT_DEPTH;
        }
        if content_text.len() >= IMPORTANCE_CONTENT_DEEP_BYTES_MIN {
            score += IMPORTANCE_BONUS_CONTENT_DEPTH;
        }

        // Question/answer shape
        let has_question = content
            .get("query")
            .and_then(Value::as_str)
            .is_some_and(|q| q.contains('?'));
        let has_answer = content
            .get("response")
            .and_then(Value::as_str)
            .is_some_and(|r| !r.is_empty());
        if has_question && has_answer {
            score += IMPORTANCE_BONUS_QUESTION_SHAPE;
        }

        // Domain vocabulary
        if self
            .domain_keywords
            .iter()
            .any(|kw| content_lower.contains(kw.as_str()))
        {
            score += IMPORTANCE_BONUS_DOMAIN_KEYWORD;
        }

        // Metadata signals
        if flag(metadata, "user_initiated") {
            score += IMPORTANCE_BONUS_USER_INITIATED;
        }
        if flag(metadata, "has_screenshot") {
            score += IMPORTANCE_BONUS_SCREENSHOT;
        }
        if flag(metadata, "session_start") {
            score += IMPORTANCE_BONUS_SESSION_START;
        }
        if metadata
            .get("conversation_turns")
            .and_then(Value::as_u64)
            .is_some_and(|turns| turns >= IMPORTANCE_CONVERSATION_TURNS_MIN)
        {
            score += IMPORTANCE_BONUS_CONVERSATION_LENGTH;
        }
        if flag(metadata, "task_completed") {
            score += IMPORTANCE_BONUS_TASK_COMPLETED;
        }
        if metadata
            .get("rating")
            .and_then(Value::as_f64)
            .is_some_and(|rating| normalize_rating(rating) >= IMPORTANCE_RATING_HIGH_MIN)
        {
            score += IMPORTANCE_BONUS_HIGH_RATING;
        }
        if flag(metadata, "learning_moment") {
            score += IMPORTANCE_BONUS_LEARNING_MOMENT;
        }
        if flag(metadata, "problem_solved") {
            score += IMPORTANCE_BONUS_PROBLEM_SOLVED;
        }

        // Error recency: a fresh error matters more than an old one
        if episode_type == EpisodeType::Error {
            let occurred_ms = metadata
                .get("occurred_at_ms")
                .and_then(Value::as_u64)
                .unwrap_or(now_ms);
            if now_ms.saturating_sub(occurred_ms) <= IMPORTANCE_ERROR_RECENCY_WINDOW_MS {
                score += IMPORTANCE_BONUS_ERROR_RECENCY;
            }
        }

        let score = score.clamp(EPISODE_IMPORTANCE_MIN, EPISODE_IMPORTANCE_MAX);

        // Postcondition
        assert!(
            (EPISODE_IMPORTANCE_MIN..=EPISODE_IMPORTANCE_MAX).contains(&score),
            "importance must be in [0, 1]"
        );
        score
    }
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Satisfaction Inference
// =============================================================================

/// Infer user satisfaction from explicit and behavioral signals.
///
/// Explicit signals (rating, feedback) win over inferred ones; None when no
/// signal is present.
#[must_use]
pub fn infer_satisfaction(metadata: &Value) -> Option<f64> {
    // Explicit rating
    if let Some(rating) = metadata.get("rating").and_then(Value::as_f64) {
        return Some(normalize_rating(rating));
    }

    // Explicit feedback
    if let Some(feedback) = metadata.get("feedback").and_then(Value::as_str) {
        return Some(match feedback.to_lowercase().as_str() {
            "positive" => 0.9,
            "negative" => 0.2,
            _ => 0.5,
        });
    }

    // Task completion
    if flag(metadata, "task_completed") {
        return Some(SATISFACTION_TASK_COMPLETED);
    }

    // A quick follow-up signals the answer missed
    if let Some(delay_ms) = metadata.get("followup_delay_ms").and_then(Value::as_u64) {
        if delay_ms < SATISFACTION_QUICK_FOLLOWUP_MS_MAX {
            return Some(SATISFACTION_LOW);
        }
    }

    // Session duration thresholds
    if let Some(duration_ms) = metadata.get("session_duration_ms").and_then(Value::as_u64) {
        if duration_ms > SATISFACTION_SESSION_LONG_MS_MIN {
            return Some(SATISFACTION_SESSION_LONG);
        }
        if duration_ms < SATISFACTION_SESSION_SHORT_MS_MAX {
            return Some(SATISFACTION_LOW);
        }
    }

    // Conversation kept going
    if flag(metadata, "conversation_continued") {
        return Some(SATISFACTION_CONVERSATION_CONTINUED);
    }

    None
}

/// Ratings above 1.0 are treated as a five-point scale.
fn normalize_rating(rating: f64) -> f64 {
    if rating > 1.0 {
        (rating / 5.0).clamp(0.0, 1.0)
    } else {
        rating.clamp(0.0, 1.0)
    }
}

fn flag(metadata: &Value, key: &str) -> bool {
    metadata.get(key).and_then(Value::as_bool) == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weights_seeded_at_default() {
        let weights = TypeWeights::new();
        for episode_type in EpisodeType::all() {
            assert_eq!(weights.get(*episode_type), EPISODE_TYPE_WEIGHT_DEFAULT);
        }
    }

    #[test]
    fn test_weights_clamped() {
        let mut weights = TypeWeights::new();
        weights.set(EpisodeType::Error, 5.0);
        assert_eq!(weights.get(EpisodeType::Error), EPISODE_TYPE_WEIGHT_MAX);

        weights.set(EpisodeType::Error, 0.0);
        assert_eq!(weights.get(EpisodeType::Error), EPISODE_TYPE_WEIGHT_MIN);
    }

    #[test]
    fn test_learn_moves_toward_target() {
        let mut weights = TypeWeights::new();
        let aggregates = vec![TypeAggregate {
            episode_type: EpisodeType::Success,
            count: 10,
            avg_importance: 0.9,
            avg_satisfaction: Some(0.9),
        }];

        let before = weights.get(EpisodeType::Success);
        weights.learn_from(&aggregates, 0.1);
        let after = weights.get(EpisodeType::Success);

        // Target is 0.5 + 1.5 * 0.9 = 1.85, so the weight drifts up
        assert!(after > before);
        assert!(after <= EPISODE_TYPE_WEIGHT_MAX);

        // Types without history are untouched
        assert_eq!(weights.get(EpisodeType::Error), EPISODE_TYPE_WEIGHT_DEFAULT);
    }

    #[test]
    fn test_learn_converges_without_overshoot() {
        let mut weights = TypeWeights::new();
        let aggregates = vec![TypeAggregate {
            episode_type: EpisodeType::Conversation,
            count: 100,
            avg_importance: 0.2,
            avg_satisfaction: Some(0.2),
        }];

        for _ in 0..200 {
            weights.learn_from(&aggregates, 0.1);
        }

        // Target is 0.5 + 1.5 * 0.2 = 0.8
        let weight = weights.get(EpisodeType::Conversation);
        assert!((weight - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_score_in_bounds_for_all_inputs() {
        let scorer = ImportanceScorer::new();
        let loaded_metadata = json!({
            "user_initiated": true,
            "has_screenshot": true,
            "session_start": true,
            "conversation_turns": 50,
            "task_completed": true,
            "rating": 5.0,
            "learning_moment": true,
            "problem_solved": true,
        });

        for episode_type in EpisodeType::all() {
            for type_weight in [0.5, 1.0, 2.0] {
                let score = scorer.score(
                    *episode_type,
                    type_weight,
                    &json!({"query": "why?", "response": "because"}),
                    &loaded_metadata,
                    0,
                );
                assert!((0.0..=1.0).contains(&score), "score {score} out of bounds");
            }
        }
    }

    #[test]
    fn test_bonuses_accumulate() {
        let scorer = ImportanceScorer::new();
        let bare = scorer.score(
            EpisodeType::Conversation,
            1.0,
            &json!({"query": "hi"}),
            &json!({}),
            0,
        );
        let loaded = scorer.score(
            EpisodeType::Conversation,
            1.0,
            &json!({"query": "how do I deploy this?", "response": "like so"}),
            &json!({"user_initiated": true, "task_completed": true}),
            0,
        );

        assert!(loaded > bare);
    }

    #[test]
    fn test_error_recency_bonus() {
        let scorer = ImportanceScorer::new();
        let now_ms = 10 * TIME_MS_PER_MIN;

        let fresh = scorer.score(
            EpisodeType::Error,
            1.0,
            &json!({"query": "it broke"}),
            &json!({"occurred_at_ms": now_ms - TIME_MS_PER_MIN}),
            now_ms,
        );
        let stale = scorer.score(
            EpisodeType::Error,
            1.0,
            &json!({"query": "it broke"}),
            &json!({"occurred_at_ms": 0}),
            now_ms,
        );

        assert!(fresh > stale);
        assert!((fresh - stale - IMPORTANCE_BONUS_ERROR_RECENCY).abs() < 1e-9);
    }

    #[test]
    fn test_satisfaction_explicit_rating_wins() {
        let satisfaction = infer_satisfaction(&json!({
            "rating": 4.0,
            "task_completed": true,
            "followup_delay_ms": 100,
        }));
        assert_eq!(satisfaction, Some(0.8));
    }

    #[test]
    fn test_satisfaction_inference_order() {
        assert_eq!(
            infer_satisfaction(&json!({"feedback": "positive"})),
            Some(0.9)
        );
        assert_eq!(
            infer_satisfaction(&json!({"task_completed": true})),
            Some(SATISFACTION_TASK_COMPLETED)
        );
        assert_eq!(
            infer_satisfaction(&json!({"followup_delay_ms": 5_000})),
            Some(SATISFACTION_LOW)
        );
        assert_eq!(
            infer_satisfaction(&json!({"session_duration_ms": 10 * TIME_MS_PER_MIN})),
            Some(SATISFACTION_SESSION_LONG)
        );
        assert_eq!(
            infer_satisfaction(&json!({"session_duration_ms": 10_000})),
            Some(SATISFACTION_LOW)
        );
        // Between the short and long thresholds, duration says nothing
        assert_eq!(
            infer_satisfaction(&json!({"session_duration_ms": 60_000})),
            None
        );
        assert_eq!(
            infer_satisfaction(&json!({"conversation_continued": true})),
            Some(SATISFACTION_CONVERSATION_CONTINUED)
        );
        assert_eq!(infer_satisfaction(&json!({})), None);
    }

    #[test]
    fn test_rating_normalization() {
        assert_eq!(infer_satisfaction(&json!({"rating": 0.6})), Some(0.6));
        assert_eq!(infer_satisfaction(&json!({"rating": 3.0})), Some(0.6));
        assert_eq!(infer_satisfaction(&json!({"rating": 5.0})), Some(1.0));
    }
}

//! PatternAnalyzer Trait and Analysis Inputs
//!
//! `TigerStyle`: Analyzers are pure functions over an episode window, so
//! identical input data always yields identical confidences. The engine owns
//! thresholds; analyzers emit every candidate they can compute.

use serde_json::Value;

use crate::store::{Episode, PatternCategory};

/// The episode window one analysis pass examines.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    /// Recent episodes, oldest first
    pub episodes: Vec<Episode>,
    /// Promoted episodes within the window
    pub promoted_count: u64,
}

impl AnalysisWindow {
    /// Build a window from episodes (any order; sorted oldest first here).
    #[must_use]
    pub fn new(mut episodes: Vec<Episode>) -> Self {
        episodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let promoted_count = episodes.iter().filter(|e| e.promoted_to_semantic).count() as u64;
        Self {
            episodes,
            promoted_count,
        }
    }

    /// Number of episodes in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// One candidate regularity produced by an analyzer.
///
/// Candidates below the engine's confidence/support thresholds are
/// discarded before persistence.
#[derive(Debug, Clone)]
pub struct CandidatePattern {
    /// Analysis family
    pub category: PatternCategory,
    /// Descriptor within the family
    pub descriptor: String,
    /// Natural-key description text
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Supporting occurrences
    pub support: u64,
    /// Category-specific payload
    pub parameters: Value,
}

impl CandidatePattern {
    /// Create a candidate.
    ///
    /// # Panics
    /// Panics if confidence is outside [0, 1].
    #[must_use]
    pub fn new(
        category: PatternCategory,
        descriptor: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        support: u64,
        parameters: Value,
    ) -> Self {
        // Precondition
        assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence {confidence} outside [0, 1]"
        );

        Self {
            category,
            descriptor: descriptor.into(),
            description: description.into(),
            confidence,
            support,
            parameters,
        }
    }
}

/// One analysis family.
///
/// Implementations must be deterministic: same window, same candidates.
pub trait PatternAnalyzer: Send + Sync {
    /// The category this analyzer produces.
    fn category(&self) -> PatternCategory;

    /// Analyze a window and return zero or more candidates.
    fn analyze(&self, window: &AnalysisWindow) -> Vec<CandidatePattern>;
}

/// Mean of a sample.
#[must_use]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation of a sample.
#[must_use]
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation, zero-guarded.
#[must_use]
pub(crate) fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_window_sorted_oldest_first() {
        let late = Episode::builder(1, "u1")
            .created_at(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap())
            .build();
        let early = Episode::builder(1, "u1")
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
            .build();

        let window = AnalysisWindow::new(vec![late, early]);
        assert!(window.episodes[0].created_at < window.episodes[1].created_at);
    }

    #[test]
    fn test_window_counts_promoted() {
        let mut promoted = Episode::builder(1, "u1").build();
        promoted.promoted_to_semantic = true;
        let plain = Episode::builder(1, "u1").build();

        let window = AnalysisWindow::new(vec![promoted, plain]);
        assert_eq!(window.promoted_count, 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_statistics_helpers() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
        assert_eq!(std_dev(&[5.0]), 0.0);
        assert!((std_dev(&[2.0, 4.0]) - 1.0).abs() < 1e-9);

        // Identical values have zero variation
        assert_eq!(coefficient_of_variation(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    #[should_panic(expected = "confidence")]
    fn test_candidate_confidence_bounds() {
        let _ = CandidatePattern::new(
            PatternCategory::Temporal,
            "time_of_day",
            "bad",
            1.5,
            3,
            Value::Null,
        );
    }
}

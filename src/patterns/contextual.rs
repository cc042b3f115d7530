//! Contextual Analyzer
//!
//! Mines domain preference, initiation style, and complexity regularity
//! from sanitized episode context.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::store::PatternCategory;

use super::analyzer::{mean, std_dev, AnalysisWindow, CandidatePattern, PatternAnalyzer};

/// Contextual regularity analyzer.
#[derive(Debug, Default)]
pub struct ContextualAnalyzer;

impl PatternAnalyzer for ContextualAnalyzer {
    fn category(&self) -> PatternCategory {
        PatternCategory::Contextual
    }

    fn analyze(&self, window: &AnalysisWindow) -> Vec<CandidatePattern> {
        let mut candidates = Vec::new();

        if window.is_empty() {
            return candidates;
        }

        // Domain frequency
        let mut domain_counts: HashMap<&str, u64> = HashMap::new();
        for episode in &window.episodes {
            if let Some(domain) = episode.context.get("domain").and_then(Value::as_str) {
                *domain_counts.entry(domain).or_insert(0) += 1;
            }
        }
        if let Some((domain, count)) = domain_counts
            .iter()
            .max_by_key(|(domain, count)| (**count, std::cmp::Reverse(*domain)))
            .map(|(domain, count)| (*domain, *count))
        {
            let total: u64 = domain_counts.values().sum();
            let ratio = count as f64 / total as f64;
            candidates.push(CandidatePattern::new(
                PatternCategory::Contextual,
                "domain_preference",
                format!("preferred domain {domain}"),
                ratio,
                count,
                json!({"domain": domain, "ratio": ratio}),
            ));
        }

        // User-vs-system initiation ratio
        let initiated: Vec<bool> = window
            .episodes
            .iter()
            .filter_map(|e| e.context.get("user_initiated").and_then(Value::as_bool))
            .collect();
        if !initiated.is_empty() {
            let user_count = initiated.iter().filter(|b| **b).count() as u64;
            let user_ratio = user_count as f64 / initiated.len() as f64;
            let dominant_ratio = user_ratio.max(1.0 - user_ratio);
            let description = if user_ratio >= 0.5 {
                "predominantly user-initiated"
            } else {
                "predominantly system-initiated"
            };
            candidates.push(CandidatePattern::new(
                PatternCategory::Contextual,
                "initiation_ratio",
                description,
                dominant_ratio,
                initiated.len() as u64,
                json!({"user_ratio": user_ratio}),
            ));
        }

        // Complexity deviation from mean
        let complexities: Vec<f64> = window
            .episodes
            .iter()
            .filter_map(|e| e.context.get("complexity").and_then(Value::as_f64))
            .collect();
        if complexities.len() >= 2 {
            let deviation = std_dev(&complexities);
            // Complexity lives in [0, 1]; double the deviation to normalize
            let confidence = (1.0 - 2.0 * deviation).clamp(0.0, 1.0);
            candidates.push(CandidatePattern::new(
                PatternCategory::Contextual,
                "complexity_profile",
                "consistent task complexity",
                confidence,
                complexities.len() as u64,
                json!({"mean_complexity": mean(&complexities), "std_dev": deviation}),
            ));
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Episode;
    use chrono::{TimeZone, Utc};

    fn episode_with_context(minute: u32, context: Value) -> Episode {
        Episode::builder(1, "u1")
            .context(context)
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, 9, minute, 0).unwrap())
            .build()
    }

    #[test]
    fn test_domain_preference() {
        let episodes = vec![
            episode_with_context(0, json!({"domain": "coding"})),
            episode_with_context(1, json!({"domain": "coding"})),
            episode_with_context(2, json!({"domain": "coding"})),
            episode_with_context(3, json!({"domain": "writing"})),
        ];
        let window = AnalysisWindow::new(episodes);

        let candidates = ContextualAnalyzer.analyze(&window);
        let domain = candidates
            .iter()
            .find(|c| c.descriptor == "domain_preference")
            .unwrap();

        assert_eq!(domain.parameters["domain"], "coding");
        assert_eq!(domain.support, 3);
        assert!((domain.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_initiation_ratio_user_dominant() {
        let episodes = vec![
            episode_with_context(0, json!({"user_initiated": true})),
            episode_with_context(1, json!({"user_initiated": true})),
            episode_with_context(2, json!({"user_initiated": true})),
            episode_with_context(3, json!({"user_initiated": false})),
        ];
        let window = AnalysisWindow::new(episodes);

        let candidates = ContextualAnalyzer.analyze(&window);
        let initiation = candidates
            .iter()
            .find(|c| c.descriptor == "initiation_ratio")
            .unwrap();

        assert_eq!(initiation.description, "predominantly user-initiated");
        assert!((initiation.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_system_dominant_also_confident() {
        let episodes = vec![
            episode_with_context(0, json!({"user_initiated": false})),
            episode_with_context(1, json!({"user_initiated": false})),
            episode_with_context(2, json!({"user_initiated": false})),
            episode_with_context(3, json!({"user_initiated": false})),
        ];
        let window = AnalysisWindow::new(episodes);

        let candidates = ContextualAnalyzer.analyze(&window);
        let initiation = candidates
            .iter()
            .find(|c| c.descriptor == "initiation_ratio")
            .unwrap();

        assert_eq!(initiation.description, "predominantly system-initiated");
        assert_eq!(initiation.confidence, 1.0);
    }

    #[test]
    fn test_complexity_profile() {
        let episodes = vec![
            episode_with_context(0, json!({"complexity": 0.5})),
            episode_with_context(1, json!({"complexity": 0.5})),
            episode_with_context(2, json!({"complexity": 0.5})),
        ];
        let window = AnalysisWindow::new(episodes);

        let candidates = ContextualAnalyzer.analyze(&window);
        let complexity = candidates
            .iter()
            .find(|c| c.descriptor == "complexity_profile")
            .unwrap();

        assert_eq!(complexity.confidence, 1.0);
        assert_eq!(complexity.parameters["mean_complexity"], 0.5);
    }

    #[test]
    fn test_no_context_no_candidates() {
        let episodes = vec![episode_with_context(0, Value::Null)];
        let window = AnalysisWindow::new(episodes);
        assert!(ContextualAnalyzer.analyze(&window).is_empty());
    }
}

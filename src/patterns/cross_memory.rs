//! Cross-Memory Analyzer
//!
//! Mines tier co-occurrence within storage events and the episodic-to-
//! semantic promotion rate.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::store::PatternCategory;

use super::analyzer::{AnalysisWindow, CandidatePattern, PatternAnalyzer};

/// Window size at which promotion-rate confidence saturates.
const PROMOTION_RATE_SAMPLE_SATURATION: f64 = 20.0;

/// Cross-tier regularity analyzer.
#[derive(Debug, Default)]
pub struct CrossMemoryAnalyzer;

impl PatternAnalyzer for CrossMemoryAnalyzer {
    fn category(&self) -> PatternCategory {
        PatternCategory::CrossMemory
    }

    fn analyze(&self, window: &AnalysisWindow) -> Vec<CandidatePattern> {
        let mut candidates = Vec::new();

        if window.is_empty() {
            return candidates;
        }

        // Tier co-occurrence: which tiers are touched together in one event
        let mut pair_counts: HashMap<(String, String), u64> = HashMap::new();
        let mut events_with_tiers = 0u64;
        for episode in &window.episodes {
            let Some(tiers) = episode.context.get("tiers_used").and_then(Value::as_array) else {
                continue;
            };
            let mut names: Vec<&str> = tiers.iter().filter_map(Value::as_str).collect();
            names.sort_unstable();
            names.dedup();
            if names.len() < 2 {
                continue;
            }
            events_with_tiers += 1;
            for i in 0..names.len() {
                for j in (i + 1)..names.len() {
                    *pair_counts
                        .entry((names[i].to_string(), names[j].to_string()))
                        .or_insert(0) += 1;
                }
            }
        }
        if let Some(((first, second), count)) = pair_counts
            .iter()
            .max_by_key(|(pair, count)| (**count, std::cmp::Reverse((*pair).clone())))
            .map(|(pair, count)| (pair.clone(), *count))
        {
            let ratio = count as f64 / events_with_tiers.max(1) as f64;
            candidates.push(CandidatePattern::new(
                PatternCategory::CrossMemory,
                "memory_combination",
                format!("tiers {first} and {second} used together"),
                ratio.min(1.0),
                count,
                json!({"tiers": [first, second], "ratio": ratio}),
            ));
        }

        // Promotion-rate tracking: confidence grows with sample size
        let total = window.len() as f64;
        let rate = window.promoted_count as f64 / total;
        let confidence = (total / PROMOTION_RATE_SAMPLE_SATURATION).min(1.0);
        candidates.push(CandidatePattern::new(
            PatternCategory::CrossMemory,
            "promotion_rate",
            "episodic to semantic promotion rate",
            confidence,
            window.promoted_count,
            json!({"promotion_rate": rate, "sample_size": window.len()}),
        ));

        candidates
    }
}

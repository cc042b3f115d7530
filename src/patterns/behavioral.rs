//! Behavioral Analyzer
//!
//! Mines success-rate distribution, the preferred behavior type, and the
//! adaptation-history presence rate.

use std::collections::HashMap;

use serde_json::json;

use crate::store::{EpisodeType, PatternCategory};

use super::analyzer::{AnalysisWindow, CandidatePattern, PatternAnalyzer};

/// Window size at which success-rate confidence saturates.
const SUCCESS_RATE_SAMPLE_SATURATION: f64 = 10.0;

/// Behavioral regularity analyzer.
#[derive(Debug, Default)]
pub struct BehavioralAnalyzer;

impl PatternAnalyzer for BehavioralAnalyzer {
    fn category(&self) -> PatternCategory {
        PatternCategory::Behavioral
    }

    fn analyze(&self, window: &AnalysisWindow) -> Vec<CandidatePattern> {
        let mut candidates = Vec::new();

        if window.is_empty() {
            return candidates;
        }
        let total = window.len() as f64;

        // Success-rate distribution
        let success_count = window
            .episodes
            .iter()
            .filter(|e| e.episode_type == EpisodeType::Success)
            .count() as u64;
        let success_rate = success_count as f64 / total;
        let confidence = (total / SUCCESS_RATE_SAMPLE_SATURATION).min(1.0);
        candidates.push(CandidatePattern::new(
            PatternCategory::Behavioral,
            "success_rate",
            "interaction success rate",
            confidence,
            success_count,
            json!({"success_rate": success_rate, "sample_size": window.len()}),
        ));

        // Preferred behavior type: frequency weighted by satisfaction
        let mut type_counts: HashMap<EpisodeType, (u64, Vec<f64>)> = HashMap::new();
        for episode in &window.episodes {
            let entry = type_counts.entry(episode.episode_type).or_insert((0, Vec::new()));
            entry.0 += 1;
            if let Some(satisfaction) = episode.satisfaction {
                entry.1.push(satisfaction);
            }
        }
        if let Some((episode_type, count, avg_satisfaction)) = type_counts
            .iter()
            .map(|(episode_type, (count, ratings))| {
                let avg = if ratings.is_empty() {
                    0.5
                } else {
                    ratings.iter().sum::<f64>() / ratings.len() as f64
                };
                (*episode_type, *count, avg)
            })
            .max_by(|a, b| {
                let weight_a = a.1 as f64 / total * (0.5 + a.2 / 2.0);
                let weight_b = b.1 as f64 / total * (0.5 + b.2 / 2.0);
                weight_a
                    .partial_cmp(&weight_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.as_str().cmp(a.0.as_str()))
            })
        {
            let ratio = count as f64 / total;
            let weighted = (ratio * (0.5 + avg_satisfaction / 2.0)).clamp(0.0, 1.0);
            candidates.push(CandidatePattern::new(
                PatternCategory::Behavioral,
                "preferred_behavior",
                format!("preferred behavior {episode_type}"),
                weighted,
                count,
                json!({
                    "episode_type": episode_type.as_str(),
                    "ratio": ratio,
                    "avg_satisfaction": avg_satisfaction,
                }),
            ));
        }

        // Adaptation-history presence
        let adaptation_count = window
            .episodes
            .iter()
            .filter(|e| e.context.get("adaptation").is_some())
            .count() as u64;
        if adaptation_count > 0 {
            let rate = adaptation_count as f64 / total;
            candidates.push(CandidatePattern::new(
                PatternCategory::Behavioral,
                "adaptation_presence",
                "adaptation history recorded",
                rate,
                adaptation_count,
                json!({"presence_rate": rate}),
            ));
        }

        candidates
    }
}

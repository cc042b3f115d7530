//! Temporal Analyzer
//!
//! Mines time-of-day frequency, session-duration regularity, and
//! storage-interval consistency from the episode window.

use chrono::Timelike;
use serde_json::{json, Value};

use crate::store::PatternCategory;

use super::analyzer::{coefficient_of_variation, mean, AnalysisWindow, CandidatePattern, PatternAnalyzer};

/// Temporal regularity analyzer.
#[derive(Debug, Default)]
pub struct TemporalAnalyzer;

impl PatternAnalyzer for TemporalAnalyzer {
    fn category(&self) -> PatternCategory {
        PatternCategory::Temporal
    }

    fn analyze(&self, window: &AnalysisWindow) -> Vec<CandidatePattern> {
        let mut candidates = Vec::new();

        if window.is_empty() {
            return candidates;
        }

        // Time-of-day frequency
        let mut hour_counts = [0u64; 24];
        for episode in &window.episodes {
            hour_counts[episode.created_at.hour() as usize] += 1;
        }
        let (peak_hour, peak_count) = hour_counts
            .iter()
            .enumerate()
            .max_by_key(|(hour, count)| (**count, 24 - hour))
            .map(|(hour, count)| (hour, *count))
            .unwrap_or((0, 0));

        if peak_count > 0 {
            let ratio = peak_count as f64 / window.len() as f64;
            candidates.push(CandidatePattern::new(
                PatternCategory::Temporal,
                "time_of_day",
                format!("peak activity at hour {peak_hour}"),
                ratio,
                peak_count,
                json!({"peak_hour": peak_hour, "ratio": ratio}),
            ));
        }

        // Session-duration regularity (deviation from mean)
        let durations: Vec<f64> = window
            .episodes
            .iter()
            .filter_map(|e| e.context.get("session_duration_ms"))
            .filter_map(Value::as_f64)
            .collect();
        if durations.len() >= 2 {
            let cv = coefficient_of_variation(&durations);
            let confidence = (1.0 - cv).clamp(0.0, 1.0);
            candidates.push(CandidatePattern::new(
                PatternCategory::Temporal,
                "session_duration",
                "consistent session length",
                confidence,
                durations.len() as u64,
                json!({"mean_duration_ms": mean(&durations), "cv": cv}),
            ));
        }

        // Storage-interval consistency
        let mut intervals = Vec::new();
        for pair in window.episodes.windows(2) {
            let delta_ms = (pair[1].created_at - pair[0].created_at).num_milliseconds();
            intervals.push(delta_ms.max(0) as f64);
        }
        if intervals.len() >= 2 {
            let cv = coefficient_of_variation(&intervals);
            let confidence = (1.0 - cv).clamp(0.0, 1.0);
            candidates.push(CandidatePattern::new(
                PatternCategory::Temporal,
                "storage_interval",
                "regular storage cadence",
                confidence,
                intervals.len() as u64,
                json!({"mean_interval_ms": mean(&intervals), "cv": cv}),
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
    use serde_json::json;

    fn episode_at_hour(hour: u32, minute: u32) -> Episode {
        Episode::builder(1, "u1")
            .created_at(Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap())
            .build()
    }

    #[test]
    fn test_same_hour_cluster() {
        let episodes: Vec<Episode> = (0..5).map(|m| episode_at_hour(14, m)).collect();
        let window = AnalysisWindow::new(episodes);

        let candidates = TemporalAnalyzer.analyze(&window);
        let time_of_day = candidates
            .iter()
            .find(|c| c.descriptor == "time_of_day")
            .unwrap();

        assert!(time_of_day.confidence > 0.0);
        assert_eq!(time_of_day.support, 5);
        assert_eq!(time_of_day.parameters["peak_hour"], 14);
        assert_eq!(time_of_day.confidence, 1.0);
    }

    #[test]
    fn test_scattered_hours_low_confidence() {
        let episodes: Vec<Episode> = (0..6).map(|h| episode_at_hour(h * 3, 0)).collect();
        let window = AnalysisWindow::new(episodes);

        let candidates = TemporalAnalyzer.analyze(&window);
        let time_of_day = candidates
            .iter()
            .find(|c| c.descriptor == "time_of_day")
            .unwrap();

        assert!(time_of_day.confidence < 0.5);
    }

    #[test]
    fn test_regular_intervals_high_confidence() {
        // Episodes exactly ten minutes apart
        let episodes: Vec<Episode> = (0..6).map(|i| episode_at_hour(10, i * 10)).collect();
        let window = AnalysisWindow::new(episodes);

        let candidates = TemporalAnalyzer.analyze(&window);
        let interval = candidates
            .iter()
            .find(|c| c.descriptor == "storage_interval")
            .unwrap();

        assert!(interval.confidence > 0.95);
        assert_eq!(interval.support, 5);
    }

    #[test]
    fn test_session_duration_regularity() {
        let episodes: Vec<Episode> = (0..4)
            .map(|m| {
                Episode::builder(1, "u1")
                    .context(json!({"session_duration_ms": 60_000.0}))
                    .created_at(Utc.with_ymd_and_hms(2024, 6, 1, 9, m, 0).unwrap())
                    .build()
            })
            .collect();
        let window = AnalysisWindow::new(episodes);

        let candidates = TemporalAnalyzer.analyze(&window);
        let duration = candidates
            .iter()
            .find(|c| c.descriptor == "session_duration")
            .unwrap();

        assert_eq!(duration.confidence, 1.0);
    }

    #[test]
    fn test_empty_window_no_candidates() {
        let window = AnalysisWindow::new(Vec::new());
        assert!(TemporalAnalyzer.analyze(&window).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let episodes: Vec<Episode> = (0..5).map(|m| episode_at_hour(14, m)).collect();
        let window = AnalysisWindow::new(episodes);

        let a = TemporalAnalyzer.analyze(&window);
        let b = TemporalAnalyzer.analyze(&window);

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.confidence, y.confidence);
            assert_eq!(x.support, y.support);
        }
    }
}

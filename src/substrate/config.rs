//! Substrate Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.
//! Operator-set options live here; the evolution engine hot-tunes only its
//! own strategy registry, never these fields.

use crate::constants::{
    CONSOLIDATION_INTERVAL_MS_DEFAULT, EVENTS_CHANNEL_CAPACITY,
    PATTERN_DISCOVERY_INTERVAL_MS_DEFAULT, SECURITY_SCAN_INTERVAL_MS_DEFAULT,
};
use crate::episodic::EpisodicConfig;
use crate::evolution::EvolutionConfig;
use crate::isolation::IsolationConfig;
use crate::patterns::PatternConfig;

/// Global configuration for the memory substrate.
///
/// # Example
///
/// ```
/// use strata_memory::substrate::SubstrateConfig;
///
/// let config = SubstrateConfig::default()
///     .with_seed(7)
///     .with_consolidation_interval_ms(10 * 60 * 1000);
/// ```
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// Isolation layer tuning
    pub isolation: IsolationConfig,
    /// Episodic manager tuning
    pub episodic: EpisodicConfig,
    /// Pattern discovery tuning
    pub patterns: PatternConfig,
    /// Evolution engine tuning
    pub evolution: EvolutionConfig,
    /// Interval between consolidation cycles
    pub consolidation_interval_ms: u64,
    /// Interval between comprehensive security scans
    pub security_scan_interval_ms: u64,
    /// Interval between pattern refresh cycles
    pub pattern_refresh_interval_ms: u64,
    /// Capacity of the notification channel
    pub events_capacity: usize,
    /// Seed for deterministic mutation randomness
    pub seed: u64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationConfig::default(),
            episodic: EpisodicConfig::default(),
            patterns: PatternConfig::default(),
            evolution: EvolutionConfig::default(),
            consolidation_interval_ms: CONSOLIDATION_INTERVAL_MS_DEFAULT,
            security_scan_interval_ms: SECURITY_SCAN_INTERVAL_MS_DEFAULT,
            pattern_refresh_interval_ms: PATTERN_DISCOVERY_INTERVAL_MS_DEFAULT,
            events_capacity: EVENTS_CHANNEL_CAPACITY,
            seed: 0,
        }
    }
}

impl SubstrateConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mutation seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the isolation tuning.
    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationConfig) -> Self {
        self.isolation = isolation;
        self
    }

    /// Replace the episodic tuning.
    #[must_use]
    pub fn with_episodic(mut self, episodic: EpisodicConfig) -> Self {
        self.episodic = episodic;
        self
    }

    /// Replace the pattern tuning.
    #[must_use]
    pub fn with_patterns(mut self, patterns: PatternConfig) -> Self {
        self.patterns = patterns;
        self
    }

    /// Replace the evolution tuning.
    #[must_use]
    pub fn with_evolution(mut self, evolution: EvolutionConfig) -> Self {
        self.evolution = evolution;
        self
    }

    /// Set the consolidation interval.
    #[must_use]
    pub fn with_consolidation_interval_ms(mut self, ms: u64) -> Self {
        assert!(ms > 0, "consolidation interval must be positive");
        self.consolidation_interval_ms = ms;
        self
    }

    /// Set the security scan interval.
    #[must_use]
    pub fn with_security_scan_interval_ms(mut self, ms: u64) -> Self {
        assert!(ms > 0, "security scan interval must be positive");
        self.security_scan_interval_ms = ms;
        self
    }

    /// Set the pattern refresh interval.
    #[must_use]
    pub fn with_pattern_refresh_interval_ms(mut self, ms: u64) -> Self {
        assert!(ms > 0, "pattern refresh interval must be positive");
        self.pattern_refresh_interval_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SubstrateConfig::default();

        assert_eq!(
            config.consolidation_interval_ms,
            CONSOLIDATION_INTERVAL_MS_DEFAULT
        );
        assert_eq!(config.events_capacity, EVENTS_CHANNEL_CAPACITY);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SubstrateConfig::new()
            .with_seed(42)
            .with_consolidation_interval_ms(1000)
            .with_security_scan_interval_ms(2000)
            .with_pattern_refresh_interval_ms(3000);

        assert_eq!(config.seed, 42);
        assert_eq!(config.consolidation_interval_ms, 1000);
        assert_eq!(config.security_scan_interval_ms, 2000);
        assert_eq!(config.pattern_refresh_interval_ms, 3000);
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn test_zero_interval_rejected() {
        let _ = SubstrateConfig::new().with_consolidation_interval_ms(0);
    }
}

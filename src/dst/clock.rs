//! Clock - Simulated or Wall Time
//!
//! `TigerStyle`: Deterministic, controllable time for simulation; the same
//! handle drives the interval cycles (consolidation, security scans,
//! evolution) against real time in production. Components never call system
//! time directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::constants::{DST_TIME_ADVANCE_MS_MAX, TIME_MS_PER_SEC};

/// A clock handle shared by every time-dependent component.
///
/// `TigerStyle`:
/// - Time only moves forward
/// - All time operations are explicit
/// - Simulated mode supports async sleep with notify for coordination
///
/// Thread-safe via `Arc<AtomicU64>` in simulated mode; wall mode reads the
/// system clock on demand.
#[derive(Debug, Clone)]
pub struct Clock {
    inner: ClockInner,
}

#[derive(Debug, Clone)]
enum ClockInner {
    Simulated {
        /// Current time in milliseconds since epoch (thread-safe)
        current_ms: Arc<AtomicU64>,
        /// Notify waiters when time advances
        notify: Arc<Notify>,
    },
    Wall,
}

impl Clock {
    /// Create a simulated clock starting at the given millisecond timestamp.
    ///
    /// # Example
    /// ```
    /// use strata_memory::dst::Clock;
    /// let clock = Clock::simulated(0);
    /// assert_eq!(clock.now_ms(), 0);
    /// ```
    #[must_use]
    pub fn simulated(start_ms: u64) -> Self {
        Self {
            inner: ClockInner::Simulated {
                current_ms: Arc::new(AtomicU64::new(start_ms)),
                notify: Arc::new(Notify::new()),
            },
        }
    }

    /// Create a simulated clock starting at the given `DateTime`.
    #[must_use]
    pub fn simulated_at(dt: DateTime<Utc>) -> Self {
        Self::simulated(dt.timestamp_millis().max(0) as u64)
    }

    /// Create a clock that reads the system time.
    #[must_use]
    pub fn wall() -> Self {
        Self {
            inner: ClockInner::Wall,
        }
    }

    /// Whether this clock is simulated.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        matches!(self.inner, ClockInner::Simulated { .. })
    }

    /// Get current time in milliseconds since epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        match &self.inner {
            ClockInner::Simulated { current_ms, .. } => current_ms.load(Ordering::SeqCst),
            ClockInner::Wall => Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let ms = self.now_ms() as i64;
        DateTime::from_timestamp_millis(ms)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
    }

    /// Advance simulated time by the given milliseconds.
    ///
    /// # Panics
    /// Panics on a wall clock, or if `ms` exceeds `DST_TIME_ADVANCE_MS_MAX`.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        // Preconditions
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        match &self.inner {
            ClockInner::Simulated { current_ms, notify } => {
                let old_time = current_ms.fetch_add(ms, Ordering::SeqCst);
                let new_time = old_time.saturating_add(ms);

                // Notify all waiters that time has advanced
                notify.notify_waiters();

                // Postcondition
                assert!(new_time >= old_time, "time must not go backwards");
                new_time
            }
            ClockInner::Wall => panic!("cannot advance a wall clock"),
        }
    }

    /// Advance simulated time by the given seconds.
    pub fn advance_secs(&self, secs: u64) -> u64 {
        self.advance_ms(secs * TIME_MS_PER_SEC)
    }

    /// Get elapsed time since a given timestamp, saturating at zero.
    #[must_use]
    pub fn elapsed_since(&self, since_ms: u64) -> u64 {
        self.now_ms().saturating_sub(since_ms)
    }

    /// Check if a given duration has elapsed since a timestamp.
    #[must_use]
    pub fn has_elapsed(&self, since_ms: u64, duration_ms: u64) -> bool {
        self.elapsed_since(since_ms) >= duration_ms
    }

    /// Sleep until the specified duration has passed.
    ///
    /// In simulated mode this yields and waits for time to be advanced;
    /// in wall mode it delegates to the runtime timer.
    pub async fn sleep_ms(&self, duration_ms: u64) {
        match &self.inner {
            ClockInner::Simulated { current_ms, notify } => {
                let target_ms = current_ms.load(Ordering::SeqCst).saturating_add(duration_ms);
                while current_ms.load(Ordering::SeqCst) < target_ms {
                    notify.notified().await;
                }
            }
            ClockInner::Wall => {
                tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::simulated(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_time() {
        let clock = Clock::simulated(0);
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.now_secs(), 0);
        assert!(clock.is_simulated());
    }

    #[test]
    fn test_simulated_at() {
        let dt = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .to_utc();
        let clock = Clock::simulated_at(dt);
        assert_eq!(clock.now(), dt);
    }

    #[test]
    fn test_advance_ms() {
        let clock = Clock::simulated(0);

        let new_time = clock.advance_ms(1000);

        assert_eq!(new_time, 1000);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_multiple_advances() {
        let clock = Clock::simulated(0);

        clock.advance_ms(100);
        clock.advance_ms(200);
        clock.advance_secs(1);

        assert_eq!(clock.now_ms(), 1300);
    }

    #[test]
    #[should_panic(expected = "advance_ms")]
    fn test_advance_exceeds_max() {
        let clock = Clock::simulated(0);
        clock.advance_ms(DST_TIME_ADVANCE_MS_MAX + 1);
    }

    #[test]
    #[should_panic(expected = "cannot advance a wall clock")]
    fn test_advance_wall_clock() {
        let clock = Clock::wall();
        clock.advance_ms(1);
    }

    #[test]
    fn test_elapsed_since() {
        let clock = Clock::simulated(0);
        let start = clock.now_ms();
        clock.advance_ms(500);

        assert_eq!(clock.elapsed_since(start), 500);
        // A timestamp in the future saturates to zero
        assert_eq!(clock.elapsed_since(10_000), 0);
    }

    #[test]
    fn test_has_elapsed() {
        let clock = Clock::simulated(0);
        let start = clock.now_ms();

        assert!(!clock.has_elapsed(start, 1000));

        clock.advance_ms(1000);
        assert!(clock.has_elapsed(start, 1000));
    }

    #[test]
    fn test_wall_clock_moves() {
        let clock = Clock::wall();
        assert!(!clock.is_simulated());
        assert!(clock.now_ms() > 0);
    }

    #[test]
    fn test_clone_shares_time() {
        let clock1 = Clock::simulated(0);
        let clock2 = clock1.clone();

        clock1.advance_ms(1000);

        assert_eq!(clock1.now_ms(), 1000);
        assert_eq!(clock2.now_ms(), 1000);
    }

    #[tokio::test]
    async fn test_sleep_ms() {
        let clock = Clock::simulated(0);
        let clock_clone = clock.clone();

        let handle = tokio::spawn(async move {
            clock_clone.sleep_ms(100).await;
            clock_clone.now_ms()
        });

        tokio::task::yield_now().await;
        clock.advance_ms(50);
        tokio::task::yield_now().await;
        clock.advance_ms(50);
        tokio::task::yield_now().await;

        let result = handle.await.unwrap();
        assert!(result >= 100);
    }
}

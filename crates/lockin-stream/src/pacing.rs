//! Adaptive Sleep and Time-Step Tracking
//!
//! The acquisition thread aims to wake up when the hardware FIFO is about half
//! full: late enough that a drain pass moves a useful batch, early enough that
//! the FIFO never overflows. [`sleep_window`] turns the FIFO size, the
//! nominal time step and the duration of the last drain into a sleep range.

use crate::config::PacingConfig;
use serde::Serialize;
use std::time::Duration;

/// Range the acquisition thread may sleep in before the next drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SleepWindow {
    pub lower: Duration,
    pub upper: Duration,
    /// The target could not be computed and the fixed fallback is in use
    pub fallback: bool,
}

impl SleepWindow {
    fn fixed(duration: Duration) -> Self {
        Self {
            lower: duration,
            upper: duration,
            fallback: true,
        }
    }
}

/// Compute the sleep window after a drain pass.
///
/// ```text
/// target = fifo_capacity / 2 * time_step
/// upper  = max(min(target - last_drain, fifo_capacity * time_step), min_sleep_ceiling)
/// lower  = max(upper - slack, min_sleep)
/// ```
///
/// A zero time step, a FIFO smaller than two samples or an overflowing
/// product yields the configured fallback.
pub fn sleep_window(
    fifo_capacity: usize,
    time_step_ns: u64,
    last_drain: Duration,
    config: &PacingConfig,
) -> SleepWindow {
    let half = (fifo_capacity / 2) as u64;
    let target_ns = match half.checked_mul(time_step_ns) {
        Some(ns) if ns > 0 => ns,
        _ => return SleepWindow::fixed(config.fallback()),
    };
    let overrun_ns = match (fifo_capacity as u64).checked_mul(time_step_ns) {
        Some(ns) => ns,
        None => return SleepWindow::fixed(config.fallback()),
    };

    let drain_ns = u64::try_from(last_drain.as_nanos()).unwrap_or(u64::MAX);
    let remaining = Duration::from_nanos(target_ns.saturating_sub(drain_ns));
    let upper = remaining
        .min(Duration::from_nanos(overrun_ns))
        .max(config.min_sleep_ceiling());
    let lower = upper.saturating_sub(config.slack()).max(config.min_sleep());

    SleepWindow {
        lower,
        upper,
        fallback: false,
    }
}

/// Exponential moving average of the measured time between samples.
///
/// `avg = (step + (factor - 1) * avg) / factor`, integer nanoseconds.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    factor: u64,
    value_ns: u64,
    last_update_ns: Option<u64>,
}

impl MovingAverage {
    pub fn new(factor: u64) -> Self {
        Self {
            factor: factor.max(1),
            value_ns: 0,
            last_update_ns: None,
        }
    }

    /// Fold in a drain pass that moved `moved` samples at monotonic time `now_ns`.
    ///
    /// The step is the time since the previous call divided by `moved`. The
    /// first call only sets the baseline; passes that moved nothing still move it.
    pub fn observe(&mut self, now_ns: u64, moved: usize) -> u64 {
        let last = self.last_update_ns.replace(now_ns);
        if let (Some(last), true) = (last, moved > 0) {
            let step = now_ns.saturating_sub(last) / moved as u64;
            self.value_ns = (step + (self.factor - 1) * self.value_ns) / self.factor;
        }
        self.value_ns
    }

    /// Current average in nanoseconds
    pub fn value_ns(&self) -> u64 {
        self.value_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_window_at_full_rate() {
        // 2048 * 2728 ns = 5.587 ms to half-fill the FIFO
        let window = sleep_window(4096, 2728, Duration::ZERO, &PacingConfig::default());
        assert!(!window.fallback);
        assert_eq!(window.upper, Duration::from_nanos(2048 * 2728));
        // upper - 10 ms is negative, so the 2 ms floor applies
        assert_eq!(window.lower, 2 * MS);
    }

    #[test]
    fn test_window_at_slowest_rate() {
        // 2048 * 43648 ns = 89.39 ms
        let drain = Duration::from_micros(500);
        let window = sleep_window(4096, 43_648, drain, &PacingConfig::default());
        let upper = Duration::from_nanos(2048 * 43_648) - drain;
        assert_eq!(window.upper, upper);
        assert_eq!(window.lower, upper - 10 * MS);
    }

    #[test]
    fn test_long_drain_hits_ceiling() {
        let window = sleep_window(4096, 2728, 20 * MS, &PacingConfig::default());
        assert_eq!(window.upper, 3 * MS);
        assert_eq!(window.lower, 2 * MS);
    }

    #[test]
    fn test_upper_never_exceeds_overrun_window() {
        let config = PacingConfig {
            min_sleep_us: 0,
            min_sleep_ceiling_us: 0,
            slack_us: 0,
            fallback_ms: 250,
        };
        // target = 1 step, overrun window = 3 steps
        let window = sleep_window(3, 1_000, Duration::ZERO, &config);
        assert_eq!(window.upper, Duration::from_nanos(1_000));
        assert!(window.upper <= Duration::from_nanos(3_000));
    }

    #[test]
    fn test_fallback_on_zero_inputs() {
        let config = PacingConfig::default();
        assert_eq!(
            sleep_window(4096, 0, Duration::ZERO, &config),
            SleepWindow::fixed(250 * MS)
        );
        assert!(sleep_window(1, 2728, Duration::ZERO, &config).fallback);
        assert!(sleep_window(usize::MAX, u64::MAX, Duration::ZERO, &config).fallback);
    }

    #[test]
    fn test_configurable_minimum() {
        let config = PacingConfig {
            min_sleep_us: 500,
            min_sleep_ceiling_us: 1_000,
            ..PacingConfig::default()
        };
        let window = sleep_window(4096, 2728, 20 * MS, &config);
        assert_eq!(window.upper, MS);
        assert_eq!(window.lower, Duration::from_micros(500));
    }

    #[test]
    fn test_moving_average() {
        let mut ma = MovingAverage::new(20);
        assert_eq!(ma.observe(1_000, 10), 0);
        // 20_000 ns for 10 samples: step 2000
        assert_eq!(ma.observe(21_000, 10), 100);
        // Nothing moved: average unchanged, baseline moves
        assert_eq!(ma.observe(50_000, 0), 100);
        // (1000 + 19 * 100) / 20 = 145
        assert_eq!(ma.observe(60_000, 10), 145);
    }

    #[test]
    fn test_moving_average_converges() {
        let mut ma = MovingAverage::new(20);
        let mut now = 0;
        ma.observe(now, 0);
        for _ in 0..500 {
            now += 2728 * 100;
            ma.observe(now, 100);
        }
        // Integer division keeps it just under the true step
        assert!(ma.value_ns() > 2700 && ma.value_ns() <= 2728);
    }
}

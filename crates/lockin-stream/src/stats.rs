//! Acquisition Statistics
//!
//! Written by the acquisition thread with relaxed stores, read by anyone.
//! Each value is individually consistent; a snapshot is not atomic as a whole.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Lifecycle of the acquisition thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    /// No worker has been started, or it has exited
    Stopped,
    /// Draining the FIFO
    Running,
    /// Asked to stop, finishing its current iteration
    Stopping,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquisitionState::Running,
            2 => AcquisitionState::Stopping,
            _ => AcquisitionState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AcquisitionState::Stopped => 0,
            AcquisitionState::Running => 1,
            AcquisitionState::Stopping => 2,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AcquisitionStats {
    state: AtomicU8,
    ma_time_step_ns: AtomicU64,
    last_drain_ns: AtomicU64,
    last_sleep_ns: AtomicU64,
    sleep_lower_ns: AtomicU64,
    sleep_upper_ns: AtomicU64,
    samples_transferred: AtomicU64,
    fifo_occupancy: AtomicU64,
    iterations: AtomicU64,
    hw_faults: AtomicU64,
    fifo_overruns: AtomicU64,
    desyncs: AtomicU64,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl AcquisitionStats {
    pub fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: AcquisitionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Zero every counter for a new session
    pub fn reset(&self) {
        for counter in [
            &self.ma_time_step_ns,
            &self.last_drain_ns,
            &self.last_sleep_ns,
            &self.sleep_lower_ns,
            &self.sleep_upper_ns,
            &self.samples_transferred,
            &self.fifo_occupancy,
            &self.iterations,
            &self.hw_faults,
            &self.fifo_overruns,
            &self.desyncs,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_drain(&self, moved: usize, occupancy: usize, duration: Duration, ma_ns: u64) {
        self.samples_transferred
            .fetch_add(moved as u64, Ordering::Relaxed);
        self.fifo_occupancy.store(occupancy as u64, Ordering::Relaxed);
        self.last_drain_ns.store(nanos(duration), Ordering::Relaxed);
        self.ma_time_step_ns.store(ma_ns, Ordering::Relaxed);
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window(&self, lower: Duration, upper: Duration) {
        self.sleep_lower_ns.store(nanos(lower), Ordering::Relaxed);
        self.sleep_upper_ns.store(nanos(upper), Ordering::Relaxed);
    }

    pub fn record_sleep(&self, actual: Duration) {
        self.last_sleep_ns.store(nanos(actual), Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.hw_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fifo_overrun(&self) {
        self.fifo_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_desyncs(&self, total: u64) {
        self.desyncs.store(total, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AcquisitionSnapshot {
        AcquisitionSnapshot {
            state: self.state(),
            ma_time_step_ns: self.ma_time_step_ns.load(Ordering::Relaxed),
            last_drain_ns: self.last_drain_ns.load(Ordering::Relaxed),
            last_sleep_ns: self.last_sleep_ns.load(Ordering::Relaxed),
            sleep_lower_ns: self.sleep_lower_ns.load(Ordering::Relaxed),
            sleep_upper_ns: self.sleep_upper_ns.load(Ordering::Relaxed),
            samples_transferred: self.samples_transferred.load(Ordering::Relaxed),
            fifo_occupancy: self.fifo_occupancy.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            hw_faults: self.hw_faults.load(Ordering::Relaxed),
            fifo_overruns: self.fifo_overruns.load(Ordering::Relaxed),
            desyncs: self.desyncs.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the acquisition statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionSnapshot {
    pub state: AcquisitionState,
    /// Measured time between samples (moving average)
    pub ma_time_step_ns: u64,
    /// Duration of the last drain pass
    pub last_drain_ns: u64,
    /// How long the last sleep actually took
    pub last_sleep_ns: u64,
    /// Last computed sleep window
    pub sleep_lower_ns: u64,
    pub sleep_upper_ns: u64,
    /// Samples moved from the FIFO into the ring this session
    pub samples_transferred: u64,
    /// FIFO occupancy seen by the last drain pass, in samples
    pub fifo_occupancy: u64,
    pub iterations: u64,
    pub hw_faults: u64,
    /// Drain passes that found the hardware FIFO full
    pub fifo_overruns: u64,
    /// Data-loss events recorded by the acquisition thread this session
    pub desyncs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let stats = AcquisitionStats::default();
        assert_eq!(stats.state(), AcquisitionState::Stopped);
        for state in [
            AcquisitionState::Running,
            AcquisitionState::Stopping,
            AcquisitionState::Stopped,
        ] {
            stats.set_state(state);
            assert_eq!(stats.state(), state);
        }
    }

    #[test]
    fn test_record_and_reset() {
        let stats = AcquisitionStats::default();
        stats.record_drain(10, 30, Duration::from_micros(40), 2728);
        stats.record_drain(5, 0, Duration::from_micros(20), 2730);
        stats.record_window(Duration::from_millis(2), Duration::from_millis(5));
        stats.record_fault();
        stats.record_fifo_overrun();

        let snap = stats.snapshot();
        assert_eq!(snap.samples_transferred, 15);
        assert_eq!(snap.fifo_occupancy, 0);
        assert_eq!(snap.last_drain_ns, 20_000);
        assert_eq!(snap.ma_time_step_ns, 2730);
        assert_eq!(snap.sleep_upper_ns, 5_000_000);
        assert_eq!(snap.iterations, 2);
        assert_eq!(snap.hw_faults, 1);
        assert_eq!(snap.fifo_overruns, 1);

        stats.reset();
        assert_eq!(stats.snapshot().samples_transferred, 0);
    }
}

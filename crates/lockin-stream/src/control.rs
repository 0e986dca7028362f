//! Device State Shared with the Acquisition Thread
//!
//! One coarse lock guards the hardware. The acquisition thread holds it for
//! each drain pass; configuration calls, ADC snapshots and power transitions
//! take it too, so none of them ever interleaves with a drain. Readers never
//! take it: the only hardware-derived value they need, the nominal time step,
//! is published through an atomic.
//!
//! Suspension is a flag under the lock plus a condition variable. While it is
//! set, everyone who needs the hardware waits; the lock itself stays free.

use crate::stats::AcquisitionStats;
use lockin_hw::LockinHardware;
use lockin_protocol::Decimation;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// State protected by the control lock
pub(crate) struct Control<H> {
    pub hw: H,
    pub multiplier: i32,
    pub decimation: Decimation,
    pub suspended: bool,
}

pub(crate) struct SharedDevice<H> {
    control: Mutex<Control<H>>,
    resumed: Condvar,
    time_step_ns: AtomicU64,
    session_open: AtomicBool,
    pub stats: AcquisitionStats,
}

impl<H: LockinHardware> SharedDevice<H> {
    pub fn new(hw: H, decimation: Decimation) -> Self {
        Self {
            control: Mutex::new(Control {
                hw,
                multiplier: 1,
                decimation,
                suspended: false,
            }),
            resumed: Condvar::new(),
            time_step_ns: AtomicU64::new(decimation.time_step_ns()),
            session_open: AtomicBool::new(false),
            stats: AcquisitionStats::default(),
        }
    }

    /// Take the control lock, waiting out a suspension
    pub fn lock_resumed(&self) -> MutexGuard<'_, Control<H>> {
        let mut control = self.control.lock();
        while control.suspended {
            self.resumed.wait(&mut control);
        }
        control
    }

    /// Like [`lock_resumed`](Self::lock_resumed), but gives up once `cancelled` returns true.
    ///
    /// Whoever flips the cancellation must do so while holding the lock and
    /// then call [`wake_all`](Self::wake_all), or the wakeup can be lost.
    pub fn lock_resumed_unless(
        &self,
        cancelled: impl Fn() -> bool,
    ) -> Option<MutexGuard<'_, Control<H>>> {
        let mut control = self.control.lock();
        loop {
            if cancelled() {
                return None;
            }
            if !control.suspended {
                return Some(control);
            }
            self.resumed.wait(&mut control);
        }
    }

    /// Take the control lock regardless of suspension (power transitions)
    pub fn lock_raw(&self) -> MutexGuard<'_, Control<H>> {
        self.control.lock()
    }

    pub fn wake_all(&self) {
        self.resumed.notify_all();
    }

    /// Nominal time step published for readers
    pub fn time_step_ns(&self) -> u64 {
        self.time_step_ns.load(Ordering::Acquire)
    }

    pub fn publish_time_step(&self, decimation: Decimation) {
        self.time_step_ns
            .store(decimation.time_step_ns(), Ordering::Release);
    }

    /// Claim the single session slot. Returns false if it is taken.
    pub fn try_open_session(&self) -> bool {
        self.session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_session(&self) {
        self.session_open.store(false, Ordering::Release);
    }

    pub fn session_open(&self) -> bool {
        self.session_open.load(Ordering::Acquire)
    }
}

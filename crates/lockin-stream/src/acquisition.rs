//! Acquisition Thread
//!
//! A dedicated OS thread moves samples from the hardware FIFO into the ring:
//!
//! ```text
//! loop {
//!     stop requested?          -> exit
//!     lock control (wait out suspension)
//!     drain min(ring space, FIFO occupancy) samples
//!     FIFO full, or holding samples the ring had no room for -> one desync
//!     unlock
//!     update moving-average time step
//!     sleep until the FIFO is about half full again
//! }
//! ```
//!
//! Hardware faults are logged and the loop carries on. Closing the session
//! flips the state to `Stopping`, unparks the thread and joins it.

use crate::config::StreamConfig;
use crate::control::SharedDevice;
use crate::pacing::{sleep_window, MovingAverage};
use crate::priority::elevate_current_thread;
use crate::rate_limit::WarnLimiter;
use crate::stats::AcquisitionState;
use crate::StreamError;
use lockin_hw::{FifoAdapter, HwError, LockinHardware};
use lockin_protocol::Sample;
use metrics::{counter, gauge};
use ring_buffer::Producer;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DrainReport {
    moved: usize,
    occupancy: usize,
}

struct AcquisitionWorker<H> {
    shared: Arc<SharedDevice<H>>,
    producer: Producer<Sample>,
    config: StreamConfig,
    average: MovingAverage,
    origin: Instant,
    fill_warnings: WarnLimiter,
    loss_warnings: WarnLimiter,
    fault_warnings: WarnLimiter,
    pacing_warnings: WarnLimiter,
}

impl<H: LockinHardware> AcquisitionWorker<H> {
    fn new(shared: Arc<SharedDevice<H>>, producer: Producer<Sample>, config: StreamConfig) -> Self {
        let limit = config.warn_limit.clone();
        Self {
            shared,
            producer,
            average: MovingAverage::new(config.moving_average_factor),
            origin: Instant::now(),
            fill_warnings: WarnLimiter::new(&limit),
            loss_warnings: WarnLimiter::new(&limit),
            fault_warnings: WarnLimiter::new(&limit),
            pacing_warnings: WarnLimiter::new(&limit),
            config,
        }
    }

    fn running(&self) -> bool {
        self.shared.stats.state() == AcquisitionState::Running
    }

    fn run(mut self) {
        info!(
            ring_capacity = self.producer.capacity(),
            fifo_capacity = self.config.fifo_capacity,
            "Acquisition thread started"
        );

        if self.config.realtime.enabled {
            match elevate_current_thread(&self.config.realtime) {
                Ok(()) => debug!(
                    priority = self.config.realtime.priority,
                    nice = self.config.realtime.nice,
                    "Acquisition thread runs with SCHED_FIFO"
                ),
                Err(e) => warn!(
                    "Could not raise acquisition thread priority, continuing at normal priority: {}",
                    e
                ),
            }
        }

        while self.running() {
            let start = Instant::now();
            let Some(report) = self.drain_once() else {
                break;
            };
            let ma_ns = self.average.observe(self.elapsed_ns(), report.moved);
            let drain = start.elapsed();
            self.shared
                .stats
                .record_drain(report.moved, report.occupancy, drain, ma_ns);

            let window = sleep_window(
                self.config.fifo_capacity,
                self.shared.time_step_ns(),
                drain,
                &self.config.pacing,
            );
            if window.fallback {
                if let Some(suppressed) = self.pacing_warnings.allow() {
                    warn!(
                        suppressed,
                        "Cannot compute the FIFO fill time, sleeping a fixed {:?}", window.lower
                    );
                }
            }
            self.shared.stats.record_window(window.lower, window.upper);

            if !self.running() {
                break;
            }
            let before = Instant::now();
            thread::park_timeout(window.lower);
            self.shared.stats.record_sleep(before.elapsed());
        }

        self.shared.stats.set_state(AcquisitionState::Stopped);
        info!(
            samples = self.shared.stats.snapshot().samples_transferred,
            "Acquisition thread stopped"
        );
    }

    fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// One pass under the control lock. `None` if stopped while waiting out a suspension.
    fn drain_once(&mut self) -> Option<DrainReport> {
        let shared = Arc::clone(&self.shared);
        let mut guard =
            shared.lock_resumed_unless(|| shared.stats.state() != AcquisitionState::Running)?;
        let control = &mut *guard;
        let multiplier = control.multiplier;
        let mut fifo = FifoAdapter::new(&mut control.hw, multiplier);

        let occupancy = match fifo.occupancy() {
            Ok(occupancy) => occupancy,
            Err(err) => {
                self.fault(&err);
                return Some(DrainReport::default());
            }
        };
        gauge!("lockin_fifo_occupancy").set(occupancy as f64);

        if occupancy > self.config.fifo_warn_threshold() {
            if let Some(suppressed) = self.fill_warnings.allow() {
                warn!(
                    occupancy,
                    capacity = self.config.fifo_capacity,
                    suppressed,
                    "FIFO is over {}% full, data loss may be imminent",
                    self.config.fifo_warn_percent
                );
            }
        }

        let space = self.producer.available_space();
        let bounded = space.min(occupancy);
        let mut moved = 0;
        for _ in 0..bounded {
            match fifo.pop_sample() {
                Ok(sample) => {
                    if self.producer.push(sample).is_err() {
                        break;
                    }
                    moved += 1;
                }
                Err(err) => {
                    self.fault(&err);
                    break;
                }
            }
        }

        // A full FIFO has been overwriting its oldest samples since the last pass
        let overrun = occupancy >= self.config.fifo_capacity;
        let ring_short = occupancy > space;
        if overrun || ring_short {
            let total = self.producer.record_desync();
            self.shared.stats.record_desyncs(total);
            counter!("lockin_desyncs_total").increment(1);
            if overrun {
                self.shared.stats.record_fifo_overrun();
                counter!("lockin_fifo_overruns_total").increment(1);
            }
            if let Some(suppressed) = self.loss_warnings.allow() {
                if overrun {
                    warn!(
                        fifo = occupancy,
                        capacity = self.config.fifo_capacity,
                        suppressed,
                        "Data loss: hardware FIFO overrun"
                    );
                } else {
                    warn!(
                        fifo = occupancy,
                        ring_space = space,
                        suppressed,
                        "Data loss: no more space in the signal buffer"
                    );
                }
            }
        }

        counter!("lockin_samples_transferred_total").increment(moved as u64);
        Some(DrainReport { moved, occupancy })
    }

    fn fault(&self, err: &HwError) {
        self.shared.stats.record_fault();
        counter!("lockin_hw_faults_total").increment(1);
        if let Some(suppressed) = self.fault_warnings.allow() {
            warn!(suppressed, "Hardware fault while draining the FIFO: {}", err);
        }
    }
}

/// Owner of a running acquisition thread. Dropping it stops and joins the thread.
pub(crate) struct AcquisitionHandle<H: LockinHardware> {
    shared: Arc<SharedDevice<H>>,
    thread: Option<JoinHandle<()>>,
}

impl<H: LockinHardware> AcquisitionHandle<H> {
    /// Start draining into `producer`
    pub fn spawn(
        shared: Arc<SharedDevice<H>>,
        producer: Producer<Sample>,
        config: &StreamConfig,
    ) -> Result<Self, StreamError> {
        shared.stats.reset();
        shared.stats.set_state(AcquisitionState::Running);

        let worker = AcquisitionWorker::new(Arc::clone(&shared), producer, config.clone());
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                shared.stats.set_state(AcquisitionState::Stopped);
                StreamError::ResourceExhausted(format!("Failed to spawn acquisition thread: {}", e))
            })?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Cancel, wake and join the thread. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        {
            // Flip the state under the lock so a worker about to wait on the
            // suspension condvar cannot miss the wakeup
            let _control = self.shared.lock_raw();
            if self.shared.stats.state() == AcquisitionState::Running {
                self.shared.stats.set_state(AcquisitionState::Stopping);
            }
        }
        self.shared.wake_all();
        thread.thread().unpark();

        let started = Instant::now();
        if thread.join().is_err() {
            error!("Acquisition thread panicked");
        }
        self.shared.stats.set_state(AcquisitionState::Stopped);
        debug!("Acquisition thread joined in {:?}", started.elapsed());
    }
}

impl<H: LockinHardware> Drop for AcquisitionHandle<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Lock-in Amplifier Signal Streaming
//!
//! Moves demodulated samples from the instrument's hardware FIFO to a reader
//! with precise timestamps.
//!
//! ```text
//! hardware FIFO ──(acquisition thread)──► ring buffer ──(ChunkReader)──► chunks
//! ```
//!
//! - The acquisition thread wakes up just often enough to keep the hardware
//!   FIFO from overflowing and moves whole samples into a lock-free ring.
//! - Every read returns one chunk: a header carrying the timestamp of its
//!   first sample and the time step, followed by as many samples as fit.
//! - Samples are never dropped silently. When the ring overflows the
//!   acquisition thread bumps the ring's desync counter, and the next read
//!   restarts the timeline from the wall clock. Consumers detect data loss
//!   as a jump in `last_start_time_ns` between consecutive chunks.

mod acquisition;
pub mod clock;
pub mod config;
mod control;
mod device;
mod error;
pub mod excitation;
pub mod pacing;
pub mod priority;
pub mod rate_limit;
mod reader;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PacingConfig, RealtimeConfig, StreamConfig};
pub use device::{Diagnostics, LockinDevice, StreamSession};
pub use error::StreamError;
pub use excitation::{
    DAC_DATA_BITS_MAX, GENERATOR_SCALE_MAX, GENERATOR_SCALE_MIN, GENERATOR_SCALE_THRESHOLD,
};
pub use pacing::{sleep_window, MovingAverage, SleepWindow};
pub use priority::elevate_current_thread;
pub use rate_limit::{RateLimitConfig, WarnLimiter};
pub use reader::ChunkReader;
pub use stats::{AcquisitionSnapshot, AcquisitionState};

// Types needed to use the public API
pub use lockin_hw::{Generator, LockinHardware, SimHandle, SimulatedLockin};
pub use lockin_protocol::{Chunk, ChunkHeader, Decimation, Sample};

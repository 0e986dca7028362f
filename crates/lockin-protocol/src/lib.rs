//! Lock-in Amplifier Stream Protocol
//!
//! This crate defines the binary format of the signal stream produced by the
//! lock-in amplifier: fixed-size [`Sample`] records, the 16-byte
//! [`ChunkHeader`] that prefixes every read, and the [`Decimation`] factor
//! that determines the exact time between samples.
//!
//! All encodings are explicit little-endian byte layouts. Nothing here relies
//! on the in-memory layout of a Rust struct.

mod chunk;
mod decimation;
mod error;
mod sample;

pub use chunk::{Chunk, ChunkHeader, TimelineGap, TimelineTracker};
pub use decimation::Decimation;
pub use error::ProtocolError;
pub use sample::{Sample, SiteSample};

/// Layout constants shared by producers and consumers of the stream
pub mod layout {
    /// Number of independent measurement sites per sample
    pub const SITES_PER_SAMPLE: usize = 2;
    /// Number of 32-bit entries per site (hf_re, hf_im, lf_re, lf_im)
    pub const ENTRIES_PER_SITE: usize = 4;
    /// Number of 32-bit entries per sample
    pub const ENTRIES_PER_SAMPLE: usize = SITES_PER_SAMPLE * ENTRIES_PER_SITE;
    /// Encoded size of one site in bytes
    pub const SITE_SIZE: usize = ENTRIES_PER_SITE * 4;
    /// Encoded size of one sample in bytes
    pub const SAMPLE_SIZE: usize = SITES_PER_SAMPLE * SITE_SIZE;
    /// Encoded size of a chunk header in bytes
    pub const HEADER_SIZE: usize = 16;
    /// Time between two samples at decimation factor 1, in nanoseconds.
    ///
    /// The value is exact, so timeline arithmetic never accumulates rounding error.
    pub const BASE_TIME_STEP_NS: u64 = 2728;
    /// Number of taps in the hardware FIR filter
    pub const FIR_TAPS: usize = 512;
    /// Largest value the FIR cycle register accepts
    pub const FIR_CYCLES_MAX: u32 = 511;
}

//! Decimation Factor
//!
//! The hardware decimates the base sample rate (~367 kHz) by a cascade of
//! half-band filters. Only powers of two up to 16 are supported.
//!
//! | factor | rate     | time step |
//! |--------|----------|-----------|
//! | 1      | ~367 kHz | 2728 ns   |
//! | 2      | ~184 kHz | 5456 ns   |
//! | 4      | ~92 kHz  | 10912 ns  |
//! | 8      | ~46 kHz  | 21824 ns  |
//! | 16     | ~23 kHz  | 43648 ns  |

use crate::layout::{BASE_TIME_STEP_NS, FIR_CYCLES_MAX};
use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated decimation factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Decimation(u32);

impl Decimation {
    /// No decimation
    pub const NONE: Decimation = Decimation(1);

    /// All supported factors, ascending
    pub const ALL: [Decimation; 5] = [
        Decimation(1),
        Decimation(2),
        Decimation(4),
        Decimation(8),
        Decimation(16),
    ];

    /// Validate a decimation factor
    pub fn new(factor: u32) -> Result<Self, ProtocolError> {
        match factor {
            1 | 2 | 4 | 8 | 16 => Ok(Self(factor)),
            other => Err(ProtocolError::InvalidDecimation(other)),
        }
    }

    /// Rebuild from the number of enabled half-band filters (the hardware register value)
    pub fn from_half_band_filters(filters: u32) -> Result<Self, ProtocolError> {
        if filters > 4 {
            return Err(ProtocolError::InvalidDecimation(1u32.checked_shl(filters).unwrap_or(0)));
        }
        Self::new(1 << filters)
    }

    /// The factor itself
    pub fn factor(&self) -> u32 {
        self.0
    }

    /// Number of half-band filters to enable (log2 of the factor)
    pub fn half_band_filters(&self) -> u32 {
        self.0.trailing_zeros()
    }

    /// FIR filter cycles matching this decimation
    pub fn fir_cycles(&self) -> u32 {
        let cycles = 341 * (1u32 << self.half_band_filters()) / 8 - 6;
        cycles.min(FIR_CYCLES_MAX)
    }

    /// Exact time between consecutive samples in nanoseconds
    pub fn time_step_ns(&self) -> u64 {
        u64::from(self.0) * BASE_TIME_STEP_NS
    }

    /// Exact duration covered by `samples` consecutive samples
    pub fn duration_ns(&self, samples: u64) -> u64 {
        self.time_step_ns() * samples
    }
}

impl Default for Decimation {
    fn default() -> Self {
        Decimation::NONE
    }
}

impl TryFrom<u32> for Decimation {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Decimation::new(value)
    }
}

impl From<Decimation> for u32 {
    fn from(value: Decimation) -> Self {
        value.0
    }
}

impl fmt::Display for Decimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

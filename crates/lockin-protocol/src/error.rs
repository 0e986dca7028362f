//! Protocol Error Types

use thiserror::Error;

/// Errors that can occur while building or parsing stream data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Decimation factor outside {1, 2, 4, 8, 16}
    #[error("Invalid decimation factor {0}: must be one of 1, 2, 4, 8, 16")]
    InvalidDecimation(u32),

    /// Buffer too short for the requested record
    #[error("Buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },

    /// Chunk payload is not a whole number of samples
    #[error("Chunk payload has {0} trailing bytes that do not form a sample")]
    TrailingBytes(usize),
}

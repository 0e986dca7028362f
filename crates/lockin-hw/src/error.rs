//! Hardware Error Types

use thiserror::Error;

/// Errors reported by register access
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// A register read or write failed
    #[error("Register access failed ({register}): {reason}")]
    RegisterAccess {
        register: &'static str,
        reason: String,
    },

    /// The converters are powered down
    #[error("Instrument is powered down")]
    PoweredDown,

    /// ADC snapshot destination has the wrong size
    #[error("ADC snapshot needs {expected} values, got a buffer of {actual}")]
    InvalidSnapshotLength { expected: usize, actual: usize },
}

impl HwError {
    /// Shorthand for a failed register access
    pub fn register(register: &'static str, reason: impl Into<String>) -> Self {
        HwError::RegisterAccess {
            register,
            reason: reason.into(),
        }
    }
}

//! Stream Error Types

use lockin_hw::HwError;
use lockin_protocol::ProtocolError;
use ring_buffer::RingError;
use thiserror::Error;

/// Errors returned by the streaming device and its sessions
#[derive(Debug, Error)]
pub enum StreamError {
    /// Bad parameter from the caller (buffer too small, unsupported factor, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Numeric setting outside what the register accepts
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// A stream session is already open
    #[error("Device is busy: a stream session is already open")]
    Busy,

    /// Register access failed
    #[error("Hardware fault: {0}")]
    HardwareFault(#[from] HwError),

    /// The operation is not supported on this endpoint
    #[error("Operation not permitted: {0}")]
    PermissionDenied(&'static str),

    /// Ring allocation or worker creation failed
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// The errno a character-device caller would see for this error
    pub fn errno(&self) -> i32 {
        match self {
            StreamError::InvalidArgument(_) | StreamError::Config(_) => libc::EINVAL,
            StreamError::OutOfRange(_) => libc::ERANGE,
            StreamError::Busy => libc::EBUSY,
            StreamError::HardwareFault(_) => libc::EIO,
            StreamError::PermissionDenied(_) => libc::EPERM,
            StreamError::ResourceExhausted(_) => libc::ENOMEM,
        }
    }
}

impl From<ProtocolError> for StreamError {
    fn from(err: ProtocolError) -> Self {
        StreamError::InvalidArgument(err.to_string())
    }
}

impl From<RingError> for StreamError {
    fn from(err: RingError) -> Self {
        match err {
            RingError::CapacityNotPowerOfTwo(_) => StreamError::InvalidArgument(err.to_string()),
            RingError::Allocation { .. } => StreamError::ResourceExhausted(err.to_string()),
        }
    }
}

impl From<config::ConfigError> for StreamError {
    fn from(err: config::ConfigError) -> Self {
        StreamError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(StreamError::Busy.errno(), libc::EBUSY);
        assert_eq!(StreamError::PermissionDenied("write").errno(), libc::EPERM);
        assert_eq!(StreamError::InvalidArgument("x".into()).errno(), libc::EINVAL);
        assert_eq!(StreamError::HardwareFault(HwError::PoweredDown).errno(), libc::EIO);
        assert_eq!(StreamError::OutOfRange("x".into()).errno(), libc::ERANGE);
    }

    #[test]
    fn test_ring_error_conversion() {
        let err: StreamError = RingError::CapacityNotPowerOfTwo(3).into();
        assert!(matches!(err, StreamError::InvalidArgument(_)));

        let err: StreamError = RingError::Allocation { capacity: 1 << 40 }.into();
        assert_eq!(err.errno(), libc::ENOMEM);
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: StreamError = ProtocolError::InvalidDecimation(3).into();
        assert_eq!(err.errno(), libc::EINVAL);
        assert!(err.to_string().contains("3"));
    }
}

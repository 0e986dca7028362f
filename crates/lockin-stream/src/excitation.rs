//! Signal Generator Settings
//!
//! The two generators feed the DAC outputs that excite the device under
//! test. Their amplitude registers hold an unsigned 18-bit value; amplitudes
//! too small to be distinguished from noise are written as zero.

use crate::StreamError;

/// Smallest accepted generator amplitude
pub const GENERATOR_SCALE_MIN: i32 = 0;

/// Largest accepted generator amplitude
pub const GENERATOR_SCALE_MAX: i32 = 131_071;

/// Amplitudes up to this value are written as zero
pub const GENERATOR_SCALE_THRESHOLD: i32 = 42;

/// Largest accepted DAC data width
pub const DAC_DATA_BITS_MAX: u32 = 31;

/// Amplitude to program for a requested `scale`
pub fn generator_register_scale(scale: i32) -> Result<i32, StreamError> {
    if !(GENERATOR_SCALE_MIN..=GENERATOR_SCALE_MAX).contains(&scale) {
        return Err(StreamError::OutOfRange(format!(
            "generator scale {} not in {}..={}",
            scale, GENERATOR_SCALE_MIN, GENERATOR_SCALE_MAX
        )));
    }
    if scale <= GENERATOR_SCALE_THRESHOLD {
        return Ok(0);
    }
    Ok(scale)
}

pub fn check_dac_data_bits(bits: u32) -> Result<u32, StreamError> {
    if bits > DAC_DATA_BITS_MAX {
        return Err(StreamError::OutOfRange(format!(
            "DAC data bits {} above {}",
            bits, DAC_DATA_BITS_MAX
        )));
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_range() {
        assert_eq!(generator_register_scale(GENERATOR_SCALE_MAX).unwrap(), 131_071);
        assert_eq!(generator_register_scale(1000).unwrap(), 1000);
        for scale in [-1, i32::MIN, GENERATOR_SCALE_MAX + 1, i32::MAX] {
            let err = generator_register_scale(scale).unwrap_err();
            assert_eq!(err.errno(), libc::ERANGE);
        }
    }

    #[test]
    fn test_small_scales_are_zeroed() {
        for scale in [0, 1, 17, GENERATOR_SCALE_THRESHOLD] {
            assert_eq!(generator_register_scale(scale).unwrap(), 0);
        }
        assert_eq!(generator_register_scale(GENERATOR_SCALE_THRESHOLD + 1).unwrap(), 43);
    }

    #[test]
    fn test_dac_data_bits_limit() {
        assert_eq!(check_dac_data_bits(0).unwrap(), 0);
        assert_eq!(check_dac_data_bits(31).unwrap(), 31);
        assert!(matches!(check_dac_data_bits(32), Err(StreamError::OutOfRange(_))));
    }
}

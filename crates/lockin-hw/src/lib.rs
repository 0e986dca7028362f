//! Lock-in Amplifier Hardware Access
//!
//! The register map of the instrument is hidden behind [`LockinHardware`].
//! Everything above this crate talks to the FPGA only through that trait:
//!
//! - [`FifoAdapter`] pulls whole samples out of the hardware FIFO and applies
//!   the sample multiplier.
//! - [`SimulatedLockin`] implements the trait in memory, either fed by hand
//!   from a [`SimHandle`] or producing samples at the decimated rate.

mod error;
mod fifo;
mod sim;

pub use error::HwError;
pub use fifo::FifoAdapter;
pub use sim::{pattern_words, sequence_of, SimHandle, SimulatedLockin};

use lockin_protocol::layout::{FIR_TAPS, SAMPLE_SIZE};

/// Size of the hardware FIFO in bytes
pub const FIFO_CAPACITY_BYTES: usize = 131_072;

/// Number of complete samples the hardware FIFO holds
pub const FIFO_CAPACITY_SAMPLES: usize = FIFO_CAPACITY_BYTES / SAMPLE_SIZE;

/// Number of raw values in one ADC snapshot
pub const ADC_SNAPSHOT_LEN: usize = 16_384;

/// Signal generator driving one of the DAC outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generator {
    One,
    Two,
}

impl Generator {
    /// Both generators, in register order
    pub const ALL: [Generator; 2] = [Generator::One, Generator::Two];

    /// Zero-based index of the generator
    pub fn index(self) -> usize {
        match self {
            Generator::One => 0,
            Generator::Two => 1,
        }
    }
}

impl std::fmt::Display for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generator{}", self.index() + 1)
    }
}

/// Register-level access to the instrument.
///
/// Implementations only move values in and out of registers. Validation,
/// locking and unit conversions live with the callers.
pub trait LockinHardware: Send + 'static {
    /// FPGA design version
    fn version(&self) -> Result<u32, HwError>;

    /// Number of 32-bit words currently held by the FIFO
    fn fifo_len_words(&mut self) -> Result<u32, HwError>;

    /// Pop one 32-bit word off the FIFO
    fn fifo_pop_word(&mut self) -> Result<i32, HwError>;

    /// Number of enabled half-band filters (log2 of the decimation factor)
    fn half_band_filters(&self) -> Result<u32, HwError>;

    /// Enable `filters` half-band filters
    fn set_half_band_filters(&mut self, filters: u32) -> Result<(), HwError>;

    /// FIR cycle register
    fn fir_cycles(&self) -> Result<u32, HwError>;

    /// Write the FIR cycle register
    fn set_fir_cycles(&mut self, cycles: u32) -> Result<(), HwError>;

    /// Upload all FIR filter taps
    fn write_fir_coefficients(&mut self, coefficients: &[i32; FIR_TAPS]) -> Result<(), HwError>;

    /// Restart ADC capture and read back [`ADC_SNAPSHOT_LEN`] raw values into `out`
    fn read_adc_samples(&mut self, out: &mut [i32]) -> Result<(), HwError>;

    /// Power the AD/DA converters up or down
    fn set_powered(&mut self, powered: bool) -> Result<(), HwError>;

    /// Output amplitude of `generator`, in register units
    fn generator_scale(&self, generator: Generator) -> Result<i32, HwError>;

    /// Set the output amplitude of `generator`
    fn set_generator_scale(&mut self, generator: Generator, scale: i32) -> Result<(), HwError>;

    /// Phase increment of `generator` per DAC clock
    fn generator_step(&self, generator: Generator) -> Result<u32, HwError>;

    /// Set the phase increment of `generator`
    fn set_generator_step(&mut self, generator: Generator, step: u32) -> Result<(), HwError>;

    /// Number of significant bits sent to the DAC
    fn dac_data_bits(&self) -> Result<u32, HwError>;

    /// Set the number of significant bits sent to the DAC
    fn set_dac_data_bits(&mut self, bits: u32) -> Result<(), HwError>;
}

impl<H: LockinHardware + ?Sized> LockinHardware for Box<H> {
    fn version(&self) -> Result<u32, HwError> {
        (**self).version()
    }

    fn fifo_len_words(&mut self) -> Result<u32, HwError> {
        (**self).fifo_len_words()
    }

    fn fifo_pop_word(&mut self) -> Result<i32, HwError> {
        (**self).fifo_pop_word()
    }

    fn half_band_filters(&self) -> Result<u32, HwError> {
        (**self).half_band_filters()
    }

    fn set_half_band_filters(&mut self, filters: u32) -> Result<(), HwError> {
        (**self).set_half_band_filters(filters)
    }

    fn fir_cycles(&self) -> Result<u32, HwError> {
        (**self).fir_cycles()
    }

    fn set_fir_cycles(&mut self, cycles: u32) -> Result<(), HwError> {
        (**self).set_fir_cycles(cycles)
    }

    fn write_fir_coefficients(&mut self, coefficients: &[i32; FIR_TAPS]) -> Result<(), HwError> {
        (**self).write_fir_coefficients(coefficients)
    }

    fn read_adc_samples(&mut self, out: &mut [i32]) -> Result<(), HwError> {
        (**self).read_adc_samples(out)
    }

    fn set_powered(&mut self, powered: bool) -> Result<(), HwError> {
        (**self).set_powered(powered)
    }

    fn generator_scale(&self, generator: Generator) -> Result<i32, HwError> {
        (**self).generator_scale(generator)
    }

    fn set_generator_scale(&mut self, generator: Generator, scale: i32) -> Result<(), HwError> {
        (**self).set_generator_scale(generator, scale)
    }

    fn generator_step(&self, generator: Generator) -> Result<u32, HwError> {
        (**self).generator_step(generator)
    }

    fn set_generator_step(&mut self, generator: Generator, step: u32) -> Result<(), HwError> {
        (**self).set_generator_step(generator, step)
    }

    fn dac_data_bits(&self) -> Result<u32, HwError> {
        (**self).dac_data_bits()
    }

    fn set_dac_data_bits(&mut self, bits: u32) -> Result<(), HwError> {
        (**self).set_dac_data_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_capacity() {
        assert_eq!(FIFO_CAPACITY_SAMPLES, 4096);
    }

    #[test]
    fn test_generator_names() {
        assert_eq!(Generator::One.to_string(), "generator1");
        assert_eq!(Generator::Two.to_string(), "generator2");
        assert_eq!(Generator::ALL.map(Generator::index), [0, 1]);
    }
}

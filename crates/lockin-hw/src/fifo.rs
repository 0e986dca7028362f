//! Hardware FIFO Adapter

use crate::{HwError, LockinHardware};
use lockin_protocol::layout::ENTRIES_PER_SAMPLE;
use lockin_protocol::Sample;

/// Pulls whole samples out of the hardware FIFO.
///
/// The FIFO holds 32-bit words; a sample is eight consecutive words. Every
/// word is scaled by the sample multiplier with two's-complement wrapping,
/// matching what the FPGA arithmetic would produce.
pub struct FifoAdapter<'a, H: LockinHardware + ?Sized> {
    hw: &'a mut H,
    multiplier: i32,
}

impl<'a, H: LockinHardware + ?Sized> FifoAdapter<'a, H> {
    /// Wrap `hw` for one drain pass
    pub fn new(hw: &'a mut H, multiplier: i32) -> Self {
        Self { hw, multiplier }
    }

    /// Complete samples in the FIFO. Trailing words of a partial sample are not counted.
    pub fn occupancy(&mut self) -> Result<usize, HwError> {
        let words = self.hw.fifo_len_words()? as usize;
        Ok(words / ENTRIES_PER_SAMPLE)
    }

    /// Pop and scale one sample
    pub fn pop_sample(&mut self) -> Result<Sample, HwError> {
        let mut words = [0i32; ENTRIES_PER_SAMPLE];
        for word in words.iter_mut() {
            *word = self.hw.fifo_pop_word()?.wrapping_mul(self.multiplier);
        }
        Ok(Sample::from_words(words))
    }

    /// Sample multiplier applied to every word
    pub fn multiplier(&self) -> i32 {
        self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedLockin;

    #[test]
    fn test_occupancy_truncates_partial_samples() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_raw_words(&[1, 2, 3]);
        assert_eq!(FifoAdapter::new(&mut sim, 1).occupancy().unwrap(), 0);

        handle.push_raw_words(&[4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(FifoAdapter::new(&mut sim, 1).occupancy().unwrap(), 1);
    }

    #[test]
    fn test_pop_sample_assembles_sites() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_raw_words(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let sample = FifoAdapter::new(&mut sim, 1).pop_sample().unwrap();
        assert_eq!(sample.sites[0].hf_re, 1);
        assert_eq!(sample.sites[0].lf_im, 4);
        assert_eq!(sample.sites[1].hf_re, 5);
        assert_eq!(sample.sites[1].lf_im, 8);
    }

    #[test]
    fn test_multiplier_wraps() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_raw_words(&[i32::MAX, -3, 0, 1, 2, 3, 4, 5]);
        let mut fifo = FifoAdapter::new(&mut sim, -2);
        assert_eq!(fifo.multiplier(), -2);
        let sample = fifo.pop_sample().unwrap();
        assert_eq!(sample.sites[0].hf_re, i32::MAX.wrapping_mul(-2));
        assert_eq!(sample.sites[0].hf_im, 6);
        assert_eq!(sample.sites[1].lf_im, -10);
    }

    #[test]
    fn test_pop_propagates_register_fault() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_samples(1);
        handle.fail_next(1);
        assert!(matches!(
            FifoAdapter::new(&mut sim, 1).pop_sample(),
            Err(HwError::RegisterAccess { .. })
        ));
    }
}

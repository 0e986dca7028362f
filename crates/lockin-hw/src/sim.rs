//! Simulated Instrument
//!
//! An in-memory [`LockinHardware`] for tests and demos. It keeps a bounded
//! word FIFO of [`FIFO_CAPACITY_BYTES`] that overwrites its oldest sample when
//! it overflows, the same way the real FIFO loses data when nobody drains it.
//!
//! Samples carry a recognizable pattern derived from a running sequence
//! number (see [`pattern_words`]), so a consumer can check with
//! [`sequence_of`] that every sample arrived intact and in order.
//!
//! Two modes:
//! - manual: nothing appears unless a test calls [`SimHandle::push_samples`]
//! - paced: samples appear at the rate set by the decimation registers

use crate::{Generator, HwError, LockinHardware, ADC_SNAPSHOT_LEN, FIFO_CAPACITY_BYTES};
use lockin_protocol::layout::{BASE_TIME_STEP_NS, ENTRIES_PER_SAMPLE, FIR_TAPS};
use lockin_protocol::Sample;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const FIFO_CAPACITY_WORDS: usize = FIFO_CAPACITY_BYTES / 4;
const SIM_VERSION: u32 = 0x0003_0001;
const PATTERN_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
// Scale registers hold the amplitude in their upper 18 bits
const GENERATOR_SCALE_SHIFT: u32 = 14;

/// Words of the sample with sequence number `seq`
pub fn pattern_words(seq: u64) -> [i32; ENTRIES_PER_SAMPLE] {
    let mixed = seq.wrapping_mul(PATTERN_MIX);
    let mut words = [0i32; ENTRIES_PER_SAMPLE];
    words[0] = seq as u32 as i32;
    words[1] = (seq >> 32) as u32 as i32;
    for (k, word) in words.iter_mut().enumerate().skip(2) {
        *word = (mixed.rotate_left(8 * k as u32) as u32 ^ k as u32) as i32;
    }
    words
}

/// Recover the sequence number of a pattern sample, or `None` if any word is off.
///
/// Only meaningful for samples read with a multiplier of 1.
pub fn sequence_of(sample: &Sample) -> Option<u64> {
    let words = sample.to_words();
    let seq = u64::from(words[0] as u32) | (u64::from(words[1] as u32) << 32);
    (pattern_words(seq) == words).then_some(seq)
}

#[derive(Debug)]
struct Pacing {
    origin: Instant,
    emitted: u64,
}

/// Injected failures for one register: let `skip` writes through, then fail `remaining`
#[derive(Debug, Clone, Copy)]
struct WriteFault {
    skip: u32,
    remaining: u32,
}

#[derive(Debug)]
struct SimState {
    fifo: VecDeque<i32>,
    next_seq: u64,
    dropped_words: u64,
    half_band_filters: u32,
    fir_cycles: u32,
    coefficients: Vec<i32>,
    generator_scale_raw: [i32; 2],
    generator_step: [u32; 2],
    dac_data_bits: u32,
    powered: bool,
    pending_faults: u32,
    write_faults: HashMap<&'static str, WriteFault>,
    adc_snapshots: u64,
    pacing: Option<Pacing>,
}

impl SimState {
    fn new() -> Self {
        Self {
            fifo: VecDeque::with_capacity(FIFO_CAPACITY_WORDS),
            next_seq: 0,
            dropped_words: 0,
            half_band_filters: 0,
            fir_cycles: 36,
            coefficients: vec![0; FIR_TAPS],
            generator_scale_raw: [0; 2],
            generator_step: [0; 2],
            dac_data_bits: 0,
            powered: true,
            pending_faults: 0,
            write_faults: HashMap::new(),
            adc_snapshots: 0,
            pacing: None,
        }
    }

    fn time_step_ns(&self) -> u64 {
        (1u64 << self.half_band_filters) * BASE_TIME_STEP_NS
    }

    fn push_word(&mut self, word: i32) {
        if self.fifo.len() == FIFO_CAPACITY_WORDS {
            self.fifo.pop_front();
            self.dropped_words += 1;
        }
        self.fifo.push_back(word);
    }

    fn push_pattern(&mut self, count: u64) -> u64 {
        let first = self.next_seq;
        for _ in 0..count {
            for word in pattern_words(self.next_seq) {
                self.push_word(word);
            }
            self.next_seq += 1;
        }
        first
    }

    /// Emit whatever the paced clock says is due
    fn refill(&mut self) {
        if !self.powered {
            return;
        }
        let step = self.time_step_ns();
        let Some(pacing) = self.pacing.as_mut() else {
            return;
        };
        let due = pacing.origin.elapsed().as_nanos() as u64 / step;
        let new = due.saturating_sub(pacing.emitted);
        pacing.emitted = due;
        if new == 0 {
            return;
        }

        // Anything beyond one full FIFO would be overwritten anyway
        let capacity = (FIFO_CAPACITY_WORDS / ENTRIES_PER_SAMPLE) as u64;
        if new > capacity {
            let skipped = new - capacity;
            self.next_seq += skipped;
            self.dropped_words += skipped * ENTRIES_PER_SAMPLE as u64;
        }
        self.push_pattern(new.min(capacity));
    }

    fn restart_pacing(&mut self) {
        if let Some(pacing) = self.pacing.as_mut() {
            pacing.origin = Instant::now();
            pacing.emitted = 0;
        }
    }

    fn take_fault(&mut self, register: &'static str) -> Result<(), HwError> {
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return Err(HwError::register(register, "injected fault"));
        }
        Ok(())
    }

    fn take_write_fault(&mut self, register: &'static str) -> Result<(), HwError> {
        let Some(fault) = self.write_faults.get_mut(register) else {
            return Ok(());
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        fault.remaining -= 1;
        if fault.remaining == 0 {
            self.write_faults.remove(register);
        }
        Err(HwError::register(register, "injected write fault"))
    }

    fn ensure_powered(&self) -> Result<(), HwError> {
        if self.powered {
            Ok(())
        } else {
            Err(HwError::PoweredDown)
        }
    }
}

/// In-memory lock-in amplifier
pub struct SimulatedLockin {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedLockin {
    /// Manual-mode instrument and a handle to drive it
    pub fn new() -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState::new()));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimHandle { state },
        )
    }

    /// Instrument that produces samples in real time at the decimated rate
    pub fn paced() -> (Self, SimHandle) {
        let (sim, handle) = Self::new();
        handle.set_paced(true);
        (sim, handle)
    }
}

impl LockinHardware for SimulatedLockin {
    fn version(&self) -> Result<u32, HwError> {
        Ok(SIM_VERSION)
    }

    fn fifo_len_words(&mut self) -> Result<u32, HwError> {
        let mut state = self.state.lock();
        state.ensure_powered()?;
        state.take_fault("fifo_size")?;
        state.refill();
        Ok(state.fifo.len() as u32)
    }

    fn fifo_pop_word(&mut self) -> Result<i32, HwError> {
        let mut state = self.state.lock();
        state.ensure_powered()?;
        state.take_fault("fifo_data")?;
        state
            .fifo
            .pop_front()
            .ok_or_else(|| HwError::register("fifo_data", "FIFO is empty"))
    }

    fn half_band_filters(&self) -> Result<u32, HwError> {
        Ok(self.state.lock().half_band_filters)
    }

    fn set_half_band_filters(&mut self, filters: u32) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.take_write_fault("half_band_filters")?;
        // Samples already due were produced at the old rate
        state.refill();
        state.half_band_filters = filters;
        state.restart_pacing();
        debug!("Simulated half-band filters set to {}", filters);
        Ok(())
    }

    fn fir_cycles(&self) -> Result<u32, HwError> {
        Ok(self.state.lock().fir_cycles & 0x1FF)
    }

    fn set_fir_cycles(&mut self, cycles: u32) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.take_write_fault("fir_cycles")?;
        state.fir_cycles = cycles;
        Ok(())
    }

    fn write_fir_coefficients(&mut self, coefficients: &[i32; FIR_TAPS]) -> Result<(), HwError> {
        self.state.lock().coefficients.copy_from_slice(coefficients);
        Ok(())
    }

    fn read_adc_samples(&mut self, out: &mut [i32]) -> Result<(), HwError> {
        if out.len() != ADC_SNAPSHOT_LEN {
            return Err(HwError::InvalidSnapshotLength {
                expected: ADC_SNAPSHOT_LEN,
                actual: out.len(),
            });
        }
        let mut state = self.state.lock();
        state.ensure_powered()?;
        let base = state.adc_snapshots as i32;
        for (i, value) in out.iter_mut().enumerate() {
            *value = base.wrapping_mul(ADC_SNAPSHOT_LEN as i32).wrapping_add(i as i32);
        }
        state.adc_snapshots += 1;
        Ok(())
    }

    fn set_powered(&mut self, powered: bool) -> Result<(), HwError> {
        let mut state = self.state.lock();
        if state.powered == powered {
            return Ok(());
        }
        state.powered = powered;
        if powered {
            state.restart_pacing();
        } else {
            state.fifo.clear();
        }
        info!("Simulated converters powered {}", if powered { "up" } else { "down" });
        Ok(())
    }

    fn generator_scale(&self, generator: Generator) -> Result<i32, HwError> {
        Ok(self.state.lock().generator_scale_raw[generator.index()] >> GENERATOR_SCALE_SHIFT)
    }

    fn set_generator_scale(&mut self, generator: Generator, scale: i32) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.take_write_fault("generator_scale")?;
        state.generator_scale_raw[generator.index()] =
            ((scale as u32) << GENERATOR_SCALE_SHIFT) as i32;
        debug!("Simulated {} scale set to {}", generator, scale);
        Ok(())
    }

    fn generator_step(&self, generator: Generator) -> Result<u32, HwError> {
        Ok(self.state.lock().generator_step[generator.index()])
    }

    fn set_generator_step(&mut self, generator: Generator, step: u32) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.take_write_fault("generator_step")?;
        state.generator_step[generator.index()] = step;
        Ok(())
    }

    fn dac_data_bits(&self) -> Result<u32, HwError> {
        Ok(self.state.lock().dac_data_bits)
    }

    fn set_dac_data_bits(&mut self, bits: u32) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.take_write_fault("dac_data_bits")?;
        state.dac_data_bits = bits;
        Ok(())
    }
}

/// Test-side control of a [`SimulatedLockin`]
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Append `count` pattern samples to the FIFO. Returns the first sequence number.
    pub fn push_samples(&self, count: u64) -> u64 {
        self.state.lock().push_pattern(count)
    }

    /// Append raw words, e.g. a partial sample
    pub fn push_raw_words(&self, words: &[i32]) {
        let mut state = self.state.lock();
        for word in words {
            state.push_word(*word);
        }
    }

    /// Complete samples currently in the FIFO
    pub fn fifo_samples(&self) -> usize {
        self.state.lock().fifo.len() / ENTRIES_PER_SAMPLE
    }

    /// Samples lost to FIFO overflow
    pub fn overruns(&self) -> u64 {
        self.state.lock().dropped_words / ENTRIES_PER_SAMPLE as u64
    }

    /// Samples produced so far (the next sequence number)
    pub fn generated(&self) -> u64 {
        self.state.lock().next_seq
    }

    /// Switch between paced and manual production
    pub fn set_paced(&self, paced: bool) {
        let mut state = self.state.lock();
        state.pacing = paced.then(|| Pacing {
            origin: Instant::now(),
            emitted: 0,
        });
    }

    /// Make the next `count` FIFO register accesses fail
    pub fn fail_next(&self, count: u32) {
        self.state.lock().pending_faults = count;
    }

    /// Make the next `count` writes to `register` fail.
    ///
    /// Register names match the ones reported in [`HwError::RegisterAccess`]:
    /// `half_band_filters`, `fir_cycles`, `generator_scale`, `generator_step`
    /// and `dac_data_bits`.
    pub fn fail_writes_to(&self, register: &'static str, count: u32) {
        self.fail_writes_after(register, 0, count);
    }

    /// Let `skip` writes to `register` succeed, then fail the next `count`
    pub fn fail_writes_after(&self, register: &'static str, skip: u32, count: u32) {
        let mut state = self.state.lock();
        if count == 0 {
            state.write_faults.remove(register);
        } else {
            state.write_faults.insert(register, WriteFault { skip, remaining: count });
        }
    }

    /// Whether the converters are powered
    pub fn is_powered(&self) -> bool {
        self.state.lock().powered
    }

    /// Half-band filter register
    pub fn half_band_filters(&self) -> u32 {
        self.state.lock().half_band_filters
    }

    /// FIR cycle register
    pub fn fir_cycles(&self) -> u32 {
        self.state.lock().fir_cycles
    }

    /// Last uploaded FIR taps
    pub fn coefficients(&self) -> Vec<i32> {
        self.state.lock().coefficients.clone()
    }

    /// Raw scale register of `generator`, amplitude in the upper bits
    pub fn generator_scale_register(&self, generator: Generator) -> i32 {
        self.state.lock().generator_scale_raw[generator.index()]
    }

    /// Phase increment register of `generator`
    pub fn generator_step(&self, generator: Generator) -> u32 {
        self.state.lock().generator_step[generator.index()]
    }

    /// DAC data bits register
    pub fn dac_data_bits(&self) -> u32 {
        self.state.lock().dac_data_bits
    }

    /// Number of ADC snapshots taken
    pub fn adc_snapshots(&self) -> u64 {
        self.state.lock().adc_snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FifoAdapter, FIFO_CAPACITY_SAMPLES};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pattern_roundtrip() {
        for seq in [0u64, 1, 4095, u32::MAX as u64 + 7, u64::MAX] {
            let sample = Sample::from_words(pattern_words(seq));
            assert_eq!(sequence_of(&sample), Some(seq));
        }
    }

    #[test]
    fn test_pattern_detects_corruption() {
        let mut words = pattern_words(42);
        words[5] ^= 1;
        assert_eq!(sequence_of(&Sample::from_words(words)), None);
    }

    #[test]
    fn test_manual_push_and_drain() {
        let (mut sim, handle) = SimulatedLockin::new();
        assert_eq!(handle.push_samples(3), 0);
        assert_eq!(handle.push_samples(2), 3);
        assert_eq!(handle.fifo_samples(), 5);

        let mut fifo = FifoAdapter::new(&mut sim, 1);
        assert_eq!(fifo.occupancy().unwrap(), 5);
        for expected in 0..5 {
            let sample = fifo.pop_sample().unwrap();
            assert_eq!(sequence_of(&sample), Some(expected));
        }
        assert!(fifo.pop_sample().is_err());
    }

    #[test]
    fn test_overflow_overwrites_oldest() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_samples(FIFO_CAPACITY_SAMPLES as u64 + 10);
        assert_eq!(handle.fifo_samples(), FIFO_CAPACITY_SAMPLES);
        assert_eq!(handle.overruns(), 10);

        let sample = FifoAdapter::new(&mut sim, 1).pop_sample().unwrap();
        assert_eq!(sequence_of(&sample), Some(10));
    }

    #[test]
    fn test_paced_mode_produces_samples() {
        let (mut sim, handle) = SimulatedLockin::paced();
        thread::sleep(Duration::from_millis(5));
        // 5 ms at 2728 ns per sample is well over a thousand samples
        assert!(sim.fifo_len_words().unwrap() > 0);
        assert!(handle.generated() > 100);
    }

    #[test]
    fn test_power_down_clears_fifo() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.push_samples(4);
        sim.set_powered(false).unwrap();
        assert!(!handle.is_powered());
        assert_eq!(sim.fifo_len_words(), Err(HwError::PoweredDown));
        sim.set_powered(true).unwrap();
        assert_eq!(sim.fifo_len_words().unwrap(), 0);
    }

    #[test]
    fn test_adc_snapshot_length_checked() {
        let (mut sim, handle) = SimulatedLockin::new();
        let mut short = vec![0; 10];
        assert_eq!(
            sim.read_adc_samples(&mut short),
            Err(HwError::InvalidSnapshotLength {
                expected: ADC_SNAPSHOT_LEN,
                actual: 10
            })
        );

        let mut full = vec![0; ADC_SNAPSHOT_LEN];
        sim.read_adc_samples(&mut full).unwrap();
        assert_eq!(full[100], 100);
        assert_eq!(handle.adc_snapshots(), 1);
    }

    #[test]
    fn test_registers() {
        let (mut sim, handle) = SimulatedLockin::new();
        sim.set_half_band_filters(3).unwrap();
        sim.set_fir_cycles(335).unwrap();
        assert_eq!(sim.half_band_filters().unwrap(), 3);
        assert_eq!(handle.fir_cycles(), 335);

        let mut taps = [0i32; FIR_TAPS];
        taps[0] = -7;
        taps[511] = 9;
        sim.write_fir_coefficients(&taps).unwrap();
        let stored = handle.coefficients();
        assert_eq!(stored[0], -7);
        assert_eq!(stored[511], 9);
    }

    #[test]
    fn test_generator_registers() {
        let (mut sim, handle) = SimulatedLockin::new();
        sim.set_generator_scale(Generator::One, 131_071).unwrap();
        sim.set_generator_scale(Generator::Two, 500).unwrap();
        assert_eq!(handle.generator_scale_register(Generator::One), 131_071 << 14);
        assert_eq!(sim.generator_scale(Generator::One).unwrap(), 131_071);
        assert_eq!(sim.generator_scale(Generator::Two).unwrap(), 500);

        sim.set_generator_step(Generator::Two, u32::MAX).unwrap();
        assert_eq!(handle.generator_step(Generator::Two), u32::MAX);
        assert_eq!(sim.generator_step(Generator::One).unwrap(), 0);

        sim.set_dac_data_bits(24).unwrap();
        assert_eq!(sim.dac_data_bits().unwrap(), 24);
        assert_eq!(handle.dac_data_bits(), 24);
    }

    #[test]
    fn test_write_faults_hit_only_their_register() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.fail_writes_to("fir_cycles", 1);

        sim.set_half_band_filters(2).unwrap();
        assert_eq!(
            sim.set_fir_cycles(335),
            Err(HwError::register("fir_cycles", "injected write fault"))
        );
        assert_eq!(handle.fir_cycles(), 36);
        sim.set_fir_cycles(335).unwrap();
        assert_eq!(handle.fir_cycles(), 335);

        handle.fail_writes_after("dac_data_bits", 1, 1);
        sim.set_dac_data_bits(8).unwrap();
        assert!(sim.set_dac_data_bits(9).is_err());
        sim.set_dac_data_bits(10).unwrap();
        assert_eq!(handle.dac_data_bits(), 10);
    }

    #[test]
    fn test_fault_injection_is_consumed() {
        let (mut sim, handle) = SimulatedLockin::new();
        handle.fail_next(2);
        assert!(sim.fifo_len_words().is_err());
        assert!(sim.fifo_len_words().is_err());
        assert_eq!(sim.fifo_len_words().unwrap(), 0);
    }
}

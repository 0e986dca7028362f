//! Streaming Device
//!
//! [`LockinDevice`] owns the hardware and its configuration interface.
//! [`LockinDevice::open`] starts a [`StreamSession`]: it allocates the ring,
//! starts the acquisition thread and hands back the reading end. Only one
//! session can be open at a time.

use crate::acquisition::AcquisitionHandle;
use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::control::SharedDevice;
use crate::excitation::{check_dac_data_bits, generator_register_scale};
use crate::reader::ChunkReader;
use crate::stats::AcquisitionSnapshot;
use crate::StreamError;
use lockin_hw::{Generator, LockinHardware, ADC_SNAPSHOT_LEN};
use lockin_protocol::layout::FIR_TAPS;
use lockin_protocol::Decimation;
use ring_buffer::RingBuffer;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Lock-in amplifier with a streaming endpoint
pub struct LockinDevice<H: LockinHardware> {
    shared: Arc<SharedDevice<H>>,
    config: StreamConfig,
    clock: Arc<dyn Clock>,
}

impl<H: LockinHardware> LockinDevice<H> {
    /// Wrap `hw` using the system clock for timestamps
    pub fn new(hw: H, config: StreamConfig) -> Result<Self, StreamError> {
        Self::with_clock(hw, config, Arc::new(SystemClock))
    }

    /// Wrap `hw` with an explicit timestamp source
    pub fn with_clock(
        hw: H,
        config: StreamConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StreamError> {
        config.validate()?;

        // Adopt whatever decimation the hardware is set to, if it is one we know
        let filters = hw.half_band_filters()?;
        let decimation = Decimation::from_half_band_filters(filters).unwrap_or_else(|e| {
            warn!("Unsupported decimation in hardware, assuming {}: {}", Decimation::NONE, e);
            Decimation::NONE
        });

        info!(
            decimation = decimation.factor(),
            ring_capacity = config.ring_capacity,
            "Lock-in device initialized"
        );

        Ok(Self {
            shared: Arc::new(SharedDevice::new(hw, decimation)),
            config,
            clock,
        })
    }

    /// Start streaming.
    ///
    /// Fails with [`StreamError::Busy`] if a session is already open, and
    /// with [`StreamError::ResourceExhausted`] if the ring or the acquisition
    /// thread cannot be created.
    pub fn open(&self) -> Result<StreamSession<H>, StreamError> {
        if !self.shared.try_open_session() {
            return Err(StreamError::Busy);
        }

        match self.start_session() {
            Ok(session) => Ok(session),
            Err(e) => {
                self.shared.release_session();
                Err(e)
            }
        }
    }

    fn start_session(&self) -> Result<StreamSession<H>, StreamError> {
        let ring = RingBuffer::new(self.config.ring_capacity)?;
        let (producer, consumer) = ring.split();

        let acquisition = AcquisitionHandle::spawn(Arc::clone(&self.shared), producer, &self.config)?;
        let reader = ChunkReader::new(consumer, Arc::clone(&self.clock));

        info!(
            start_ns = reader.last_start_time_ns(),
            "Stream session opened"
        );
        Ok(StreamSession {
            reader,
            acquisition: Some(acquisition),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Set the decimation factor (1, 2, 4, 8 or 16).
    ///
    /// Programs the half-band filters and the matching FIR cycle count. Chunks
    /// read afterwards carry the new time step. If the FIR cycles cannot be
    /// written the previous half-band setting is restored, so the published
    /// time step always matches the rate the hardware runs at.
    pub fn set_decimation_factor(&self, factor: u32) -> Result<(), StreamError> {
        let decimation = Decimation::new(factor)?;
        let mut control = self.shared.lock_resumed();
        let previous = control.decimation;
        control.hw.set_half_band_filters(decimation.half_band_filters())?;
        if let Err(e) = control.hw.set_fir_cycles(decimation.fir_cycles()) {
            match control.hw.set_half_band_filters(previous.half_band_filters()) {
                Ok(()) => warn!(
                    factor,
                    "FIR cycles not written, decimation stays at {}: {}",
                    previous.factor(),
                    e
                ),
                Err(restore) => {
                    // Samples now arrive at the new rate whatever the FIR does
                    control.decimation = decimation;
                    self.shared.publish_time_step(decimation);
                    error!(
                        factor,
                        "FIR cycles not written and half-band filters not restored: {}", restore
                    );
                }
            }
            return Err(e.into());
        }
        control.decimation = decimation;
        self.shared.publish_time_step(decimation);
        debug!(
            factor,
            fir_cycles = decimation.fir_cycles(),
            time_step_ns = decimation.time_step_ns(),
            "Decimation changed"
        );
        Ok(())
    }

    /// Decimation factor as read back from the hardware
    pub fn decimation_factor(&self) -> Result<u32, StreamError> {
        let control = self.shared.lock_resumed();
        let filters = control.hw.half_band_filters()?;
        Ok(Decimation::from_half_band_filters(filters)?.factor())
    }

    /// Nominal time between samples
    pub fn time_step_ns(&self) -> u64 {
        self.shared.time_step_ns()
    }

    /// FIR cycle register
    pub fn fir_cycles(&self) -> Result<u32, StreamError> {
        Ok(self.shared.lock_resumed().hw.fir_cycles()?)
    }

    /// Upload all FIR filter taps
    pub fn set_filter_coefficients(&self, coefficients: &[i32; FIR_TAPS]) -> Result<(), StreamError> {
        self.shared
            .lock_resumed()
            .hw
            .write_fir_coefficients(coefficients)?;
        debug!("FIR coefficients uploaded");
        Ok(())
    }

    /// Multiplier applied to every FIFO word from the next drain pass on
    pub fn set_sample_multiplier(&self, multiplier: i32) {
        self.shared.lock_resumed().multiplier = multiplier;
        debug!(multiplier, "Sample multiplier changed");
    }

    pub fn sample_multiplier(&self) -> i32 {
        self.shared.lock_resumed().multiplier
    }

    /// Set the output amplitude of `generator`.
    ///
    /// Accepts [`GENERATOR_SCALE_MIN`](crate::GENERATOR_SCALE_MIN) to
    /// [`GENERATOR_SCALE_MAX`](crate::GENERATOR_SCALE_MAX); amplitudes up to
    /// [`GENERATOR_SCALE_THRESHOLD`](crate::GENERATOR_SCALE_THRESHOLD) are
    /// written as zero. Returns the amplitude actually programmed.
    pub fn set_generator_scale(&self, generator: Generator, scale: i32) -> Result<i32, StreamError> {
        let programmed = generator_register_scale(scale)?;
        self.shared
            .lock_resumed()
            .hw
            .set_generator_scale(generator, programmed)?;
        debug!(%generator, requested = scale, programmed, "Generator scale changed");
        Ok(programmed)
    }

    pub fn generator_scale(&self, generator: Generator) -> Result<i32, StreamError> {
        Ok(self.shared.lock_resumed().hw.generator_scale(generator)?)
    }

    /// Set the phase increment of `generator`, i.e. its output frequency
    pub fn set_generator_step(&self, generator: Generator, step: u32) -> Result<(), StreamError> {
        self.shared
            .lock_resumed()
            .hw
            .set_generator_step(generator, step)?;
        debug!(%generator, step, "Generator step changed");
        Ok(())
    }

    pub fn generator_step(&self, generator: Generator) -> Result<u32, StreamError> {
        Ok(self.shared.lock_resumed().hw.generator_step(generator)?)
    }

    /// Set the DAC data width, at most [`DAC_DATA_BITS_MAX`](crate::DAC_DATA_BITS_MAX)
    pub fn set_dac_data_bits(&self, bits: u32) -> Result<(), StreamError> {
        let bits = check_dac_data_bits(bits)?;
        self.shared.lock_resumed().hw.set_dac_data_bits(bits)?;
        debug!(bits, "DAC data bits changed");
        Ok(())
    }

    /// DAC data width
    pub fn dac_data_bits(&self) -> Result<u32, StreamError> {
        Ok(self.shared.lock_resumed().hw.dac_data_bits()?)
    }

    /// Take one full snapshot of the raw ADC buffer.
    ///
    /// The whole buffer is read under the control lock, so it never mixes two
    /// captures and never interleaves with a drain pass.
    pub fn adc_snapshot(&self) -> Result<Vec<i32>, StreamError> {
        let mut values = Vec::new();
        values
            .try_reserve_exact(ADC_SNAPSHOT_LEN)
            .map_err(|_| StreamError::ResourceExhausted("ADC snapshot buffer".into()))?;
        values.resize(ADC_SNAPSHOT_LEN, 0);
        self.shared.lock_resumed().hw.read_adc_samples(&mut values)?;
        Ok(values)
    }

    /// FPGA design version
    pub fn hardware_version(&self) -> Result<u32, StreamError> {
        Ok(self.shared.lock_resumed().hw.version()?)
    }

    /// Ring capacity in samples
    pub fn ring_capacity(&self) -> usize {
        self.config.ring_capacity
    }

    /// Ring capacity in bytes
    pub fn ring_capacity_bytes(&self) -> usize {
        self.config.ring_capacity * lockin_protocol::layout::SAMPLE_SIZE
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Whether a session is open
    pub fn is_open(&self) -> bool {
        self.shared.session_open()
    }

    /// Acquisition statistics and device settings
    pub fn diagnostics(&self) -> Diagnostics {
        let control = self.shared.lock_raw();
        Diagnostics {
            decimation_factor: control.decimation.factor(),
            time_step_ns: self.shared.time_step_ns(),
            sample_multiplier: control.multiplier,
            suspended: control.suspended,
            ring_capacity: self.config.ring_capacity,
            session_open: self.shared.session_open(),
            acquisition: self.shared.stats.snapshot(),
        }
    }

    /// Power the converters down.
    ///
    /// Waits for an in-flight drain pass to finish; afterwards the acquisition
    /// thread and every configuration call block until [`resume`](Self::resume).
    pub fn suspend(&self) -> Result<(), StreamError> {
        let mut control = self.shared.lock_raw();
        if control.suspended {
            return Ok(());
        }
        control.hw.set_powered(false)?;
        control.suspended = true;
        info!("Lock-in device suspended");
        Ok(())
    }

    /// Power the converters up, let them settle and release everyone waiting
    pub fn resume(&self) -> Result<(), StreamError> {
        {
            let mut control = self.shared.lock_raw();
            if !control.suspended {
                return Ok(());
            }
            control.hw.set_powered(true)?;
            thread::sleep(self.config.resume_settle());
            control.suspended = false;
        }
        self.shared.wake_all();
        info!("Lock-in device resumed");
        Ok(())
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock_raw().suspended
    }
}

/// Device settings and acquisition statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub decimation_factor: u32,
    pub time_step_ns: u64,
    pub sample_multiplier: i32,
    pub suspended: bool,
    pub ring_capacity: usize,
    pub session_open: bool,
    pub acquisition: AcquisitionSnapshot,
}

/// An open stream. Dropping it closes the stream.
pub struct StreamSession<H: LockinHardware> {
    reader: ChunkReader,
    acquisition: Option<AcquisitionHandle<H>>,
    shared: Arc<SharedDevice<H>>,
}

impl<H: LockinHardware> StreamSession<H> {
    /// Read one chunk into `buf`; see [`ChunkReader::read`]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let time_step_ns = self.shared.time_step_ns();
        self.reader.read(buf, time_step_ns)
    }

    /// The stream is read-only
    pub fn write(&mut self, _buf: &[u8]) -> Result<usize, StreamError> {
        Err(StreamError::PermissionDenied("the signal stream is read-only"))
    }

    /// Timestamp the next chunk will start at
    pub fn last_start_time_ns(&self) -> u64 {
        self.reader.last_start_time_ns()
    }

    /// Data-loss events seen so far in this session
    pub fn desyncs(&self) -> u64 {
        self.reader.observed_desyncs()
    }

    /// Times the timeline was restarted because of data loss
    pub fn resyncs(&self) -> u64 {
        self.reader.resyncs()
    }

    /// Samples waiting in the ring
    pub fn occupied_count(&self) -> usize {
        self.reader.occupied_count()
    }

    pub fn acquisition(&self) -> AcquisitionSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop the acquisition thread and release the device
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(mut acquisition) = self.acquisition.take() {
            acquisition.stop();
            self.shared.release_session();
            info!("Stream session closed");
        }
    }
}

impl<H: LockinHardware> Drop for StreamSession<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

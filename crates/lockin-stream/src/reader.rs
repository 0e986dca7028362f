//! Chunked Reader
//!
//! A read hands out one chunk: a [`ChunkHeader`] followed by as many samples
//! as both the caller's buffer and the ring allow. The reader owns the
//! stream's timeline. Each read stamps the header with the timestamp of its
//! first sample and then advances the timeline by exactly `n * time_step_ns`,
//! so consecutive chunks line up with no drift.
//!
//! When the ring's desync counter moved since the previous read, samples were
//! lost and the timeline no longer describes the data. The reader then
//! restarts it from the current wall-clock time. To the consumer this is
//! visible only as a jump in `last_start_time_ns` between two headers.

use crate::clock::Clock;
use crate::StreamError;
use lockin_protocol::layout::{HEADER_SIZE, SAMPLE_SIZE};
use lockin_protocol::{ChunkHeader, Sample};
use metrics::counter;
use ring_buffer::Consumer;
use std::sync::Arc;
use tracing::{trace, warn};

/// Reading half of a stream session
pub struct ChunkReader {
    consumer: Consumer<Sample>,
    clock: Arc<dyn Clock>,
    last_start_time_ns: u64,
    last_desyncs: u64,
    resyncs: u64,
    scratch: Vec<Sample>,
}

impl ChunkReader {
    /// Start a timeline at "now" and take the current desync count as baseline
    pub fn new(consumer: Consumer<Sample>, clock: Arc<dyn Clock>) -> Self {
        let last_desyncs = consumer.desyncs();
        let last_start_time_ns = clock.now_ns();
        Self {
            consumer,
            clock,
            last_start_time_ns,
            last_desyncs,
            resyncs: 0,
            scratch: Vec::new(),
        }
    }

    /// Fill `buf` with one chunk and return the number of bytes written.
    ///
    /// `time_step_ns` is the nominal time step in force for this chunk. A
    /// buffer shorter than a header is rejected before anything is touched.
    /// An empty ring yields a header-only chunk.
    pub fn read(&mut self, buf: &mut [u8], time_step_ns: u64) -> Result<usize, StreamError> {
        if buf.len() < HEADER_SIZE {
            return Err(StreamError::InvalidArgument(format!(
                "read buffer of {} bytes cannot hold a {}-byte chunk header",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let mut snapshot = self.consumer.snapshot();
        self.synchronize();

        let room = (buf.len() - HEADER_SIZE) / SAMPLE_SIZE;
        let n = room.min(snapshot.occupied_count());

        let header = ChunkHeader {
            last_start_time_ns: self.last_start_time_ns,
            time_step_ns,
        };
        header.encode_into(buf)?;

        if self.scratch.len() < n {
            self.scratch.resize(n, Sample::default());
        }
        let popped = self
            .consumer
            .pop_into(&mut snapshot, &mut self.scratch[..n]);
        debug_assert_eq!(popped, n);

        let payload = &mut buf[HEADER_SIZE..HEADER_SIZE + popped * SAMPLE_SIZE];
        for (sample, out) in self.scratch[..popped]
            .iter()
            .zip(payload.chunks_exact_mut(SAMPLE_SIZE))
        {
            sample.encode_into(out)?;
        }

        self.last_start_time_ns = header.end_time_ns(popped);
        counter!("lockin_chunks_read_total").increment(1);
        trace!(samples = popped, start = header.last_start_time_ns, "Chunk read");
        Ok(HEADER_SIZE + popped * SAMPLE_SIZE)
    }

    /// Restart the timeline if data was lost since the previous read
    fn synchronize(&mut self) {
        let desyncs = self.consumer.desyncs();
        if desyncs != self.last_desyncs {
            warn!(
                lost_events = desyncs.wrapping_sub(self.last_desyncs),
                "Resetting start time due to desync"
            );
            self.last_start_time_ns = self.clock.now_ns();
            self.resyncs += 1;
        }
        self.last_desyncs = desyncs;
    }

    /// Timestamp the next chunk will start at (absent a desync)
    pub fn last_start_time_ns(&self) -> u64 {
        self.last_start_time_ns
    }

    /// Desync counter value seen by the last read
    pub fn observed_desyncs(&self) -> u64 {
        self.last_desyncs
    }

    /// Times the timeline was restarted because of data loss
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Samples waiting in the ring
    pub fn occupied_count(&self) -> usize {
        self.consumer.occupied_count()
    }

    /// Ring capacity in samples
    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }
}

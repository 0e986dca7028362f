//! Chunk Framing
//!
//! Every read of the signal stream returns one chunk: a 16-byte header
//! followed by zero or more encoded samples.
//!
//! ```text
//! offset  size  field
//! 0       8     last_start_time_ns  (u64, little-endian)
//! 8       8     time_step_ns        (u64, little-endian)
//! 16      32*n  samples
//! ```
//!
//! Data loss is never reported as an error. It shows up as a jump in
//! `last_start_time_ns` between consecutive chunks: after a loss the driver
//! restarts its timeline from the current wall-clock time. [`TimelineTracker`]
//! detects those jumps on the consumer side.

use crate::layout::{HEADER_SIZE, SAMPLE_SIZE};
use crate::{ProtocolError, Sample};
use serde::{Deserialize, Serialize};

/// Header prefixed to every chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Wall-clock timestamp of the first sample in the chunk (ns since the Unix epoch)
    pub last_start_time_ns: u64,
    /// Nominal time between samples, derived from the decimation factor
    pub time_step_ns: u64,
}

impl ChunkHeader {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = HEADER_SIZE;

    /// Write the header into the first 16 bytes of `out`
    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), ProtocolError> {
        if out.len() < HEADER_SIZE {
            return Err(ProtocolError::BufferTooShort {
                needed: HEADER_SIZE,
                actual: out.len(),
            });
        }
        out[0..8].copy_from_slice(&self.last_start_time_ns.to_le_bytes());
        out[8..16].copy_from_slice(&self.time_step_ns.to_le_bytes());
        Ok(())
    }

    /// Decode a header from the first 16 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::BufferTooShort {
                needed: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let mut start = [0u8; 8];
        let mut step = [0u8; 8];
        start.copy_from_slice(&bytes[0..8]);
        step.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            last_start_time_ns: u64::from_le_bytes(start),
            time_step_ns: u64::from_le_bytes(step),
        })
    }

    /// Timestamp of the sample following the last one in a chunk of `samples`
    pub fn end_time_ns(&self, samples: usize) -> u64 {
        self.last_start_time_ns + self.time_step_ns * samples as u64
    }
}

/// A parsed chunk borrowing its sample payload
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// Chunk header
    pub header: ChunkHeader,
    payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Parse exactly one chunk as returned by a single read
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        let header = ChunkHeader::decode(bytes)?;
        let payload = &bytes[HEADER_SIZE..];
        let trailing = payload.len() % SAMPLE_SIZE;
        if trailing != 0 {
            return Err(ProtocolError::TrailingBytes(trailing));
        }
        Ok(Self { header, payload })
    }

    /// Number of samples in the chunk
    pub fn len(&self) -> usize {
        self.payload.len() / SAMPLE_SIZE
    }

    /// Whether the chunk carries no samples
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Decoded samples in stream order
    pub fn samples(&self) -> impl Iterator<Item = Sample> + 'a {
        self.payload
            .chunks_exact(SAMPLE_SIZE)
            .filter_map(|raw| Sample::decode(raw).ok())
    }

    /// Timestamp of sample `index` within the chunk
    pub fn timestamp_ns(&self, index: usize) -> u64 {
        self.header.last_start_time_ns + self.header.time_step_ns * index as u64
    }
}

/// A discontinuity between two consecutive chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineGap {
    /// Where the previous chunk said the next one would start
    pub expected_start_ns: u64,
    /// Where the chunk actually starts
    pub actual_start_ns: u64,
}

impl TimelineGap {
    /// Signed difference between actual and expected start
    pub fn offset_ns(&self) -> i128 {
        i128::from(self.actual_start_ns) - i128::from(self.expected_start_ns)
    }
}

/// Follows successive chunk headers and reports timeline discontinuities
#[derive(Debug, Clone, Default)]
pub struct TimelineTracker {
    expected_start_ns: Option<u64>,
    gaps: usize,
    samples: u64,
}

impl TimelineTracker {
    /// Create a tracker that has not seen any chunk yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a chunk. Returns the gap if the chunk does not continue the previous one.
    pub fn observe(&mut self, header: &ChunkHeader, samples: usize) -> Option<TimelineGap> {
        let gap = match self.expected_start_ns {
            Some(expected) if expected != header.last_start_time_ns => Some(TimelineGap {
                expected_start_ns: expected,
                actual_start_ns: header.last_start_time_ns,
            }),
            _ => None,
        };
        if gap.is_some() {
            self.gaps += 1;
        }
        self.expected_start_ns = Some(header.end_time_ns(samples));
        self.samples += samples as u64;
        gap
    }

    /// Number of discontinuities seen so far
    pub fn gaps(&self) -> usize {
        self.gaps
    }

    /// Total samples seen so far
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_bytes(header: ChunkHeader, samples: &[Sample]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE + samples.len() * SAMPLE_SIZE];
        header.encode_into(&mut out).unwrap();
        for (i, sample) in samples.iter().enumerate() {
            let at = HEADER_SIZE + i * SAMPLE_SIZE;
            sample.encode_into(&mut out[at..]).unwrap();
        }
        out
    }

    #[test]
    fn test_header_layout() {
        let header = ChunkHeader {
            last_start_time_ns: 0x0102_0304_0506_0708,
            time_step_ns: 2728,
        };
        let mut out = [0u8; 16];
        header.encode_into(&mut out).unwrap();
        assert_eq!(&out[0..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&out[8..16], &2728u64.to_le_bytes());
        assert_eq!(ChunkHeader::decode(&out).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_short_buffer() {
        let mut out = [0u8; 15];
        assert!(ChunkHeader::default().encode_into(&mut out).is_err());
        assert!(ChunkHeader::decode(&out).is_err());
    }

    #[test]
    fn test_parse_chunk_with_samples() {
        let header = ChunkHeader {
            last_start_time_ns: 1_000,
            time_step_ns: 10,
        };
        let samples = [
            Sample::from_words([1, 0, 0, 0, 0, 0, 0, 0]),
            Sample::from_words([2, 0, 0, 0, 0, 0, 0, 0]),
        ];
        let bytes = chunk_bytes(header, &samples);
        let chunk = Chunk::parse(&bytes).unwrap();
        assert_eq!(chunk.header, header);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.samples().collect::<Vec<_>>(), samples.to_vec());
        assert_eq!(chunk.timestamp_ns(1), 1_010);
    }

    #[test]
    fn test_parse_header_only_chunk() {
        let bytes = chunk_bytes(ChunkHeader::default(), &[]);
        let chunk = Chunk::parse(&bytes).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_parse_rejects_partial_sample() {
        let mut bytes = chunk_bytes(ChunkHeader::default(), &[Sample::default()]);
        bytes.pop();
        assert_eq!(Chunk::parse(&bytes).unwrap_err(), ProtocolError::TrailingBytes(31));
    }

    #[test]
    fn test_tracker_accepts_continuous_timeline() {
        let mut tracker = TimelineTracker::new();
        let first = ChunkHeader { last_start_time_ns: 100, time_step_ns: 5 };
        let second = ChunkHeader { last_start_time_ns: 150, time_step_ns: 5 };
        assert_eq!(tracker.observe(&first, 10), None);
        assert_eq!(tracker.observe(&second, 0), None);
        // An empty chunk does not move the timeline
        let third = ChunkHeader { last_start_time_ns: 150, time_step_ns: 5 };
        assert_eq!(tracker.observe(&third, 3), None);
        assert_eq!(tracker.gaps(), 0);
        assert_eq!(tracker.samples(), 13);
    }

    #[test]
    fn test_tracker_reports_reset() {
        let mut tracker = TimelineTracker::new();
        tracker.observe(&ChunkHeader { last_start_time_ns: 100, time_step_ns: 5 }, 10);
        let gap = tracker
            .observe(&ChunkHeader { last_start_time_ns: 9_000, time_step_ns: 5 }, 1)
            .unwrap();
        assert_eq!(gap.expected_start_ns, 150);
        assert_eq!(gap.actual_start_ns, 9_000);
        assert_eq!(gap.offset_ns(), 8_850);
        assert_eq!(tracker.gaps(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_exact_timeline_never_reports_gaps(
                start in 0u64..1_000_000_000,
                step in 1u64..50_000,
                sizes in prop::collection::vec(0usize..512, 1..64),
            ) {
                let mut tracker = TimelineTracker::new();
                let mut at = start;
                for n in &sizes {
                    let header = ChunkHeader { last_start_time_ns: at, time_step_ns: step };
                    prop_assert!(tracker.observe(&header, *n).is_none());
                    at += step * *n as u64;
                }
                prop_assert_eq!(tracker.samples(), sizes.iter().map(|n| *n as u64).sum::<u64>());
            }
        }
    }
}

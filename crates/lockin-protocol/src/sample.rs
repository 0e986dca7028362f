//! Sample Records
//!
//! One sample carries the demodulated output of both sites. Each site holds
//! the real and imaginary parts of the high- and low-frequency channels.

use crate::layout::{ENTRIES_PER_SAMPLE, ENTRIES_PER_SITE, SAMPLE_SIZE, SITES_PER_SAMPLE, SITE_SIZE};
use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// Demodulated output of a single measurement site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteSample {
    /// High-frequency channel, real part
    pub hf_re: i32,
    /// High-frequency channel, imaginary part
    pub hf_im: i32,
    /// Low-frequency channel, real part
    pub lf_re: i32,
    /// Low-frequency channel, imaginary part
    pub lf_im: i32,
}

impl SiteSample {
    /// Entries in FIFO order
    pub fn to_words(&self) -> [i32; ENTRIES_PER_SITE] {
        [self.hf_re, self.hf_im, self.lf_re, self.lf_im]
    }

    /// Build a site from entries in FIFO order
    pub fn from_words(words: [i32; ENTRIES_PER_SITE]) -> Self {
        Self {
            hf_re: words[0],
            hf_im: words[1],
            lf_re: words[2],
            lf_im: words[3],
        }
    }
}

/// One sample of the signal stream (32 bytes on the wire)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Per-site values, site 0 first
    pub sites: [SiteSample; SITES_PER_SAMPLE],
}

impl Sample {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = SAMPLE_SIZE;

    /// Assemble a sample from the eight entries popped off the hardware FIFO
    pub fn from_words(words: [i32; ENTRIES_PER_SAMPLE]) -> Self {
        let mut sites = [SiteSample::default(); SITES_PER_SAMPLE];
        for (site, chunk) in sites.iter_mut().zip(words.chunks_exact(ENTRIES_PER_SITE)) {
            *site = SiteSample::from_words([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { sites }
    }

    /// Entries in FIFO order (site 0 first)
    pub fn to_words(&self) -> [i32; ENTRIES_PER_SAMPLE] {
        let mut words = [0i32; ENTRIES_PER_SAMPLE];
        for (chunk, site) in words.chunks_exact_mut(ENTRIES_PER_SITE).zip(self.sites.iter()) {
            chunk.copy_from_slice(&site.to_words());
        }
        words
    }

    /// Write the sample into the first 32 bytes of `out`.
    ///
    /// Site `s`, entry `e` lands at offset `16 * s + 4 * e`, little-endian.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), ProtocolError> {
        if out.len() < SAMPLE_SIZE {
            return Err(ProtocolError::BufferTooShort {
                needed: SAMPLE_SIZE,
                actual: out.len(),
            });
        }
        for (i, word) in self.to_words().iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    /// Encode into a fresh array
    pub fn to_bytes(&self) -> [u8; SAMPLE_SIZE] {
        let mut out = [0u8; SAMPLE_SIZE];
        for (i, word) in self.to_words().iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Decode a sample from the first 32 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < SAMPLE_SIZE {
            return Err(ProtocolError::BufferTooShort {
                needed: SAMPLE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut words = [0i32; ENTRIES_PER_SAMPLE];
        for (i, word) in words.iter_mut().enumerate() {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            *word = i32::from_le_bytes(raw);
        }
        Ok(Self::from_words(words))
    }

    /// Byte offset of a site within an encoded sample
    pub const fn site_offset(site: usize) -> usize {
        site * SITE_SIZE
    }
}

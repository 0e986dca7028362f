//! Lock-Free Ring Buffer
//!
//! A fixed-capacity single-producer/single-consumer ring buffer for
//! fixed-size records. The writer never blocks and never overwrites unread
//! data: pushing into a full ring fails and is recorded as a desync, which
//! the consumer can observe and react to.
//!
//! The capacity must be a power of two so that indices wrap with a bitmask.
//! One slot is always kept empty to tell a full ring from an empty one, so at
//! most `capacity - 1` records are resident at a time.

mod buffer;

pub use buffer::{Consumer, Producer, RingBuffer, RingSnapshot};

use thiserror::Error;

/// Errors when constructing a ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Capacity is zero, one, or not a power of two
    #[error("Ring capacity must be a power of two greater than one (got {0})")]
    CapacityNotPowerOfTwo(usize),

    /// Storage for the ring could not be reserved
    #[error("Failed to allocate storage for {capacity} ring slots")]
    Allocation { capacity: usize },
}

/// Returned by [`Producer::push`] when the ring has no free slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Ring buffer is full")]
pub struct RingFull;

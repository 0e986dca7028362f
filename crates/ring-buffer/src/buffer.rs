//! Lock-Free Ring Buffer Implementation

use crate::{RingError, RingFull};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free SPSC ring buffer.
///
/// Construct with [`RingBuffer::new`], then [`split`](RingBuffer::split) into
/// the one [`Producer`] and the one [`Consumer`]. Only the producer moves
/// `head` and only the consumer moves `tail`.
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Box<[UnsafeCell<T>]>,
    /// `capacity - 1`
    mask: usize,
    /// Next write position, published by the producer with release ordering
    head: AtomicUsize,
    /// Next read position, published by the consumer with release ordering
    tail: AtomicUsize,
    /// Number of data-loss events since allocation
    desyncs: AtomicU64,
}

// SAFETY: slots in [tail, head) are only read by the consumer and slots
// outside it are only written by the producer. Ownership of a slot moves
// between the two through the release/acquire pairs on `head` and `tail`,
// and the split handles guarantee a single producer and a single consumer.
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring with `capacity` slots (must be a power of two, at least 2)
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(RingError::CapacityNotPowerOfTwo(capacity));
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| RingError::Allocation { capacity })?;
        storage.resize_with(capacity, || UnsafeCell::new(T::default()));

        Ok(Self {
            storage: storage.into_boxed_slice(),
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            desyncs: AtomicU64::new(0),
        })
    }
}

impl<T> RingBuffer<T> {
    /// Split into the producer and consumer halves
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self);
        (
            Producer {
                ring: Arc::clone(&ring),
            },
            Consumer { ring },
        )
    }

    /// Number of slots (a power of two)
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn desyncs(&self) -> u64 {
        self.desyncs.load(Ordering::Acquire)
    }

    #[inline]
    fn count(&self, head: usize, tail: usize) -> usize {
        head.wrapping_sub(tail) & self.mask
    }

    #[inline]
    fn space(&self, head: usize, tail: usize) -> usize {
        self.mask - self.count(head, tail)
    }

    /// Raw pointer to slot `index`
    #[inline]
    fn slot(&self, index: usize) -> *mut T {
        debug_assert!(index <= self.mask);
        // UnsafeCell<T> has the same layout as T, so consecutive slots are
        // contiguous T values reachable from the first slot's pointer.
        UnsafeCell::raw_get(self.storage.as_ptr().wrapping_add(index))
    }
}

/// Consistent view of the ring taken by the consumer at the start of a read.
///
/// Records published after the snapshot are left for the next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSnapshot {
    head: usize,
    tail: usize,
    occupied: usize,
}

impl RingSnapshot {
    /// Head index observed at snapshot time
    pub fn head(&self) -> usize {
        self.head
    }

    /// Tail index (advances as chunks are popped against this snapshot)
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Records still poppable against this snapshot
    pub fn occupied_count(&self) -> usize {
        self.occupied
    }
}

/// Writing half of a [`RingBuffer`]
pub struct Producer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T: Copy> Producer<T> {
    /// Number of slots (a power of two)
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Free slots. May understate the space if the consumer is mid-read,
    /// which only postpones the write to the next cycle.
    pub fn available_space(&self) -> usize {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        self.ring.space(head, tail)
    }

    /// Unread records
    pub fn occupied_count(&self) -> usize {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        self.ring.count(head, tail)
    }

    /// Append a record.
    ///
    /// Fails with [`RingFull`] when `capacity - 1` records are resident; the
    /// failed attempt counts as one desync.
    pub fn push(&mut self, value: T) -> Result<(), RingFull> {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        if self.ring.space(head, tail) == 0 {
            self.record_desync();
            return Err(RingFull);
        }

        // SAFETY: `head` is outside [tail, head), so the consumer does not
        // touch this slot until the release store below publishes it.
        unsafe { self.ring.slot(head).write(value) };

        self.ring
            .head
            .store((head + 1) & self.ring.mask, Ordering::Release);
        Ok(())
    }

    /// Record a data-loss event detected outside of [`push`](Self::push).
    /// Returns the new desync count.
    pub fn record_desync(&self) -> u64 {
        self.ring.desyncs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Data-loss events since allocation
    pub fn desyncs(&self) -> u64 {
        self.ring.desyncs()
    }
}

/// Reading half of a [`RingBuffer`]
pub struct Consumer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Number of slots (a power of two)
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Unread records
    pub fn occupied_count(&self) -> usize {
        self.snapshot().occupied
    }

    /// Data-loss events since allocation
    pub fn desyncs(&self) -> u64 {
        self.ring.desyncs()
    }

    /// Take a consistent `(head, tail, occupied)` view for one read.
    ///
    /// The acquire load of `head` pairs with the producer's release store, so
    /// every record below the observed head is fully written.
    pub fn snapshot(&self) -> RingSnapshot {
        let head = self.ring.head.load(Ordering::Acquire);
        let tail = self.ring.tail.load(Ordering::Relaxed);
        RingSnapshot {
            head,
            tail,
            occupied: self.ring.count(head, tail),
        }
    }

    /// Copy the longest contiguous run starting at the snapshot's tail into
    /// `dest` and release those slots to the producer.
    ///
    /// The run stops at the snapshot's head, the physical end of the storage,
    /// or `dest.len()`, whichever comes first. A wrapped read therefore needs
    /// two calls. Returns the number of records copied.
    pub fn pop_contiguous_chunk(&mut self, snapshot: &mut RingSnapshot, dest: &mut [T]) -> usize {
        let tail = snapshot.tail;
        let to_end = (self.ring.capacity() - tail).min(snapshot.occupied);
        let n = to_end.min(dest.len());
        if n == 0 {
            return 0;
        }

        // SAFETY: slots [tail, tail + n) lie inside [tail, head) of the
        // snapshot, were published by the producer before the acquire load in
        // `snapshot`, and do not wrap past the end of the storage.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ring.slot(tail) as *const T, dest.as_mut_ptr(), n);
        }

        let new_tail = (tail + n) & self.ring.mask;
        self.ring.tail.store(new_tail, Ordering::Release);
        snapshot.tail = new_tail;
        snapshot.occupied -= n;
        n
    }

    /// Pop up to `dest.len()` records against a snapshot, wrapping if needed
    pub fn pop_into(&mut self, snapshot: &mut RingSnapshot, dest: &mut [T]) -> usize {
        let first = self.pop_contiguous_chunk(snapshot, dest);
        let second = self.pop_contiguous_chunk(snapshot, &mut dest[first..]);
        first + second
    }
}

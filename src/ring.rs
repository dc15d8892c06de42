//! Bounded single-producer/single-consumer ring buffer.
//!
//! The only cross-thread transport in the engine. Capacity is a power
//! of two so indexing is a mask instead of a modulo. `head` (producer)
//! and `tail` (consumer) are 64-bit counters on separate cache lines;
//! the acquire/release pairing on them is the entire synchronization
//! protocol - no CAS, no locks.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use thiserror::Error;

/// Ring construction failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("ring capacity must be a non-zero power of two, got {0}")]
    CapacityNotPowerOfTwo(usize),
}

/// Bounded SPSC queue.
///
/// One thread may enqueue and one thread may dequeue at a time; the
/// [`Writer`]/[`Reader`] handles express that contract but do not
/// enforce exclusivity across repeated accessor calls - the caller
/// owns the SPSC discipline, as with the engine's per-shard rings.
pub struct Ring<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
    capacity: u64,
    /// Next slot to write. Producer-owned, consumer reads it acquire.
    head: CachePadded<AtomicU64>,
    /// Next slot to read. Consumer-owned, producer reads it acquire.
    tail: CachePadded<AtomicU64>,
}

// Slots are only touched by the single producer/consumer permitted by
// the protocol, so sharing the ring itself is sound for Send payloads.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> std::fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity)
            .field("mask", &self.mask)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Ring<T> {
    /// Create a ring with the given power-of-two capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::CapacityNotPowerOfTwo(capacity));
        }
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            buf,
            mask: (capacity - 1) as u64,
            capacity: capacity as u64,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        })
    }

    /// Attempt to enqueue. Returns the item back when full.
    ///
    /// Single producer only. Never blocks.
    #[inline]
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= self.capacity {
            return Err(item);
        }
        let idx = (head & self.mask) as usize;
        // Slot is outside the live [tail, head) window, so the consumer
        // cannot touch it until the release store below.
        unsafe { (*self.buf[idx].get()).write(item) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Attempt to dequeue. Returns `None` when empty.
    ///
    /// Single consumer only. Never blocks.
    #[inline]
    pub fn try_dequeue(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let idx = (tail & self.mask) as usize;
        let item = unsafe { (*self.buf[idx].get()).assume_init_read() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Logical occupancy. Approximate when both ends are live.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity as usize
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // &mut self: no other thread can be touching the ring.
        let head = self.head.load(Ordering::Relaxed);
        let mut tail = self.tail.load(Ordering::Relaxed);
        while tail != head {
            let idx = (tail & self.mask) as usize;
            unsafe { (*self.buf[idx].get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Producer handle over a shared ring.
pub struct Writer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Writer<T> {
    pub(crate) fn new(ring: Arc<Ring<T>>) -> Self {
        Self { ring }
    }

    /// See [`Ring::try_enqueue`].
    #[inline]
    pub fn try_enqueue(&mut self, item: T) -> Result<(), T> {
        self.ring.try_enqueue(item)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Consumer handle over a shared ring.
pub struct Reader<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Reader<T> {
    pub(crate) fn new(ring: Arc<Ring<T>>) -> Self {
        Self { ring }
    }

    /// See [`Ring::try_dequeue`].
    #[inline]
    pub fn try_dequeue(&mut self) -> Option<T> {
        self.ring.try_dequeue()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

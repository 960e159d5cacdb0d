//! Lock-free SPSC ring buffer.
//!
//! ## Layout
//!
//! Capacity is rounded up to a power of two so the physical slot of logical
//! index `i` is `i & mask`. Both cursors only ever grow (wrapping at
//! `usize::MAX`); their difference is the fill level. One slot is always left
//! empty, so `write - read <= capacity - 1` and "full" differs from "empty"
//! without a flag.
//!
//! ## Memory ordering
//!
//! | Side | Own cursor | Other cursor | Publish |
//! |------|------------|--------------|---------|
//! | producer | `Relaxed` | `Acquire` (read) | `Release` (write) |
//! | consumer | `Relaxed` | `Acquire` (write) | `Release` (read) |
//!
//! A consumer that observes a published write cursor therefore observes the
//! samples written before it, and the producer never overwrites a slot the
//! consumer has not released.
//!
//! ## Ownership
//!
//! [`RingBuffer`] offers every operation on `&mut self` for single-thread use.
//! [`RingBuffer::split`] hands out one [`RingProducer`] and one
//! [`RingConsumer`]; neither is `Clone`, so the one-writer/one-reader rule is
//! enforced by the type system instead of at runtime.

pub mod audio;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use tracing::debug;

use crate::error::{Result, VrbError};
use crate::simd;

/// Element type storable in a [`RingBuffer`].
///
/// `copy_span` moves a contiguous run of elements; `f32` routes it through
/// the vector copy kernel.
pub trait Element: Copy + Default + Send + 'static {
    #[inline]
    fn copy_span(dest: &mut [Self], src: &[Self]) {
        dest.copy_from_slice(src);
    }
}

impl Element for f32 {
    #[inline]
    fn copy_span(dest: &mut [Self], src: &[Self]) {
        simd::copy_buffer(dest, src);
    }
}

macro_rules! plain_element {
    ($($t:ty),*) => { $(impl Element for $t {})* };
}

plain_element!(f64, i8, i16, i32, i64, u8, u16, u32, u64, usize);

/// Least power of two `>= requested`; `requested <= 1` gives 1.
pub fn round_capacity(requested: usize) -> Option<usize> {
    requested.max(1).checked_next_power_of_two()
}

struct Shared<T> {
    storage: Box<[UnsafeCell<T>]>,
    mask: usize,
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
}

// SAFETY: slots are only touched by the single producer (free region) or the
// single consumer (filled region); the cursors hand regions over with
// acquire/release, so no slot is accessed from two threads at once.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T: Element> Shared<T> {
    fn new(capacity: usize) -> Self {
        let storage = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Box<[_]>>();
        Self {
            storage,
            mask: capacity - 1,
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    fn base(&self) -> *mut T {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    /// # Safety
    /// `start + len <= capacity`, and the caller owns the slots.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn slots_mut(&self, start: usize, len: usize) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.base().add(start), len) }
    }

    /// # Safety
    /// `start + len <= capacity`, and no one is writing the slots.
    #[inline]
    unsafe fn slots(&self, start: usize, len: usize) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.base().add(start), len) }
    }

    // Producer-side view.
    #[inline]
    fn free(&self) -> usize {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        self.capacity() - write.wrapping_sub(read) - 1
    }

    // Consumer-side view.
    #[inline]
    fn available(&self) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// # Safety
    /// Only one thread may act as producer.
    unsafe fn push(&self, data: &[T]) -> usize {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        let free = self.capacity() - write.wrapping_sub(read) - 1;
        let count = data.len().min(free);
        if count == 0 {
            return 0;
        }

        let pos = write & self.mask;
        let first = count.min(self.capacity() - pos);
        // SAFETY: [write, write + count) lies in the free region, which only
        // the producer touches until the cursor below is published.
        unsafe {
            T::copy_span(self.slots_mut(pos, first), &data[..first]);
            if count > first {
                T::copy_span(self.slots_mut(0, count - first), &data[first..count]);
            }
        }

        self.write
            .store(write.wrapping_add(count), Ordering::Release);
        count
    }

    /// # Safety
    /// Only one thread may act as consumer.
    unsafe fn copy_out(&self, out: &mut [T], offset: usize) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let available = write.wrapping_sub(read);
        if offset >= available {
            return 0;
        }

        let count = out.len().min(available - offset);
        let start = read.wrapping_add(offset);
        let pos = start & self.mask;
        let first = count.min(self.capacity() - pos);
        // SAFETY: [start, start + count) was published by the producer and is
        // not released until the consumer moves the read cursor.
        unsafe {
            T::copy_span(&mut out[..first], self.slots(pos, first));
            if count > first {
                T::copy_span(&mut out[first..count], self.slots(0, count - first));
            }
        }
        count
    }

    /// # Safety
    /// Only one thread may act as consumer.
    unsafe fn pop(&self, out: &mut [T]) -> usize {
        // SAFETY: forwarded consumer contract.
        let count = unsafe { self.copy_out(out, 0) };
        if count > 0 {
            let read = self.read.load(Ordering::Relaxed);
            self.read.store(read.wrapping_add(count), Ordering::Release);
        }
        count
    }

    /// # Safety
    /// Only one thread may act as consumer.
    unsafe fn skip(&self, count: usize) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let skipped = count.min(write.wrapping_sub(read));
        self.read.store(read.wrapping_add(skipped), Ordering::Release);
        skipped
    }
}

/// Fixed-capacity SPSC ring buffer, unsplit.
pub struct RingBuffer<T: Element> {
    shared: Arc<Shared<T>>,
}

impl<T: Element> RingBuffer<T> {
    /// Create a buffer holding `capacity` rounded up to a power of two.
    /// At most `capacity() - 1` elements are in flight at once.
    ///
    /// # Errors
    /// `VrbError::CapacityOverflow` if no power of two `>= capacity` fits in `usize`.
    pub fn new(capacity: usize) -> Result<Self> {
        let rounded =
            round_capacity(capacity).ok_or(VrbError::CapacityOverflow { requested: capacity })?;
        debug!(requested = capacity, capacity = rounded, "ring buffer allocated");
        Ok(Self {
            shared: Arc::new(Shared::new(rounded)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Copies up to `data.len()` elements in; returns how many fit.
    pub fn write(&mut self, data: &[T]) -> usize {
        // SAFETY: `&mut self` excludes any other producer or consumer.
        unsafe { self.shared.push(data) }
    }

    /// Moves up to `out.len()` elements out; returns how many were read.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        // SAFETY: `&mut self` excludes any other producer or consumer.
        unsafe { self.shared.pop(out) }
    }

    /// Like [`read`](Self::read) starting `offset` elements in, without
    /// consuming anything. `offset >= available()` returns 0.
    pub fn peek(&self, out: &mut [T], offset: usize) -> usize {
        // SAFETY: unsplit, so no consumer can release slots concurrently and
        // every mutating method needs `&mut self`.
        unsafe { self.shared.copy_out(out, offset) }
    }

    /// Drops up to `count` elements without copying.
    pub fn skip(&mut self, count: usize) -> usize {
        // SAFETY: `&mut self` excludes any other consumer.
        unsafe { self.shared.skip(count) }
    }

    /// Elements ready to read.
    pub fn available(&self) -> usize {
        self.shared.available()
    }

    /// Elements that can be written before the buffer is full.
    pub fn free(&self) -> usize {
        self.shared.free()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Rewinds both cursors and clears storage.
    pub fn reset(&mut self) {
        let shared = &self.shared;
        shared.write.store(0, Ordering::Relaxed);
        shared.read.store(0, Ordering::Relaxed);
        // SAFETY: `&mut self` on the unsplit buffer means no other handle exists.
        unsafe { shared.slots_mut(0, shared.capacity()) }.fill(T::default());
    }

    /// Splits into the producer and consumer halves.
    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        (
            RingProducer {
                shared: Arc::clone(&self.shared),
            },
            RingConsumer {
                shared: self.shared,
            },
        )
    }
}

impl<T: Element> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Write half. Held by the single producer thread.
pub struct RingProducer<T: Element> {
    shared: Arc<Shared<T>>,
}

impl<T: Element> RingProducer<T> {
    /// Copies up to `data.len()` elements in; returns how many fit.
    /// A short count is an overrun for the caller to handle.
    pub fn write(&mut self, data: &[T]) -> usize {
        // SAFETY: the only producer handle, and `&mut self` serialises calls.
        unsafe { self.shared.push(data) }
    }

    pub fn free(&self) -> usize {
        self.shared.free()
    }

    pub fn available(&self) -> usize {
        self.capacity() - 1 - self.free()
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Read half. Held by the single consumer thread.
pub struct RingConsumer<T: Element> {
    shared: Arc<Shared<T>>,
}

impl<T: Element> RingConsumer<T> {
    /// Moves up to `out.len()` elements out; returns how many were read.
    /// A short count is an underrun for the caller to handle.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        // SAFETY: the only consumer handle, and `&mut self` serialises calls.
        unsafe { self.shared.pop(out) }
    }

    /// Copies without consuming, starting `offset` elements in.
    pub fn peek(&self, out: &mut [T], offset: usize) -> usize {
        // SAFETY: releasing slots needs `&mut self` on this, the only consumer.
        unsafe { self.shared.copy_out(out, offset) }
    }

    pub fn skip(&mut self, count: usize) -> usize {
        // SAFETY: the only consumer handle, and `&mut self` serialises calls.
        unsafe { self.shared.skip(count) }
    }

    pub fn available(&self) -> usize {
        self.shared.available()
    }

    pub fn free(&self) -> usize {
        self.capacity() - 1 - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

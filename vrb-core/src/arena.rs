//! Bump allocator for per-block scratch memory.
//!
//! A `MemoryArena` owns one zero-initialized, cache-line-aligned region and
//! hands out increasing offsets from it. Nothing is freed individually; the
//! whole region is reclaimed by [`MemoryArena::reset`].
//!
//! `allocate` advances the offset with a compare-and-swap loop, so it never
//! blocks and may be called from the audio callback. `reset` takes `&mut self`:
//! every slice handed out borrows the arena, so the borrow checker rules out a
//! reset while any allocation is still in use.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Pod;
use tracing::{error, info};

use crate::error::{Result, VrbError};

/// Alignment of the backing region.
pub const ARENA_ALIGN: usize = 64;

pub struct MemoryArena {
    base: NonNull<u8>,
    layout: Layout,
    used: AtomicUsize,
    zero_on_reset: bool,
}

// SAFETY: the region is owned exclusively by the arena and handed out in
// disjoint pieces; the offset is the only shared state and it is atomic.
unsafe impl Send for MemoryArena {}
unsafe impl Sync for MemoryArena {}

impl MemoryArena {
    /// Obtains a zeroed region of `size` bytes.
    ///
    /// Failure here must abort session startup.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            error!("memory arena requested with zero size");
            return Err(VrbError::ArenaAllocation { size });
        }
        let layout = Layout::from_size_align(size, ARENA_ALIGN)
            .map_err(|_| VrbError::ArenaAllocation { size })?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            error!(size, "memory arena allocation failed");
            return Err(VrbError::ArenaAllocation { size });
        };

        info!(size, align = ARENA_ALIGN, "memory arena created");
        Ok(Self {
            base,
            layout,
            used: AtomicUsize::new(0),
            zero_on_reset: false,
        })
    }

    /// Zero-fill the region on every [`reset`](Self::reset).
    pub fn with_zero_on_reset(mut self, enabled: bool) -> Self {
        self.zero_on_reset = enabled;
        self
    }

    pub fn zero_on_reset(&self) -> bool {
        self.zero_on_reset
    }

    /// Reserves `size` bytes aligned to `align`.
    ///
    /// Returns `None` for a zero size, a non-power-of-two alignment, or when the
    /// aligned span `[aligned_start, aligned_start + size)` would pass the end
    /// of the region. Exhaustion is per call: the caller is expected
    /// to skip optional work for the current block.
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if size == 0 || !align.is_power_of_two() {
            return None;
        }
        let capacity = self.capacity();
        let base_addr = self.base.as_ptr() as usize;

        let mut start = 0;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let addr = base_addr.checked_add(used)?.checked_add(align - 1)? & !(align - 1);
                let offset = addr - base_addr;
                let end = offset.checked_add(size)?;
                if end > capacity {
                    return None;
                }
                start = offset;
                Some(end)
            })
            .ok()?;

        // SAFETY: start + size <= capacity, so the pointer stays in the region.
        NonNull::new(unsafe { self.base.as_ptr().add(start) })
    }

    /// Typed, zero-filled slice of `len` elements.
    ///
    /// The slice borrows the arena and so cannot outlive the next reset.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice<T: Pod>(&self, len: usize) -> Option<&mut [T]> {
        let bytes = len.checked_mul(std::mem::size_of::<T>())?;
        if bytes == 0 {
            return Some(&mut []);
        }
        let ptr = self.allocate(bytes, std::mem::align_of::<T>())?;
        // SAFETY: the range is inside the region, aligned for T, and handed
        // out to no one else until reset. Zero is a valid `Pod` value.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, bytes);
            Some(std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<T>(), len))
        }
    }

    /// Individual reclamation is not supported; memory returns on reset.
    pub fn deallocate(&self, _ptr: NonNull<u8>) {}

    /// Reclaims every allocation at once.
    pub fn reset(&mut self) {
        let used = std::mem::replace(self.used.get_mut(), 0);
        if self.zero_on_reset && used > 0 {
            // SAFETY: exclusive access; `used` never exceeds the region size.
            unsafe { std::ptr::write_bytes(self.base.as_ptr(), 0, used) };
        }
    }

    /// Bytes consumed, including alignment padding.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Used bytes as a percentage of capacity.
    pub fn usage_percentage(&self) -> f32 {
        self.used() as f32 / self.capacity() as f32 * 100.0
    }
}

impl Drop for MemoryArena {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArena")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("zero_on_reset", &self.zero_on_reset)
            .finish()
    }
}

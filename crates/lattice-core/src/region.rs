//! Cache-line aligned, zero-initialised byte regions.
//!
//! Every byte the substrate hands out lives in an [`AlignedRegion`]: block
//! arenas (one per growth step) and the individually sized kissing-boundary
//! buffers. Regions never move once allocated, so raw pointers into them
//! stay valid for the region's lifetime.

use crate::constants::CACHE_LINE_SIZE;
use crate::error::{LatticeError, Result};
use lattice_tracing::performance::record_allocation;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::time::Instant;

/// Owned, 64-byte aligned heap region.
///
/// The region hands out raw pointers; synchronisation of the bytes is the
/// caller's business (exclusive segment ownership, or the boundary protocol).
pub struct AlignedRegion {
    data: NonNull<u8>,
    layout: Layout,
    locked: bool,
}

impl AlignedRegion {
    /// Allocate `size` zeroed bytes aligned to [`CACHE_LINE_SIZE`].
    ///
    /// `label` names the region in allocation events.
    ///
    /// # Errors
    ///
    /// [`LatticeError::Resource`] when `size` is zero, the layout is invalid,
    /// or the allocator returns null.
    pub fn new(size: usize, label: &str) -> Result<Self> {
        if size == 0 {
            return Err(LatticeError::resource(format!("{label}: cannot allocate an empty region")));
        }

        let layout = Layout::from_size_align(size, CACHE_LINE_SIZE)
            .map_err(|e| LatticeError::resource(format!("{label}: invalid layout: {e}")))?;

        let start = Instant::now();
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let data = NonNull::new(ptr).ok_or_else(|| {
            tracing::warn!(size, label, "allocation failed");
            LatticeError::resource(format!("{label}: failed to allocate {size} bytes"))
        })?;
        record_allocation(size, label, CACHE_LINE_SIZE, start.elapsed().as_micros() as u64);

        Ok(Self {
            data,
            layout,
            locked: false,
        })
    }

    /// Allocate and try to pin the pages in RAM.
    ///
    /// Pinning is best effort: without `CAP_IPC_LOCK` or a raised
    /// `RLIMIT_MEMLOCK` the region is returned unlocked.
    pub fn new_locked(size: usize, label: &str) -> Result<Self> {
        let mut region = Self::new(size, label)?;
        region.locked = lock_memory(region.data.as_ptr(), size);
        if !region.locked {
            tracing::warn!(size, label, "could not lock region in memory; pages may be swapped");
        }
        Ok(region)
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Mutable pointer to the first byte.
    ///
    /// Handed out from `&self` because segments and boundaries share one
    /// region across threads; writers must uphold their own exclusivity.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Pointer to `offset`, or `None` when `offset + len` runs past the end.
    pub fn ptr_at(&self, offset: usize, len: usize) -> Option<*mut u8> {
        let end = offset.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        // SAFETY: offset + len <= size, so the result stays inside the allocation.
        Some(unsafe { self.data.as_ptr().add(offset) })
    }
}

impl Drop for AlignedRegion {
    fn drop(&mut self) {
        if self.locked {
            unlock_memory(self.data.as_ptr(), self.layout.size());
        }
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { dealloc(self.data.as_ptr(), self.layout) };
    }
}

// SAFETY: the region owns its allocation; concurrent access to the bytes is
// mediated by the segment and boundary types built on top of it.
unsafe impl Send for AlignedRegion {}
unsafe impl Sync for AlignedRegion {}

impl std::fmt::Debug for AlignedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedRegion")
            .field("ptr", &self.data)
            .field("len", &self.len())
            .field("locked", &self.locked)
            .finish()
    }
}

#[cfg(target_os = "linux")]
fn lock_memory(ptr: *const u8, size: usize) -> bool {
    // SAFETY: ptr..ptr+size is a live allocation owned by the caller.
    unsafe {
        if libc::mlock(ptr as *const libc::c_void, size) != 0 {
            return false;
        }
        libc::madvise(ptr as *mut libc::c_void, size, libc::MADV_WILLNEED);
        true
    }
}

#[cfg(target_os = "macos")]
fn lock_memory(ptr: *const u8, size: usize) -> bool {
    // SAFETY: ptr..ptr+size is a live allocation owned by the caller.
    unsafe {
        if libc::mlock(ptr as *const libc::c_void, size) != 0 {
            return false;
        }
        libc::madvise(ptr as *mut libc::c_void, size, libc::MADV_WILLNEED);
        true
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn lock_memory(_ptr: *const u8, _size: usize) -> bool {
    false
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn unlock_memory(ptr: *const u8, size: usize) {
    // SAFETY: the range was locked by `lock_memory` and is still allocated.
    unsafe {
        libc::munlock(ptr as *const libc::c_void, size);
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn unlock_memory(_ptr: *const u8, _size: usize) {}

//! Kissing boundaries: shared regions between two sibling segments.
//!
//! # Protocol
//!
//! ```text
//! read:   readers += 1 ; v0 = version ; copy out ; v1 = version ; readers -= 1
//!         v0 != v1  =>  version_conflicts += 1   (the bytes are returned anyway)
//!
//! write:  spin on write_lock ; spin until readers == 0 ; copy in
//!         version += 1 ; cache_invalidations += 1 ; release write_lock
//! ```
//!
//! Reads never block and never retry. A reader that needs an untorn view
//! snapshots [`KissingBoundary::version`] before and after its own read and
//! retries on mismatch, or keeps a cached version and polls
//! [`KissingBoundary::check_version`].
//!
//! Writers are serialised by the spin flag; at most one writer copies at a
//! time and it never starts copying while a reader is registered.

use crate::error::{LatticeError, Result};
use crate::region::AlignedRegion;
use serde::{Deserialize, Serialize};
use std::hint::spin_loop;
use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Which owner performed an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundarySide {
    A,
    B,
}

/// Keeps hot atomics on their own cache lines.
#[repr(align(64))]
#[derive(Default)]
struct CacheAligned<T>(T);

#[derive(Default)]
struct SyncState {
    write_lock: AtomicBool,
    version: AtomicU32,
    reader_count: AtomicU32,
}

#[derive(Default)]
struct AccessCounters {
    reads_a: AtomicU64,
    reads_b: AtomicU64,
    writes_a: AtomicU64,
    writes_b: AtomicU64,
    total_accesses: AtomicU64,
    cache_invalidations: AtomicU64,
    version_conflicts: AtomicU64,
}

impl AccessCounters {
    fn record_read(&self, side: BoundarySide) {
        match side {
            BoundarySide::A => self.reads_a.fetch_add(1, Ordering::Relaxed),
            BoundarySide::B => self.reads_b.fetch_add(1, Ordering::Relaxed),
        };
        self.total_accesses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self, side: BoundarySide) {
        match side {
            BoundarySide::A => self.writes_a.fetch_add(1, Ordering::Relaxed),
            BoundarySide::B => self.writes_b.fetch_add(1, Ordering::Relaxed),
        };
        self.total_accesses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a boundary's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryStats {
    pub segment_a: usize,
    pub segment_b: usize,
    pub size: usize,
    pub version: u32,
    pub reads_a: u64,
    pub reads_b: u64,
    pub writes_a: u64,
    pub writes_b: u64,
    pub total_accesses: u64,
    pub cache_invalidations: u64,
    pub version_conflicts: u64,
}

/// Single-writer / many-reader region shared by exactly two segments.
pub struct KissingBoundary {
    memory: AlignedRegion,
    segment_a: usize,
    segment_b: usize,
    sync: CacheAligned<SyncState>,
    counters: CacheAligned<AccessCounters>,
    retired: AtomicBool,
}

/// Holds the write lock; releases it on drop.
struct WriteGuard<'a> {
    lock: &'a AtomicBool,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl KissingBoundary {
    /// Allocate a zeroed boundary of `size` bytes between two distinct segments.
    ///
    /// # Errors
    ///
    /// - [`LatticeError::InvalidArgument`] if `segment_a == segment_b` or `size == 0`
    /// - [`LatticeError::Resource`] if the region cannot be allocated
    pub fn new(segment_a: usize, segment_b: usize, size: usize) -> Result<Self> {
        if segment_a == segment_b {
            return Err(LatticeError::invalid("a boundary needs two distinct segments", segment_a));
        }
        if size == 0 {
            return Err(LatticeError::invalid_argument("boundary size must be non-zero"));
        }
        Ok(Self {
            memory: AlignedRegion::new(size, "boundary")?,
            segment_a,
            segment_b,
            sync: CacheAligned::default(),
            counters: CacheAligned::default(),
            retired: AtomicBool::new(false),
        })
    }

    pub fn segment_a(&self) -> usize {
        self.segment_a
    }

    pub fn segment_b(&self) -> usize {
        self.segment_b
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Whether this boundary joins `x` and `y`, in either order.
    pub fn connects(&self, x: usize, y: usize) -> bool {
        (self.segment_a == x && self.segment_b == y) || (self.segment_a == y && self.segment_b == x)
    }

    /// Side of `accessor`, or an error for a segment that does not own the boundary.
    pub fn side_of(&self, accessor: usize) -> Result<BoundarySide> {
        if accessor == self.segment_a {
            Ok(BoundarySide::A)
        } else if accessor == self.segment_b {
            Ok(BoundarySide::B)
        } else {
            Err(LatticeError::InvalidArgument(format!(
                "segment {accessor} does not own boundary {}<->{}",
                self.segment_a, self.segment_b
            )))
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Lock-free. If a writer slipped in during the copy the read still
    /// succeeds and `version_conflicts` is incremented.
    pub fn read(&self, accessor: usize, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.read_observed(accessor, offset, buf, || {})
    }

    /// [`Self::read`] with a hook run between the copy and the second
    /// version snapshot.
    fn read_observed(
        &self,
        accessor: usize,
        offset: usize,
        buf: &mut [u8],
        after_copy: impl FnOnce(),
    ) -> Result<usize> {
        let side = self.admit(accessor)?;
        let src = self.span(offset, buf.len())?;
        let sync = &self.sync.0;

        sync.reader_count.fetch_add(1, Ordering::SeqCst);
        let v0 = sync.version.load(Ordering::SeqCst);
        // SAFETY: `src..src+len` lies inside the region. A concurrent writer
        // can only make the copy torn, which the version check below reports.
        unsafe { load_bytes(src, buf) };
        after_copy();
        fence(Ordering::Acquire);
        let v1 = sync.version.load(Ordering::SeqCst);
        sync.reader_count.fetch_sub(1, Ordering::SeqCst);

        if v0 != v1 {
            self.counters.0.version_conflicts.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.0.record_read(side);
        Ok(buf.len())
    }

    /// Copy `data` into the boundary at `offset` under the write lock.
    pub fn write(&self, accessor: usize, offset: usize, data: &[u8]) -> Result<usize> {
        let side = self.admit(accessor)?;
        let dst = self.span(offset, data.len())?;

        {
            let _guard = self.lock_for_write();
            // SAFETY: we hold the write lock; the destination range was
            // bounds-checked above.
            unsafe { store_bytes(dst, data) };
            self.bump_version();
        }

        self.counters.0.record_write(side);
        Ok(data.len())
    }

    /// Swap a 4- or 8-byte value at `offset`: `new` goes in, the previous
    /// bytes come back in `old`.
    pub fn exchange(&self, accessor: usize, offset: usize, new: &[u8], old: &mut [u8]) -> Result<()> {
        let width = new.len();
        if width != 4 && width != 8 {
            return Err(LatticeError::invalid("atomic exchange width must be 4 or 8 bytes", width));
        }
        if old.len() != width {
            return Err(LatticeError::InvalidArgument(format!(
                "exchange buffers differ in width: {width} vs {}",
                old.len()
            )));
        }
        let side = self.admit(accessor)?;
        let target = self.span(offset, width)?;

        {
            let _guard = self.lock_for_write();
            // SAFETY: exclusive as in `write`; the range was bounds-checked.
            unsafe {
                load_bytes(target, old);
                store_bytes(target, new);
            }
            self.bump_version();
        }

        self.counters.0.record_write(side);
        Ok(())
    }

    /// Swap a native-endian `u32`, returning the previous value.
    pub fn exchange_u32(&self, accessor: usize, offset: usize, value: u32) -> Result<u32> {
        let mut old = [0u8; 4];
        self.exchange(accessor, offset, &value.to_ne_bytes(), &mut old)?;
        Ok(u32::from_ne_bytes(old))
    }

    /// Swap a native-endian `u64`, returning the previous value.
    pub fn exchange_u64(&self, accessor: usize, offset: usize, value: u64) -> Result<u64> {
        let mut old = [0u8; 8];
        self.exchange(accessor, offset, &value.to_ne_bytes(), &mut old)?;
        Ok(u64::from_ne_bytes(old))
    }

    /// Current version; bumped by every write, exchange and invalidation.
    pub fn version(&self) -> u32 {
        self.sync.0.version.load(Ordering::SeqCst)
    }

    /// True while nothing has been written since `cached` was observed.
    pub fn check_version(&self, cached: u32) -> bool {
        self.version() == cached
    }

    /// Force cached copies stale without writing.
    pub fn invalidate(&self) {
        self.bump_version();
    }

    pub fn stats(&self) -> BoundaryStats {
        let c = &self.counters.0;
        BoundaryStats {
            segment_a: self.segment_a,
            segment_b: self.segment_b,
            size: self.size(),
            version: self.version(),
            reads_a: c.reads_a.load(Ordering::Relaxed),
            reads_b: c.reads_b.load(Ordering::Relaxed),
            writes_a: c.writes_a.load(Ordering::Relaxed),
            writes_b: c.writes_b.load(Ordering::Relaxed),
            total_accesses: c.total_accesses.load(Ordering::Relaxed),
            cache_invalidations: c.cache_invalidations.load(Ordering::Relaxed),
            version_conflicts: c.version_conflicts.load(Ordering::Relaxed),
        }
    }

    /// Zero the access counters. The version is left alone.
    pub fn reset_stats(&self) {
        let c = &self.counters.0;
        for counter in [
            &c.reads_a,
            &c.reads_b,
            &c.writes_a,
            &c.writes_b,
            &c.total_accesses,
            &c.cache_invalidations,
            &c.version_conflicts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Whether the owning block has been destroyed.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Called by the owning block on destroy; later accesses fail.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn admit(&self, accessor: usize) -> Result<BoundarySide> {
        if self.is_retired() {
            return Err(LatticeError::state(format!(
                "boundary {}<->{} belongs to a destroyed block",
                self.segment_a, self.segment_b
            )));
        }
        self.side_of(accessor)
    }

    fn span(&self, offset: usize, len: usize) -> Result<*mut u8> {
        self.memory
            .ptr_at(offset, len)
            .ok_or_else(|| LatticeError::out_of_bounds(offset, len, self.size()))
    }

    fn lock_for_write(&self) -> WriteGuard<'_> {
        let sync = &self.sync.0;
        while sync
            .write_lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
        while sync.reader_count.load(Ordering::SeqCst) != 0 {
            spin_loop();
        }
        WriteGuard { lock: &sync.write_lock }
    }

    fn bump_version(&self) {
        self.sync.0.version.fetch_add(1, Ordering::SeqCst);
        self.counters.0.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

// Boundary bytes are only touched through relaxed byte atomics, so a reader
// overlapping a writer sees a torn value instead of racing.

/// # Safety
///
/// `src..src + dst.len()` must lie inside a live allocation.
unsafe fn load_bytes(src: *const u8, dst: &mut [u8]) {
    for (i, out) in dst.iter_mut().enumerate() {
        *out = AtomicU8::from_ptr(src.add(i).cast_mut()).load(Ordering::Relaxed);
    }
}

/// # Safety
///
/// `dst..dst + src.len()` must lie inside a live allocation.
unsafe fn store_bytes(dst: *mut u8, src: &[u8]) {
    for (i, byte) in src.iter().enumerate() {
        AtomicU8::from_ptr(dst.add(i)).store(*byte, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for KissingBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KissingBoundary")
            .field("segment_a", &self.segment_a)
            .field("segment_b", &self.segment_b)
            .field("size", &self.size())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_boundaries() {
        assert!(matches!(KissingBoundary::new(3, 3, 64), Err(LatticeError::InvalidArgument(_))));
        assert!(matches!(KissingBoundary::new(0, 1, 0), Err(LatticeError::InvalidArgument(_))));
    }

    #[test]
    fn version_change_during_read_is_counted() {
        let boundary = KissingBoundary::new(0, 1, 16).unwrap();
        boundary.write(0, 0, &[7; 16]).unwrap();
        let mut buf = [0u8; 16];

        boundary.read(1, 0, &mut buf).unwrap();
        assert_eq!(boundary.stats().version_conflicts, 0);

        // The torn read still returns its bytes.
        assert_eq!(boundary.read_observed(1, 0, &mut buf, || boundary.invalidate()).unwrap(), 16);
        assert_eq!(buf, [7; 16]);
        assert_eq!(boundary.stats().version_conflicts, 1);

        // Caller-side retry: re-read until the version is stable.
        let mut attempts = 0;
        let mut disturb = true;
        loop {
            attempts += 1;
            let before = boundary.version();
            boundary
                .read_observed(1, 0, &mut buf, || {
                    if std::mem::take(&mut disturb) {
                        boundary.invalidate();
                    }
                })
                .unwrap();
            if boundary.check_version(before) {
                break;
            }
        }
        assert_eq!(attempts, 2);
        let stats = boundary.stats();
        assert_eq!(stats.version_conflicts, 2);
        assert_eq!(stats.reads_b, 4);
    }

    #[test]
    fn memory_is_cache_aligned() {
        let boundary = KissingBoundary::new(0, 1, 100).unwrap();
        assert_eq!(boundary.memory.as_ptr() as usize % 64, 0);
        assert_eq!(boundary.size(), 100);
    }

    #[test]
    fn owners_only() {
        let boundary = KissingBoundary::new(2, 5, 64).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(boundary.read(3, 0, &mut buf), Err(LatticeError::InvalidArgument(_))));
        assert!(matches!(boundary.write(0, 0, &buf), Err(LatticeError::InvalidArgument(_))));
        assert_eq!(boundary.stats().total_accesses, 0);
    }

    #[test]
    fn offsets_past_the_end_are_capacity_errors() {
        let boundary = KissingBoundary::new(0, 1, 16).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(boundary.read(0, 9, &mut buf), Err(LatticeError::CapacityExceeded(_))));
        assert!(matches!(boundary.write(1, 16, &[1]), Err(LatticeError::CapacityExceeded(_))));
        assert_eq!(boundary.write(1, 8, &buf).unwrap(), 8);
    }

    #[test]
    fn exchange_swaps_and_counts_as_write() {
        let boundary = KissingBoundary::new(0, 1, 64).unwrap();
        assert_eq!(boundary.exchange_u32(0, 0, 7).unwrap(), 0);
        assert_eq!(boundary.exchange_u32(1, 0, 9).unwrap(), 7);
        assert_eq!(boundary.exchange_u64(1, 8, u64::MAX).unwrap(), 0);

        let mut old = [0u8; 2];
        assert!(boundary.exchange(0, 0, &[1, 2], &mut old).is_err());

        let stats = boundary.stats();
        assert_eq!((stats.writes_a, stats.writes_b), (1, 2));
        assert_eq!(stats.version, 3);
    }

    #[test]
    fn invalidate_bumps_version_only() {
        let boundary = KissingBoundary::new(0, 1, 8).unwrap();
        let cached = boundary.version();
        boundary.invalidate();
        assert!(!boundary.check_version(cached));
        let stats = boundary.stats();
        assert_eq!(stats.cache_invalidations, 1);
        assert_eq!(stats.total_accesses, 0);
    }

    #[test]
    fn retired_boundary_refuses_access() {
        let boundary = KissingBoundary::new(0, 1, 8).unwrap();
        boundary.retire();
        let mut buf = [0u8; 1];
        assert!(matches!(boundary.read(0, 0, &mut buf), Err(LatticeError::State(_))));
    }

    #[test]
    fn reset_keeps_version() {
        let boundary = KissingBoundary::new(0, 1, 8).unwrap();
        boundary.write(0, 0, &[1, 2, 3]).unwrap();
        boundary.reset_stats();
        let stats = boundary.stats();
        assert_eq!(stats.writes_a, 0);
        assert_eq!(stats.version, 1);
    }
}

//! Cache-aligned segments of a block arena.

use crate::constants::SYMMETRY_ORDER;
use crate::error::{LatticeError, Result};
use crate::region::AlignedRegion;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Role of a segment inside its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Coordinator memory; segment 0 of every block.
    Control,
    /// Private working memory of one worker.
    Worker,
    /// Shared between a parent and its children.
    Shared,
    /// Backing for boundary traffic.
    Boundary,
}

/// Block-wide access totals, shared by every segment of a block.
#[derive(Debug, Default)]
pub(crate) struct BlockCounters {
    pub(crate) total_reads: AtomicU64,
    pub(crate) total_writes: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
}

impl BlockCounters {
    pub(crate) fn reset(&self) {
        self.total_reads.store(0, Ordering::Relaxed);
        self.total_writes.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

/// Geometric position of a segment in `d` dimensions:
/// `pos[k] = cos(2π · (id + group · 12) / d) · (1 + k / d)`.
pub fn compute_position(id: usize, group: usize, d: usize) -> Vec<f64> {
    if d == 0 {
        return Vec::new();
    }
    let dims = d as f64;
    let phase = (2.0 * PI * (id as f64 + group as f64 * SYMMETRY_ORDER as f64) / dims).cos();
    (0..d).map(|k| phase * (1.0 + k as f64 / dims)).collect()
}

/// A fixed-size window into one of its block's arenas.
///
/// Reads take `&self`, writes take `&mut self`: a worker that owns a
/// segment mutably can write without any lock, while counters stay
/// consistent for concurrent readers of the statistics.
#[repr(align(64))]
pub struct Segment {
    id: usize,
    symmetry_group: usize,
    kind: SegmentKind,
    numa_node: u32,
    arena: Arc<AlignedRegion>,
    offset: usize,
    size: usize,
    position: Vec<f64>,
    read_count: AtomicU64,
    write_count: AtomicU64,
    block: Arc<BlockCounters>,
}

impl Segment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        kind: SegmentKind,
        numa_node: u32,
        arena: Arc<AlignedRegion>,
        offset: usize,
        size: usize,
        dimensions: usize,
        block: Arc<BlockCounters>,
    ) -> Self {
        let symmetry_group = id % SYMMETRY_ORDER;
        Self {
            id,
            symmetry_group,
            kind,
            numa_node,
            arena,
            offset,
            size,
            position: compute_position(id, symmetry_group, dimensions),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            block,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn symmetry_group(&self) -> usize {
        self.symmetry_group
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: SegmentKind) {
        self.kind = kind;
    }

    /// Advisory NUMA node.
    pub fn numa_node(&self) -> u32 {
        self.numa_node
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn num_dimensions(&self) -> usize {
        self.position.len()
    }

    /// Start of the segment's bytes. Never null while the block is alive.
    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: offset + size <= arena length, fixed at construction.
        unsafe { self.arena.as_ptr().add(self.offset) }
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the range belongs to this segment alone; writers need `&mut self`.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes this the only view.
        unsafe { std::slice::from_raw_parts_mut(self.arena.as_mut_ptr().add(self.offset), self.size) }
    }

    /// Copy `buf.len()` bytes from `offset`. Returns 0 without touching
    /// `buf` when the range is out of bounds.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        let Some(range) = self.range(offset, buf.len()) else {
            return 0;
        };
        buf.copy_from_slice(&self.as_slice()[range]);
        self.count_read();
        buf.len()
    }

    /// Copy `data` to `offset`. Returns 0 when the range is out of bounds.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        let Some(range) = self.range(offset, data.len()) else {
            return 0;
        };
        self.as_mut_slice()[range].copy_from_slice(data);
        self.count_write();
        data.len()
    }

    /// Load a plain-old-data value from `offset` (no alignment requirement).
    pub fn load<T: bytemuck::Pod>(&self, offset: usize) -> Result<T> {
        let len = std::mem::size_of::<T>();
        let range = self
            .range(offset, len)
            .ok_or_else(|| LatticeError::out_of_bounds(offset, len, self.size))?;
        let value = bytemuck::pod_read_unaligned(&self.as_slice()[range]);
        self.count_read();
        Ok(value)
    }

    /// Store a plain-old-data value at `offset`.
    pub fn store<T: bytemuck::Pod>(&mut self, offset: usize, value: T) -> Result<()> {
        let bytes = bytemuck::bytes_of(&value);
        let range = self
            .range(offset, bytes.len())
            .ok_or_else(|| LatticeError::out_of_bounds(offset, bytes.len(), self.size))?;
        self.as_mut_slice()[range].copy_from_slice(bytes);
        self.count_write();
        Ok(())
    }

    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_counts(&self) {
        self.read_count.store(0, Ordering::Relaxed);
        self.write_count.store(0, Ordering::Relaxed);
    }

    /// Grow the position vector to `dimensions`, filling only the new
    /// coordinates from [`compute_position`]. Existing coordinates are kept
    /// bit for bit.
    pub(crate) fn extend_position(&mut self, dimensions: usize) {
        let old = self.position.len();
        if dimensions <= old {
            return;
        }
        let fresh = compute_position(self.id, self.symmetry_group, dimensions);
        self.position.extend_from_slice(&fresh[old..]);
    }

    fn range(&self, offset: usize, len: usize) -> Option<std::ops::Range<usize>> {
        let end = offset.checked_add(len)?;
        (end <= self.size).then_some(offset..end)
    }

    fn count_read(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.block.total_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn count_write(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.block.total_writes.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("symmetry_group", &self.symmetry_group)
            .field("kind", &self.kind)
            .field("numa_node", &self.numa_node)
            .field("size", &self.size)
            .field("dimensions", &self.position.len())
            .finish()
    }
}

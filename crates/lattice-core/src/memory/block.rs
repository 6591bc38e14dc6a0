//! Hierarchical memory block: segments, boundaries and growth.

use super::segment::{BlockCounters, Segment, SegmentKind};
use crate::boundary::KissingBoundary;
use crate::config::BlockConfig;
use crate::constants::{MIN_SEGMENTS, SYMMETRY_ORDER};
use crate::coprime::{coprime, CoprimeMatrix};
use crate::error::{LatticeError, Result};
use crate::region::AlignedRegion;
use lattice_tracing::performance::record_scale;
use lattice_tracing::{perf_event, perf_span};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BLOCK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Output of [`HierarchicalMemoryBlock::should_scale`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleAdvice {
    pub segments: bool,
    pub dimensions: bool,
}

impl ScaleAdvice {
    pub fn any(&self) -> bool {
        self.segments || self.dimensions
    }
}

/// Snapshot of block-level statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    pub block_id: String,
    pub num_segments: usize,
    pub num_dimensions: usize,
    pub num_boundaries: usize,
    pub segment_size: usize,
    pub total_size: usize,
    pub total_reads: u64,
    pub total_writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// State guarded by the block mutex.
#[derive(Default)]
struct Ledger {
    boundaries: Vec<Arc<KissingBoundary>>,
    segment_scale_history: Vec<usize>,
    dimension_scale_history: Vec<usize>,
}

/// A set of equally sized, cache-aligned segments carved out of one or more
/// arenas, plus the boundaries between them.
///
/// ```text
/// arena 0: [ seg 0 | seg 1 | ... | seg 11 ]          (create)
/// arena 1: [ seg 12 | ... | seg 23 ]                 (scale_segments ×2)
/// boundaries: Arc<KissingBoundary> (own memory each)
/// ```
///
/// Segments never move. Growing the block appends a fresh arena and new
/// segments behind the existing ones.
///
/// Structural operations that change the segment set or the dimensionality
/// take `&mut self`; [`Self::create_boundary`] only needs `&self` and takes
/// the block mutex. Segment reads and writes take no lock.
pub struct HierarchicalMemoryBlock {
    block_id: String,
    config: BlockConfig,
    segment_size: usize,
    max_segments: usize,
    max_dimensions: usize,
    num_dimensions: usize,
    arenas: Vec<Arc<AlignedRegion>>,
    segments: Vec<Segment>,
    coprime: CoprimeMatrix,
    counters: Arc<BlockCounters>,
    ledger: Mutex<Ledger>,
    destroyed: bool,
}

impl HierarchicalMemoryBlock {
    /// Create a block of `total_size` bytes split into `initial_segments`.
    ///
    /// # Errors
    ///
    /// [`LatticeError::Resource`] when the sizes violate the minima
    /// (`initial_segments >= 12` and a multiple of 12, `initial_dimensions >= 13`,
    /// at least one cache line per segment) or the arena cannot be allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use lattice_core::memory::HierarchicalMemoryBlock;
    ///
    /// let block = HierarchicalMemoryBlock::create(1 << 20, 12, 13, 0, 0).unwrap();
    /// assert_eq!(block.num_segments(), 12);
    /// ```
    pub fn create(
        total_size: usize,
        initial_segments: usize,
        initial_dimensions: usize,
        owner_id: u32,
        hierarchy_level: u32,
    ) -> Result<Self> {
        Self::with_config(
            BlockConfig::new(total_size, initial_segments, initial_dimensions).with_owner(owner_id, hierarchy_level),
        )
    }

    /// Create a block from a full [`BlockConfig`].
    pub fn with_config(config: BlockConfig) -> Result<Self> {
        config.validate()?;

        let segment_size = config.segment_size();
        let num_segments = config.initial_segments;
        let num_dimensions = config.initial_dimensions;
        let counters = Arc::new(BlockCounters::default());

        let arena = Arc::new(allocate_arena(&config, segment_size, num_segments)?);
        let segments = (0..num_segments)
            .map(|i| {
                let kind = if i == 0 { SegmentKind::Control } else { SegmentKind::Worker };
                Segment::new(
                    i,
                    kind,
                    numa_node(i, config.numa_nodes),
                    Arc::clone(&arena),
                    i * segment_size,
                    segment_size,
                    num_dimensions,
                    Arc::clone(&counters),
                )
            })
            .collect();

        let seq = NEXT_BLOCK_SEQ.fetch_add(1, Ordering::Relaxed);
        let block_id = format!(
            "HMEM_{}_L{}_S{}_D{}_{}",
            config.owner_id, config.hierarchy_level, num_segments, num_dimensions, seq
        );

        tracing::info!(
            block_id = %block_id,
            segments = num_segments,
            dimensions = num_dimensions,
            segment_size,
            total_size = segment_size * num_segments,
            "created hierarchical memory block"
        );

        Ok(Self {
            block_id,
            max_segments: config.max_segments(),
            max_dimensions: config.max_dimensions(),
            segment_size,
            num_dimensions,
            arenas: vec![arena],
            segments,
            coprime: CoprimeMatrix::for_dimensions(num_dimensions),
            counters,
            ledger: Mutex::new(Ledger::default()),
            destroyed: false,
            config,
        })
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn owner_id(&self) -> u32 {
        self.config.owner_id
    }

    pub fn hierarchy_level(&self) -> u32 {
        self.config.hierarchy_level
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn min_segments(&self) -> usize {
        MIN_SEGMENTS
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    pub fn max_dimensions(&self) -> usize {
        self.max_dimensions
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// `num_segments · segment_size`; grows with [`Self::scale_segments`].
    pub fn total_size(&self) -> usize {
        self.segments.len() * self.segment_size
    }

    pub fn coprime_matrix(&self) -> &CoprimeMatrix {
        &self.coprime
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn segment(&self, id: usize) -> Result<&Segment> {
        self.ensure_alive()?;
        self.segments
            .get(id)
            .ok_or_else(|| self.segment_out_of_range(id))
    }

    pub fn segment_mut(&mut self, id: usize) -> Result<&mut Segment> {
        self.ensure_alive()?;
        let len = self.segments.len();
        self.segments
            .get_mut(id)
            .ok_or_else(|| LatticeError::InvalidArgument(format!("segment {id} out of range (block has {len})")))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// All segments mutably, for handing one segment to each worker.
    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    /// First segment whose symmetry group is `group`.
    pub fn segment_by_symmetry(&self, group: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.symmetry_group() == group)
    }

    /// Multiply the segment count by `factor`, capped at `max_segments`.
    ///
    /// New segments live in a freshly allocated arena; existing segments and
    /// their bytes are untouched. Returns the new count.
    ///
    /// # Errors
    ///
    /// - [`LatticeError::InvalidArgument`] if `factor < 2`
    /// - [`LatticeError::CapacityExceeded`] if the block is already at `max_segments`
    /// - [`LatticeError::Resource`] if the new arena cannot be allocated (block unchanged)
    /// - [`LatticeError::State`] after [`Self::destroy`]
    pub fn scale_segments(&mut self, factor: usize) -> Result<usize> {
        self.ensure_alive()?;
        if factor < 2 {
            return Err(LatticeError::invalid("segment scale factor must be at least 2", factor));
        }

        let old = self.segments.len();
        if old >= self.max_segments {
            tracing::warn!(block_id = %self.block_id, max = self.max_segments, "segment scaling refused at cap");
            return Err(LatticeError::CapacityExceeded(format!(
                "block {} already has the maximum of {} segments",
                self.block_id, self.max_segments
            )));
        }
        let new = old.saturating_mul(factor).min(self.max_segments);
        let _span = perf_span!("scale_segments", from = old, to = new);

        let arena = Arc::new(allocate_arena(&self.config, self.segment_size, new - old)?);
        let ledger = self.ledger.get_mut();
        for i in old..new {
            self.segments.push(Segment::new(
                i,
                SegmentKind::Worker,
                numa_node(i, self.config.numa_nodes),
                Arc::clone(&arena),
                (i - old) * self.segment_size,
                self.segment_size,
                self.num_dimensions,
                Arc::clone(&self.counters),
            ));
        }
        self.arenas.push(arena);
        ledger.segment_scale_history.push(new);

        record_scale("segments", old, new);
        tracing::info!(block_id = %self.block_id, from = old, to = new, "scaled segments");
        Ok(new)
    }

    /// Add `extra` dimensions, capped at `max_dimensions`.
    ///
    /// Existing coordinates are kept bit for bit; only the new indices are
    /// filled. The coprime matrix grows with its upper-left block intact.
    /// Returns the new dimensionality.
    pub fn scale_dimensions(&mut self, extra: usize) -> Result<usize> {
        self.ensure_alive()?;
        if extra == 0 {
            return Err(LatticeError::invalid_argument("dimension increase must be non-zero"));
        }

        let old = self.num_dimensions;
        if old >= self.max_dimensions {
            tracing::warn!(block_id = %self.block_id, max = self.max_dimensions, "dimension scaling refused at cap");
            return Err(LatticeError::CapacityExceeded(format!(
                "block {} already has the maximum of {} dimensions",
                self.block_id, self.max_dimensions
            )));
        }
        let new = old.saturating_add(extra).min(self.max_dimensions);
        let _span = perf_span!("scale_dimensions", from = old, to = new);

        for segment in &mut self.segments {
            segment.extend_position(new);
        }
        self.coprime.extend(new);
        self.num_dimensions = new;
        self.ledger.get_mut().dimension_scale_history.push(new);

        record_scale("dimensions", old, new);
        tracing::info!(block_id = %self.block_id, from = old, to = new, "scaled dimensions");
        Ok(new)
    }

    /// Advise growth from current pressure. Pure: reads counters only.
    ///
    /// Segments are advised once total accesses exceed
    /// `num_segments · access_pressure_per_segment`; dimensions once the
    /// boundary count exceeds `num_segments · boundary_pressure_per_segment`.
    /// Both rules are monotone in their pressure.
    pub fn should_scale(&self) -> ScaleAdvice {
        let n = self.segments.len() as u64;
        let accesses = self.counters.total_reads.load(Ordering::Relaxed)
            + self.counters.total_writes.load(Ordering::Relaxed);
        let boundaries = self.ledger.lock().boundaries.len() as u64;

        ScaleAdvice {
            segments: accesses > n.saturating_mul(self.config.access_pressure_per_segment),
            dimensions: boundaries > n.saturating_mul(self.config.boundary_pressure_per_segment as u64),
        }
    }

    /// Allocate a boundary of `size` bytes between segments `a` and `b`.
    ///
    /// The block keeps a reference; [`Self::destroy`] retires it.
    ///
    /// # Errors
    ///
    /// - [`LatticeError::InvalidArgument`] for unknown or identical segments, or `size == 0`
    /// - [`LatticeError::CapacityExceeded`] once every pair already has `n(n-1)/2` boundaries
    /// - [`LatticeError::Resource`] on allocation failure
    pub fn create_boundary(&self, a: usize, b: usize, size: usize) -> Result<Arc<KissingBoundary>> {
        self.ensure_alive()?;
        let n = self.segments.len();
        if a >= n || b >= n {
            return Err(LatticeError::InvalidArgument(format!(
                "boundary {a}<->{b} references a segment outside 0..{n}"
            )));
        }

        let mut ledger = self.ledger.lock();
        let max_boundaries = n * (n - 1) / 2;
        if ledger.boundaries.len() >= max_boundaries {
            return Err(LatticeError::CapacityExceeded(format!(
                "block {} already holds {max_boundaries} boundaries",
                self.block_id
            )));
        }

        let boundary = Arc::new(KissingBoundary::new(a, b, size)?);
        ledger.boundaries.push(Arc::clone(&boundary));
        perf_event!("boundary_created", segment_a = a, segment_b = b, size = size);
        Ok(boundary)
    }

    /// Boundary joining `a` and `b` in either orientation.
    pub fn find_boundary(&self, a: usize, b: usize) -> Option<Arc<KissingBoundary>> {
        self.ledger.lock().boundaries.iter().find(|bd| bd.connects(a, b)).cloned()
    }

    /// Boundaries in creation order.
    pub fn boundaries(&self) -> Vec<Arc<KissingBoundary>> {
        self.ledger.lock().boundaries.clone()
    }

    pub fn num_boundaries(&self) -> usize {
        self.ledger.lock().boundaries.len()
    }

    /// Whether segments `a` and `b` may exchange data: their ids must be
    /// [`coprime`] and the dimensions named by their symmetry groups must
    /// carry coprime prime tags. Unknown segments never communicate.
    pub fn can_communicate(&self, a: usize, b: usize) -> bool {
        let (Some(sa), Some(sb)) = (self.segments.get(a), self.segments.get(b)) else {
            return false;
        };
        coprime(a as u64, b as u64)
            && self
                .coprime
                .get(sa.symmetry_group(), sb.symmetry_group())
                .unwrap_or(false)
    }

    /// Compare a cached boundary version with the live one, counting the
    /// outcome as a cache hit or miss.
    pub fn check_boundary_cache(&self, index: usize, cached_version: u32) -> Result<bool> {
        let boundary = self
            .ledger
            .lock()
            .boundaries
            .get(index)
            .cloned()
            .ok_or_else(|| LatticeError::invalid("no boundary at index", index))?;
        let fresh = boundary.check_version(cached_version);
        let counter = if fresh {
            &self.counters.cache_hits
        } else {
            &self.counters.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(fresh)
    }

    pub fn segment_scale_history(&self) -> Vec<usize> {
        self.ledger.lock().segment_scale_history.clone()
    }

    pub fn dimension_scale_history(&self) -> Vec<usize> {
        self.ledger.lock().dimension_scale_history.clone()
    }

    pub fn stats(&self) -> BlockStats {
        BlockStats {
            block_id: self.block_id.clone(),
            num_segments: self.segments.len(),
            num_dimensions: self.num_dimensions,
            num_boundaries: self.num_boundaries(),
            segment_size: self.segment_size,
            total_size: self.total_size(),
            total_reads: self.counters.total_reads.load(Ordering::Relaxed),
            total_writes: self.counters.total_writes.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Zero block and segment counters.
    pub fn reset_stats(&self) {
        self.counters.reset();
        for segment in &self.segments {
            segment.reset_counts();
        }
    }

    /// Re-check every structural invariant.
    pub fn validate(&self) -> bool {
        if self.destroyed {
            return false;
        }
        let n = self.segments.len();
        let shape_ok = n % SYMMETRY_ORDER == 0
            && (MIN_SEGMENTS..=self.max_segments).contains(&n)
            && self.num_dimensions <= self.max_dimensions
            && self.coprime.size() == self.num_dimensions
            && self.coprime.is_well_formed();
        let segments_ok = self.segments.iter().enumerate().all(|(i, s)| {
            s.id() == i
                && s.symmetry_group() == i % SYMMETRY_ORDER
                && s.size() == self.segment_size
                && s.num_dimensions() == self.num_dimensions
                && !s.as_ptr().is_null()
        });
        let boundaries_ok = self
            .ledger
            .lock()
            .boundaries
            .iter()
            .all(|b| b.segment_a() < n && b.segment_b() < n && b.segment_a() != b.segment_b());
        shape_ok && segments_ok && boundaries_ok
    }

    /// Release boundaries, segments and arenas, in that order. Boundaries
    /// still referenced elsewhere are retired and refuse further access.
    /// Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let ledger = self.ledger.get_mut();
        for boundary in ledger.boundaries.drain(..).rev() {
            boundary.retire();
        }
        while self.segments.pop().is_some() {}
        while self.arenas.pop().is_some() {}
        self.destroyed = true;
        tracing::debug!(block_id = %self.block_id, "destroyed hierarchical memory block");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            return Err(LatticeError::state(format!("block {} has been destroyed", self.block_id)));
        }
        Ok(())
    }

    fn segment_out_of_range(&self, id: usize) -> LatticeError {
        LatticeError::InvalidArgument(format!("segment {id} out of range (block has {})", self.segments.len()))
    }
}

impl Drop for HierarchicalMemoryBlock {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for HierarchicalMemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalMemoryBlock")
            .field("block_id", &self.block_id)
            .field("segments", &self.segments.len())
            .field("dimensions", &self.num_dimensions)
            .field("segment_size", &self.segment_size)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

fn numa_node(segment: usize, nodes: u32) -> u32 {
    (segment % nodes.max(1) as usize) as u32
}

fn allocate_arena(config: &BlockConfig, segment_size: usize, count: usize) -> Result<AlignedRegion> {
    let bytes = segment_size
        .checked_mul(count)
        .ok_or_else(|| LatticeError::resource(format!("{count} segments of {segment_size} bytes overflow usize")))?;
    if config.lock_memory {
        AlignedRegion::new_locked(bytes, "arena")
    } else {
        AlignedRegion::new(bytes, "arena")
    }
}

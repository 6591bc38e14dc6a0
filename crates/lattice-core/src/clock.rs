//! Clock-lattice coordinates.
//!
//! Integer ids are laid out on concentric rings of capacity
//! `[12, 60, 60, 100, 100, ...]`. The id of a slot is the number of slots on
//! all inner rings plus its position on its own ring, which makes the
//! mapping a bijection between `u64` ids and `(ring, position)` pairs.
//!
//! ```text
//!   ring 0:  ids   0..12    (12 slots)
//!   ring 1:  ids  12..72    (60 slots)
//!   ring 2:  ids  72..132   (60 slots)
//!   ring 3:  ids 132..232   (100 slots)
//!   ring r:  ids 232 + (r-4)*100 .. +100   for r >= 4
//! ```

use crate::constants::{
    EXTENDED_RING_CAPACITY, FIXED_RING_SPAN, MAX_NEIGHBOURS, NEIGHBOUR_OFFSETS, RADIUS_STEP, RING_CAPACITIES,
    RING_THREE_OFFSET,
};
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A slot on the lattice with its polar projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockPosition {
    pub ring: u32,
    pub position: u32,
    /// `2π · position / capacity(ring)`
    pub angle: f64,
    /// `0.25 · (ring + 1)`
    pub radius: f64,
}

impl ClockPosition {
    /// Build a position and derive its angle and radius.
    ///
    /// No range check is made here; see [`position_to_id`] and [`validate`].
    pub fn new(ring: u32, position: u32) -> Self {
        let capacity = ring_capacity(ring);
        Self {
            ring,
            position,
            angle: 2.0 * PI * f64::from(position) / f64::from(capacity),
            radius: RADIUS_STEP * (f64::from(ring) + 1.0),
        }
    }

    /// `position < capacity(ring)`
    pub fn in_range(&self) -> bool {
        self.position < ring_capacity(self.ring)
    }
}

/// Placement of a thread inside a flat memory range (see [`map_thread_to_memory`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockMemorySlot {
    pub ring: u32,
    pub position: u32,
    pub memory_offset: usize,
    pub segment_size: usize,
}

/// Slot count of `ring`.
pub fn ring_capacity(ring: u32) -> u32 {
    RING_CAPACITIES
        .get(ring as usize)
        .copied()
        .unwrap_or(EXTENDED_RING_CAPACITY)
}

/// Number of ids on all rings inside `ring` (the id of `(ring, 0)`).
pub fn ring_offset(ring: u32) -> u64 {
    match ring {
        0..=3 => RING_CAPACITIES[..ring as usize].iter().map(|&c| u64::from(c)).sum(),
        _ => FIXED_RING_SPAN + u64::from(ring - 4) * u64::from(EXTENDED_RING_CAPACITY),
    }
}

fn check_base(base: u32) -> Result<()> {
    if base < 2 {
        return Err(LatticeError::invalid("base must be at least 2", base));
    }
    Ok(())
}

/// Map an id to its lattice slot.
///
/// # Errors
///
/// [`LatticeError::InvalidArgument`] when `base < 2`, or when the id lies on
/// a ring whose index does not fit in `u32`.
///
/// # Example
///
/// ```rust
/// use lattice_core::clock::id_to_position;
///
/// let p = id_to_position(71, 12).unwrap();
/// assert_eq!((p.ring, p.position), (1, 59));
/// ```
pub fn id_to_position(id: u64, base: u32) -> Result<ClockPosition> {
    check_base(base)?;

    let mut start = 0u64;
    for (ring, &capacity) in RING_CAPACITIES.iter().enumerate().take(3) {
        let end = start + u64::from(capacity);
        if id < end {
            return Ok(ClockPosition::new(ring as u32, (id - start) as u32));
        }
        start = end;
    }

    // Ring 3 and every extended ring hold 100 ids each from id 132 on.
    let rel = id - RING_THREE_OFFSET;
    let ring = 3 + rel / u64::from(EXTENDED_RING_CAPACITY);
    let ring = u32::try_from(ring).map_err(|_| LatticeError::invalid("id beyond the last addressable ring", id))?;
    let position = (rel % u64::from(EXTENDED_RING_CAPACITY)) as u32;
    Ok(ClockPosition::new(ring, position))
}

/// Inverse of [`id_to_position`].
///
/// Extended rings are not range-checked: an oversized position on ring
/// `r >= 4` simply addresses into the following rings.
pub fn position_to_id(pos: &ClockPosition, base: u32) -> Result<u64> {
    check_base(base)?;
    if (pos.ring as usize) < RING_CAPACITIES.len() && !pos.in_range() {
        return Err(LatticeError::InvalidArgument(format!(
            "position {} out of range for ring {} (capacity {})",
            pos.position,
            pos.ring,
            ring_capacity(pos.ring)
        )));
    }
    Ok(ring_offset(pos.ring) + u64::from(pos.position))
}

/// Project `id` into `d` dimensions.
///
/// The first three coordinates are the polar projection and the ring depth;
/// every higher coordinate `k` is `(out[0] + out[1] + out[2]) · cos(2π(k+2)k/d) / √d`.
pub fn nd_position(id: u64, d: usize) -> Result<Vec<f64>> {
    if d == 0 {
        return Err(LatticeError::invalid_argument("dimension count must be non-zero"));
    }
    let pos = id_to_position(id, 12)?;

    let mut out = vec![0.0; d];
    let head = [
        pos.radius * pos.angle.cos(),
        pos.radius * pos.angle.sin(),
        f64::from(pos.ring) / 4.0,
    ];
    let head_len = d.min(3);
    out[..head_len].copy_from_slice(&head[..head_len]);

    let dims = d as f64;
    let norm = dims.sqrt();
    for (k, slot) in out.iter_mut().enumerate().skip(3) {
        let factor = (2.0 * PI * (k as f64 + 2.0) * k as f64 / dims).cos();
        let sum: f64 = head.iter().map(|c| c * factor).sum();
        *slot = sum / norm;
    }
    Ok(out)
}

/// Up to twelve neighbour ids of `id`, in a fixed order: same-ring offsets
/// `-3, -2, -1, +1, +2, +3`, then the inner-ring sibling (ring > 0), then
/// the outer-ring sibling. Duplicates are kept.
pub fn neighbours_of(id: u64, base: u32) -> Result<Vec<u64>> {
    let pos = id_to_position(id, base)?;
    let capacity = i64::from(ring_capacity(pos.ring));
    let mut out = Vec::with_capacity(NEIGHBOUR_OFFSETS.len() + 2);

    for offset in NEIGHBOUR_OFFSETS {
        let wrapped = (i64::from(pos.position) + offset).rem_euclid(capacity) as u32;
        out.push(ring_offset(pos.ring) + u64::from(wrapped));
    }

    if out.len() < MAX_NEIGHBOURS && pos.ring > 0 {
        let inner = pos.ring - 1;
        out.push(ring_offset(inner) + u64::from(pos.position % ring_capacity(inner)));
    }

    if let Some(outer) = pos.ring.checked_add(1).filter(|_| out.len() < MAX_NEIGHBOURS) {
        out.push(ring_offset(outer) + u64::from(pos.position % ring_capacity(outer)));
    }

    Ok(out)
}

/// Positions of ids `0..n`.
pub fn organise(n: usize, base: u32) -> Result<Vec<ClockPosition>> {
    if n == 0 {
        return Err(LatticeError::invalid_argument("cannot organise zero ids"));
    }
    (0..n as u64).map(|id| id_to_position(id, base)).collect()
}

/// True when every position is in range and maps back to its own index.
pub fn validate(positions: &[ClockPosition], base: u32) -> bool {
    if positions.is_empty() || base < 2 {
        return false;
    }
    positions.iter().enumerate().all(|(index, pos)| {
        pos.in_range() && matches!(position_to_id(pos, base), Ok(id) if id == index as u64)
    })
}

/// Place thread `thread_id` of `hierarchy_level` inside `total_memory` bytes.
///
/// The range is cut into one slot per lattice position up to and including
/// ring `hierarchy_level`; the thread takes slot `thread_id mod capacity`
/// on that ring.
pub fn map_thread_to_memory(thread_id: u64, hierarchy_level: u32, total_memory: usize) -> Result<ClockMemorySlot> {
    let ring = hierarchy_level;
    let capacity = ring_capacity(ring);
    let position = (thread_id % u64::from(capacity)) as u32;

    let slots = ring_offset(ring) + u64::from(capacity);
    let segment_size = usize::try_from(total_memory as u64 / slots).unwrap_or(0);
    if segment_size == 0 {
        return Err(LatticeError::InvalidArgument(format!(
            "{total_memory} bytes cannot be split into {slots} lattice slots"
        )));
    }

    let slot_index = usize::try_from(ring_offset(ring) + u64::from(position))
        .map_err(|_| LatticeError::invalid("hierarchy level too deep", hierarchy_level))?;

    Ok(ClockMemorySlot {
        ring,
        position,
        memory_offset: slot_index * segment_size,
        segment_size,
    })
}

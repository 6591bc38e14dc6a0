//! Hierarchical memory blocks.
//!
//! A [`HierarchicalMemoryBlock`] owns its [`Segment`]s and the
//! [`crate::boundary::KissingBoundary`]s created between them.

mod block;
mod segment;

pub use block::{BlockStats, HierarchicalMemoryBlock, ScaleAdvice};
pub use segment::{compute_position, Segment, SegmentKind};

//! Geometric concurrency substrate
//!
//! This crate provides:
//! - **Clock lattice**: deterministic id ↔ ring position mapping and neighbourhoods
//! - **Coprime oracle**: which ids may communicate
//! - **Work distribution**: even splits and load-imbalance signals
//! - **Hierarchical memory blocks**: cache-aligned segments that scale in count and dimension
//! - **Kissing boundaries**: versioned single-writer regions shared by two segments
//! - **Partitioned tokenizer**: twelve independently locked shards merged into one vocabulary
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │      callers: thread ids, segment ids, token strings       │
//! └───────┬──────────────────┬──────────────────┬────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!   ┌───────────┐     ┌─────────────┐    ┌──────────────┐
//!   │   clock   │────►│   coprime   │    │  tokenizer   │
//!   │  lattice  │     │ distribution│    │ (12 shards)  │
//!   └─────┬─────┘     └──────┬──────┘    └──────────────┘
//!         │                  │
//!         ▼                  ▼
//!   ┌──────────────────────────────────────┐
//!   │ HierarchicalMemoryBlock               │
//!   │   segments ──── KissingBoundary ────  │
//!   └──────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use lattice_core::{clock, HierarchicalMemoryBlock};
//!
//! # fn main() -> lattice_core::Result<()> {
//! let pos = clock::id_to_position(42, 3)?;
//! assert_eq!(clock::position_to_id(&pos, 3)?, 42);
//!
//! let block = HierarchicalMemoryBlock::create(1 << 20, 12, 13, 0, 0)?;
//! let boundary = block.create_boundary(1, 2, 4096)?;
//! boundary.write(1, 0, b"hello")?;
//!
//! let mut buf = [0u8; 5];
//! boundary.read(2, 0, &mut buf)?;
//! assert_eq!(&buf, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod clock;
pub mod config;
pub mod constants;
pub mod coprime;
pub mod distribution;
pub mod error;
pub mod memory;
pub mod region;
pub mod registry;
pub mod tokenizer;

// Re-export public API
pub use boundary::{BoundarySide, BoundaryStats, KissingBoundary};
pub use clock::{ClockMemorySlot, ClockPosition};
pub use config::{BlockConfig, TokenizerConfig};
pub use coprime::{coprime, coprime_matrix, CoprimeMatrix};
pub use distribution::{balance_by_load, distribute};
pub use error::{LatticeError, Result};
pub use memory::{BlockStats, HierarchicalMemoryBlock, ScaleAdvice, Segment, SegmentKind};
pub use region::AlignedRegion;
pub use registry::{BlockRegistry, SharedBlock};
pub use tokenizer::{PartitionedTokenizer, TokenizerPhase};

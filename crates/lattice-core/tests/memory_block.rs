//! Integration tests for hierarchical memory blocks

use lattice_core::memory::{compute_position, HierarchicalMemoryBlock, SegmentKind};
use lattice_core::{BlockConfig, LatticeError, Result};
use std::thread;

#[test]
fn test_block_lifecycle() -> Result<()> {
    let mut block = HierarchicalMemoryBlock::create(1 << 20, 12, 13, 0, 0)?;
    assert_eq!(block.num_segments(), 12);
    for (i, seg) in block.segments().iter().enumerate() {
        assert!(!seg.as_ptr().is_null());
        assert_eq!(seg.symmetry_group(), i);
        assert_eq!(seg.as_ptr() as usize % 64, 0);
    }

    assert_eq!(block.scale_segments(2)?, 24);
    assert_eq!(block.num_segments(), 24);

    assert_eq!(block.scale_dimensions(7)?, 20);
    assert!(block.segments().iter().all(|s| s.num_dimensions() == 20));
    assert!(block.validate());
    Ok(())
}

#[test]
fn test_positions_are_geometric() -> Result<()> {
    let block = HierarchicalMemoryBlock::create(1 << 16, 12, 13, 0, 0)?;
    let seg = block.segment(4)?;
    assert_eq!(seg.position(), compute_position(4, 4, 13).as_slice());
    assert!(block.segments().iter().any(|s| s.position().iter().any(|c| *c != 0.0)));
    Ok(())
}

#[test]
fn test_scaling_preserves_data_and_coordinates() -> Result<()> {
    let mut block = HierarchicalMemoryBlock::create(12 * 1024, 12, 13, 0, 0)?;
    block.segment_mut(11)?.write(100, b"kept across growth");
    let before: Vec<Vec<f64>> = block.segments().iter().map(|s| s.position().to_vec()).collect();

    block.scale_segments(3)?;
    block.scale_dimensions(5)?;

    let mut buf = [0u8; 18];
    assert_eq!(block.segment(11)?.read(100, &mut buf), 18);
    assert_eq!(&buf, b"kept across growth");
    for (seg, old) in block.segments().iter().zip(&before) {
        assert_eq!(&seg.position()[..13], old.as_slice());
    }

    let fresh = block.segment(30)?;
    assert_eq!(fresh.symmetry_group(), 6);
    assert_eq!(fresh.kind(), SegmentKind::Worker);
    assert_eq!(fresh.size(), 1024);
    assert!(fresh.as_slice().iter().all(|b| *b == 0));
    Ok(())
}

#[test]
fn test_growth_limits() -> Result<()> {
    let config = BlockConfig {
        segment_growth_limit: 2,
        dimension_growth_limit: 2,
        ..BlockConfig::new(12 * 256, 12, 13)
    };
    let mut block = HierarchicalMemoryBlock::with_config(config)?;
    assert_eq!(block.scale_segments(10)?, 24);
    assert!(matches!(block.scale_segments(2), Err(LatticeError::CapacityExceeded(_))));
    assert_eq!(block.scale_dimensions(20)?, 26);
    assert!(matches!(block.scale_dimensions(1), Err(LatticeError::CapacityExceeded(_))));
    assert_eq!(block.dimension_scale_history(), vec![26]);
    Ok(())
}

#[test]
fn test_destroyed_block_rejects_operations() -> Result<()> {
    let mut block = HierarchicalMemoryBlock::create(1 << 16, 12, 13, 0, 0)?;
    let boundary = block.create_boundary(2, 5, 64)?;
    block.destroy();

    assert!(matches!(block.scale_segments(2), Err(LatticeError::State(_))));
    assert!(matches!(block.scale_dimensions(1), Err(LatticeError::State(_))));
    assert!(matches!(block.create_boundary(0, 1, 64), Err(LatticeError::State(_))));
    assert!(matches!(boundary.write(2, 0, &[1]), Err(LatticeError::State(_))));
    assert_eq!(block.num_segments(), 0);
    Ok(())
}

#[test]
fn test_workers_own_their_segments() -> Result<()> {
    let mut block = HierarchicalMemoryBlock::create(12 * 4096, 12, 13, 0, 0)?;

    thread::scope(|scope| {
        for seg in block.segments_mut() {
            scope.spawn(move || {
                let id = seg.id() as u64;
                for slot in 0..64 {
                    seg.store::<u64>(slot * 8, id * 1000 + slot as u64).unwrap();
                }
            });
        }
    });

    for seg in block.segments() {
        let id = seg.id() as u64;
        assert_eq!(seg.load::<u64>(63 * 8)?, id * 1000 + 63);
    }
    let stats = block.stats();
    assert_eq!(stats.total_writes, 12 * 64);
    assert_eq!(stats.total_reads, 12);

    block.reset_stats();
    assert_eq!(block.stats().total_writes, 0);
    assert_eq!(block.segment(0)?.write_count(), 0);
    Ok(())
}

#[test]
fn test_config_from_json() -> Result<()> {
    let config = BlockConfig::from_json_str(r#"{"total_size": 49152, "owner_id": 7}"#)?;
    let block = HierarchicalMemoryBlock::with_config(config)?;
    assert_eq!(block.owner_id(), 7);
    assert_eq!(block.segment_size(), 4096);
    assert!(block.block_id().starts_with("HMEM_7_L0_S12_D13_"));
    Ok(())
}

//! Integration tests for kissing boundaries

use lattice_core::{HierarchicalMemoryBlock, KissingBoundary, LatticeError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn test_single_writer_handoff() -> Result<()> {
    let block = HierarchicalMemoryBlock::create(1 << 20, 12, 13, 0, 0)?;
    let boundary = block.create_boundary(0, 1, 1024)?;

    let payload = b"Boundary data\0";
    assert_eq!(boundary.write(0, 0, payload)?, 14);

    let mut buf = [0u8; 14];
    assert_eq!(boundary.read(1, 0, &mut buf)?, 14);
    assert_eq!(&buf, payload);

    let stats = boundary.stats();
    assert_eq!(stats.writes_a, 1);
    assert_eq!(stats.reads_b, 1);
    assert_eq!(stats.version, 1);
    Ok(())
}

#[test]
fn test_strangers_and_overruns_are_rejected() -> Result<()> {
    let boundary = KissingBoundary::new(3, 4, 16)?;
    let mut buf = [0u8; 4];
    assert!(matches!(boundary.read(5, 0, &mut buf), Err(LatticeError::InvalidArgument(_))));
    assert!(matches!(boundary.write(3, 14, &buf), Err(LatticeError::CapacityExceeded(_))));
    assert_eq!(boundary.version(), 0);
    Ok(())
}

#[test]
fn test_exchange_returns_previous_value() -> Result<()> {
    let boundary = KissingBoundary::new(0, 1, 64)?;
    assert_eq!(boundary.exchange_u64(0, 8, 42)?, 0);
    assert_eq!(boundary.exchange_u64(1, 8, 7)?, 42);
    assert_eq!(boundary.exchange_u32(1, 0, 9)?, 0);

    let mut old = [0u8; 3];
    assert!(boundary.exchange(0, 0, &[1, 2, 3], &mut old).is_err());
    assert_eq!(boundary.version(), 3);
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writer() -> Result<()> {
    let boundary = KissingBoundary::new(0, 1, 256)?;
    let done = AtomicBool::new(false);
    const WRITES: u64 = 2_000;

    let reads = thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut n = 0u64;
                    let mut buf = [0u8; 8];
                    let mut last = 0u32;
                    while !done.load(Ordering::Acquire) {
                        boundary.read(1, 0, &mut buf).unwrap();
                        let v = boundary.version();
                        assert!(v >= last);
                        last = v;
                        n += 1;
                        thread::yield_now();
                    }
                    n
                })
            })
            .collect();

        for i in 1..=WRITES {
            boundary.write(0, 0, &i.to_ne_bytes()).unwrap();
        }
        done.store(true, Ordering::Release);
        readers.into_iter().map(|h| h.join().unwrap()).sum::<u64>()
    });

    let stats = boundary.stats();
    assert_eq!(stats.version, WRITES as u32);
    assert_eq!(stats.writes_a, WRITES);
    assert_eq!(stats.reads_b, reads);
    assert_eq!(stats.total_accesses, WRITES + reads);
    assert!(stats.version_conflicts <= reads);

    let mut buf = [0u8; 8];
    boundary.read(0, 0, &mut buf)?;
    assert_eq!(u64::from_ne_bytes(buf), WRITES);
    Ok(())
}

#[test]
fn test_cached_version_tracks_invalidation() -> Result<()> {
    let boundary = KissingBoundary::new(0, 1, 32)?;
    let cached = boundary.version();
    assert!(boundary.check_version(cached));
    boundary.invalidate();
    assert!(!boundary.check_version(cached));
    assert_eq!(boundary.stats().cache_invalidations, 1);

    boundary.reset_stats();
    assert_eq!(boundary.stats().cache_invalidations, 0);
    assert_eq!(boundary.version(), 1);
    Ok(())
}

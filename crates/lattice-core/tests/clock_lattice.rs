//! Integration tests for the clock-lattice coordinate map

use lattice_core::clock::{id_to_position, map_thread_to_memory, neighbours_of, organise, position_to_id, validate};
use lattice_core::Result;
use proptest::prelude::*;

#[test]
fn test_ring_boundaries() -> Result<()> {
    let cases = [(0, 0, 0), (12, 1, 0), (71, 1, 59), (72, 2, 0), (131, 2, 59), (132, 3, 0), (232, 4, 0), (331, 4, 99)];
    for (id, ring, position) in cases {
        let pos = id_to_position(id, 12)?;
        assert_eq!((pos.ring, pos.position), (ring, position), "id {id}");
    }
    Ok(())
}

#[test]
fn test_neighbours_of_origin() -> Result<()> {
    // -3..+3 on ring 0, then ring 1 position 0
    assert_eq!(neighbours_of(0, 12)?, vec![9, 10, 11, 1, 2, 3, 12]);
    Ok(())
}

#[test]
fn test_neighbours_include_inner_and_outer_rings() -> Result<()> {
    let n = neighbours_of(75, 12)?;
    assert_eq!(n.len(), 8);
    let inner = id_to_position(n[6], 12)?;
    let outer = id_to_position(n[7], 12)?;
    assert_eq!((inner.ring, inner.position), (1, 3));
    assert_eq!((outer.ring, outer.position), (3, 3));
    Ok(())
}

#[test]
fn test_organise_then_validate() -> Result<()> {
    let positions = organise(500, 12)?;
    assert!(validate(&positions, 12));

    let mut shuffled = positions.clone();
    shuffled.swap(3, 4);
    assert!(!validate(&shuffled, 12));
    assert!(!validate(&[], 12));
    assert!(organise(0, 12).is_err());
    Ok(())
}

#[test]
fn test_invalid_base_is_rejected() {
    assert!(id_to_position(5, 1).is_err());
    assert!(neighbours_of(5, 0).is_err());
}

#[test]
fn test_thread_slots_do_not_overlap() -> Result<()> {
    let total = 1 << 20;
    let a = map_thread_to_memory(0, 1, total)?;
    let b = map_thread_to_memory(1, 1, total)?;
    assert_eq!(a.ring, 1);
    assert!(a.memory_offset + a.segment_size <= b.memory_offset);
    assert!(b.memory_offset + b.segment_size <= total);
    assert!(map_thread_to_memory(0, 3, 10).is_err());
    Ok(())
}

proptest! {
    #[test]
    fn prop_id_position_round_trip(id in 0u64..10_000_000, base in 2u32..64) {
        let pos = id_to_position(id, base).unwrap();
        prop_assert!(pos.in_range());
        prop_assert_eq!(position_to_id(&pos, base).unwrap(), id);
    }

    #[test]
    fn prop_radius_grows_with_ring(id in 0u64..100_000) {
        let pos = id_to_position(id, 12).unwrap();
        prop_assert!((pos.radius - 0.25 * (f64::from(pos.ring) + 1.0)).abs() < 1e-12);
        prop_assert!(pos.angle >= 0.0 && pos.angle < std::f64::consts::TAU);
    }

    #[test]
    fn prop_neighbours_are_bounded(id in 0u64..100_000) {
        let n = neighbours_of(id, 12).unwrap();
        prop_assert!(n.len() <= 12);
        prop_assert!(n.len() >= 7);
    }
}

//! Splitting scalar work across participants.

use crate::error::{LatticeError, Result};
use std::ops::Range;

/// Split `total` units over `n` participants; the first `total % n` get one
/// extra unit so the shares sum to `total` and differ by at most one.
pub fn distribute(total: u64, n: usize) -> Result<Vec<u64>> {
    if n == 0 {
        return Err(LatticeError::invalid_argument("cannot distribute work over zero participants"));
    }
    let n64 = n as u64;
    let base = total / n64;
    let remainder = total % n64;
    Ok((0..n64).map(|i| base + u64::from(i < remainder)).collect())
}

/// Contiguous half-open ranges covering `0..total`, sized by [`distribute`].
pub fn work_ranges(total: u64, n: usize) -> Result<Vec<Range<u64>>> {
    let shares = distribute(total, n)?;
    let mut start = 0;
    Ok(shares
        .into_iter()
        .map(|share| {
            let range = start..start + share;
            start += share;
            range
        })
        .collect())
}

/// Per-participant imbalance signal: `round(|load_i - mean| * 1000)`.
///
/// This is a delta magnitude, not a redistribution; it does not preserve
/// any total.
pub fn balance_by_load(loads: &[f64]) -> Result<Vec<u64>> {
    if loads.is_empty() {
        return Err(LatticeError::invalid_argument("load vector is empty"));
    }
    let mean = loads.iter().sum::<f64>() / loads.len() as f64;
    Ok(loads.iter().map(|load| ((load - mean).abs() * 1000.0).round() as u64).collect())
}

/// Index of the smallest load (first on ties).
pub fn least_loaded(loads: &[f64]) -> Option<usize> {
    loads
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &load)| match best {
            Some((_, b)) if b <= load => best,
            _ => Some((i, load)),
        })
        .map(|(i, _)| i)
}

/// Index of the largest load (first on ties).
pub fn most_loaded(loads: &[f64]) -> Option<usize> {
    loads
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &load)| match best {
            Some((_, b)) if b >= load => best,
            _ => Some((i, load)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_goes_to_the_front() {
        assert_eq!(distribute(10, 3).unwrap(), vec![4, 3, 3]);
        assert_eq!(distribute(2, 4).unwrap(), vec![1, 1, 0, 0]);
        assert_eq!(distribute(0, 2).unwrap(), vec![0, 0]);
        assert!(distribute(5, 0).is_err());
    }

    #[test]
    fn ranges_are_contiguous() {
        let ranges = work_ranges(10, 3).unwrap();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn balance_rounds_distance_from_mean() {
        // mean = 0.5
        assert_eq!(balance_by_load(&[0.2, 0.8, 0.5]).unwrap(), vec![300, 300, 0]);
        assert_eq!(balance_by_load(&[1.0, 1.0]).unwrap(), vec![0, 0]);
        // 1.75 rounds to 2 where truncation would give 1
        assert_eq!(balance_by_load(&[0.0, 0.0035]).unwrap(), vec![2, 2]);
        assert!(balance_by_load(&[]).is_err());
    }

    #[test]
    fn extremes_pick_first_on_ties() {
        let loads = [0.4, 0.1, 0.9, 0.1, 0.9];
        assert_eq!(least_loaded(&loads), Some(1));
        assert_eq!(most_loaded(&loads), Some(2));
        assert_eq!(least_loaded(&[]), None);
    }
}

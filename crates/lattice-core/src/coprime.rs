//! Coprime admission rule.
//!
//! Two ids may talk when `gcd(a + 1, b + 1) == 1`. The shift lets id 0
//! take part; an id is always allowed to talk to itself.
//!
//! Blocks additionally keep a matrix over their dimensions, where dimension
//! `i` is tagged with the `i mod 40`-th prime (see [`DIMENSION_PRIMES`]).

use crate::constants::DIMENSION_PRIMES;
use num_integer::Integer;
use serde::{Deserialize, Serialize};

/// `gcd(a + 1, b + 1) == 1`, with `a == b` forced true.
pub fn coprime(a: u64, b: u64) -> bool {
    if a == b {
        return true;
    }
    (u128::from(a) + 1).gcd(&(u128::from(b) + 1)) == 1
}

/// Prime tag of dimension `index`.
pub fn dimension_prime(index: usize) -> u64 {
    DIMENSION_PRIMES[index % DIMENSION_PRIMES.len()]
}

/// Whether dimensions `i` and `j` carry coprime prime tags. Distinct
/// dimensions only collide when they share a tag (`i ≡ j mod 40`).
pub fn dimensions_coprime(i: usize, j: usize) -> bool {
    i == j || dimension_prime(i).gcd(&dimension_prime(j)) == 1
}

/// Entry rule of a [`CoprimeMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixRule {
    /// [`coprime`] over ids.
    Ids,
    /// [`dimensions_coprime`] over dimension indices.
    Dimensions,
}

impl MatrixRule {
    fn cell(self, i: usize, j: usize) -> bool {
        match self {
            MatrixRule::Ids => coprime(i as u64, j as u64),
            MatrixRule::Dimensions => dimensions_coprime(i, j),
        }
    }
}

/// Symmetric boolean matrix over `0..n` with a true diagonal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoprimeMatrix {
    n: usize,
    rule: MatrixRule,
    cells: Vec<bool>,
}

impl CoprimeMatrix {
    /// [`coprime`] over ids `0..n`.
    pub fn new(n: usize) -> Self {
        Self::with_rule(n, MatrixRule::Ids)
    }

    /// Prime-tag matrix over dimensions `0..n`, as kept by a block.
    pub fn for_dimensions(n: usize) -> Self {
        Self::with_rule(n, MatrixRule::Dimensions)
    }

    pub fn with_rule(n: usize, rule: MatrixRule) -> Self {
        let mut cells = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                cells.push(rule.cell(i, j));
            }
        }
        Self { n, rule, cells }
    }

    pub fn rule(&self) -> MatrixRule {
        self.rule
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Entry `(i, j)`; `None` outside the matrix.
    pub fn get(&self, i: usize, j: usize) -> Option<bool> {
        (i < self.n && j < self.n).then(|| self.cells[i * self.n + j])
    }

    /// Grow to `new_n × new_n`. Existing entries keep their values; shrinking
    /// is a no-op.
    pub fn extend(&mut self, new_n: usize) {
        if new_n <= self.n {
            return;
        }
        let mut cells = Vec::with_capacity(new_n * new_n);
        for i in 0..new_n {
            for j in 0..new_n {
                let cell = if i < self.n && j < self.n {
                    self.cells[i * self.n + j]
                } else {
                    self.rule.cell(i, j)
                };
                cells.push(cell);
            }
        }
        self.n = new_n;
        self.cells = cells;
    }

    /// Row-major view of the cells.
    pub fn as_slice(&self) -> &[bool] {
        &self.cells
    }

    /// Symmetric with a true diagonal.
    pub fn is_well_formed(&self) -> bool {
        let at = |i: usize, j: usize| self.cells[i * self.n + j];
        (0..self.n).all(|i| at(i, i) && (0..i).all(|j| at(i, j) == at(j, i)))
    }
}

/// `n × n` coprime matrix over ids `0..n`.
pub fn coprime_matrix(n: usize) -> CoprimeMatrix {
    CoprimeMatrix::new(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_gcd_rule() {
        assert!(coprime(0, 1));
        assert!(!coprime(1, 3));
        assert!(coprime(0, u64::MAX));
        assert!(coprime(7, 7));
        assert!(!coprime(5, 11));
    }

    #[test]
    fn matrix_extension_preserves_upper_left_block() {
        let mut m = coprime_matrix(13);
        let before = m.clone();
        m.extend(20);
        assert_eq!(m.size(), 20);
        for i in 0..13 {
            for j in 0..13 {
                assert_eq!(m.get(i, j), before.get(i, j));
            }
        }
        assert!(m.is_well_formed());
        assert_eq!(m.get(20, 0), None);

        m.extend(5);
        assert_eq!(m.size(), 20);
    }

    #[test]
    fn dimension_matrix_uses_prime_tags() {
        let m = CoprimeMatrix::for_dimensions(52);
        assert_eq!(m.rule(), MatrixRule::Dimensions);
        assert!(m.is_well_formed());
        // distinct primes are always coprime
        assert_eq!(m.get(4, 9), Some(true));
        assert_eq!(m.get(0, 39), Some(true));
        // 0 and 40 share the tag 2
        assert_eq!(m.get(0, 40), Some(false));
        assert_eq!(m.get(11, 51), Some(false));
        assert_eq!(m.get(40, 40), Some(true));
    }

    #[test]
    fn dimension_matrix_extends_with_its_own_rule() {
        let mut m = CoprimeMatrix::for_dimensions(13);
        m.extend(45);
        assert_eq!(m, CoprimeMatrix::for_dimensions(45));
        assert_ne!(m, CoprimeMatrix::new(45));
    }
}

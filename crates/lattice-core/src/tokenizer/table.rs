//! Open-addressing index from token to global id.

use super::djb2;
use crate::constants::CONSOLIDATED_TABLE_SIZE;
use crate::error::{LatticeError, Result};

/// Fixed-size, linearly probed table of global ids. Token text lives in the
/// global vocabulary; slots only hold ids into it.
#[derive(Debug, Clone)]
pub struct ConsolidatedTable {
    slots: Box<[Option<u32>]>,
    len: usize,
}

impl Default for ConsolidatedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidatedTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; CONSOLIDATED_TABLE_SIZE].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Global id of `token`, resolving candidate ids through `vocab`.
    pub fn get(&self, token: &str, vocab: &[String]) -> Option<u32> {
        match self.probe(token, vocab) {
            Probe::Found(id) => Some(id),
            Probe::Vacant(_) | Probe::Full => None,
        }
    }

    /// Return the id already stored for `token`, or store `id` for it.
    ///
    /// `vocab[id]` must already hold `token` when the slot is vacant.
    pub fn get_or_insert(&mut self, token: &str, id: u32, vocab: &[String]) -> Result<(u32, bool)> {
        match self.probe(token, vocab) {
            Probe::Found(existing) => Ok((existing, false)),
            Probe::Vacant(slot) => {
                self.slots[slot] = Some(id);
                self.len += 1;
                Ok((id, true))
            }
            Probe::Full => Err(LatticeError::CapacityExceeded(format!(
                "consolidated table is full ({} slots)",
                self.slots.len()
            ))),
        }
    }

    fn probe(&self, token: &str, vocab: &[String]) -> Probe {
        let size = self.slots.len();
        let start = (djb2(token) % size as u64) as usize;
        for step in 0..size {
            let slot = (start + step) % size;
            match self.slots[slot] {
                None => return Probe::Vacant(slot),
                Some(id) if vocab.get(id as usize).is_some_and(|t| t == token) => return Probe::Found(id),
                Some(_) => {}
            }
        }
        Probe::Full
    }
}

enum Probe {
    Found(u32),
    Vacant(usize),
    Full,
}

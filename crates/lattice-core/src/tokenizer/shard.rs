//! One vocabulary partition.

/// Distinct tokens of one partition with their occurrence counts.
///
/// Slots are append-only: a token keeps its slot for the shard's lifetime.
#[derive(Debug, Clone, Default)]
pub struct VocabShard {
    tokens: Vec<String>,
    counts: Vec<u32>,
    capacity: usize,
}

impl VocabShard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::new(),
            counts: Vec::new(),
            capacity,
        }
    }

    /// Count one occurrence of `token`. Returns its slot, or `None` when the
    /// token is new and the shard is full.
    pub fn insert(&mut self, token: &str) -> Option<usize> {
        if let Some(slot) = self.tokens.iter().position(|t| t == token) {
            self.counts[slot] = self.counts[slot].saturating_add(1);
            return Some(slot);
        }
        if self.tokens.len() >= self.capacity {
            return None;
        }
        self.tokens.push(token.to_owned());
        self.counts.push(1);
        Some(self.tokens.len() - 1)
    }

    pub fn slot_of(&self, token: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    pub fn count(&self, slot: usize) -> Option<u32> {
        self.counts.get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(token, count)` in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.tokens.iter().map(String::as_str).zip(self.counts.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tokens_share_a_slot() {
        let mut shard = VocabShard::with_capacity(4);
        assert_eq!(shard.insert("a"), Some(0));
        assert_eq!(shard.insert("b"), Some(1));
        assert_eq!(shard.insert("a"), Some(0));
        assert_eq!(shard.count(0), Some(2));
        assert_eq!(shard.slot_of("b"), Some(1));
    }

    #[test]
    fn full_shard_still_counts_known_tokens() {
        let mut shard = VocabShard::with_capacity(1);
        assert_eq!(shard.insert("x"), Some(0));
        assert_eq!(shard.insert("y"), None);
        assert_eq!(shard.insert("x"), Some(0));
        assert_eq!(shard.entries().collect::<Vec<_>>(), vec![("x", 2)]);
    }
}

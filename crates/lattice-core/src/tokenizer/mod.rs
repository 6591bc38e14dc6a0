//! Twelve-way partitioned vocabulary with one-shot consolidation.
//!
//! ```text
//!   add(token) ──djb2 % 12──► shard[p] (own mutex)
//!                                │
//!   consolidate() ◄──────────────┘  shards 0..11 in order
//!        │
//!        ▼
//!   global vocab (<PAD> <UNK> <BOS> <EOS> <MASK> ...) + ConsolidatedTable
//! ```
//!
//! Adds to different partitions never share a lock. Lookups after
//! consolidation go through the retained table; before it, they scan the
//! global vocabulary.

mod shard;
mod table;

pub use shard::VocabShard;
pub use table::ConsolidatedTable;

use crate::config::TokenizerConfig;
use crate::constants::{
    BOS_ID, DJB2_INIT, DJB2_MULTIPLIER, ENCODE_GROWTH_FACTOR, ENCODE_INITIAL_CAPACITY, EOS_ID, MASK_ID,
    NUM_PARTITIONS, PAD_ID, PARTITION_SLACK, RESERVED_TOKENS, UNK_ID,
};
use crate::error::{LatticeError, Result};
use lattice_tracing::performance::record_throughput;
use lattice_tracing::{perf_span, timed_block};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Classical djb2: `hash = hash * 33 + byte`, starting at 5381.
pub fn djb2(token: &str) -> u64 {
    token
        .bytes()
        .fold(DJB2_INIT, |hash, byte| hash.wrapping_mul(DJB2_MULTIPLIER).wrapping_add(u64::from(byte)))
}

/// Shard that owns `token`.
pub fn partition_of(token: &str) -> usize {
    (djb2(token) % NUM_PARTITIONS as u64) as usize
}

/// Lifecycle of a [`PartitionedTokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenizerPhase {
    Empty,
    BuildingShards,
    Consolidated,
}

/// Where an added token landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenSlot {
    pub partition: usize,
    pub slot: usize,
}

struct GlobalVocab {
    tokens: Vec<String>,
    counts: Vec<u32>,
    table: Option<ConsolidatedTable>,
}

impl GlobalVocab {
    fn reserved() -> Self {
        Self {
            tokens: RESERVED_TOKENS.iter().map(|t| (*t).to_owned()).collect(),
            counts: vec![0; RESERVED_TOKENS.len()],
            table: None,
        }
    }

    fn lookup(&self, token: &str) -> u32 {
        let found = match &self.table {
            Some(table) => table.get(token, &self.tokens),
            None => self.tokens.iter().position(|t| t == token).map(|i| i as u32),
        };
        found.unwrap_or(UNK_ID)
    }
}

/// Vocabulary split into twelve independently locked shards.
pub struct PartitionedTokenizer {
    shards: Vec<Mutex<VocabShard>>,
    shard_capacity: usize,
    global: RwLock<GlobalVocab>,
    consolidated: AtomicBool,
}

impl PartitionedTokenizer {
    /// Tokenizer whose shards each hold `max_vocab_size / 12 + 10000` tokens.
    pub fn new(max_vocab_size: usize) -> Self {
        Self::with_config(&TokenizerConfig::new(max_vocab_size))
    }

    pub fn with_config(config: &TokenizerConfig) -> Self {
        let shard_capacity = config.max_vocab_size / NUM_PARTITIONS + PARTITION_SLACK;
        tracing::debug!(max_vocab_size = config.max_vocab_size, shard_capacity, "created partitioned tokenizer");
        Self {
            shards: (0..NUM_PARTITIONS)
                .map(|_| Mutex::new(VocabShard::with_capacity(shard_capacity)))
                .collect(),
            shard_capacity,
            global: RwLock::new(GlobalVocab::reserved()),
            consolidated: AtomicBool::new(false),
        }
    }

    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    pub fn is_consolidated(&self) -> bool {
        self.consolidated.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> TokenizerPhase {
        if self.is_consolidated() {
            TokenizerPhase::Consolidated
        } else if self.shards.iter().all(|s| s.lock().is_empty()) {
            TokenizerPhase::Empty
        } else {
            TokenizerPhase::BuildingShards
        }
    }

    /// Count one occurrence of `token` in its partition.
    ///
    /// Adding after consolidation is allowed: it drops the lookup table and
    /// the tokenizer returns to [`TokenizerPhase::BuildingShards`] until the
    /// next [`Self::consolidate`].
    ///
    /// # Errors
    ///
    /// - [`LatticeError::InvalidArgument`] for an empty token
    /// - [`LatticeError::CapacityExceeded`] when the token is new and its shard is full
    pub fn try_add(&self, token: &str) -> Result<TokenSlot> {
        if token.is_empty() {
            return Err(LatticeError::invalid_argument("cannot add an empty token"));
        }
        let partition = partition_of(token);
        // Shared hold: `consolidate` cannot run between the insert and the flag check.
        let (slot, stale) = {
            let _global = self.global.read();
            let slot = self.shards[partition].lock().insert(token).ok_or_else(|| {
                LatticeError::CapacityExceeded(format!(
                    "partition {partition} is full ({} tokens)",
                    self.shard_capacity
                ))
            })?;
            (slot, self.consolidated.load(Ordering::Acquire))
        };

        if stale {
            let mut global = self.global.write();
            if self.consolidated.swap(false, Ordering::AcqRel) {
                global.table = None;
                tracing::debug!("add after consolidation; lookup table invalidated");
            }
        }
        Ok(TokenSlot { partition, slot })
    }

    /// [`Self::try_add`] returning the slot within the partition, or
    /// `<UNK>` if the token could not be stored.
    pub fn add(&self, token: &str) -> u32 {
        match self.try_add(token) {
            Ok(TokenSlot { slot, .. }) => slot as u32,
            Err(err) => {
                tracing::warn!(token, error = %err, "token not added");
                UNK_ID
            }
        }
    }

    /// Split `text` on ASCII whitespace, lowercase and add every token.
    pub fn build_vocab(&self, text: &str) {
        for word in text.split_ascii_whitespace() {
            self.add(&word.to_lowercase());
        }
    }

    /// [`Self::build_vocab`] over many documents on the rayon pool.
    pub fn build_vocab_parallel<S>(&self, documents: &[S])
    where
        S: AsRef<str> + Sync,
    {
        let ((), duration_us) = timed_block!("build_vocab_parallel", {
            documents.par_iter().for_each(|doc| self.build_vocab(doc.as_ref()));
        });
        record_throughput("build_vocab_parallel", documents.len(), duration_us);
    }

    /// Merge shards 0..11 into the global vocabulary and build the lookup
    /// table. Reserved tokens keep ids 0..5; a shard token equal to a
    /// reserved token adds its count to the reserved entry.
    ///
    /// A second call without intervening adds changes nothing.
    pub fn consolidate(&self) -> Result<()> {
        let mut global = self.global.write();
        if self.consolidated.load(Ordering::Acquire) && global.table.is_some() {
            tracing::debug!("tokenizer already consolidated");
            return Ok(());
        }

        let _span = perf_span!("consolidate", partitions = NUM_PARTITIONS);
        let mut fresh = GlobalVocab::reserved();
        let mut table = ConsolidatedTable::new();
        for (id, token) in RESERVED_TOKENS.iter().enumerate() {
            table.get_or_insert(token, id as u32, &fresh.tokens)?;
        }

        for shard in &self.shards {
            let shard = shard.lock();
            for (token, count) in shard.entries() {
                let next = fresh.tokens.len() as u32;
                fresh.tokens.push(token.to_owned());
                let (id, inserted) = table.get_or_insert(token, next, &fresh.tokens)?;
                if inserted {
                    fresh.counts.push(count);
                } else {
                    fresh.tokens.pop();
                    let slot = &mut fresh.counts[id as usize];
                    *slot = slot.saturating_add(count);
                }
            }
        }

        fresh.table = Some(table);
        *global = fresh;
        self.consolidated.store(true, Ordering::Release);
        tracing::info!(vocab_size = global.tokens.len(), "tokenizer consolidated");
        Ok(())
    }

    /// Global id of `token`, or `<UNK>`. Never mutates.
    pub fn lookup(&self, token: &str) -> u32 {
        self.global.read().lookup(token)
    }

    /// Lowercased whitespace-separated tokens mapped through [`Self::lookup`].
    ///
    /// The output buffer starts at 16 ids and triples when full.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let global = self.global.read();
        let mut capacity = ENCODE_INITIAL_CAPACITY;
        let mut ids = Vec::with_capacity(capacity);
        for word in text.split_ascii_whitespace() {
            if ids.len() == capacity {
                capacity *= ENCODE_GROWTH_FACTOR;
                ids.reserve_exact(capacity - ids.len());
            }
            ids.push(global.lookup(&word.to_lowercase()));
        }
        ids
    }

    /// [`Self::encode`] framed by `<BOS>` and `<EOS>`.
    pub fn encode_with_special(&self, text: &str) -> Vec<u32> {
        let body = self.encode(text);
        let mut ids = Vec::with_capacity(body.len() + 2);
        ids.push(BOS_ID);
        ids.extend(body);
        ids.push(EOS_ID);
        ids
    }

    /// Join tokens with single spaces. `<PAD>`, `<BOS>`, `<EOS>` and `<MASK>`
    /// are skipped; `<UNK>` and unknown ids render as `<UNK>`.
    pub fn decode(&self, ids: &[u32]) -> String {
        let global = self.global.read();
        let unk = RESERVED_TOKENS[UNK_ID as usize];
        ids.iter()
            .filter(|id| !matches!(**id, PAD_ID | BOS_ID | EOS_ID | MASK_ID))
            .map(|&id| global.tokens.get(id as usize).map_or(unk, String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn token_str(&self, id: u32) -> Option<String> {
        self.global.read().tokens.get(id as usize).cloned()
    }

    /// Consolidated count of global id `id`.
    pub fn token_count(&self, id: u32) -> Option<u32> {
        self.global.read().counts.get(id as usize).copied()
    }

    /// Size of the global vocabulary, reserved tokens included.
    pub fn vocab_size(&self) -> usize {
        self.global.read().tokens.len()
    }

    /// Distinct tokens per partition.
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.lock().len()).collect()
    }

    /// The `k` most frequent non-reserved tokens, by descending count then id.
    pub fn top_tokens(&self, k: usize) -> Vec<(String, u32)> {
        let global = self.global.read();
        let mut ranked: Vec<usize> = (RESERVED_TOKENS.len()..global.tokens.len()).collect();
        ranked.sort_by(|&a, &b| global.counts[b].cmp(&global.counts[a]).then(a.cmp(&b)));
        ranked
            .into_iter()
            .take(k)
            .map(|i| (global.tokens[i].clone(), global.counts[i]))
            .collect()
    }
}

impl Default for PartitionedTokenizer {
    fn default() -> Self {
        Self::with_config(&TokenizerConfig::default())
    }
}

impl std::fmt::Debug for PartitionedTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedTokenizer")
            .field("shard_capacity", &self.shard_capacity)
            .field("phase", &self.phase())
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

//! Runtime configuration for blocks and tokenizers.
//!
//! Both configs start from [`Default`], can be overridden from the
//! environment (`LATTICE_BLOCK_*`, `LATTICE_TOKENIZER_*`) and round-trip
//! through JSON. Environment values that fail to parse are ignored with a
//! warning so a typo never prevents start-up.

use crate::constants::{CACHE_LINE_SIZE, MIN_DIMENSIONS, MIN_SEGMENTS, SYMMETRY_ORDER};
use crate::error::{LatticeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

pub const ENV_BLOCK_TOTAL_SIZE: &str = "LATTICE_BLOCK_TOTAL_SIZE";
pub const ENV_BLOCK_SEGMENTS: &str = "LATTICE_BLOCK_SEGMENTS";
pub const ENV_BLOCK_DIMENSIONS: &str = "LATTICE_BLOCK_DIMENSIONS";
pub const ENV_BLOCK_OWNER: &str = "LATTICE_BLOCK_OWNER";
pub const ENV_BLOCK_LEVEL: &str = "LATTICE_BLOCK_LEVEL";
pub const ENV_BLOCK_SEGMENT_GROWTH: &str = "LATTICE_BLOCK_SEGMENT_GROWTH";
pub const ENV_BLOCK_DIMENSION_GROWTH: &str = "LATTICE_BLOCK_DIMENSION_GROWTH";
pub const ENV_BLOCK_NUMA_NODES: &str = "LATTICE_BLOCK_NUMA_NODES";
pub const ENV_BLOCK_LOCK_MEMORY: &str = "LATTICE_BLOCK_LOCK_MEMORY";
pub const ENV_TOKENIZER_MAX_VOCAB: &str = "LATTICE_TOKENIZER_MAX_VOCAB";

/// Parameters of a [`crate::memory::HierarchicalMemoryBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Bytes of the initial arena, split evenly across the initial segments.
    pub total_size: usize,
    /// Initial segment count; at least 12 and a multiple of 12.
    pub initial_segments: usize,
    /// Initial dimensionality of segment positions; at least 13.
    pub initial_dimensions: usize,
    pub owner_id: u32,
    pub hierarchy_level: u32,
    /// `max_segments = initial_segments * segment_growth_limit`.
    pub segment_growth_limit: usize,
    /// `max_dimensions = initial_dimensions * dimension_growth_limit`.
    pub dimension_growth_limit: usize,
    /// Advisory NUMA node count; segment `i` is tagged with node `i % numa_nodes`.
    pub numa_nodes: u32,
    /// Try to `mlock` arenas. Failure to lock is logged and otherwise ignored.
    pub lock_memory: bool,
    /// Accesses per segment above which more segments are advised.
    pub access_pressure_per_segment: u64,
    /// Boundaries per segment above which more dimensions are advised.
    pub boundary_pressure_per_segment: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            total_size: 1 << 20,
            initial_segments: MIN_SEGMENTS,
            initial_dimensions: MIN_DIMENSIONS,
            owner_id: 0,
            hierarchy_level: 0,
            segment_growth_limit: 8,
            dimension_growth_limit: 4,
            numa_nodes: 2,
            lock_memory: false,
            access_pressure_per_segment: 10_000,
            boundary_pressure_per_segment: 2,
        }
    }
}

impl BlockConfig {
    /// Config with the three structural sizes set and defaults elsewhere.
    pub fn new(total_size: usize, initial_segments: usize, initial_dimensions: usize) -> Self {
        Self {
            total_size,
            initial_segments,
            initial_dimensions,
            ..Self::default()
        }
    }

    /// Set owner and hierarchy level.
    pub fn with_owner(mut self, owner_id: u32, hierarchy_level: u32) -> Self {
        self.owner_id = owner_id;
        self.hierarchy_level = hierarchy_level;
        self
    }

    pub fn max_segments(&self) -> usize {
        self.initial_segments.saturating_mul(self.segment_growth_limit)
    }

    pub fn max_dimensions(&self) -> usize {
        self.initial_dimensions.saturating_mul(self.dimension_growth_limit)
    }

    /// Per-segment byte size: an even share of `total_size`, rounded down to
    /// a whole number of cache lines.
    pub fn segment_size(&self) -> usize {
        match self.initial_segments {
            0 => 0,
            n => (self.total_size / n) / CACHE_LINE_SIZE * CACHE_LINE_SIZE,
        }
    }

    /// Check the structural minima.
    ///
    /// # Errors
    ///
    /// Size and minima violations are [`LatticeError::Resource`], matching
    /// the failure a block constructor reports for them.
    pub fn validate(&self) -> Result<()> {
        if self.initial_segments < MIN_SEGMENTS || self.initial_segments % SYMMETRY_ORDER != 0 {
            return Err(LatticeError::resource(format!(
                "initial_segments must be a multiple of {SYMMETRY_ORDER} and at least {MIN_SEGMENTS}, got {}",
                self.initial_segments
            )));
        }
        if self.initial_dimensions < MIN_DIMENSIONS {
            return Err(LatticeError::resource(format!(
                "initial_dimensions must be at least {MIN_DIMENSIONS}, got {}",
                self.initial_dimensions
            )));
        }
        if self.segment_size() == 0 {
            return Err(LatticeError::resource(format!(
                "total_size {} leaves less than {CACHE_LINE_SIZE} bytes per segment across {} segments",
                self.total_size, self.initial_segments
            )));
        }
        if self.segment_growth_limit == 0 || self.dimension_growth_limit == 0 {
            return Err(LatticeError::invalid_argument("growth limits must be at least 1"));
        }
        if self.numa_nodes == 0 {
            return Err(LatticeError::invalid_argument("numa_nodes must be at least 1"));
        }
        Ok(())
    }

    /// Defaults overridden by any `LATTICE_BLOCK_*` variables that are set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_from_env(ENV_BLOCK_TOTAL_SIZE, &mut config.total_size);
        override_from_env(ENV_BLOCK_SEGMENTS, &mut config.initial_segments);
        override_from_env(ENV_BLOCK_DIMENSIONS, &mut config.initial_dimensions);
        override_from_env(ENV_BLOCK_OWNER, &mut config.owner_id);
        override_from_env(ENV_BLOCK_LEVEL, &mut config.hierarchy_level);
        override_from_env(ENV_BLOCK_SEGMENT_GROWTH, &mut config.segment_growth_limit);
        override_from_env(ENV_BLOCK_DIMENSION_GROWTH, &mut config.dimension_growth_limit);
        override_from_env(ENV_BLOCK_NUMA_NODES, &mut config.numa_nodes);
        override_from_env(ENV_BLOCK_LOCK_MEMORY, &mut config.lock_memory);
        config
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LatticeError::invalid_argument(format!("block config: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LatticeError::invalid_argument(format!("block config: {e}")))
    }
}

/// Parameters of a [`crate::tokenizer::PartitionedTokenizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Target vocabulary size; each shard holds `max_vocab_size / 12 + 10000`.
    pub max_vocab_size: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { max_vocab_size: 50_000 }
    }
}

impl TokenizerConfig {
    pub fn new(max_vocab_size: usize) -> Self {
        Self { max_vocab_size }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_from_env(ENV_TOKENIZER_MAX_VOCAB, &mut config.max_vocab_size);
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LatticeError::invalid_argument(format!("tokenizer config: {e}")))
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    let Ok(raw) = env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const BLOCK_KEYS: &[&str] = &[
        ENV_BLOCK_TOTAL_SIZE,
        ENV_BLOCK_SEGMENTS,
        ENV_BLOCK_DIMENSIONS,
        ENV_BLOCK_OWNER,
        ENV_BLOCK_LEVEL,
        ENV_BLOCK_SEGMENT_GROWTH,
        ENV_BLOCK_DIMENSION_GROWTH,
        ENV_BLOCK_NUMA_NODES,
        ENV_BLOCK_LOCK_MEMORY,
        ENV_TOKENIZER_MAX_VOCAB,
    ];

    fn reset_env() {
        for key in BLOCK_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = BlockConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_segments(), 96);
        assert_eq!(config.max_dimensions(), 52);
        assert_eq!(config.segment_size(), (1 << 20) / 12 / 64 * 64);
    }

    #[test]
    fn minima_are_resource_errors() {
        for config in [
            BlockConfig::new(1 << 20, 11, 13),
            BlockConfig::new(1 << 20, 18, 13),
            BlockConfig::new(1 << 20, 12, 12),
            BlockConfig::new(12 * 63, 12, 13),
        ] {
            assert!(matches!(config.validate(), Err(LatticeError::Resource(_))), "{config:?}");
        }
    }

    #[test]
    #[serial]
    fn from_env_overrides_and_ignores_garbage() {
        reset_env();
        env::set_var(ENV_BLOCK_SEGMENTS, "24");
        env::set_var(ENV_BLOCK_LOCK_MEMORY, "true");
        env::set_var(ENV_BLOCK_DIMENSIONS, "thirteen");
        env::set_var(ENV_TOKENIZER_MAX_VOCAB, "1200");

        let block = BlockConfig::from_env();
        assert_eq!(block.initial_segments, 24);
        assert!(block.lock_memory);
        assert_eq!(block.initial_dimensions, MIN_DIMENSIONS);
        assert_eq!(TokenizerConfig::from_env().max_vocab_size, 1200);
        reset_env();
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = BlockConfig::from_json_str(r#"{"total_size": 4096, "owner_id": 7}"#).unwrap();
        assert_eq!(config.total_size, 4096);
        assert_eq!(config.owner_id, 7);
        assert_eq!(config.initial_segments, MIN_SEGMENTS);

        let json = config.to_json().unwrap();
        assert_eq!(BlockConfig::from_json_str(&json).unwrap(), config);

        assert!(matches!(
            TokenizerConfig::from_json_str("{ nope"),
            Err(LatticeError::InvalidArgument(_))
        ));
    }
}

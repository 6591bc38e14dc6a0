//! Bit-exact constants shared by every component.

// ================================================================================================
// Clock lattice
// ================================================================================================

/// Capacities of the fixed inner rings.
pub const RING_CAPACITIES: [u32; 4] = [12, 60, 60, 100];

/// Capacity of every ring at index 4 and beyond.
pub const EXTENDED_RING_CAPACITY: u32 = 100;

/// Number of ids held by the fixed rings (12 + 60 + 60 + 100).
pub const FIXED_RING_SPAN: u64 = 232;

/// Ids before ring 3; extended rings are counted from here.
pub const RING_THREE_OFFSET: u64 = 132;

/// Radius step between rings.
pub const RADIUS_STEP: f64 = 0.25;

/// Order of the symmetry group tagging segments and partitions.
pub const SYMMETRY_ORDER: usize = 12;

/// Same-ring neighbour offsets, in enumeration order.
pub const NEIGHBOUR_OFFSETS: [i64; 6] = [-3, -2, -1, 1, 2, 3];

/// Upper bound on a neighbour list.
pub const MAX_NEIGHBOURS: usize = 12;

/// Prime tags of block dimensions; dimension `i` uses entry `i mod 40`.
pub const DIMENSION_PRIMES: [u64; 40] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97, 101, 103, 107,
    109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173,
];

// ================================================================================================
// Memory
// ================================================================================================

/// Cache line size for alignment (64 bytes on x86-64/ARM64)
pub const CACHE_LINE_SIZE: usize = 64;

/// Smallest segment count a block may have.
pub const MIN_SEGMENTS: usize = 12;

/// Smallest dimensionality a block may have.
pub const MIN_DIMENSIONS: usize = 13;

// ================================================================================================
// Tokenizer
// ================================================================================================

/// Number of vocabulary shards.
pub const NUM_PARTITIONS: usize = 12;

/// Slack added to every shard on top of `max_vocab / 12`.
pub const PARTITION_SLACK: usize = 10_000;

/// Slot count of the consolidated open-addressing table (2^17).
pub const CONSOLIDATED_TABLE_SIZE: usize = 1 << 17;

pub const DJB2_INIT: u64 = 5381;
pub const DJB2_MULTIPLIER: u64 = 33;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const BOS_ID: u32 = 2;
pub const EOS_ID: u32 = 3;
pub const MASK_ID: u32 = 4;

/// Reserved tokens in id order.
pub const RESERVED_TOKENS: [&str; 5] = ["<PAD>", "<UNK>", "<BOS>", "<EOS>", "<MASK>"];

/// Initial slot count of the encode buffer; grows by [`ENCODE_GROWTH_FACTOR`].
pub const ENCODE_INITIAL_CAPACITY: usize = 16;

pub const ENCODE_GROWTH_FACTOR: usize = 3;

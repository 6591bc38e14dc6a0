//! Named blocks shared between callers.

use crate::error::{LatticeError, Result};
use crate::memory::HierarchicalMemoryBlock;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A shared block. The mutex serialises structural operations on it.
pub type SharedBlock = Arc<Mutex<HierarchicalMemoryBlock>>;

/// Blocks keyed by [`HierarchicalMemoryBlock::block_id`].
///
/// # Example
///
/// ```rust
/// use lattice_core::memory::HierarchicalMemoryBlock;
/// use lattice_core::registry::BlockRegistry;
///
/// let registry = BlockRegistry::new();
/// let block = HierarchicalMemoryBlock::create(1 << 16, 12, 13, 0, 0).unwrap();
/// let id = block.block_id().to_string();
/// registry.register(block).unwrap();
/// assert!(registry.get(&id).is_ok());
/// ```
#[derive(Default)]
pub struct BlockRegistry {
    blocks: RwLock<HashMap<String, SharedBlock>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `block` and return a shared handle to it.
    pub fn register(&self, block: HierarchicalMemoryBlock) -> Result<SharedBlock> {
        let id = block.block_id().to_string();
        let mut blocks = self.blocks.write();
        if blocks.contains_key(&id) {
            return Err(LatticeError::InvalidArgument(format!("block {id} is already registered")));
        }
        let shared = Arc::new(Mutex::new(block));
        blocks.insert(id.clone(), Arc::clone(&shared));
        tracing::debug!(block_id = %id, "registered block");
        Ok(shared)
    }

    pub fn get(&self, id: &str) -> Result<SharedBlock> {
        self.blocks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LatticeError::InvalidArgument(format!("unknown block {id}")))
    }

    /// Unregister and destroy a block. Handles still held elsewhere see a
    /// destroyed block.
    pub fn destroy(&self, id: &str) -> Result<()> {
        let shared = self
            .blocks
            .write()
            .remove(id)
            .ok_or_else(|| LatticeError::InvalidArgument(format!("unknown block {id}")))?;
        shared.lock().destroy();
        tracing::debug!(block_id = %id, "destroyed registered block");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.blocks.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry").field("ids", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_leaves_outstanding_handles_destroyed() {
        let registry = BlockRegistry::new();
        let block = HierarchicalMemoryBlock::create(12 * 256, 12, 13, 0, 0).unwrap();
        let id = block.block_id().to_string();
        let handle = registry.register(block).unwrap();

        registry.destroy(&id).unwrap();
        assert!(handle.lock().is_destroyed());
        assert!(registry.is_empty());
        assert!(registry.destroy(&id).is_err());
        assert!(registry.get(&id).is_err());
    }
}

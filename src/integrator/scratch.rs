use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap as HashMap;

use crate::grid::index::origin_from_block_index;
use crate::grid::{Block, BlockIndex, Layer};

/// Thread-safe map of freshly allocated blocks for regions the live grid has
/// not allocated yet. A single mutex serializes growth of the map; voxel
/// writes inside an already-created scratch block stay on the stripe locks,
/// so the hot path only pays this lock on a block miss.
pub struct ScratchBlocks<V> {
    blocks: Mutex<HashMap<BlockIndex, Arc<Block<V>>>>,
}

impl<V> ScratchBlocks<V> {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::default()),
        }
    }

    #[inline]
    fn map_lock(&self) -> MutexGuard<'_, HashMap<BlockIndex, Arc<Block<V>>>> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.map_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_lock().is_empty()
    }
}

impl<V: Default> ScratchBlocks<V> {
    /// Returns the scratch block for `block_index`, creating a zeroed block
    /// with the right origin on first request.
    pub fn get_or_create(&self, block_index: BlockIndex, layer: &Layer<V>) -> Arc<Block<V>> {
        let mut map = self.map_lock();
        if let Some(block) = map.get(&block_index) {
            return block.clone();
        }
        let block = Arc::new(Block::new(
            layer.voxels_per_side(),
            origin_from_block_index(block_index, layer.block_size()),
        ));
        let prev = map.insert(block_index, block.clone());
        debug_assert!(
            prev.is_none(),
            "scratch block {:?} appeared while holding the temp lock",
            block_index
        );
        block
    }

    /// Moves every scratch block into the live layer and clears the map.
    /// Single-threaded; called after all workers of a pass have joined.
    /// Returns the number of blocks merged.
    pub fn flush(&self, layer: &Layer<V>) -> usize {
        let mut map = self.map_lock();
        let merged = map.len();
        for (block_index, block) in map.drain() {
            layer.insert_block(block_index, block);
        }
        merged
    }
}

impl<V> Default for ScratchBlocks<V> {
    fn default() -> Self {
        Self::new()
    }
}

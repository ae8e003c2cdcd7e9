use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;
use rustc_hash::FxHashMap as HashMap;

use super::block::Block;
use super::index::{
    block_index_from_global_voxel_index, global_voxel_index_from_point, linear_from_local_index,
    local_from_global_voxel_index, BlockIndex,
};

/// Sparse grid of blocks keyed by integer block index.
///
/// Blocks are `Arc`ed so handles handed out to workers stay valid while the
/// map grows. Structural access goes through the `RwLock`; voxel mutation
/// inside a block is the integrator's business (stripe locks).
pub struct Layer<V> {
    voxel_size: f32,
    voxel_size_inv: f32,
    voxels_per_side: i32,
    block_size: f32,
    blocks: RwLock<HashMap<BlockIndex, Arc<Block<V>>>>,
}

impl<V> Layer<V> {
    pub fn new(voxel_size: f32, voxels_per_side: i32) -> Self {
        assert!(voxel_size > 0.0);
        assert!(voxels_per_side > 0);
        Self {
            voxel_size,
            voxel_size_inv: 1.0 / voxel_size,
            voxels_per_side,
            block_size: voxel_size * voxels_per_side as f32,
            blocks: RwLock::new(HashMap::default()),
        }
    }

    #[inline]
    fn map_read(&self) -> RwLockReadGuard<'_, HashMap<BlockIndex, Arc<Block<V>>>> {
        self.blocks.read().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    fn map_write(&self) -> RwLockWriteGuard<'_, HashMap<BlockIndex, Arc<Block<V>>>> {
        self.blocks.write().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    #[inline]
    pub fn voxel_size_inv(&self) -> f32 {
        self.voxel_size_inv
    }

    #[inline]
    pub fn voxels_per_side(&self) -> i32 {
        self.voxels_per_side
    }

    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    #[inline]
    pub fn block_index_from_point(&self, point: Vec3) -> BlockIndex {
        block_index_from_global_voxel_index(
            global_voxel_index_from_point(point, self.voxel_size_inv),
            self.voxels_per_side,
        )
    }

    pub fn block_by_index(&self, index: BlockIndex) -> Option<Arc<Block<V>>> {
        self.map_read().get(&index).cloned()
    }

    pub fn block_by_coords(&self, point: Vec3) -> Option<Arc<Block<V>>> {
        self.block_by_index(self.block_index_from_point(point))
    }

    /// Looks up the voxel containing `point`; `None` if its block is
    /// unallocated. Returns the block handle plus the voxel's linear index.
    pub fn voxel_by_coords(&self, point: Vec3) -> Option<(Arc<Block<V>>, usize)> {
        let global = global_voxel_index_from_point(point, self.voxel_size_inv);
        let block = self.block_by_index(block_index_from_global_voxel_index(
            global,
            self.voxels_per_side,
        ))?;
        let local = local_from_global_voxel_index(global, self.voxels_per_side);
        Some((block, linear_from_local_index(local, self.voxels_per_side)))
    }

    pub fn insert_block(&self, index: BlockIndex, block: Arc<Block<V>>) {
        self.map_write().insert(index, block);
    }

    pub fn all_allocated_blocks(&self) -> Vec<BlockIndex> {
        self.map_read().keys().copied().collect()
    }

    pub fn block_count(&self) -> usize {
        self.map_read().len()
    }
}

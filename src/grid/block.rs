use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;

use super::index::{linear_from_local_index, LocalVoxelIndex};

/// Fixed-edge cube of voxels, the unit of allocation in the sparse grid.
///
/// Voxel storage is linear, `x + y*vps + z*vps^2`. The `updated` flag is set
/// on any voxel write so downstream consumers can find dirty blocks.
pub struct Block<V> {
    voxels: Box<[V]>,
    origin: Vec3,
    voxels_per_side: i32,
    updated: AtomicBool,
}

impl<V: Default> Block<V> {
    pub fn new(voxels_per_side: i32, origin: Vec3) -> Self {
        let count = (voxels_per_side * voxels_per_side * voxels_per_side) as usize;
        Self {
            voxels: (0..count).map(|_| V::default()).collect(),
            origin,
            voxels_per_side,
            updated: AtomicBool::new(false),
        }
    }
}

impl<V> Block<V> {
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[inline]
    pub fn voxels_per_side(&self) -> i32 {
        self.voxels_per_side
    }

    #[inline]
    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn voxel(&self, linear: usize) -> &V {
        &self.voxels[linear]
    }

    #[inline]
    pub fn voxel_by_local_index(&self, local: LocalVoxelIndex) -> &V {
        &self.voxels[linear_from_local_index(local, self.voxels_per_side)]
    }

    #[inline]
    pub fn set_updated(&self) {
        self.updated.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn updated(&self) -> bool {
        self.updated.load(Ordering::Relaxed)
    }
}

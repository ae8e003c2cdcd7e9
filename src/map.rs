use std::sync::atomic::AtomicU32;

use crate::grid::Layer;
use crate::voxel::{LabelVoxel, TsdfVoxel};

/// Owns the fused volume: a distance layer and a parallel label layer on the
/// same grid geometry, plus the process-wide label counter. Integrators
/// borrow all three, so the map outlives any integrator built on it.
pub struct LabelTsdfMap {
    tsdf_layer: Layer<TsdfVoxel>,
    label_layer: Layer<LabelVoxel>,
    highest_label: AtomicU32,
}

impl LabelTsdfMap {
    pub fn new(voxel_size: f32, voxels_per_side: i32) -> Self {
        Self {
            tsdf_layer: Layer::new(voxel_size, voxels_per_side),
            label_layer: Layer::new(voxel_size, voxels_per_side),
            highest_label: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn tsdf_layer(&self) -> &Layer<TsdfVoxel> {
        &self.tsdf_layer
    }

    #[inline]
    pub fn label_layer(&self) -> &Layer<LabelVoxel> {
        &self.label_layer
    }

    #[inline]
    pub fn highest_label(&self) -> &AtomicU32 {
        &self.highest_label
    }
}

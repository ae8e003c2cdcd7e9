use glam::{IVec3, Vec3};

/// Index of a voxel in the global (world) grid.
pub type GlobalVoxelIndex = IVec3;
/// Index of a block in the sparse grid.
pub type BlockIndex = IVec3;
/// Index of a voxel inside its block, each component in `0..voxels_per_side`.
pub type LocalVoxelIndex = IVec3;

#[inline]
pub fn global_voxel_index_from_point(point: Vec3, voxel_size_inv: f32) -> GlobalVoxelIndex {
    (point * voxel_size_inv).floor().as_ivec3()
}

#[inline]
pub fn block_index_from_global_voxel_index(
    global: GlobalVoxelIndex,
    voxels_per_side: i32,
) -> BlockIndex {
    IVec3::new(
        global.x.div_euclid(voxels_per_side),
        global.y.div_euclid(voxels_per_side),
        global.z.div_euclid(voxels_per_side),
    )
}

#[inline]
pub fn local_from_global_voxel_index(
    global: GlobalVoxelIndex,
    voxels_per_side: i32,
) -> LocalVoxelIndex {
    IVec3::new(
        global.x.rem_euclid(voxels_per_side),
        global.y.rem_euclid(voxels_per_side),
        global.z.rem_euclid(voxels_per_side),
    )
}

#[inline]
pub fn linear_from_local_index(local: LocalVoxelIndex, voxels_per_side: i32) -> usize {
    (local.x + local.y * voxels_per_side + local.z * voxels_per_side * voxels_per_side) as usize
}

#[inline]
pub fn origin_from_block_index(block: BlockIndex, block_size: f32) -> Vec3 {
    block.as_vec3() * block_size
}

#[inline]
pub fn center_point_from_global_voxel_index(global: GlobalVoxelIndex, voxel_size: f32) -> Vec3 {
    (global.as_vec3() + Vec3::splat(0.5)) * voxel_size
}

use glam::{IVec3, Vec3};

use crate::grid::index::global_voxel_index_from_point;
use crate::grid::GlobalVoxelIndex;

/// Voxel traversal from sensor origin toward a surface point, yielding every
/// global voxel index the ray passes through (Amanatides-Woo stepping).
///
/// Surface rays run from the origin to `point_g + truncation` along the ray,
/// or only through the `+-truncation` band around the point when carving is
/// disabled. Clearing rays stop `truncation` short of the surface and are
/// capped at the maximum ray length.
pub struct RayCaster {
    curr_index: GlobalVoxelIndex,
    step: IVec3,
    t_to_next: Vec3,
    t_step: Vec3,
    steps_remaining: u32,
}

impl RayCaster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin: Vec3,
        point_g: Vec3,
        clearing_ray: bool,
        voxel_carving_enabled: bool,
        max_ray_length: f32,
        voxel_size_inv: f32,
        truncation_distance: f32,
    ) -> Self {
        let ray = point_g - origin;
        let ray_length = ray.length();
        let unit_ray = ray.normalize_or_zero();

        let (start, end) = if clearing_ray {
            let length = (ray_length - truncation_distance).clamp(0.0, max_ray_length);
            let end = origin + unit_ray * length;
            let start = if voxel_carving_enabled { origin } else { end };
            (start, end)
        } else {
            let end = point_g + unit_ray * truncation_distance;
            let start = if voxel_carving_enabled {
                origin
            } else {
                point_g - unit_ray * truncation_distance
            };
            (start, end)
        };

        Self::from_scaled(start * voxel_size_inv, end * voxel_size_inv)
    }

    /// `start`/`end` in voxel units (world coordinates times `1/voxel_size`).
    fn from_scaled(start: Vec3, end: Vec3) -> Self {
        let start_index = global_voxel_index_from_point(start, 1.0);
        let end_index = global_voxel_index_from_point(end, 1.0);
        let diff = end_index - start_index;
        let steps_remaining = (diff.x.abs() + diff.y.abs() + diff.z.abs()) as u32 + 1;

        let ray = end - start;
        let mut step = IVec3::ZERO;
        let mut t_step = Vec3::INFINITY;
        let mut t_to_next = Vec3::INFINITY;
        for axis in 0..3 {
            if ray[axis] > 0.0 {
                step[axis] = 1;
                t_step[axis] = 1.0 / ray[axis];
                t_to_next[axis] = (start_index[axis] as f32 + 1.0 - start[axis]) * t_step[axis];
            } else if ray[axis] < 0.0 {
                step[axis] = -1;
                t_step[axis] = -1.0 / ray[axis];
                t_to_next[axis] = (start[axis] - start_index[axis] as f32) * t_step[axis];
            }
        }

        Self {
            curr_index: start_index,
            step,
            t_to_next,
            t_step,
            steps_remaining,
        }
    }
}

impl Iterator for RayCaster {
    type Item = GlobalVoxelIndex;

    fn next(&mut self) -> Option<GlobalVoxelIndex> {
        if self.steps_remaining == 0 {
            return None;
        }
        let out = self.curr_index;
        self.steps_remaining -= 1;

        if self.steps_remaining > 0 {
            let mut axis = 0;
            if self.t_to_next.y < self.t_to_next[axis] {
                axis = 1;
            }
            if self.t_to_next.z < self.t_to_next[axis] {
                axis = 2;
            }
            self.curr_index[axis] += self.step[axis];
            self.t_to_next[axis] += self.t_step[axis];
        }

        Some(out)
    }
}

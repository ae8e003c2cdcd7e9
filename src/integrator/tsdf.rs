use glam::{Affine3A, Vec3};

use rustc_hash::FxHashMap as HashMap;

use crate::grid::index::{center_point_from_global_voxel_index, global_voxel_index_from_point};
use crate::grid::GlobalVoxelIndex;
use crate::voxel::{Color, TsdfVoxel};

use super::LabelTsdfIntegrator;

/// Bundle map: target voxel index -> indices of the input points that end in
/// that voxel. Bundle order follows point order.
pub type VoxelBundleMap = HashMap<GlobalVoxelIndex, Vec<usize>>;

/// Knobs for the distance side of the fusion.
#[derive(Clone, Debug)]
pub struct TsdfConfig {
    pub default_truncation_distance: f32,
    pub max_weight: f32,
    pub min_ray_length_m: f32,
    pub max_ray_length_m: f32,
    /// Carve free space along the whole ray instead of only the truncation
    /// band around the surface.
    pub voxel_carving_enabled: bool,
    /// Turn rays beyond the maximum length into clearing rays instead of
    /// dropping them.
    pub allow_clear: bool,
    pub use_const_weight: bool,
    pub use_weight_dropoff: bool,
    /// Skip voxels already owned by another surface bundle (see the ray
    /// integrator).
    pub enable_anti_grazing: bool,
    pub integrator_threads: usize,
}

impl Default for TsdfConfig {
    fn default() -> Self {
        Self {
            default_truncation_distance: 0.1,
            max_weight: 10_000.0,
            min_ray_length_m: 0.1,
            max_ray_length_m: 5.0,
            voxel_carving_enabled: true,
            allow_clear: true,
            use_const_weight: false,
            use_weight_dropoff: true,
            enable_anti_grazing: false,
            integrator_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Signed distance of a voxel center to the surface point, measured along
/// the ray from the sensor origin (positive in front of the surface).
#[inline]
fn compute_tsdf_distance(origin: Vec3, point_g: Vec3, voxel_center: Vec3) -> f32 {
    let v_point_origin = point_g - origin;
    let dist_g = v_point_origin.length();
    let dist_g_v = (voxel_center - origin).dot(v_point_origin) / dist_g;
    dist_g - dist_g_v
}

impl<'a> LabelTsdfIntegrator<'a> {
    /// Observation weight for a point in the camera frame: inverse square of
    /// depth, matching sensor noise growth with distance.
    pub(crate) fn voxel_weight(&self, point_c: Vec3) -> f32 {
        if self.config.use_const_weight {
            return 1.0;
        }
        let dist_z = point_c.z.abs();
        if dist_z > 1e-6 {
            1.0 / (dist_z * dist_z)
        } else {
            0.0
        }
    }

    /// Partitions a cloud into per-voxel bundles: a surface map keyed by the
    /// voxel each valid point ends in, and a clearing map for freespace
    /// points and rays past the maximum length.
    pub fn bundle_rays(
        &self,
        t_g_c: &Affine3A,
        points_c: &[Vec3],
        freespace_points: bool,
    ) -> (VoxelBundleMap, VoxelBundleMap) {
        let mut surface_map = VoxelBundleMap::default();
        let mut clear_map = VoxelBundleMap::default();

        for (point_index, point_c) in points_c.iter().enumerate() {
            let ray_distance = point_c.length();
            if ray_distance < self.config.min_ray_length_m {
                continue;
            }
            let clearing = if ray_distance > self.config.max_ray_length_m {
                if !self.config.allow_clear {
                    continue;
                }
                true
            } else {
                freespace_points
            };

            let point_g = t_g_c.transform_point3(*point_c);
            let voxel_index =
                global_voxel_index_from_point(point_g, self.tsdf_layer.voxel_size_inv());
            let map = if clearing {
                &mut clear_map
            } else {
                &mut surface_map
            };
            map.entry(voxel_index).or_default().push(point_index);
        }

        (surface_map, clear_map)
    }

    /// Fuses one observation into a distance voxel, under its stripe lock.
    pub(crate) fn update_tsdf_voxel(
        &self,
        origin: Vec3,
        point_g: Vec3,
        global_voxel_index: GlobalVoxelIndex,
        color: Color,
        weight: f32,
        voxel: &TsdfVoxel,
    ) {
        let voxel_center =
            center_point_from_global_voxel_index(global_voxel_index, self.tsdf_layer.voxel_size());
        let sdf = compute_tsdf_distance(origin, point_g, voxel_center);
        let truncation = self.config.default_truncation_distance;

        let mut updated_weight = weight;
        // Reduce the weight of samples behind the surface so thin objects do
        // not get eaten from the back side.
        if !self.config.use_const_weight && self.config.use_weight_dropoff {
            let dropoff_epsilon = self.tsdf_layer.voxel_size();
            if sdf < -dropoff_epsilon {
                updated_weight = weight * (truncation + sdf) / (truncation - dropoff_epsilon);
                updated_weight = updated_weight.max(0.0);
            }
        }
        if updated_weight < f32::EPSILON {
            return;
        }

        let _stripe = self.stripes.lock(global_voxel_index);

        let old_weight = voxel.weight();
        let new_weight = (old_weight + updated_weight).min(self.config.max_weight);
        let fused =
            (voxel.distance() * old_weight + sdf * updated_weight) / (old_weight + updated_weight);

        if sdf.abs() < truncation {
            voxel.set_color(Color::blend(voxel.color(), old_weight, color, updated_weight));
        }
        voxel.set_distance(fused.clamp(-truncation, truncation));
        voxel.set_weight(new_weight);
    }
}

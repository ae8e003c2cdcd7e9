use glam::{Affine3A, Vec3};

use crate::grid::GlobalVoxelIndex;
use crate::util::Timed;
use crate::voxel::{Color, Label};

use super::raycast::RayCaster;
use super::tsdf::VoxelBundleMap;
use super::{allocate_voxel, BlockCursor, LabelTsdfIntegrator};

impl<'a> LabelTsdfIntegrator<'a> {
    /// Fuses one labeled cloud into the volume: bundles rays per target
    /// voxel, runs the surface pass and then the clearing pass across the
    /// worker pool, and merges scratch blocks into the live grids after each
    /// pass.
    ///
    /// `labels` carries one label per point (all equal within a segment, as
    /// produced by [`Self::decide_label_point_clouds`]).
    pub fn integrate_point_cloud(
        &self,
        t_g_c: &Affine3A,
        points_c: &[Vec3],
        colors: &[Color],
        labels: &[Label],
        freespace_points: bool,
    ) {
        assert_eq!(points_c.len(), colors.len());
        assert_eq!(points_c.len(), labels.len());

        let _integrate = Timed::debug("integrate");

        let (surface_map, clear_map) = self.bundle_rays(t_g_c, points_c, freespace_points);

        self.integrate_rays(t_g_c, points_c, colors, labels, false, &surface_map, &clear_map);

        {
            let _clear = Timed::debug("integrate/clear");
            self.integrate_rays(t_g_c, points_c, colors, labels, true, &surface_map, &clear_map);
        }
    }

    /// One pass (surface or clearing) over its bundle map, fanned out across
    /// the worker pool, followed by the single-threaded scratch merge.
    #[allow(clippy::too_many_arguments)]
    fn integrate_rays(
        &self,
        t_g_c: &Affine3A,
        points_c: &[Vec3],
        colors: &[Color],
        labels: &[Label],
        clearing_ray: bool,
        surface_map: &VoxelBundleMap,
        clear_map: &VoxelBundleMap,
    ) {
        let threads = self.config.integrator_threads;
        if threads == 1 {
            self.integrate_voxels(t_g_c, points_c, colors, labels, clearing_ray, surface_map, clear_map, 0);
        } else if let Some(pool) = &self.pool {
            pool.scope(|scope| {
                for thread_index in 0..threads {
                    scope.spawn(move |_| {
                        self.integrate_voxels(
                            t_g_c,
                            points_c,
                            colors,
                            labels,
                            clearing_ray,
                            surface_map,
                            clear_map,
                            thread_index,
                        );
                    });
                }
            });
        }

        let merged_tsdf = self.tsdf_scratch.flush(self.tsdf_layer);
        let merged_label = self.label_scratch.flush(self.label_layer);
        if merged_tsdf + merged_label > 0 {
            log::trace!(
                "merged {} tsdf and {} label scratch blocks",
                merged_tsdf,
                merged_label
            );
        }
    }

    /// Worker body: with N workers, worker w handles bundle i iff
    /// `(i + w + 1) % N == 0`. Bundles are processed in map iteration order.
    #[allow(clippy::too_many_arguments)]
    fn integrate_voxels(
        &self,
        t_g_c: &Affine3A,
        points_c: &[Vec3],
        colors: &[Color],
        labels: &[Label],
        clearing_ray: bool,
        surface_map: &VoxelBundleMap,
        clear_map: &VoxelBundleMap,
        thread_index: usize,
    ) {
        let map = if clearing_ray { clear_map } else { surface_map };
        let threads = self.config.integrator_threads;

        for (i, (voxel_index, point_indices)) in map.iter().enumerate() {
            if (i + thread_index + 1) % threads == 0 {
                self.integrate_voxel(
                    t_g_c,
                    points_c,
                    colors,
                    labels,
                    clearing_ray,
                    *voxel_index,
                    point_indices,
                    surface_map,
                );
            }
        }
    }

    /// Condenses one bundle into a merged representative sample, then traces
    /// its ray and updates every visited distance and label voxel.
    #[allow(clippy::too_many_arguments)]
    fn integrate_voxel(
        &self,
        t_g_c: &Affine3A,
        points_c: &[Vec3],
        colors: &[Color],
        labels: &[Label],
        clearing_ray: bool,
        bundle_key: GlobalVoxelIndex,
        point_indices: &[usize],
        surface_map: &VoxelBundleMap,
    ) {
        if point_indices.is_empty() {
            return;
        }

        let origin = Vec3::from(t_g_c.translation);

        let mut merged_point_c = Vec3::ZERO;
        let mut merged_color = Color::default();
        let mut merged_weight = 0.0f32;
        let mut merged_label = 0;

        if clearing_ray {
            // Only the nearest sample matters for carving free space.
            let point_index = point_indices[0];
            merged_point_c = points_c[point_index];
            merged_color = colors[point_index];
            merged_weight = self.voxel_weight(merged_point_c);
            merged_label = labels[point_index];
        } else {
            for &point_index in point_indices {
                // Points of one segment all carry the same label; bundles
                // mixing segments resolve to the last point's label.
                merged_label = labels[point_index];

                let point_c = points_c[point_index];
                let point_weight = self.voxel_weight(point_c);
                if point_weight <= 0.0 {
                    continue;
                }
                merged_point_c = (merged_point_c * merged_weight + point_c * point_weight)
                    / (merged_weight + point_weight);
                merged_color =
                    Color::blend(merged_color, merged_weight, colors[point_index], point_weight);
                merged_weight += point_weight;
            }
            if merged_weight <= 0.0 {
                return;
            }
        }

        let merged_point_g = t_g_c.transform_point3(merged_point_c);

        let ray_caster = RayCaster::new(
            origin,
            merged_point_g,
            clearing_ray,
            self.config.voxel_carving_enabled,
            self.config.max_ray_length_m,
            self.tsdf_layer.voxel_size_inv(),
            self.config.default_truncation_distance,
        );

        let mut tsdf_cursor = BlockCursor::default();
        let mut label_cursor = BlockCursor::default();

        for global_voxel_index in ray_caster {
            if self.config.enable_anti_grazing {
                // Skip voxels another surface bundle owns; a surface ray
                // always integrates its own key.
                if (clearing_ray || global_voxel_index != bundle_key)
                    && surface_map.contains_key(&global_voxel_index)
                {
                    continue;
                }
            }

            let (tsdf_block, tsdf_linear) = allocate_voxel(
                global_voxel_index,
                self.tsdf_layer,
                &self.tsdf_scratch,
                &mut tsdf_cursor,
            );
            self.update_tsdf_voxel(
                origin,
                merged_point_g,
                global_voxel_index,
                merged_color,
                merged_weight,
                tsdf_block.voxel(tsdf_linear),
            );

            let (label_block, label_linear) = allocate_voxel(
                global_voxel_index,
                self.label_layer,
                &self.label_scratch,
                &mut label_cursor,
            );
            self.update_label_voxel(
                global_voxel_index,
                merged_label,
                1,
                label_block.voxel(label_linear),
            );
        }
    }
}

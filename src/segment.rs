use glam::{Affine3A, Vec3};

use crate::voxel::{Color, Label};

/// One labeled point-cloud bundle for a single ingestion step: points in the
/// camera frame, the sensor-to-world pose they were captured from, per-point
/// colors, and the output labels filled in by the assigner (one per point,
/// all equal within a segment).
pub struct Segment {
    pub points_c: Vec<Vec3>,
    pub t_g_c: Affine3A,
    pub colors: Vec<Color>,
    pub labels: Vec<Label>,
}

impl Segment {
    pub fn new(points_c: Vec<Vec3>, colors: Vec<Color>, t_g_c: Affine3A) -> Self {
        assert_eq!(points_c.len(), colors.len());
        Self {
            points_c,
            t_g_c,
            colors,
            labels: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_c.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_c.is_empty()
    }
}

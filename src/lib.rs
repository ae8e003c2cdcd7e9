//! Labeled volumetric fusion: incrementally fuses labeled point-cloud
//! segments, each captured from a known sensor pose, into a sparse voxel
//! volume carrying both a truncated signed-distance field and a per-voxel
//! label field with confidences.
//!
//! The entry point is [`LabelTsdfIntegrator`]: feed it batches of
//! [`Segment`]s, let the assigner reconcile each segment with the labels
//! already stored in the volume, then integrate the labeled cloud with
//! [`LabelTsdfIntegrator::integrate_point_cloud`].

pub mod grid;
pub mod integrator;
pub mod map;
pub mod segment;
pub mod util;
pub mod voxel;

pub use integrator::{LabelConfig, LabelTsdfIntegrator, SegmentCandidates, TsdfConfig};
pub use map::LabelTsdfMap;
pub use segment::Segment;
pub use voxel::{Color, Label, LabelConfidence, LabelVoxel, TsdfVoxel};

pub mod assign;
pub mod merge;
pub mod raycast;
pub mod rays;
pub mod scratch;
pub mod stripe;
pub mod tsdf;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap as HashMap;

use crate::grid::index::{
    block_index_from_global_voxel_index, linear_from_local_index, local_from_global_voxel_index,
};
use crate::grid::{Block, BlockIndex, GlobalVoxelIndex, Layer};
use crate::map::LabelTsdfMap;
use crate::voxel::{Label, LabelConfidence, LabelVoxel, TsdfVoxel};

pub use assign::{SegmentCandidates, SegmentId};
pub use raycast::RayCaster;
pub use scratch::ScratchBlocks;
pub use stripe::StripeLocks;
pub use tsdf::{TsdfConfig, VoxelBundleMap};

/// Symmetric co-occurrence counters, keyed `(min(l1,l2)) -> (max(l1,l2))`.
pub type PairwiseConfidence = HashMap<Label, HashMap<Label, i32>>;

/// Knobs for the label side of the fusion.
#[derive(Clone, Debug)]
pub struct LabelConfig {
    /// Gates merge-candidate accumulation and [`LabelTsdfIntegrator::merge_labels`].
    pub enable_pairwise_confidence_merging: bool,
    /// A label overlapping more than this fraction of a segment's points
    /// becomes a merge candidate for that segment.
    pub pairwise_confidence_ratio_threshold: f32,
    /// Minimum co-occurrence count before a pair of labels is merged.
    pub pairwise_confidence_threshold: i32,
    // Capped confidence tends to introduce artifacts in planar regions;
    // off by default.
    pub cap_confidence: bool,
    pub confidence_cap_value: LabelConfidence,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enable_pairwise_confidence_merging: false,
            pairwise_confidence_ratio_threshold: 0.05,
            pairwise_confidence_threshold: 2,
            cap_confidence: false,
            confidence_cap_value: 10,
        }
    }
}

/// Fuses labeled point-cloud segments into a shared TSDF + label volume.
///
/// Borrows the layers and the label counter from a [`LabelTsdfMap`]; the map
/// outlives the integrator. One instance is driven in batches: candidates,
/// assignment, then one `integrate_point_cloud` per segment. Merging and
/// swapping must only run while no integration workers are active.
pub struct LabelTsdfIntegrator<'a> {
    pub(crate) config: TsdfConfig,
    pub(crate) label_config: LabelConfig,

    pub(crate) tsdf_layer: &'a Layer<TsdfVoxel>,
    pub(crate) label_layer: &'a Layer<LabelVoxel>,
    pub(crate) highest_label: &'a AtomicU32,

    pub(crate) stripes: StripeLocks,
    pub(crate) tsdf_scratch: ScratchBlocks<TsdfVoxel>,
    pub(crate) label_scratch: ScratchBlocks<LabelVoxel>,

    pub(crate) pairwise_confidence: PairwiseConfidence,
    pub(crate) labels_count: HashMap<Label, i64>,

    pub(crate) pool: Option<rayon::ThreadPool>,
}

impl<'a> LabelTsdfIntegrator<'a> {
    pub fn new(config: TsdfConfig, label_config: LabelConfig, map: &'a LabelTsdfMap) -> Self {
        assert!(config.integrator_threads >= 1);
        let pool = (config.integrator_threads > 1).then(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.integrator_threads)
                .thread_name(|i| format!("fuse-{}", i))
                .build()
                .expect("failed to build integration thread pool")
        });
        Self {
            config,
            label_config,
            tsdf_layer: map.tsdf_layer(),
            label_layer: map.label_layer(),
            highest_label: map.highest_label(),
            stripes: StripeLocks::new(),
            tsdf_scratch: ScratchBlocks::new(),
            label_scratch: ScratchBlocks::new(),
            pairwise_confidence: PairwiseConfidence::default(),
            labels_count: HashMap::default(),
            pool,
        }
    }

    /// Advances the shared label counter and returns a never-before-seen
    /// label. Exhausting the label space is a hard precondition violation,
    /// checked before the counter is touched.
    pub fn get_fresh_label(&self) -> Label {
        assert!(
            self.highest_label.load(Ordering::Relaxed) < Label::MAX,
            "label space exhausted"
        );
        self.highest_label.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn pairwise_confidence(&self) -> &PairwiseConfidence {
        &self.pairwise_confidence
    }

    /// Applies one labeled observation to a voxel, under its stripe lock.
    ///
    /// Matching labels accumulate confidence (saturating at the cap when
    /// enabled); a disagreeing observation erodes the sitting label's
    /// confidence, and seats its own label once that hits zero.
    pub(crate) fn update_label_voxel(
        &self,
        global_voxel_index: GlobalVoxelIndex,
        label: Label,
        confidence: LabelConfidence,
        voxel: &LabelVoxel,
    ) {
        let _stripe = self.stripes.lock(global_voxel_index);

        if voxel.label() == label {
            let mut summed = voxel.confidence().saturating_add(confidence);
            if self.label_config.cap_confidence && summed > self.label_config.confidence_cap_value {
                summed = self.label_config.confidence_cap_value;
            }
            voxel.set_confidence(summed);
        } else if voxel.confidence() == 0 {
            voxel.set_label(label);
            voxel.set_confidence(confidence);
            self.highest_label.fetch_max(label, Ordering::Relaxed);
        } else {
            voxel.set_confidence(voxel.confidence().saturating_sub(confidence));
        }
    }
}

/// Cache of the last block a ray touched, to skip repeated map lookups while
/// consecutive voxels fall in the same block.
pub(crate) struct BlockCursor<V> {
    block: Option<Arc<Block<V>>>,
    block_index: BlockIndex,
}

impl<V> Default for BlockCursor<V> {
    fn default() -> Self {
        Self {
            block: None,
            block_index: BlockIndex::MAX,
        }
    }
}

/// Returns the block and linear voxel offset for `global_voxel_index`,
/// consulting the live layer first and falling back to the scratch map for
/// unallocated regions. Marks the block dirty. Thread safe.
pub(crate) fn allocate_voxel<V: Default>(
    global_voxel_index: GlobalVoxelIndex,
    layer: &Layer<V>,
    scratch: &ScratchBlocks<V>,
    cursor: &mut BlockCursor<V>,
) -> (Arc<Block<V>>, usize) {
    let block_index = block_index_from_global_voxel_index(global_voxel_index, layer.voxels_per_side());

    let cached = match &cursor.block {
        Some(block) if cursor.block_index == block_index => Some(block.clone()),
        _ => None,
    };
    let block = match cached {
        Some(block) => block,
        None => {
            let block = layer
                .block_by_index(block_index)
                .unwrap_or_else(|| scratch.get_or_create(block_index, layer));
            cursor.block = Some(block.clone());
            cursor.block_index = block_index;
            block
        }
    };

    block.set_updated();
    let local = local_from_global_voxel_index(global_voxel_index, layer.voxels_per_side());
    let linear = linear_from_local_index(local, layer.voxels_per_side());
    (block, linear)
}

use std::collections::hash_map::Entry;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::segment::Segment;
use crate::voxel::Label;

use super::LabelTsdfIntegrator;

/// Position of a segment within the current batch.
pub type SegmentId = usize;

/// Per-batch candidate tally: label -> segment -> number of that segment's
/// points that landed on a voxel already bearing the label.
pub type SegmentCandidates = HashMap<Label, HashMap<SegmentId, usize>>;

impl<'a> LabelTsdfIntegrator<'a> {
    /// Labels overlapping more than the configured fraction of a segment's
    /// points are potential merge candidates for that segment.
    fn check_for_segment_label_merge_candidate(
        &self,
        label: Label,
        label_points_count: usize,
        segment_points_count: usize,
        merge_candidate_labels: &mut HashSet<Label>,
    ) {
        let overlap_ratio = label_points_count as f32 / segment_points_count as f32;
        if overlap_ratio > self.label_config.pairwise_confidence_ratio_threshold {
            merge_candidate_labels.insert(label);
        }
    }

    fn increase_label_count_for_segment(
        &self,
        segment_id: SegmentId,
        label: Label,
        segment_points_count: usize,
        candidates: &mut SegmentCandidates,
        merge_candidate_labels: &mut HashSet<Label>,
    ) {
        match candidates.entry(label).or_default().entry(segment_id) {
            Entry::Occupied(mut count) => {
                *count.get_mut() += 1;
                if self.label_config.enable_pairwise_confidence_merging {
                    self.check_for_segment_label_merge_candidate(
                        label,
                        *count.get(),
                        segment_points_count,
                        merge_candidate_labels,
                    );
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(1);
            }
        }
    }

    /// Sets or raises the pairwise confidence of every unordered pair drawn
    /// from the merge candidates. Pairs are stored `(min, max)`; self-pairs
    /// are excluded.
    fn increase_pairwise_confidence_count(&mut self, merge_candidates: &[Label]) {
        for i in 0..merge_candidates.len() {
            for j in i + 1..merge_candidates.len() {
                let (mut l1, mut l2) = (merge_candidates[i], merge_candidates[j]);
                if l1 == l2 {
                    continue;
                }
                if l1 > l2 {
                    std::mem::swap(&mut l1, &mut l2);
                }
                *self
                    .pairwise_confidence
                    .entry(l1)
                    .or_default()
                    .entry(l2)
                    .or_insert(0) += 1;
            }
        }
    }

    /// Stage A: projects each of the segment's points into the world frame
    /// and tallies which stored labels it lands on. Points in unallocated
    /// blocks or on unobserved (label 0) voxels are skipped. A segment that
    /// touches no labeled voxel gets a fresh-label candidate covering all its
    /// points, so it wins against itself in the assignment stage.
    pub fn compute_segment_label_candidates(
        &mut self,
        segment_id: SegmentId,
        segment: &Segment,
        candidates: &mut SegmentCandidates,
    ) {
        let segment_points_count = segment.points_c.len();
        let mut merge_candidate_labels = HashSet::default();
        let mut candidate_label_exists = false;

        for point_c in &segment.points_c {
            let point_g = segment.t_g_c.transform_point3(*point_c);
            let Some((block, linear)) = self.label_layer.voxel_by_coords(point_g) else {
                continue;
            };
            let label = block.voxel(linear).label();
            if label == 0 {
                continue;
            }
            candidate_label_exists = true;
            self.increase_label_count_for_segment(
                segment_id,
                label,
                segment_points_count,
                candidates,
                &mut merge_candidate_labels,
            );
        }

        if self.label_config.enable_pairwise_confidence_merging {
            let merge_candidates: Vec<Label> = merge_candidate_labels.into_iter().collect();
            self.increase_pairwise_confidence_count(&merge_candidates);
        }

        if !candidate_label_exists {
            let fresh_label = self.get_fresh_label();
            candidates
                .entry(fresh_label)
                .or_default()
                .insert(segment_id, segment_points_count);
        }
    }

    /// Fetches the unassigned (segment, label) pair with the highest overall
    /// voxel count.
    fn next_segment_label_pair(
        &self,
        candidates: &SegmentCandidates,
        labelled_segments: &HashSet<SegmentId>,
    ) -> Option<(SegmentId, Label)> {
        let mut max_count = 0usize;
        let mut best = None;

        for (label, per_segment) in candidates {
            for (segment_id, count) in per_segment {
                if *count > max_count && !labelled_segments.contains(segment_id) {
                    max_count = *count;
                    best = Some((*segment_id, *label));
                }
            }
        }
        best
    }

    /// Stage B + C: greedily assigns each label to the segment it overlaps
    /// most (one label seats at most one segment per batch), then hands every
    /// still-unassigned segment a fresh label. Afterwards every segment has
    /// one label per point, all equal.
    pub fn decide_label_point_clouds(
        &self,
        segments: &mut [Segment],
        candidates: &mut SegmentCandidates,
    ) {
        let mut labelled_segments: HashSet<SegmentId> = HashSet::default();

        while let Some((segment_id, label)) = self.next_segment_label_pair(candidates, &labelled_segments) {
            let segment = &mut segments[segment_id];
            segment.labels.clear();
            segment.labels.resize(segment.points_c.len(), label);
            labelled_segments.insert(segment_id);
            candidates.remove(&label);
        }

        for (segment_id, segment) in segments.iter_mut().enumerate() {
            if labelled_segments.contains(&segment_id) {
                continue;
            }
            let fresh_label = self.get_fresh_label();
            segment.labels.clear();
            segment.labels.resize(segment.points_c.len(), fresh_label);
        }
    }
}

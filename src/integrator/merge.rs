use rustc_hash::FxHashMap as HashMap;

use crate::voxel::Label;

use super::LabelTsdfIntegrator;

impl<'a> LabelTsdfIntegrator<'a> {
    /// Rewrites every voxel bearing `old_label` to `new_label`, marking the
    /// affected blocks dirty. Confidence is left untouched. Must not run
    /// concurrently with integration workers.
    pub fn swap_labels(&mut self, old_label: Label, new_label: Label) {
        let mut swapped: i64 = 0;

        for block_index in self.label_layer.all_allocated_blocks() {
            let Some(block) = self.label_layer.block_by_index(block_index) else {
                continue;
            };
            let mut touched = false;
            for linear in 0..block.num_voxels() {
                let voxel = block.voxel(linear);
                if voxel.label() == old_label {
                    voxel.set_label(new_label);
                    touched = true;
                    swapped += 1;
                }
            }
            if touched {
                block.set_updated();
            }
        }

        // Count bookkeeping transfers with the swap; nothing bears the old
        // label afterwards.
        if swapped > 0 {
            *self.labels_count.entry(new_label).or_insert(0) += swapped;
        }
        self.labels_count.remove(&old_label);
    }

    /// Applies every pairwise merge whose co-occurrence count crossed the
    /// threshold, erasing fired pairs as it goes. Merges may chain within one
    /// invocation; no ordering between them is promised. Must not run
    /// concurrently with integration workers.
    pub fn merge_labels(&mut self) {
        if !self.label_config.enable_pairwise_confidence_merging {
            return;
        }

        let outer_labels: Vec<Label> = self.pairwise_confidence.keys().copied().collect();
        for label1 in outer_labels {
            let fired: Vec<Label> = match self.pairwise_confidence.get(&label1) {
                Some(inner) => inner
                    .iter()
                    .filter(|(_, count)| **count > self.label_config.pairwise_confidence_threshold)
                    .map(|(label2, _)| *label2)
                    .collect(),
                None => continue,
            };

            for label2 in fired {
                self.swap_labels(label1, label2);
                log::info!("merging labels {} and {}", label1, label2);
                if let Some(inner) = self.pairwise_confidence.get_mut(&label1) {
                    inner.remove(&label2);
                }
            }
        }

        self.pairwise_confidence.retain(|_, inner| !inner.is_empty());
    }

    /// Labels currently carried by at least one voxel, ascending. Runs a
    /// one-shot scan of all allocated label blocks and rebuilds the count
    /// map as a side effect.
    pub fn get_labels_list(&mut self) -> Vec<Label> {
        let mut counts: HashMap<Label, i64> = HashMap::default();
        for block_index in self.label_layer.all_allocated_blocks() {
            let Some(block) = self.label_layer.block_by_index(block_index) else {
                continue;
            };
            for linear in 0..block.num_voxels() {
                let label = block.voxel(linear).label();
                if label != 0 {
                    *counts.entry(label).or_insert(0) += 1;
                }
            }
        }
        self.labels_count = counts;

        let mut labels: Vec<Label> = self
            .labels_count
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(label, _)| *label)
            .collect();
        labels.sort_unstable();
        labels
    }
}

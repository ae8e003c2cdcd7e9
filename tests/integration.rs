use glam::{Affine3A, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use labelfuse::{
    Color, Label, LabelConfig, LabelTsdfIntegrator, LabelTsdfMap, Segment, SegmentCandidates,
    TsdfConfig,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_map() -> LabelTsdfMap {
    LabelTsdfMap::new(0.1, 8)
}

fn test_config(threads: usize) -> TsdfConfig {
    TsdfConfig {
        default_truncation_distance: 0.1,
        min_ray_length_m: 0.1,
        max_ray_length_m: 5.0,
        voxel_carving_enabled: false,
        use_const_weight: true,
        use_weight_dropoff: false,
        integrator_threads: threads,
        ..TsdfConfig::default()
    }
}

fn segment(points: Vec<Vec3>) -> Segment {
    let colors = vec![Color::new(128, 128, 128, 255); points.len()];
    Segment::new(points, colors, Affine3A::IDENTITY)
}

/// Runs the assigner over one batch: candidates per segment, then the greedy
/// assignment.
fn decide_batch(fuser: &mut LabelTsdfIntegrator<'_>, segments: &mut [Segment]) {
    let mut candidates = SegmentCandidates::default();
    for (id, seg) in segments.iter().enumerate() {
        fuser.compute_segment_label_candidates(id, seg, &mut candidates);
    }
    fuser.decide_label_point_clouds(segments, &mut candidates);
}

fn integrate_batch(fuser: &LabelTsdfIntegrator<'_>, segments: &[Segment]) {
    for seg in segments {
        fuser.integrate_point_cloud(&seg.t_g_c, &seg.points_c, &seg.colors, &seg.labels, false);
    }
}

fn label_at(map: &LabelTsdfMap, point: Vec3) -> Option<(Label, u32)> {
    map.label_layer().voxel_by_coords(point).map(|(block, linear)| {
        let voxel = block.voxel(linear);
        (voxel.label(), voxel.confidence())
    })
}

fn for_each_label_voxel(map: &LabelTsdfMap, mut f: impl FnMut(Label, u32)) {
    let layer = map.label_layer();
    for block_index in layer.all_allocated_blocks() {
        let block = layer.block_by_index(block_index).unwrap();
        for linear in 0..block.num_voxels() {
            let voxel = block.voxel(linear);
            f(voxel.label(), voxel.confidence());
        }
    }
}

fn assert_label_monotonicity(map: &LabelTsdfMap) {
    let highest = map.highest_label().load(std::sync::atomic::Ordering::Relaxed);
    for_each_label_voxel(map, |label, _| {
        assert!(label <= highest, "label {} above counter {}", label, highest);
    });
}

// S1: a single segment over a fresh volume gets the first fresh label, and
// every voxel in its truncation bands ends at (label 1, confidence 1).
#[test]
fn fresh_volume_single_segment() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    let points = vec![
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.3, 0.0, 1.0),
        Vec3::new(0.6, 0.0, 1.0),
        Vec3::new(0.9, 0.0, 1.0),
    ];
    let mut segments = vec![segment(points.clone())];

    decide_batch(&mut fuser, &mut segments);
    assert_eq!(segments[0].labels, vec![1; 4]);

    integrate_batch(&fuser, &segments);

    for point in &points {
        assert_eq!(label_at(&map, *point), Some((1, 1)));
    }
    assert_label_monotonicity(&map);
}

// S2: re-observing the same segment at the same pose reinforces: the
// assigner carries label 1 over and surface confidences rise to 2.
#[test]
fn matching_reinforcement() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    let points = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.3, 0.0, 1.0)];
    for round in 1u32..=2 {
        let mut segments = vec![segment(points.clone())];
        decide_batch(&mut fuser, &mut segments);
        assert_eq!(segments[0].labels, vec![1; 2], "round {}", round);
        integrate_batch(&fuser, &segments);

        for point in &points {
            assert_eq!(label_at(&map, *point), Some((1, round)));
        }
    }
}

// S3: a competing label first erodes the sitting one to confidence 0, then
// seats itself on the next exposure.
#[test]
fn competing_label_takeover() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    let point = Vec3::new(0.0, 0.0, 1.0);
    let mut segments = vec![segment(vec![point])];
    decide_batch(&mut fuser, &mut segments);
    integrate_batch(&fuser, &segments);
    assert_eq!(label_at(&map, point), Some((1, 1)));

    let colors = vec![Color::default()];
    let competing = fuser.get_fresh_label();
    assert_eq!(competing, 2);

    // First exposure: erode, label stays.
    fuser.integrate_point_cloud(&Affine3A::IDENTITY, &[point], &colors, &[competing], false);
    assert_eq!(label_at(&map, point), Some((1, 0)));

    // Second exposure: take over.
    fuser.integrate_point_cloud(&Affine3A::IDENTITY, &[point], &colors, &[competing], false);
    assert_eq!(label_at(&map, point), Some((2, 1)));
}

// S4: two segments competing for a stored label; one wins it in the greedy
// stage, the loser and the unrelated segment fall through to fresh labels.
#[test]
fn segment_label_carryover() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    let region = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.3, 0.0, 1.0)];
    let mut seed = vec![segment(region.clone())];
    decide_batch(&mut fuser, &mut seed);
    integrate_batch(&fuser, &seed);

    let mut batch = vec![
        segment(region.clone()),                 // overlaps with 2 points
        segment(vec![region[0]]),                // overlaps with 1 point
        segment(vec![Vec3::new(2.0, 0.0, 1.0)]), // fresh region
    ];
    decide_batch(&mut fuser, &mut batch);

    assert_eq!(batch[0].labels, vec![1; 2]);
    assert_eq!(batch[1].labels, vec![3]);
    assert_eq!(batch[2].labels, vec![2]);

    let mut labels: Vec<Label> = batch.iter().map(|s| s.labels[0]).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), 3, "labels must be pairwise distinct");
}

// S5: repeated co-observation of two labels by one segment drives their
// pairwise confidence over the threshold; merge_labels rewrites the volume.
#[test]
fn pairwise_merge() {
    init_logger();
    let map = test_map();
    let label_config = LabelConfig {
        enable_pairwise_confidence_merging: true,
        pairwise_confidence_ratio_threshold: 0.05,
        pairwise_confidence_threshold: 2,
        ..LabelConfig::default()
    };
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), label_config, &map);

    let region_a = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.3, 0.0, 1.0)];
    let region_b = vec![Vec3::new(1.0, 0.0, 1.0), Vec3::new(1.3, 0.0, 1.0)];

    for region in [&region_a, &region_b] {
        let mut batch = vec![segment(region.clone())];
        decide_batch(&mut fuser, &mut batch);
        integrate_batch(&fuser, &batch);
    }
    assert_eq!(label_at(&map, region_a[0]), Some((1, 1)));
    assert_eq!(label_at(&map, region_b[0]), Some((2, 1)));

    // A segment spanning both regions sees labels 1 and 2 with 50% overlap
    // each; three sightings push the pair count past the threshold.
    let spanning = segment([region_a.clone(), region_b.clone()].concat());
    for _ in 0..3 {
        let mut candidates = SegmentCandidates::default();
        fuser.compute_segment_label_candidates(0, &spanning, &mut candidates);
    }
    assert_eq!(fuser.pairwise_confidence()[&1][&2], 3);

    fuser.merge_labels();

    for_each_label_voxel(&map, |label, _| {
        assert_ne!(label, 1, "label 1 must be fully rewritten");
    });
    assert_eq!(label_at(&map, region_a[0]), Some((2, 1)));
    assert_eq!(fuser.get_labels_list(), vec![2]);
    assert!(fuser.pairwise_confidence().is_empty());
}

// S6: with anti-grazing, a ray passing through another bundle's voxel skips
// it but still updates its own terminal voxel.
#[test]
fn anti_grazing_skips_foreign_bundle_keys() {
    init_logger();
    let near = Vec3::new(0.0, 0.0, 0.35);
    let far = Vec3::new(0.0, 0.0, 0.75);

    let run = |anti_grazing: bool| -> (Option<(Label, u32)>, Option<(Label, u32)>) {
        let map = test_map();
        let config = TsdfConfig {
            default_truncation_distance: 0.05,
            voxel_carving_enabled: true,
            enable_anti_grazing: anti_grazing,
            ..test_config(1)
        };
        let mut fuser = LabelTsdfIntegrator::new(config, LabelConfig::default(), &map);

        let mut batch = vec![segment(vec![near, far])];
        decide_batch(&mut fuser, &mut batch);
        integrate_batch(&fuser, &batch);
        (label_at(&map, near), label_at(&map, far))
    };

    // The far ray crosses the near bundle's voxel: with anti-grazing it is
    // skipped there, without it the near voxel is hit twice.
    assert_eq!(run(true), (Some((1, 1)), Some((1, 1))));
    assert_eq!(run(false), (Some((1, 2)), Some((1, 1))));
}

#[test]
fn swap_totality() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    let points = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.3, 0.0, 1.0)];
    let mut batch = vec![segment(points.clone())];
    decide_batch(&mut fuser, &mut batch);
    integrate_batch(&fuser, &batch);

    let swapped_to = 5;
    fuser.swap_labels(1, swapped_to);

    let mut bearing_new = 0usize;
    for_each_label_voxel(&map, |label, _| {
        assert_ne!(label, 1);
        if label == swapped_to {
            bearing_new += 1;
        }
    });
    assert!(bearing_new > 0);
    assert_eq!(label_at(&map, points[0]).unwrap().0, swapped_to);
}

#[test]
fn labels_list_reports_present_labels() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);

    for region in [Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0)] {
        let mut batch = vec![segment(vec![region])];
        decide_batch(&mut fuser, &mut batch);
        integrate_batch(&fuser, &batch);
    }
    assert_eq!(fuser.get_labels_list(), vec![1, 2]);
}

fn random_cloud(rng: &mut ChaCha8Rng, count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.5..2.5),
            )
        })
        .collect()
}

// Invariant 9: identical inputs with one worker produce bit-identical grids.
#[test]
fn single_thread_determinism() {
    init_logger();

    let grid_fingerprint = |map: &LabelTsdfMap| -> Vec<(i32, i32, i32, usize, u32, u32, u32, u32)> {
        let mut out = Vec::new();
        let label_layer = map.label_layer();
        let tsdf_layer = map.tsdf_layer();
        let mut indices = label_layer.all_allocated_blocks();
        indices.sort_unstable_by_key(|v| (v.x, v.y, v.z));
        for index in indices {
            let label_block = label_layer.block_by_index(index).unwrap();
            let tsdf_block = tsdf_layer.block_by_index(index).unwrap();
            for linear in 0..label_block.num_voxels() {
                let lv = label_block.voxel(linear);
                let tv = tsdf_block.voxel(linear);
                out.push((
                    index.x,
                    index.y,
                    index.z,
                    linear,
                    lv.label(),
                    lv.confidence(),
                    tv.distance().to_bits(),
                    tv.weight().to_bits(),
                ));
            }
        }
        out
    };

    let run = || -> Vec<(i32, i32, i32, usize, u32, u32, u32, u32)> {
        let map = test_map();
        let mut fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..2 {
            let mut batch = vec![
                segment(random_cloud(&mut rng, 40)),
                segment(random_cloud(&mut rng, 25)),
            ];
            decide_batch(&mut fuser, &mut batch);
            integrate_batch(&fuser, &batch);
        }
        grid_fingerprint(&map)
    };

    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

// Multi-worker integration must uphold the structural invariants even though
// scheduling is nondeterministic.
#[test]
fn concurrent_integration_invariants() {
    init_logger();
    let map = test_map();
    let mut fuser = LabelTsdfIntegrator::new(test_config(4), LabelConfig::default(), &map);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut batch = vec![segment(random_cloud(&mut rng, 300))];
    decide_batch(&mut fuser, &mut batch);
    integrate_batch(&fuser, &batch);

    let assigned = batch[0].labels[0];
    assert_label_monotonicity(&map);
    let mut observed = 0usize;
    for_each_label_voxel(&map, |label, confidence| {
        assert!(label == 0 || label == assigned);
        assert!(label != 0 || confidence == 0);
        if label != 0 {
            observed += 1;
        }
    });
    assert!(observed > 0);
    // Scratch maps must be fully merged after a batch.
    assert!(map.label_layer().block_count() > 0);
    assert_eq!(
        map.label_layer().block_count(),
        map.tsdf_layer().block_count()
    );
}

#[test]
#[should_panic]
fn mismatched_lengths_are_a_precondition_violation() {
    let map = test_map();
    let fuser = LabelTsdfIntegrator::new(test_config(1), LabelConfig::default(), &map);
    let points = vec![Vec3::new(0.0, 0.0, 1.0)];
    let colors = vec![Color::default(); 2];
    fuser.integrate_point_cloud(&Affine3A::IDENTITY, &points, &colors, &[1], false);
}

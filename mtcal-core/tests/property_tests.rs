//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Nesting: Bonferroni ⊆ Holm ⊆ Benjamini-Hochberg
//! 2. All p-values equal to 1 reject nothing
//! 3. Holm and BH are invariant to input order
//! 4. Resampled panels keep their (T, K) shape
//! 5. Step-down rejections form a prefix of the visiting order
//! 6. Power is undefined, never zero, without true effects
//! 7. The calibrated threshold depends only on the multiset of maxima

use mtcal_core::bootstrap::BootstrapMatrix;
use mtcal_core::correction::{benjamini_hochberg, bonferroni, holm, RejectionSet};
use mtcal_core::evaluation::evaluate;
use mtcal_core::panel::{ClusterLabeling, GroundTruth, Panel};
use mtcal_core::resample::{BlockClusterResampler, ResampleScheme};
use mtcal_core::stepdown::stepdown_walk;
use mtcal_core::BootstrapDistribution;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_p_values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![
            (0.0..1.0_f64),
            (0.0..0.02_f64),
            Just(0.01),
            Just(1.0),
        ],
        2..30,
    )
}

fn arb_alpha() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.005), Just(0.01), Just(0.05), Just(0.1), (0.001..0.5_f64)]
}

/// Panel of shape (T, K) with K = clusters * per_cluster.
fn arb_panel() -> impl Strategy<Value = (Panel, ClusterLabeling)> {
    (2usize..40, 1usize..4, 1usize..4).prop_flat_map(|(periods, clusters, per_cluster)| {
        let series = clusters * per_cluster;
        prop::collection::vec(-10.0..10.0_f64, periods * series).prop_map(move |data| {
            (
                Panel::from_column_major(periods, series, data).unwrap(),
                ClusterLabeling::contiguous(clusters, per_cluster),
            )
        })
    })
}

fn arb_matrix_and_t() -> impl Strategy<Value = (Vec<Vec<f64>>, Vec<f64>)> {
    (1usize..8, 1usize..40).prop_flat_map(|(k, b)| {
        (
            prop::collection::vec(prop::collection::vec(0.0..4.0_f64, k), b),
            prop::collection::vec(-6.0..6.0_f64, k),
        )
    })
}

// ── 1. Nesting ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn bonferroni_within_holm_within_bh(p in arb_p_values(), alpha in arb_alpha()) {
        let b = bonferroni(&p, alpha);
        let h = holm(&p, alpha);
        let bh = benjamini_hochberg(&p, alpha);
        prop_assert!(b.is_subset_of(&h));
        prop_assert!(h.is_subset_of(&bh));
    }
}

// ── 2. All-ones ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn unit_p_values_reject_nothing(k in 0usize..50, alpha in arb_alpha()) {
        let p = vec![1.0; k];
        prop_assert_eq!(bonferroni(&p, alpha).count(), 0);
        prop_assert_eq!(holm(&p, alpha).count(), 0);
        prop_assert_eq!(benjamini_hochberg(&p, alpha).count(), 0);
    }
}

// ── 3. Permutation invariance ────────────────────────────────────────

proptest! {
    #[test]
    fn holm_and_bh_ignore_input_order(
        (p, perm) in arb_p_values().prop_flat_map(|p| {
            let n = p.len();
            (Just(p), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
        }),
        alpha in arb_alpha(),
    ) {
        let permuted: Vec<f64> = perm.iter().map(|&i| p[i]).collect();
        for rule in [holm, benjamini_hochberg] {
            let original = rule(&p, alpha);
            let shuffled = rule(&permuted, alpha);
            // map decisions on the permuted vector back to original indices
            let mut back = vec![false; p.len()];
            for (pos, &i) in perm.iter().enumerate() {
                back[i] = shuffled.is_rejected(pos);
            }
            prop_assert_eq!(original, RejectionSet::from_vec(back));
        }
    }
}

// ── 4. Resample shape ────────────────────────────────────────────────

proptest! {
    #[test]
    fn resample_keeps_shape(
        (panel, labels) in arb_panel(),
        block_frac in 0.0..1.0_f64,
        seed in any::<u64>(),
    ) {
        let periods = panel.periods();
        let block_length = 1 + ((periods - 1) as f64 * block_frac) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        for scheme in [ResampleScheme::BlockCluster, ResampleScheme::MovingBlock, ResampleScheme::Cluster] {
            let out = BlockClusterResampler::new(block_length, scheme)
                .resample(&panel, &labels, &mut rng)
                .unwrap();
            prop_assert_eq!(out.shape(), panel.shape());
        }
    }
}

// ── 5. Step-down monotonicity ────────────────────────────────────────

proptest! {
    #[test]
    fn stepdown_rejections_are_a_prefix((rows, t) in arb_matrix_and_t(), alpha in arb_alpha()) {
        let matrix = BootstrapMatrix::from_rows(rows).unwrap();
        let walk = stepdown_walk(&t, &matrix, alpha).unwrap();
        let decisions: Vec<bool> = walk.order.iter().map(|&i| walk.rejections.is_rejected(i)).collect();
        for rank in 1..decisions.len() {
            prop_assert!(!decisions[rank] || decisions[rank - 1]);
        }
        for &p in &walk.adjusted_p_values {
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}

// ── 6. Undefined power ───────────────────────────────────────────────

proptest! {
    #[test]
    fn power_undefined_without_true_effects(decisions in prop::collection::vec(any::<bool>(), 0..20)) {
        let truth = GroundTruth::all_null(decisions.len());
        let record = evaluate(&RejectionSet::from_vec(decisions), &truth).unwrap();
        prop_assert_eq!(record.power, None);
    }
}

// ── 7. Threshold invariance to draw order ────────────────────────────

proptest! {
    #[test]
    fn threshold_depends_only_on_multiset(
        (maxima, shuffled) in prop::collection::vec(0.0..6.0_f64, 1..200).prop_flat_map(|v| {
            (Just(v.clone()), Just(v).prop_shuffle())
        }),
        alpha in arb_alpha(),
    ) {
        let a = BootstrapDistribution::from_maxima(maxima).threshold(alpha);
        let b = BootstrapDistribution::from_maxima(shuffled).threshold(alpha);
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }
}

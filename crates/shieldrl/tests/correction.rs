//! End-to-end correction scenarios: ensemble classifier plus boundary
//! search against scripted dynamics models.

use ndarray::{array, ArrayView1};
use rand::SeedableRng;
use shieldrl::dynamics::DynamicsPredictor;
use shieldrl::safety::{
    BoundarySearch, CorrectionConfig, CorrectionOutcome, EnsembleClassifier, SafetyIndex,
};
use shieldrl::spaces::ActionBounds;

/// Predicts a distance that shrinks linearly as the (1-D) action grows, so
/// the safety index crosses zero exactly at `threshold`.
struct ThresholdDynamics {
    threshold: f32,
}

impl DynamicsPredictor for ThresholdDynamics {
    fn predict_noisy(&self, _obs: &ArrayView1<f32>, action: &ArrayView1<f32>) -> (f32, f32) {
        // index = radius - d with k*ddot = 0, so d > radius iff a < threshold.
        let d = 0.3 + (self.threshold - action[0]);
        (d, 0.0)
    }
}

/// Always produces a NaN distance.
struct BrokenDynamics;

impl DynamicsPredictor for BrokenDynamics {
    fn predict_noisy(&self, _obs: &ArrayView1<f32>, _action: &ArrayView1<f32>) -> (f32, f32) {
        (f32::NAN, 0.0)
    }
}

fn index() -> SafetyIndex {
    SafetyIndex::new(1.0, 1.0, 0.0, 0.3)
}

#[test]
fn test_unsafe_nominal_corrected_to_threshold() {
    // Action space [-10, 10], nominal u = 5, dynamics reporting unsafe for
    // a > 3: the correction must settle on 3, not keep 5.
    let dynamics = ThresholdDynamics { threshold: 3.0 };
    let bounds = ActionBounds::symmetric(1, 10.0);
    let search = BoundarySearch::new(CorrectionConfig {
        ray_count: 1,
        max_trials: 1,
        ..Default::default()
    });

    let mut corrected = 0;
    for seed in 0..20 {
        let mut classifier =
            EnsembleClassifier::new(&dynamics, index(), array![0.0], 0.0, 5, 0.01);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let result = search.correct(&array![5.0].view(), &bounds, &mut classifier, &mut rng);

        if let Some(action) = result.action {
            assert_eq!(result.outcome, CorrectionOutcome::CorrectionFound);
            assert!(
                (action[0] - 3.0).abs() < 1e-3,
                "corrected action {} should sit on the safety boundary",
                action[0]
            );
            assert!(!result.candidates.is_empty());
            corrected += 1;
        }
    }
    assert!(corrected > 0, "no seed drew an inward search direction");
}

#[test]
fn test_safe_nominal_left_alone() {
    let dynamics = ThresholdDynamics { threshold: 3.0 };
    let bounds = ActionBounds::symmetric(1, 10.0);
    let search = BoundarySearch::new(CorrectionConfig {
        ray_count: 3,
        max_trials: 2,
        ..Default::default()
    });

    let mut classifier = EnsembleClassifier::new(&dynamics, index(), array![0.0], 0.0, 5, 0.01);
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let result = search.correct(&array![1.0].view(), &bounds, &mut classifier, &mut rng);

    assert!(result.action.is_none());
    assert_eq!(result.outcome, CorrectionOutcome::NominalAlreadySafe);
}

#[test]
fn test_broken_dynamics_fail_open() {
    // Non-finite predictions abort every ray; the call reports no correction
    // and the caller keeps the nominal action.
    let dynamics = BrokenDynamics;
    let bounds = ActionBounds::symmetric(2, 10.0);
    let search = BoundarySearch::new(CorrectionConfig::default());

    let mut classifier =
        EnsembleClassifier::new(&dynamics, index(), array![0.0, 0.0], 0.5, 5, 0.01);
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let result = search.correct(
        &array![2.0, -1.0].view(),
        &bounds,
        &mut classifier,
        &mut rng,
    );

    assert!(result.action.is_none());
    assert!(result.candidates.is_empty());
}

#[test]
fn test_two_dim_disc_correction_picks_minimum_norm() {
    // In 2-D the first sweep is the deterministic angular fan; with the
    // unsafe region {||a|| < 1}, every ray from the origin lands on the unit
    // circle and the minimum-norm pick is also on it.
    struct DiscDynamics;
    impl DynamicsPredictor for DiscDynamics {
        fn predict_noisy(&self, _obs: &ArrayView1<f32>, action: &ArrayView1<f32>) -> (f32, f32) {
            let n = action.iter().map(|&x| x * x).sum::<f32>().sqrt();
            // Safe (index < 0) iff ||a|| >= 1.
            (0.3 + (n - 1.0), 0.0)
        }
    }

    let dynamics = DiscDynamics;
    let bounds = ActionBounds::symmetric(2, 10.0);
    let search = BoundarySearch::new(CorrectionConfig {
        ray_count: 6,
        ..Default::default()
    });

    let mut classifier =
        EnsembleClassifier::new(&dynamics, index(), array![0.0, 0.0], 0.0, 5, 0.01);
    let mut rng = rand::rngs::StdRng::seed_from_u64(5);
    let result = search.correct(
        &array![0.0, 0.0].view(),
        &bounds,
        &mut classifier,
        &mut rng,
    );

    assert_eq!(result.outcome, CorrectionOutcome::CorrectionFound);
    let action = result.action.unwrap();
    let n = action.iter().map(|&x| x * x).sum::<f32>().sqrt();
    assert!((n - 1.0).abs() < 1e-3);
}

//! Bounded continuous action space.

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Per-axis bounds of a continuous action space.
///
/// Each axis carries its own `[low, high]` interval, so symmetric and
/// asymmetric control ranges are both representable.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionBounds {
    /// Lower bound for each axis
    pub low: Vec<f32>,
    /// Upper bound for each axis
    pub high: Vec<f32>,
}

impl ActionBounds {
    /// Create bounds from explicit per-axis intervals.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "low and high must have same length");
        for (l, h) in low.iter().zip(high.iter()) {
            assert!(h > l, "each axis must have high > low");
        }
        Self { low, high }
    }

    /// Symmetric bounds `[-ctrlrange, ctrlrange]` on every axis.
    pub fn symmetric(dim: usize, ctrlrange: f32) -> Self {
        Self::new(vec![-ctrlrange; dim], vec![ctrlrange; dim])
    }

    /// Number of action dimensions.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Whether every coordinate of `action` lies inside the bounds.
    pub fn contains(&self, action: &ArrayView1<f32>) -> bool {
        action
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(&a, (&l, &h))| a >= l && a <= h)
    }

    /// Clip each coordinate into its axis interval.
    pub fn clip(&self, action: &ArrayView1<f32>) -> Array1<f32> {
        Array1::from_iter(
            action
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .map(|(&a, (&l, &h))| a.clamp(l, h)),
        )
    }

    /// Sample a uniformly random in-bounds action.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f32> {
        Array1::from_iter(
            self.low
                .iter()
                .zip(self.high.iter())
                .map(|(&l, &h)| Uniform::new(l, h).sample(rng)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_contains() {
        let bounds = ActionBounds::symmetric(2, 10.0);
        assert!(bounds.contains(&array![3.0, -9.9].view()));
        assert!(!bounds.contains(&array![10.5, 0.0].view()));
        assert!(!bounds.contains(&array![0.0, -10.1].view()));
    }

    #[test]
    fn test_clip() {
        let bounds = ActionBounds::new(vec![-1.0, 0.0], vec![1.0, 2.0]);
        let clipped = bounds.clip(&array![5.0, -5.0].view());
        assert_eq!(clipped, array![1.0, 0.0]);
    }

    #[test]
    fn test_sample_in_bounds() {
        let bounds = ActionBounds::symmetric(3, 2.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let a = bounds.sample(&mut rng);
            assert!(bounds.contains(&a.view()));
        }
    }

    #[test]
    #[should_panic]
    fn test_degenerate_axis_rejected() {
        ActionBounds::new(vec![1.0], vec![1.0]);
    }
}

//! Ensemble statistics over repeated stochastic evaluations.

use smallvec::SmallVec;

/// A finished ensemble of scalar samples, typically safety-index values from
/// independent noisy forward passes of the dynamics model.
///
/// Construction rejects non-finite members: uncertainty statistics over
/// garbage are meaningless, so the caller gets `None` and must treat the
/// whole evaluation as a prediction fault.
#[derive(Clone, Debug)]
pub struct Ensemble {
    samples: SmallVec<[f32; 8]>,
}

impl Ensemble {
    /// Gather `n` samples from `draw`, failing on the first non-finite one.
    pub fn gather(n: usize, mut draw: impl FnMut() -> f32) -> Option<Self> {
        let mut samples = SmallVec::with_capacity(n);
        for _ in 0..n {
            let value = draw();
            if !value.is_finite() {
                return None;
            }
            samples.push(value);
        }
        Some(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample mean.
    pub fn mean(&self) -> f32 {
        let sum: f64 = self.samples.iter().map(|&v| v as f64).sum();
        (sum / self.samples.len() as f64) as f32
    }

    /// Population standard deviation.
    pub fn std(&self) -> f32 {
        let mean = self.mean() as f64;
        let var: f64 = self
            .samples
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64;
        var.sqrt() as f32
    }

    /// Upper confidence bound `mean + beta * std`.
    pub fn upper_bound(&self, beta: f32) -> f32 {
        self.mean() + beta * self.std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let mut vals = [1.0f32, 2.0, 3.0, 4.0].into_iter();
        let ens = Ensemble::gather(4, || vals.next().unwrap()).unwrap();
        assert!((ens.mean() - 2.5).abs() < 1e-6);
        // population std of [1,2,3,4] = sqrt(1.25)
        assert!((ens.std() - 1.25f32.sqrt()).abs() < 1e-6);
        assert!((ens.upper_bound(2.0) - (2.5 + 2.0 * 1.25f32.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn test_nan_rejected() {
        let mut vals = [1.0f32, f32::NAN, 3.0].into_iter();
        assert!(Ensemble::gather(3, || vals.next().unwrap()).is_none());
    }

    #[test]
    fn test_infinity_rejected() {
        let mut vals = [1.0f32, f32::INFINITY].into_iter();
        assert!(Ensemble::gather(2, || vals.next().unwrap()).is_none());
    }
}

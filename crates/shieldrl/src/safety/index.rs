//! Scalar safety index over (distance, distance-rate) features.

use crate::config::TrainerConfig;
use crate::tasks::TaskSpec;

/// Safety index `phi(d, ddot) = sigma + r^n - d^n - k*ddot`.
///
/// Values `<= 0` are conventionally safe. The constraint radius `r` comes
/// from the task's constraint family, which the registry has already
/// validated; an unconstrained task never reaches this type.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SafetyIndex {
    /// Velocity weight
    pub k: f32,
    /// Distance exponent
    pub n: f32,
    /// Safety margin
    pub sigma: f32,
    /// Constraint radius
    pub radius: f32,
}

impl SafetyIndex {
    pub fn new(k: f32, n: f32, sigma: f32, radius: f32) -> Self {
        Self { k, n, sigma, radius }
    }

    /// Build the index from a validated task and the trainer's safety
    /// hyperparameters.
    pub fn from_task(task: &TaskSpec, config: &TrainerConfig) -> Self {
        Self::new(
            config.adaptive_k,
            config.adaptive_n,
            config.adaptive_sigma,
            task.constraint.radius(),
        )
    }

    /// Evaluate the index for one (distance, rate) pair.
    pub fn evaluate(&self, d: f32, ddot: f32) -> f32 {
        self.sigma + self.radius.powf(self.n) - d.powf(self.n) - self.k * ddot
    }
}

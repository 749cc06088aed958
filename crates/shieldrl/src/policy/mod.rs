//! Policy and value-function seams.
//!
//! The trust-region engine and the trainer treat the actor-critic as opaque:
//! a sampler for rollouts, plus a differentiable surface exposed as flat
//! parameter vectors, gradients, and Fisher-vector products. The libtorch
//! implementation lives in `gaussian_mlp` behind the `torch` feature;
//! tests substitute analytic mocks.

#[cfg(feature = "torch")]
mod gaussian_mlp;

#[cfg(feature = "torch")]
pub use gaussian_mlp::{MlpConfig, MlpCritic, MlpGaussianActor};

use crate::distributed::Collective;
use crate::training::EpochBatch;
use ndarray::{Array1, ArrayView1};

/// Everything the rollout loop needs from one policy query. The value
/// estimate comes from the critic separately.
#[derive(Clone, Debug)]
pub struct ActionDecision {
    /// Sampled action
    pub action: Array1<f32>,
    /// Log-probability of the sampled action
    pub log_prob: f32,
    /// Distribution mean (stored for later KL computation)
    pub mean: Array1<f32>,
    /// Distribution log standard deviation per dimension
    pub log_std: Array1<f32>,
}

/// A policy that can be sampled during rollouts.
pub trait StochasticPolicy {
    fn act(&mut self, obs: &ArrayView1<f32>) -> ActionDecision;
}

/// Differentiable surface of the policy, flattened over all parameters.
///
/// `set_param_vec` overwrites the parameters wholesale; the trust-region
/// line search uses it to probe candidate points and to restore the old
/// parameters when the search fails.
pub trait PolicyObjective {
    /// Current parameters as one flat vector
    fn param_vec(&self) -> Array1<f32>;

    /// Overwrite all parameters from a flat vector
    fn set_param_vec(&mut self, params: &ArrayView1<f32>);

    /// Importance-weighted surrogate loss
    /// `-(exp(logp - logp_old) * adv).mean()`
    fn surrogate_loss(&self, batch: &EpochBatch) -> f64;

    /// Gradient of the surrogate loss w.r.t. the flat parameters
    fn surrogate_grad(&self, batch: &EpochBatch) -> Array1<f32>;

    /// Sample-mean KL divergence from the batch's stored (old) distribution
    /// parameters to the current policy
    fn mean_kl(&self, batch: &EpochBatch) -> f64;

    /// Hessian-of-KL applied to `x` (Fisher-vector product)
    fn fisher_vector_product(&self, batch: &EpochBatch, x: &ArrayView1<f32>) -> Array1<f32>;

    /// Mean entropy of the current policy over the batch (diagnostics)
    fn entropy(&self, batch: &EpochBatch) -> f64;
}

/// Separately-optimized state-value function.
pub trait ValueFunction {
    /// Value estimate of a single observation
    fn value(&self, obs: &ArrayView1<f32>) -> f32;

    /// Mean squared error against the batch returns
    fn loss(&self, batch: &EpochBatch) -> f64;

    /// One gradient-descent step on the value loss; gradients are averaged
    /// across workers before being applied. Returns the pre-step loss.
    fn train_step(&mut self, batch: &EpochBatch, collective: &dyn Collective) -> f64;

    /// Current parameters as one flat vector (checkpointing, broadcast)
    fn param_vec(&self) -> Array1<f32>;

    /// Overwrite all parameters from a flat vector
    fn set_param_vec(&mut self, params: &ArrayView1<f32>);
}

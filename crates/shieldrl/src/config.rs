//! Trainer configuration.

use crate::{Result, ShieldError};
use serde::{Deserialize, Serialize};

/// Configuration for the shielded trust-region trainer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainerConfig {
    // Training
    /// Environment steps collected per epoch (per worker)
    pub steps_per_epoch: usize,
    /// Number of epochs (policy updates), warmup included
    pub epochs: usize,
    /// Maximum episode length before truncation
    pub max_ep_len: usize,
    /// Fraction of epochs spent collecting dynamics data before shielding
    pub warmup_ratio: f64,

    // Trust region
    /// Discount factor
    pub gamma: f32,
    /// GAE lambda
    pub lam: f32,
    /// KL divergence budget per policy update
    pub target_kl: f64,
    /// Line search shrink factor
    pub backtrack_coeff: f64,
    /// Maximum line search steps
    pub backtrack_iters: usize,
    /// Conjugate gradient iteration cap
    pub cg_iters: usize,

    // Value function
    /// Value function learning rate
    pub vf_lr: f64,
    /// Gradient descent steps on the value loss per epoch
    pub train_v_iters: usize,

    // Safety shield
    /// Safety index velocity weight
    pub adaptive_k: f32,
    /// Safety index distance exponent
    pub adaptive_n: f32,
    /// Safety index margin
    pub adaptive_sigma: f32,
    /// Confidence coefficient on the ensemble standard deviation
    pub beta: f32,
    /// Stochastic forward passes per classification
    pub ensemble_size: usize,
    /// Search rays per correction call
    pub ray_count: usize,
    /// Independent retry attempts per ray
    pub max_trials: usize,

    // Dynamics model
    /// Supervised training epochs for the dynamics model
    pub dynamics_epochs: usize,
    /// Dynamics training minibatch size
    pub dynamics_batch_size: usize,
    /// Dynamics model learning rate
    pub dynamics_lr: f64,
    /// Dropout probability inside the dynamics model
    pub dynamics_dropout: f64,
    /// Weight of the L2 regularization penalty
    pub dynamics_lam: f64,

    // Checkpointing
    /// Save a checkpoint every N epochs (0 disables)
    pub save_freq: usize,
    /// Directory for checkpoints
    pub data_dir: String,

    // Random seed
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            steps_per_epoch: 30_000,
            epochs: 200,
            max_ep_len: 1000,
            warmup_ratio: 0.1,

            gamma: 0.99,
            lam: 0.97,
            target_kl: 0.02,
            backtrack_coeff: 0.8,
            backtrack_iters: 100,
            cg_iters: 100,

            vf_lr: 1e-3,
            train_v_iters: 80,

            adaptive_k: 1.0,
            adaptive_n: 1.0,
            adaptive_sigma: 0.04,
            beta: 0.01,
            ensemble_size: 5,
            ray_count: 5,
            max_trials: 1,

            dynamics_epochs: 50,
            dynamics_batch_size: 64,
            dynamics_lr: 1e-4,
            dynamics_dropout: 0.1,
            dynamics_lam: 1e-2,

            save_freq: 10,
            data_dir: "checkpoints".to_string(),

            seed: 0,
        }
    }
}

impl TrainerConfig {
    /// Number of epochs spent in the warmup (dynamics data collection) phase.
    pub fn warmup_epochs(&self) -> usize {
        (self.epochs as f64 * self.warmup_ratio) as usize
    }

    /// Capacity of the dynamics dataset: every warmup step contributes one sample.
    pub fn dynamics_dataset_size(&self) -> usize {
        self.steps_per_epoch * self.warmup_epochs()
    }

    /// Set total epochs
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set steps per epoch
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps_per_epoch = steps;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate cross-field consistency. Call once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.steps_per_epoch == 0 || self.epochs == 0 {
            return Err(ShieldError::ConfigError(
                "steps_per_epoch and epochs must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.warmup_ratio) {
            return Err(ShieldError::ConfigError(
                "warmup_ratio must lie in [0, 1)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&(self.gamma as f64)) || !(0.0..=1.0).contains(&(self.lam as f64))
        {
            return Err(ShieldError::ConfigError(
                "gamma and lam must lie in [0, 1]".into(),
            ));
        }
        if self.target_kl <= 0.0 {
            return Err(ShieldError::ConfigError("target_kl must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.backtrack_coeff) {
            return Err(ShieldError::ConfigError(
                "backtrack_coeff must lie in (0, 1)".into(),
            ));
        }
        if self.ensemble_size == 0 || self.ray_count == 0 || self.max_trials == 0 {
            return Err(ShieldError::ConfigError(
                "ensemble_size, ray_count and max_trials must be positive".into(),
            ));
        }
        Ok(())
    }
}

//! Rollout storage and the trust-region update.

mod buffer;
mod trainer;
mod trpo;

pub use buffer::{EpochBatch, RolloutBuffer};
pub use trainer::{EpochStats, Trainer};
pub use trpo::{conjugate_gradient, TrustRegion, UpdateReport};

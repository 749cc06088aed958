//! # ShieldRL
//!
//! State-wise safe reinforcement learning in Rust.
//!
//! ## Overview
//!
//! ShieldRL provides:
//! - A `SafeEnv` boundary for cost-aware simulators with explicit fault
//!   recovery (`Result<Transition, SimFault>`)
//! - A learned-dynamics safety shield: ensemble classification against a
//!   safety index plus boundary-seeking action correction
//! - Trust-region (natural gradient) policy optimization with a
//!   KL-constrained line search
//! - Single-trajectory rollout buffers with GAE-lambda post-processing
//!
//! ## Features
//!
//! - `default` - Core search/update algorithms without neural networks
//! - `torch` - MLP actor-critic and dropout dynamics model (requires libtorch)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shieldrl::prelude::*;
//! use shieldrl_envs::PlanarHazards;
//!
//! let task = task_registry().lookup("Goal_Point_8Hazards")?;
//! let mut env = PlanarHazards::from_task(&task, 42);
//! let obs = retry_reset(&mut env);
//! ```

pub mod checkpoint;
pub mod config;
pub mod distributed;
pub mod dynamics;
pub mod env;
pub mod log;
pub mod safety;
pub mod spaces;
pub mod tasks;
pub mod training;
pub mod utils;

// Neural-network policy and dynamics model (libtorch backend).
pub mod policy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::TrainerConfig;
    pub use crate::dynamics::{DynamicsDataset, DynamicsEstimator, DynamicsPredictor};
    pub use crate::env::{retry_reset, SafeEnv, SimFault, StepInfo, Transition};
    pub use crate::policy::{ActionDecision, PolicyObjective, StochasticPolicy, ValueFunction};
    pub use crate::safety::{
        ActionClassifier, BoundarySearch, Correction, CorrectionConfig, CorrectionOutcome,
        SafetyIndex, SafetyVerdict,
    };
    pub use crate::spaces::ActionBounds;
    pub use crate::tasks::{task_registry, ConstraintKind, TaskSpec};
    pub use crate::training::{EpochBatch, RolloutBuffer, Trainer, TrustRegion, UpdateReport};

    pub use crate::checkpoint::Checkpointable;
    pub use crate::checkpoint::{CheckpointConfig, CheckpointManager};
    pub use crate::distributed::{Collective, LocalCollective};
    pub use crate::log::{CompositeLogger, ConsoleLogger, MetricLogger};

    #[cfg(feature = "torch")]
    pub use crate::dynamics::DynamicsModel;
    #[cfg(feature = "torch")]
    pub use crate::policy::{MlpConfig, MlpCritic, MlpGaussianActor};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    /// Unsupported or inconsistent task configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Dynamics model error: {0}")]
    DynamicsError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[cfg(feature = "torch")]
    #[error("Tensor error: {0}")]
    TensorError(#[from] tch::TchError),
}

pub type Result<T> = core::result::Result<T, ShieldError>;

//! Checkpoint state and trait definitions.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Trait for components that can be checkpointed.
pub trait Checkpointable {
    /// Serialize the component's state to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore the component's state from bytes.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// Training metrics snapshot for checkpoints.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CheckpointMetrics {
    /// Mean episode return at checkpoint time
    pub mean_return: f64,
    /// Mean episode cost at checkpoint time
    pub mean_cost: f64,
    /// Cumulative constraint cost over the whole run
    pub cumulative_cost: f64,
}

/// Complete training checkpoint state.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointState {
    /// Training epoch number
    pub epoch: u64,
    /// Total environment steps taken
    pub global_step: u64,
    /// Flat policy parameter vector
    pub policy_params: Vec<f32>,
    /// Flat value-function parameter vector
    pub value_params: Vec<f32>,
    /// Serializable environment state, if the simulator provides one
    pub env_state: Option<Vec<u8>>,
    /// Training metrics at checkpoint time
    pub metrics: CheckpointMetrics,
    /// Unix timestamp when the checkpoint was created
    pub timestamp: u64,
    /// Library version
    pub version: String,
}

impl CheckpointState {
    pub fn new(
        epoch: u64,
        global_step: u64,
        policy_params: Vec<f32>,
        value_params: Vec<f32>,
        metrics: CheckpointMetrics,
    ) -> Self {
        Self {
            epoch,
            global_step,
            policy_params,
            value_params,
            env_state: None,
            metrics,
            timestamp: unix_timestamp(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn with_env_state(mut self, state: Vec<u8>) -> Self {
        self.env_state = Some(state);
        self
    }
}

fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        let state = CheckpointState::new(
            12,
            36_000,
            vec![0.1, -0.2],
            vec![0.5],
            CheckpointMetrics {
                mean_return: 4.0,
                mean_cost: 0.2,
                cumulative_cost: 100.0,
            },
        )
        .with_env_state(vec![1, 2, 3]);

        let bytes = serde_json::to_vec(&state).unwrap();
        let restored: CheckpointState = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(restored.epoch, 12);
        assert_eq!(restored.global_step, 36_000);
        assert_eq!(restored.policy_params, vec![0.1, -0.2]);
        assert_eq!(restored.env_state, Some(vec![1, 2, 3]));
        assert_eq!(restored.metrics.cumulative_cost, 100.0);
    }
}

//! Core environment trait definitions.

use crate::safety::SafetyIndex;
use crate::spaces::ActionBounds;
use ndarray::{Array1, ArrayView1};

/// A fault raised by the simulator. Expected and tolerated, never fatal to
/// the training loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimFault {
    /// The physics step diverged (NaN state, solver blow-up, ...).
    #[error("physics step failed: {0}")]
    StepFailed(String),
    /// The simulator could not produce a fresh initial state.
    #[error("environment reset failed: {0}")]
    ResetFailed(String),
}

/// Information returned from environment steps
#[derive(Clone, Debug, Default)]
pub struct StepInfo {
    /// Constraint-violation cost incurred this step
    pub cost: f32,
    /// Custom metrics (kept minimal for performance)
    pub extra: smallvec::SmallVec<[(&'static str, f32); 4]>,
}

impl StepInfo {
    pub fn with_cost(cost: f32) -> Self {
        Self {
            cost,
            ..Default::default()
        }
    }

    /// Add a custom metric (use rarely)
    pub fn with_extra(mut self, key: &'static str, value: f32) -> Self {
        self.extra.push((key, value));
        self
    }
}

/// Result from a single environment step
#[derive(Clone, Debug)]
pub struct Transition {
    /// Observation after the step
    pub observation: Array1<f32>,
    /// Reward received
    pub reward: f32,
    /// Whether the episode ended
    pub done: bool,
    /// Additional info (must carry the step cost)
    pub info: StepInfo,
}

/// Per-obstacle safety features read from the live simulator state.
#[derive(Clone, Debug)]
pub struct HazardReadings {
    /// Distance from the robot to each constrained obstacle
    pub distances: Array1<f32>,
    /// Rate of change of each distance (negative means approaching)
    pub rates: Array1<f32>,
}

impl HazardReadings {
    /// Index of the obstacle maximizing the simplified safety index
    /// `-d^n - k*ddot`, i.e. the most critical obstacle right now.
    pub fn most_critical(&self, k: f32, n: f32) -> usize {
        let mut best = 0;
        let mut best_val = f32::NEG_INFINITY;
        for (i, (&d, &ddot)) in self.distances.iter().zip(self.rates.iter()).enumerate() {
            let val = -d.powf(n) - k * ddot;
            if val > best_val {
                best_val = val;
                best = i;
            }
        }
        best
    }
}

/// Core trait for cost-aware simulators.
///
/// `step` and `reset` return `Result` rather than raising: simulator
/// instability is part of the contract, and callers recover explicitly.
pub trait SafeEnv: Send {
    /// Flat observation dimensionality
    fn observation_dim(&self) -> usize;

    /// Per-axis action bounds
    fn action_bounds(&self) -> ActionBounds;

    /// Reset to a fresh initial state
    fn reset(&mut self) -> Result<Array1<f32>, SimFault>;

    /// Advance the simulation by one control step
    fn step(&mut self, action: &ArrayView1<f32>) -> Result<Transition, SimFault>;

    /// Distances and distance rates to every constrained obstacle
    fn hazard_readings(&self) -> HazardReadings;

    /// Ground-truth safety index of the current state, used as the
    /// comparison baseline during action correction.
    ///
    /// Default: evaluate the index on every obstacle reading and take the
    /// worst (largest) value.
    fn measured_safety_index(&self, index: &SafetyIndex) -> f32 {
        let readings = self.hazard_readings();
        readings
            .distances
            .iter()
            .zip(readings.rates.iter())
            .map(|(&d, &ddot)| index.evaluate(d, ddot))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Physical duration of one control step (simulation timestep times
    /// frame skip).
    fn timestep(&self) -> f64;

    /// Optional serializable simulator state, stored inside checkpoints.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restore simulator state saved by [`SafeEnv::save_state`].
    fn load_state(&mut self, _state: &[u8]) {}
}

/// Reset the environment, retrying until the simulator produces a valid
/// initial state. Instability here is expected and tolerated.
pub fn retry_reset<E: SafeEnv + ?Sized>(env: &mut E) -> Array1<f32> {
    loop {
        match env.reset() {
            Ok(obs) => return obs,
            Err(fault) => {
                tracing::warn!(%fault, "environment reset failed, retrying");
            }
        }
    }
}

/// Step the environment, substituting a zero-reward terminal transition with
/// zero cost when the simulator faults. The observation is carried over
/// unchanged so the episode can be closed out cleanly.
pub fn fault_tolerant_step<E: SafeEnv + ?Sized>(
    env: &mut E,
    action: &ArrayView1<f32>,
    prev_obs: &Array1<f32>,
) -> Transition {
    match env.step(action) {
        Ok(transition) => transition,
        Err(fault) => {
            tracing::warn!(%fault, "simulation fault, discarding episode");
            Transition {
                observation: prev_obs.clone(),
                reward: 0.0,
                done: true,
                info: StepInfo::with_cost(0.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FlakyEnv {
        resets_until_ok: usize,
        fail_step: bool,
    }

    impl SafeEnv for FlakyEnv {
        fn observation_dim(&self) -> usize {
            1
        }

        fn action_bounds(&self) -> ActionBounds {
            ActionBounds::symmetric(1, 1.0)
        }

        fn reset(&mut self) -> Result<Array1<f32>, SimFault> {
            if self.resets_until_ok > 0 {
                self.resets_until_ok -= 1;
                Err(SimFault::ResetFailed("unstable".into()))
            } else {
                Ok(array![0.0])
            }
        }

        fn step(&mut self, _action: &ArrayView1<f32>) -> Result<Transition, SimFault> {
            if self.fail_step {
                Err(SimFault::StepFailed("nan in qpos".into()))
            } else {
                Ok(Transition {
                    observation: array![1.0],
                    reward: 1.0,
                    done: false,
                    info: StepInfo::with_cost(0.5),
                })
            }
        }

        fn hazard_readings(&self) -> HazardReadings {
            HazardReadings {
                distances: array![1.0],
                rates: array![0.0],
            }
        }

        fn timestep(&self) -> f64 {
            0.002
        }
    }

    #[test]
    fn test_retry_reset_survives_faults() {
        let mut env = FlakyEnv {
            resets_until_ok: 3,
            fail_step: false,
        };
        let obs = retry_reset(&mut env);
        assert_eq!(obs, array![0.0]);
    }

    #[test]
    fn test_fault_tolerant_step_synthesizes_terminal() {
        let mut env = FlakyEnv {
            resets_until_ok: 0,
            fail_step: true,
        };
        let prev = array![0.25];
        let t = fault_tolerant_step(&mut env, &array![0.0].view(), &prev);
        assert!(t.done);
        assert_eq!(t.reward, 0.0);
        assert_eq!(t.info.cost, 0.0);
        assert_eq!(t.observation, prev);
    }

    #[test]
    fn test_most_critical_obstacle() {
        let readings = HazardReadings {
            distances: array![2.0, 0.5, 1.0],
            rates: array![0.0, -0.1, 0.3],
        };
        // -0.5 + 0.1 = -0.4 beats -2.0 and -1.3
        assert_eq!(readings.most_critical(1.0, 1.0), 1);
    }
}

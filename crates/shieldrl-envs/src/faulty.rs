//! Fault-injecting wrapper for exercising recovery paths.

use ndarray::{Array1, ArrayView1};
use shieldrl::env::{HazardReadings, SafeEnv, SimFault, Transition};
use shieldrl::spaces::ActionBounds;

/// Wraps any environment and makes every `period`-th step (and every
/// `reset_period`-th reset) fail, the way an unstable simulator would.
pub struct Faulty<E: SafeEnv> {
    inner: E,
    period: usize,
    reset_period: usize,
    steps: usize,
    resets: usize,
}

impl<E: SafeEnv> Faulty<E> {
    pub fn new(inner: E, period: usize, reset_period: usize) -> Self {
        assert!(period > 1 && reset_period > 1);
        Self {
            inner,
            period,
            reset_period,
            steps: 0,
            resets: 0,
        }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: SafeEnv> SafeEnv for Faulty<E> {
    fn observation_dim(&self) -> usize {
        self.inner.observation_dim()
    }

    fn action_bounds(&self) -> ActionBounds {
        self.inner.action_bounds()
    }

    fn reset(&mut self) -> Result<Array1<f32>, SimFault> {
        self.resets += 1;
        if self.resets % self.reset_period == 0 {
            return Err(SimFault::ResetFailed("injected reset fault".into()));
        }
        self.inner.reset()
    }

    fn step(&mut self, action: &ArrayView1<f32>) -> Result<Transition, SimFault> {
        self.steps += 1;
        if self.steps % self.period == 0 {
            return Err(SimFault::StepFailed("injected step fault".into()));
        }
        self.inner.step(action)
    }

    fn hazard_readings(&self) -> HazardReadings {
        self.inner.hazard_readings()
    }

    fn timestep(&self) -> f64 {
        self.inner.timestep()
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        self.inner.save_state()
    }

    fn load_state(&mut self, state: &[u8]) {
        self.inner.load_state(state)
    }
}

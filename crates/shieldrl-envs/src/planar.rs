//! Planar point robot among circular hazards.

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shieldrl::env::{HazardReadings, SafeEnv, SimFault, StepInfo, Transition};
use shieldrl::spaces::ActionBounds;
use shieldrl::tasks::TaskSpec;

const ARENA_HALF: f32 = 3.0;
const SIM_TIMESTEP: f64 = 0.002;
const FRAME_SKIP: usize = 10;
const DRAG: f32 = 0.9;

/// A double-integrator point robot steered by 2-D acceleration commands,
/// rewarded for approaching a goal and costed for entering hazard discs.
pub struct PlanarHazards {
    pos: [f32; 2],
    vel: [f32; 2],
    goal: [f32; 2],
    hazards: Vec<[f32; 2]>,
    hazard_size: f32,
    goal_size: f32,
    indicator_cost: bool,
    ctrlrange: f32,
    rng: StdRng,
}

impl PlanarHazards {
    /// Build the environment from a validated task description.
    pub fn from_task(task: &TaskSpec, seed: u64) -> Self {
        let mut env = Self {
            pos: [0.0, 0.0],
            vel: [0.0, 0.0],
            goal: [0.0, 0.0],
            hazards: vec![[0.0, 0.0]; task.constraint.count()],
            hazard_size: task.constraint.radius(),
            goal_size: task.goal_size,
            indicator_cost: task.indicator_cost,
            ctrlrange: task.ctrlrange,
            rng: StdRng::seed_from_u64(seed),
        };
        env.scatter();
        env
    }

    fn scatter(&mut self) {
        self.pos = [0.0, 0.0];
        self.vel = [0.0, 0.0];
        self.goal = self.random_point();
        for i in 0..self.hazards.len() {
            // Keep hazards off the spawn point so episodes never start in
            // violation.
            loop {
                let p = self.random_point();
                let d = (p[0] * p[0] + p[1] * p[1]).sqrt();
                if d > self.hazard_size * 2.0 {
                    self.hazards[i] = p;
                    break;
                }
            }
        }
    }

    fn random_point(&mut self) -> [f32; 2] {
        [
            self.rng.gen_range(-ARENA_HALF..ARENA_HALF),
            self.rng.gen_range(-ARENA_HALF..ARENA_HALF),
        ]
    }

    fn goal_dist(&self) -> f32 {
        let dx = self.goal[0] - self.pos[0];
        let dy = self.goal[1] - self.pos[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn observation(&self) -> Array1<f32> {
        let mut obs = Vec::with_capacity(self.observation_dim());
        obs.extend_from_slice(&self.pos);
        obs.extend_from_slice(&self.vel);
        obs.push(self.goal[0] - self.pos[0]);
        obs.push(self.goal[1] - self.pos[1]);
        for h in &self.hazards {
            obs.push(h[0] - self.pos[0]);
            obs.push(h[1] - self.pos[1]);
        }
        Array1::from_vec(obs)
    }

    fn cost(&self) -> f32 {
        let mut cost = 0.0;
        for h in &self.hazards {
            let dx = h[0] - self.pos[0];
            let dy = h[1] - self.pos[1];
            let d = (dx * dx + dy * dy).sqrt();
            if d < self.hazard_size {
                if self.indicator_cost {
                    return 1.0;
                }
                cost += self.hazard_size - d;
            }
        }
        cost
    }
}

impl SafeEnv for PlanarHazards {
    fn observation_dim(&self) -> usize {
        6 + 2 * self.hazards.len()
    }

    fn action_bounds(&self) -> ActionBounds {
        ActionBounds::symmetric(2, self.ctrlrange)
    }

    fn reset(&mut self) -> Result<Array1<f32>, SimFault> {
        self.scatter();
        Ok(self.observation())
    }

    fn step(&mut self, action: &ArrayView1<f32>) -> Result<Transition, SimFault> {
        if action.len() != 2 {
            return Err(SimFault::StepFailed(format!(
                "expected 2 action dims, got {}",
                action.len()
            )));
        }

        let dt = self.timestep() as f32;
        let prev_goal_dist = self.goal_dist();

        let ax = action[0].clamp(-self.ctrlrange, self.ctrlrange);
        let ay = action[1].clamp(-self.ctrlrange, self.ctrlrange);
        self.vel[0] = self.vel[0] * DRAG + ax * dt;
        self.vel[1] = self.vel[1] * DRAG + ay * dt;
        self.pos[0] = (self.pos[0] + self.vel[0] * dt).clamp(-ARENA_HALF, ARENA_HALF);
        self.pos[1] = (self.pos[1] + self.vel[1] * dt).clamp(-ARENA_HALF, ARENA_HALF);

        if !self.pos[0].is_finite() || !self.pos[1].is_finite() {
            return Err(SimFault::StepFailed("non-finite robot state".into()));
        }

        let mut reward = prev_goal_dist - self.goal_dist();
        let mut done = false;
        if self.goal_dist() < self.goal_size {
            reward += 1.0;
            done = true;
        }

        Ok(Transition {
            observation: self.observation(),
            reward,
            done,
            info: StepInfo::with_cost(self.cost()),
        })
    }

    fn hazard_readings(&self) -> HazardReadings {
        let n = self.hazards.len();
        let mut distances = Array1::zeros(n);
        let mut rates = Array1::zeros(n);
        for (i, h) in self.hazards.iter().enumerate() {
            let dx = h[0] - self.pos[0];
            let dy = h[1] - self.pos[1];
            let d = (dx * dx + dy * dy).sqrt().max(1e-6);
            distances[i] = d;
            // d' = -(h - p) . v / d: negative while closing in.
            rates[i] = -(dx * self.vel[0] + dy * self.vel[1]) / d;
        }
        HazardReadings { distances, rates }
    }

    fn timestep(&self) -> f64 {
        SIM_TIMESTEP * FRAME_SKIP as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldrl::safety::SafetyIndex;
    use shieldrl::tasks::task_registry;

    fn env() -> PlanarHazards {
        let task = task_registry().lookup("Goal_Point_8Hazards").unwrap();
        PlanarHazards::from_task(&task, 7)
    }

    #[test]
    fn test_reset_and_dims() {
        let mut env = env();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), env.observation_dim());
        assert_eq!(env.action_bounds().dim(), 2);
    }

    #[test]
    fn test_step_moves_toward_goal_under_thrust() {
        let mut env = env();
        env.reset().unwrap();
        // Aim straight at the goal for a while; net reward must be positive.
        let mut total = 0.0;
        for _ in 0..200 {
            let to_goal = [env.goal[0] - env.pos[0], env.goal[1] - env.pos[1]];
            let norm = (to_goal[0] * to_goal[0] + to_goal[1] * to_goal[1])
                .sqrt()
                .max(1e-6);
            let action = ndarray::array![
                to_goal[0] / norm * env.ctrlrange,
                to_goal[1] / norm * env.ctrlrange
            ];
            let t = env.step(&action.view()).unwrap();
            total += t.reward;
            if t.done {
                break;
            }
        }
        assert!(total > 0.0);
    }

    #[test]
    fn test_hazard_rate_sign() {
        let mut env = env();
        env.reset().unwrap();
        env.hazards = vec![[1.0, 0.0]];
        env.pos = [0.0, 0.0];
        env.vel = [1.0, 0.0];

        let readings = env.hazard_readings();
        assert!((readings.distances[0] - 1.0).abs() < 1e-5);
        // Moving toward the hazard: distance is shrinking.
        assert!(readings.rates[0] < 0.0);
    }

    #[test]
    fn test_cost_inside_hazard() {
        let mut env = env();
        env.reset().unwrap();
        env.hazards = vec![[0.05, 0.0]];
        env.pos = [0.0, 0.0];
        assert!(env.cost() > 0.0);

        env.pos = [2.0, 2.0];
        assert_eq!(env.cost(), 0.0);
    }

    #[test]
    fn test_measured_index_matches_worst_hazard() {
        let mut env = env();
        env.reset().unwrap();
        env.hazards = vec![[2.0, 0.0], [0.5, 0.0]];
        env.pos = [0.0, 0.0];
        env.vel = [0.0, 0.0];

        let index = SafetyIndex::new(1.0, 1.0, 0.0, 0.3);
        let measured = env.measured_safety_index(&index);
        // Closest hazard at 0.5 dominates: 0.3 - 0.5 = -0.2.
        assert!((measured + 0.2).abs() < 1e-5);
    }
}

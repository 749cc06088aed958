//! Rollout buffer with GAE-lambda post-processing.

use crate::distributed::Collective;
use crate::utils::discount_cumsum;
use ndarray::{s, Array1, Array2, ArrayView1};

/// One epoch of rollout data, advantages normalized, ready for the
/// trust-region update.
#[derive(Clone, Debug)]
pub struct EpochBatch {
    pub obs: Array2<f32>,
    pub act: Array2<f32>,
    pub ret: Array1<f32>,
    pub adv: Array1<f32>,
    pub logp: Array1<f32>,
    pub mu: Array2<f32>,
    pub logstd: Array2<f32>,
}

impl EpochBatch {
    pub fn len(&self) -> usize {
        self.obs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.nrows() == 0
    }
}

/// Fixed-capacity storage for the trajectories of one epoch.
///
/// `ptr` advances monotonically with each `store`; `path_start_idx` marks the
/// beginning of the current (possibly unfinished) trajectory. `finish_path`
/// closes a trajectory and writes its GAE advantages and discounted
/// returns-to-go; `get` is legal only on a full buffer and logically clears
/// it without reallocating.
pub struct RolloutBuffer {
    obs: Array2<f32>,
    act: Array2<f32>,
    rew: Array1<f32>,
    val: Array1<f32>,
    logp: Array1<f32>,
    mu: Array2<f32>,
    logstd: Array2<f32>,
    adv: Array1<f32>,
    ret: Array1<f32>,
    gamma: f32,
    lam: f32,
    ptr: usize,
    path_start_idx: usize,
    capacity: usize,
}

impl RolloutBuffer {
    pub fn new(obs_dim: usize, act_dim: usize, capacity: usize, gamma: f32, lam: f32) -> Self {
        Self {
            obs: Array2::zeros((capacity, obs_dim)),
            act: Array2::zeros((capacity, act_dim)),
            rew: Array1::zeros(capacity),
            val: Array1::zeros(capacity),
            logp: Array1::zeros(capacity),
            mu: Array2::zeros((capacity, act_dim)),
            logstd: Array2::zeros((capacity, act_dim)),
            adv: Array1::zeros(capacity),
            ret: Array1::zeros(capacity),
            gamma,
            lam,
            ptr: 0,
            path_start_idx: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.ptr
    }

    pub fn is_empty(&self) -> bool {
        self.ptr == 0
    }

    pub fn is_full(&self) -> bool {
        self.ptr == self.capacity
    }

    /// Append one timestep of agent-environment interaction.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        obs: &ArrayView1<f32>,
        act: &ArrayView1<f32>,
        rew: f32,
        val: f32,
        logp: f32,
        mu: &ArrayView1<f32>,
        logstd: &ArrayView1<f32>,
    ) {
        assert!(self.ptr < self.capacity, "rollout buffer overflow");
        self.obs.row_mut(self.ptr).assign(obs);
        self.act.row_mut(self.ptr).assign(act);
        self.rew[self.ptr] = rew;
        self.val[self.ptr] = val;
        self.logp[self.ptr] = logp;
        self.mu.row_mut(self.ptr).assign(mu);
        self.logstd.row_mut(self.ptr).assign(logstd);
        self.ptr += 1;
    }

    /// Close the current trajectory, bootstrapping with `last_val`.
    ///
    /// `last_val` should be 0 when the trajectory ended in a terminal state
    /// and V(s_T) when it was cut off by a timeout or the epoch boundary.
    pub fn finish_path(&mut self, last_val: f32) {
        let start = self.path_start_idx;
        let end = self.ptr;
        if start == end {
            return;
        }

        let n = end - start;
        let mut rews = Array1::zeros(n + 1);
        let mut vals = Array1::zeros(n + 1);
        rews.slice_mut(s![..n]).assign(&self.rew.slice(s![start..end]));
        vals.slice_mut(s![..n]).assign(&self.val.slice(s![start..end]));
        rews[n] = last_val;
        vals[n] = last_val;

        // GAE-lambda advantages from the one-step TD residuals.
        let mut deltas = Array1::zeros(n);
        for t in 0..n {
            deltas[t] = rews[t] + self.gamma * vals[t + 1] - vals[t];
        }
        let adv = discount_cumsum(&deltas.view(), self.gamma * self.lam);
        self.adv.slice_mut(s![start..end]).assign(&adv);

        // Discounted rewards-to-go, targets for the value function.
        let ret = discount_cumsum(&rews.view(), self.gamma);
        self.ret
            .slice_mut(s![start..end])
            .assign(&ret.slice(s![..n]));

        self.path_start_idx = self.ptr;
    }

    /// Extract the epoch's data with advantages normalized to zero mean and
    /// unit std (statistics computed across all workers), resetting the
    /// buffer for the next epoch.
    pub fn get(&mut self, collective: &dyn Collective) -> EpochBatch {
        assert!(self.is_full(), "rollout buffer must be full before get");
        self.ptr = 0;
        self.path_start_idx = 0;

        let (adv_mean, adv_std) = collective.stats(&self.adv.view());
        let adv = self.adv.mapv(|a| (a - adv_mean) / adv_std);

        EpochBatch {
            obs: self.obs.clone(),
            act: self.act.clone(),
            ret: self.ret.clone(),
            adv,
            logp: self.logp.clone(),
            mu: self.mu.clone(),
            logstd: self.logstd.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::LocalCollective;
    use ndarray::array;

    fn fill(buffer: &mut RolloutBuffer, n: usize, rew: f32, val: f32) {
        for _ in 0..n {
            buffer.store(
                &array![0.0, 0.0].view(),
                &array![0.0].view(),
                rew,
                val,
                -0.5,
                &array![0.0].view(),
                &array![-0.5].view(),
            );
        }
    }

    #[test]
    fn test_gae_three_step_hand_computed() {
        // rewards = [1, 1, 1], values = 0, last_val = 0, gamma = 0.99,
        // lambda = 0.95: deltas are all 1, so
        //   adv = [1 + q + q^2, 1 + q, 1] with q = 0.9405
        //   ret = [1 + g + g^2, 1 + g, 1] with g = 0.99
        let mut buffer = RolloutBuffer::new(2, 1, 3, 0.99, 0.95);
        fill(&mut buffer, 3, 1.0, 0.0);
        buffer.finish_path(0.0);

        let batch = buffer.get(&LocalCollective);

        // Advantages are normalized by get(); check returns exactly and the
        // advantage ordering plus normalization moments instead.
        assert!((batch.ret[0] - 2.9701).abs() < 1e-5);
        assert!((batch.ret[1] - 1.99).abs() < 1e-5);
        assert!((batch.ret[2] - 1.0).abs() < 1e-5);
        assert!(batch.adv[0] > batch.adv[1] && batch.adv[1] > batch.adv[2]);
    }

    #[test]
    fn test_gae_unnormalized_values() {
        // Same trajectory, inspected before normalization via the raw
        // advantage buffer.
        let mut buffer = RolloutBuffer::new(2, 1, 3, 0.99, 0.95);
        fill(&mut buffer, 3, 1.0, 0.0);
        buffer.finish_path(0.0);

        let q = 0.99f32 * 0.95;
        assert!((buffer.adv[2] - 1.0).abs() < 1e-6);
        assert!((buffer.adv[1] - (1.0 + q)).abs() < 1e-5);
        assert!((buffer.adv[0] - (1.0 + q + q * q)).abs() < 1e-5);
    }

    #[test]
    fn test_bootstrap_value_enters_tail() {
        let mut buffer = RolloutBuffer::new(2, 1, 2, 1.0, 1.0);
        fill(&mut buffer, 2, 0.0, 0.0);
        buffer.finish_path(10.0);
        // With gamma = lam = 1 and zero rewards, every advantage equals the
        // bootstrap value and returns include it undiscounted.
        assert!((buffer.adv[0] - 10.0).abs() < 1e-5);
        assert!((buffer.ret[1] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_get_normalizes_and_resets() {
        let mut buffer = RolloutBuffer::new(2, 1, 4, 0.99, 0.95);
        for i in 0..4 {
            buffer.store(
                &array![0.0, 0.0].view(),
                &array![0.0].view(),
                i as f32,
                0.0,
                0.0,
                &array![0.0].view(),
                &array![0.0].view(),
            );
            buffer.finish_path(0.0);
        }
        let batch = buffer.get(&LocalCollective);

        let mean = batch.adv.iter().sum::<f32>() / 4.0;
        let var = batch.adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var.sqrt() - 1.0).abs() < 1e-4);

        assert_eq!(buffer.ptr, 0);
        assert_eq!(buffer.path_start_idx, 0);
        // Cleared logically: storing is legal again.
        fill(&mut buffer, 1, 0.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_store_past_capacity_panics() {
        let mut buffer = RolloutBuffer::new(2, 1, 2, 0.99, 0.95);
        fill(&mut buffer, 3, 0.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "must be full")]
    fn test_get_before_full_panics() {
        let mut buffer = RolloutBuffer::new(2, 1, 4, 0.99, 0.95);
        fill(&mut buffer, 2, 0.0, 0.0);
        buffer.finish_path(0.0);
        let _ = buffer.get(&LocalCollective);
    }

    #[test]
    fn test_two_paths_are_independent() {
        // Second path's terminal reward must not leak into the first.
        let mut buffer = RolloutBuffer::new(2, 1, 4, 1.0, 1.0);
        fill(&mut buffer, 2, 1.0, 0.0);
        buffer.finish_path(0.0);
        fill(&mut buffer, 2, 100.0, 0.0);
        buffer.finish_path(0.0);

        assert!((buffer.ret[0] - 2.0).abs() < 1e-5);
        assert!((buffer.ret[2] - 200.0).abs() < 1e-4);
    }
}

//! Full training-loop integration: warmup, dynamics fit, shielded rollouts,
//! and trust-region updates over the synthetic planar environment, with
//! scripted policy/value/dynamics collaborators standing in for the neural
//! networks.

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shieldrl::config::TrainerConfig;
use shieldrl::distributed::Collective;
use shieldrl::dynamics::{DynamicsData, DynamicsEstimator, DynamicsPredictor, FitReport};
use shieldrl::policy::{ActionDecision, PolicyObjective, StochasticPolicy, ValueFunction};
use shieldrl::tasks::task_registry;
use shieldrl::training::{EpochBatch, Trainer};
use shieldrl_envs::{Faulty, PlanarHazards};

/// Zero-mean Gaussian policy with a fixed log-std and a tiny parameter
/// vector; its objective surface is flat so every line search accepts the
/// zero-KL step immediately.
struct ScriptedPolicy {
    params: Array1<f32>,
    act_dim: usize,
    rng: StdRng,
}

impl ScriptedPolicy {
    fn new(act_dim: usize, seed: u64) -> Self {
        Self {
            params: Array1::zeros(4),
            act_dim,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl StochasticPolicy for ScriptedPolicy {
    fn act(&mut self, _obs: &ArrayView1<f32>) -> ActionDecision {
        let action =
            Array1::from_iter((0..self.act_dim).map(|_| self.rng.gen_range(-1.0f32..1.0)));
        ActionDecision {
            action,
            log_prob: -0.5,
            mean: Array1::zeros(self.act_dim),
            log_std: Array1::zeros(self.act_dim),
        }
    }
}

impl PolicyObjective for ScriptedPolicy {
    fn param_vec(&self) -> Array1<f32> {
        self.params.clone()
    }

    fn set_param_vec(&mut self, params: &ArrayView1<f32>) {
        self.params = params.to_owned();
    }

    fn surrogate_loss(&self, _batch: &EpochBatch) -> f64 {
        0.0
    }

    fn surrogate_grad(&self, _batch: &EpochBatch) -> Array1<f32> {
        Array1::zeros(self.params.len())
    }

    fn mean_kl(&self, _batch: &EpochBatch) -> f64 {
        0.0
    }

    fn fisher_vector_product(&self, _batch: &EpochBatch, x: &ArrayView1<f32>) -> Array1<f32> {
        x.to_owned()
    }

    fn entropy(&self, _batch: &EpochBatch) -> f64 {
        1.4
    }
}

struct ScriptedValue {
    params: Array1<f32>,
    steps_taken: usize,
}

impl ScriptedValue {
    fn new() -> Self {
        Self {
            params: Array1::zeros(2),
            steps_taken: 0,
        }
    }
}

impl ValueFunction for ScriptedValue {
    fn value(&self, _obs: &ArrayView1<f32>) -> f32 {
        0.0
    }

    fn loss(&self, batch: &EpochBatch) -> f64 {
        batch.ret.iter().map(|&r| (r as f64).powi(2)).sum::<f64>() / batch.len() as f64
    }

    fn train_step(&mut self, batch: &EpochBatch, _collective: &dyn Collective) -> f64 {
        self.steps_taken += 1;
        self.loss(batch)
    }

    fn param_vec(&self) -> Array1<f32> {
        self.params.clone()
    }

    fn set_param_vec(&mut self, params: &ArrayView1<f32>) {
        self.params = params.to_owned();
    }
}

/// Dynamics stub that reports a comfortably safe constant prediction and
/// records whether `fit` consumed a full dataset.
struct ScriptedDynamics {
    fitted_samples: usize,
}

impl ScriptedDynamics {
    fn new() -> Self {
        Self { fitted_samples: 0 }
    }
}

impl DynamicsPredictor for ScriptedDynamics {
    fn predict_noisy(&self, _obs: &ArrayView1<f32>, _action: &ArrayView1<f32>) -> (f32, f32) {
        (5.0, 0.0)
    }
}

impl DynamicsEstimator for ScriptedDynamics {
    fn fit(&mut self, data: &DynamicsData) -> shieldrl::Result<FitReport> {
        self.fitted_samples = data.len();
        Ok(FitReport {
            epoch_losses: vec![1.0, 0.5],
            test_loss: 0.4,
            train_len: data.len() * 7 / 10,
            test_len: data.len() - data.len() * 7 / 10,
        })
    }
}

fn tiny_config() -> TrainerConfig {
    TrainerConfig {
        steps_per_epoch: 40,
        epochs: 4,
        max_ep_len: 10,
        warmup_ratio: 0.25,
        train_v_iters: 3,
        ensemble_size: 3,
        ray_count: 2,
        seed: 42,
        ..Default::default()
    }
}

#[test]
fn test_full_training_schedule() {
    let task = task_registry().lookup("Goal_Point_8Hazards").unwrap();
    let env = PlanarHazards::from_task(&task, 9);
    let act_dim = 2;

    let config = tiny_config();
    let mut trainer = Trainer::new(
        env,
        ScriptedPolicy::new(act_dim, 1),
        ScriptedValue::new(),
        ScriptedDynamics::new(),
        &task,
        config.clone(),
    )
    .unwrap();

    let stats = trainer.run().unwrap();

    // 4 epochs, 1 of them warmup.
    assert_eq!(stats.len(), 3);
    assert!(trainer.shield_ready());
    assert_eq!(
        trainer.global_step(),
        (config.epochs * config.steps_per_epoch) as u64
    );

    for s in &stats {
        // The flat objective accepts immediately at j = 0 with zero KL.
        assert_eq!(s.update.accepted_step, Some(0));
        assert!(s.update.kl.abs() < 1e-9);
        assert!(s.cumulative_cost >= 0.0);
        assert!(s.cost_rate >= 0.0);
        assert!(s.mean_len > 0.0);
    }
}

#[test]
fn test_training_survives_simulator_faults() {
    let task = task_registry().lookup("Goal_Point_8Hazards").unwrap();
    let env = Faulty::new(PlanarHazards::from_task(&task, 21), 7, 3);

    let mut trainer = Trainer::new(
        env,
        ScriptedPolicy::new(2, 2),
        ScriptedValue::new(),
        ScriptedDynamics::new(),
        &task,
        tiny_config(),
    )
    .unwrap();

    // Injected step and reset faults must not abort the schedule.
    let stats = trainer.run().unwrap();
    assert_eq!(stats.len(), 3);
}

#[test]
fn test_dynamics_dataset_feeds_fit() {
    let task = task_registry().lookup("Goal_Point_8Hazards").unwrap();
    let env = PlanarHazards::from_task(&task, 33);
    let config = tiny_config();
    let warmup_samples = config.steps_per_epoch * config.warmup_epochs();

    let mut trainer = Trainer::new(
        env,
        ScriptedPolicy::new(2, 3),
        ScriptedValue::new(),
        ScriptedDynamics::new(),
        &task,
        config,
    )
    .unwrap();
    trainer.run().unwrap();

    // fit() saw exactly one sample per warmup step.
    assert!(trainer.shield_ready());
    assert_eq!(trainer.dynamics().fitted_samples, warmup_samples);
}

//! Shielded trust-region training loop.

use super::{RolloutBuffer, TrustRegion, UpdateReport};
use crate::checkpoint::{Checkpointable, CheckpointManager, CheckpointMetrics, CheckpointState};
use crate::config::TrainerConfig;
use crate::distributed::{Collective, LocalCollective};
use crate::dynamics::{DynamicsDataset, DynamicsEstimator};
use crate::env::{fault_tolerant_step, retry_reset, SafeEnv};
use crate::log::{EpochTracker, MetricLogger, NoOpLogger};
use crate::policy::{PolicyObjective, StochasticPolicy, ValueFunction};
use crate::safety::{BoundarySearch, CorrectionConfig, EnsembleClassifier, SafetyIndex};
use crate::spaces::ActionBounds;
use crate::tasks::TaskSpec;
use crate::{Result, ShieldError};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Per-epoch summary returned by [`Trainer::run`].
#[derive(Clone, Debug)]
pub struct EpochStats {
    pub epoch: usize,
    pub mean_return: f64,
    pub mean_cost: f64,
    pub mean_len: f64,
    /// Mean number of shield interventions per finished episode
    pub mean_interventions: f64,
    pub cumulative_cost: f64,
    pub cost_rate: f64,
    pub update: UpdateReport,
    pub loss_v_old: f64,
    pub loss_v: f64,
}

/// Closed-loop safety-shielded trainer.
///
/// Warmup epochs collect (state, action, distance, distance-rate) pairs for
/// the dynamics model while running unshielded prestage updates; afterwards
/// the model is trained once and every rollout action passes through the
/// boundary-seeking correction before reaching the simulator.
pub struct Trainer<E, P, V, D>
where
    E: SafeEnv,
    P: StochasticPolicy + PolicyObjective,
    V: ValueFunction,
    D: DynamicsEstimator,
{
    config: TrainerConfig,
    env: E,
    policy: P,
    vf: V,
    dynamics: D,
    index: SafetyIndex,
    bounds: ActionBounds,
    buffer: RolloutBuffer,
    dataset: DynamicsDataset,
    search: BoundarySearch,
    trust_region: TrustRegion,
    collective: Box<dyn Collective>,
    logger: Box<dyn MetricLogger>,
    checkpoints: Option<CheckpointManager>,
    rng: StdRng,

    epoch: usize,
    global_step: u64,
    cum_cost: f64,
    shield_ready: bool,
    tracker: EpochTracker,
    last_metrics: CheckpointMetrics,
    progress: Option<ProgressBar>,
}

impl<E, P, V, D> Trainer<E, P, V, D>
where
    E: SafeEnv,
    P: StochasticPolicy + PolicyObjective,
    V: ValueFunction,
    D: DynamicsEstimator,
{
    pub fn new(
        env: E,
        policy: P,
        vf: V,
        dynamics: D,
        task: &TaskSpec,
        config: TrainerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let bounds = env.action_bounds();
        let obs_dim = env.observation_dim();
        let act_dim = bounds.dim();

        let buffer = RolloutBuffer::new(
            obs_dim,
            act_dim,
            config.steps_per_epoch,
            config.gamma,
            config.lam,
        );
        let dataset = DynamicsDataset::new(obs_dim, act_dim, config.dynamics_dataset_size());

        let search = BoundarySearch::new(CorrectionConfig {
            ray_count: config.ray_count,
            max_trials: config.max_trials,
            ..Default::default()
        });
        let trust_region = TrustRegion::new(
            config.target_kl,
            config.backtrack_coeff,
            config.backtrack_iters,
            config.cg_iters,
        );
        let index = SafetyIndex::from_task(task, &config);
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            env,
            policy,
            vf,
            dynamics,
            index,
            bounds,
            buffer,
            dataset,
            search,
            trust_region,
            collective: Box::new(LocalCollective),
            logger: Box::new(NoOpLogger),
            checkpoints: None,
            rng,
            epoch: 0,
            global_step: 0,
            cum_cost: 0.0,
            shield_ready: false,
            tracker: EpochTracker::new(),
            last_metrics: CheckpointMetrics::default(),
            progress: None,
        })
    }

    pub fn with_collective(mut self, collective: Box<dyn Collective>) -> Self {
        // Workers of the same group must diverge in their sampling streams.
        self.rng = StdRng::seed_from_u64(self.config.seed + 10_000 * collective.rank() as u64);
        self.collective = collective;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn MetricLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    pub fn with_progress(mut self) -> Self {
        let total = (self.config.epochs * self.config.steps_per_epoch) as u64;
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .expect("valid progress template"),
        );
        self.progress = Some(pb);
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn value_function(&self) -> &V {
        &self.vf
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn shield_ready(&self) -> bool {
        self.shield_ready
    }

    /// Run the full training schedule. Returns per-epoch statistics for the
    /// post-warmup epochs.
    pub fn run(&mut self) -> Result<Vec<EpochStats>> {
        crate::utils::set_seed(self.config.seed + 10_000 * self.collective.rank() as u64);
        self.sync_initial_params();

        let warmup_epochs = self.config.warmup_epochs();
        if warmup_epochs == 0 {
            tracing::warn!("warmup_ratio yields zero warmup epochs; shield stays disabled");
        }

        let start = Instant::now();
        let mut stats = Vec::new();
        let mut obs = retry_reset(&mut self.env);

        while self.epoch < self.config.epochs {
            let warmup = self.epoch < warmup_epochs;

            if !warmup && !self.shield_ready && warmup_epochs > 0 {
                self.train_dynamics()?;
            }

            self.collect_epoch(&mut obs, warmup);
            let (update, loss_v_old, loss_v) = self.update();

            if !warmup {
                let epoch_stats = self.epoch_stats(warmup_epochs, update, loss_v_old, loss_v);
                self.log_epoch(&epoch_stats, start.elapsed().as_secs_f64());
                self.maybe_checkpoint(&epoch_stats)?;
                stats.push(epoch_stats);
            } else {
                self.tracker.drain();
            }

            self.epoch += 1;
        }

        Ok(stats)
    }

    /// Broadcast rank 0's parameters so all workers start identical.
    fn sync_initial_params(&mut self) {
        let mut pi = self.policy.param_vec();
        self.collective.broadcast(&mut pi);
        self.policy.set_param_vec(&pi.view());

        let mut v = self.vf.param_vec();
        self.collective.broadcast(&mut v);
        self.vf.set_param_vec(&v.view());
    }

    fn train_dynamics(&mut self) -> Result<()> {
        if !self.dataset.is_full() {
            return Err(ShieldError::TrainingError(format!(
                "dynamics dataset incomplete: {} of {} samples",
                self.dataset.len(),
                self.config.dynamics_dataset_size()
            )));
        }
        tracing::info!("training dynamics model");
        let data = self.dataset.get();
        let report = self.dynamics.fit(&data)?;
        tracing::info!(test_loss = report.test_loss, "dynamics model ready");
        self.shield_ready = true;
        Ok(())
    }

    /// Collect one epoch of experience into the rollout buffer (and, during
    /// warmup, into the dynamics dataset).
    fn collect_epoch(&mut self, obs: &mut Array1<f32>, warmup: bool) {
        let steps = self.config.steps_per_epoch;
        let mut ep_ret = 0.0f64;
        let mut ep_cost = 0.0f64;
        let mut ep_len = 0usize;
        let mut ep_interventions = 0usize;
        let mut ep_start = Instant::now();

        for t in 0..steps {
            let decision = self.policy.act(&obs.view());
            let value = self.vf.value(&obs.view());

            let (executed, intervened) = if self.shield_ready && !warmup {
                self.shield(obs, &decision.action)
            } else {
                (decision.action.clone(), false)
            };
            if intervened {
                ep_interventions += 1;
            }

            let transition = fault_tolerant_step(&mut self.env, &executed.view(), obs);

            if warmup {
                // Label with the most critical obstacle's post-step features:
                // the model learns to predict where the constraint is headed.
                let readings = self.env.hazard_readings();
                let i = readings.most_critical(self.index.k, self.index.n);
                self.dataset.store(
                    &obs.view(),
                    &decision.action.view(),
                    readings.distances[i],
                    readings.rates[i],
                );
            }

            // The buffer stores the nominal action: the stored log-prob
            // belongs to it, not to the shielded one.
            self.buffer.store(
                &obs.view(),
                &decision.action.view(),
                transition.reward,
                value,
                decision.log_prob,
                &decision.mean.view(),
                &decision.log_std.view(),
            );

            ep_ret += transition.reward as f64;
            ep_cost += transition.info.cost as f64;
            self.cum_cost += transition.info.cost as f64;
            ep_len += 1;
            self.global_step += 1;

            *obs = transition.observation;

            let timeout = ep_len == self.config.max_ep_len;
            let terminal = transition.done || timeout;
            let epoch_ended = t == steps - 1;

            if terminal || epoch_ended {
                if epoch_ended && !terminal {
                    tracing::warn!(ep_len, "trajectory cut off by epoch boundary");
                }
                // Bootstrap unless the episode genuinely ended.
                let last_val = if timeout || epoch_ended {
                    self.vf.value(&obs.view())
                } else {
                    0.0
                };
                self.buffer.finish_path(last_val);

                if terminal {
                    self.tracker.store("EpRet", ep_ret);
                    self.tracker.store("EpCost", ep_cost);
                    self.tracker.store("EpLen", ep_len as f64);
                    self.tracker.store("EpShield", ep_interventions as f64);
                    self.tracker
                        .store("EpTime", ep_start.elapsed().as_secs_f64());
                }

                *obs = retry_reset(&mut self.env);
                ep_ret = 0.0;
                ep_cost = 0.0;
                ep_len = 0;
                ep_interventions = 0;
                ep_start = Instant::now();
            }
        }
    }

    /// Run the boundary-seeking correction on a nominal action. Fail-open:
    /// when no valid boundary point exists, the nominal action is executed
    /// unmodified.
    fn shield(&mut self, obs: &Array1<f32>, nominal: &Array1<f32>) -> (Array1<f32>, bool) {
        let current_index = self.env.measured_safety_index(&self.index);
        let mut classifier = EnsembleClassifier::new(
            &self.dynamics,
            self.index,
            obs.clone(),
            current_index,
            self.config.ensemble_size,
            self.config.beta,
        );

        let correction =
            self.search
                .correct(&nominal.view(), &self.bounds, &mut classifier, &mut self.rng);

        match correction.action {
            Some(action) => (action, true),
            None => (nominal.clone(), false),
        }
    }

    /// Trust-region policy step plus value regression.
    fn update(&mut self) -> (UpdateReport, f64, f64) {
        let batch = self.buffer.get(self.collective.as_ref());

        let loss_v_old = self.vf.loss(&batch);
        let report = self.trust_region.update(&mut self.policy, &batch);

        for _ in 0..self.config.train_v_iters {
            self.vf.train_step(&batch, self.collective.as_ref());
        }
        let loss_v = self.vf.loss(&batch);

        (report, loss_v_old, loss_v)
    }

    fn epoch_stats(
        &mut self,
        warmup_epochs: usize,
        update: UpdateReport,
        loss_v_old: f64,
        loss_v: f64,
    ) -> EpochStats {
        let cumulative_cost = self.collective.sum_scalar(self.cum_cost);
        let shielded_epochs = (self.epoch + 1 - warmup_epochs) as f64;
        let global_steps_per_epoch =
            (self.config.steps_per_epoch * self.collective.world_size()) as f64;
        let cost_rate = cumulative_cost / (shielded_epochs * global_steps_per_epoch);

        EpochStats {
            epoch: self.epoch - warmup_epochs,
            mean_return: self.tracker.mean("EpRet").unwrap_or(0.0),
            mean_cost: self.tracker.mean("EpCost").unwrap_or(0.0),
            mean_len: self.tracker.mean("EpLen").unwrap_or(0.0),
            mean_interventions: self.tracker.mean("EpShield").unwrap_or(0.0),
            cumulative_cost,
            cost_rate,
            update,
            loss_v_old,
            loss_v,
        }
    }

    fn log_epoch(&mut self, stats: &EpochStats, elapsed: f64) {
        let mut metrics = self.tracker.drain();
        metrics.insert("CumulativeCost".into(), stats.cumulative_cost);
        metrics.insert("CostRate".into(), stats.cost_rate);
        metrics.insert(
            "TotalEnvInteracts".into(),
            ((stats.epoch + 1) * self.config.steps_per_epoch) as f64,
        );
        metrics.insert("LossPi".into(), stats.update.loss_pi_old);
        metrics.insert(
            "DeltaLossPi".into(),
            stats.update.loss_pi - stats.update.loss_pi_old,
        );
        metrics.insert("LossV".into(), stats.loss_v_old);
        metrics.insert("DeltaLossV".into(), stats.loss_v - stats.loss_v_old);
        metrics.insert("KL".into(), stats.update.kl);
        metrics.insert("Entropy".into(), stats.update.entropy);
        metrics.insert("EpochS".into(), stats.update.step_scale);
        metrics.insert("Time".into(), elapsed);

        if self.collective.is_root() {
            self.logger.log_metrics(&metrics, stats.epoch as u64);
        }

        if let Some(ref pb) = self.progress {
            pb.set_position(self.global_step);
            let sps = self.global_step as f64 / elapsed.max(1e-9);
            pb.set_message(format!(
                "Ret: {:.2} Cost: {:.2} KL: {:.4} SPS: {:.0}",
                stats.mean_return, stats.mean_cost, stats.update.kl, sps
            ));
        }
    }

    fn maybe_checkpoint(&mut self, stats: &EpochStats) -> Result<()> {
        if !self.collective.is_root() {
            return Ok(());
        }
        if let Some(mut manager) = self.checkpoints.take() {
            let last_metrics = CheckpointMetrics {
                mean_return: stats.mean_return,
                mean_cost: stats.mean_cost,
                cumulative_cost: stats.cumulative_cost,
            };
            self.last_metrics = last_metrics;
            let result = manager.maybe_save(self, self.epoch as u64, stats.mean_return);
            self.checkpoints = Some(manager);
            result?;
        }
        Ok(())
    }
}

impl<E, P, V, D> Checkpointable for Trainer<E, P, V, D>
where
    E: SafeEnv,
    P: StochasticPolicy + PolicyObjective,
    V: ValueFunction,
    D: DynamicsEstimator,
{
    fn save_state(&self) -> Result<Vec<u8>> {
        let mut state = CheckpointState::new(
            self.epoch as u64,
            self.global_step,
            self.policy.param_vec().to_vec(),
            self.vf.param_vec().to_vec(),
            self.last_metrics.clone(),
        );
        if let Some(env_state) = self.env.save_state() {
            state = state.with_env_state(env_state);
        }
        Ok(serde_json::to_vec(&state)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let state: CheckpointState = serde_json::from_slice(data)?;
        self.policy
            .set_param_vec(&Array1::from_vec(state.policy_params).view());
        self.vf
            .set_param_vec(&Array1::from_vec(state.value_params).view());
        if let Some(env_state) = state.env_state {
            self.env.load_state(&env_state);
        }
        self.epoch = state.epoch as usize;
        self.global_step = state.global_step;
        self.cum_cost = state.metrics.cumulative_cost;
        Ok(())
    }
}

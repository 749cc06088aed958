//! ShieldRL CLI
//!
//! Command-line launcher for shielded safe-RL training runs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shieldrl::prelude::*;
use shieldrl_envs::PlanarHazards;

#[derive(Parser)]
#[command(name = "shieldrl")]
#[command(version, about = "State-wise safe RL in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a shielded policy on a task (requires --features torch)
    Train {
        /// Task name from the registry
        #[arg(default_value = "Goal_Point_8Hazards")]
        task: String,

        /// Epochs (warmup included)
        #[arg(long, default_value = "200")]
        epochs: usize,

        /// Environment steps per epoch
        #[arg(long, default_value = "30000")]
        steps: usize,

        /// KL budget per policy update
        #[arg(long, default_value = "0.02")]
        target_kl: f64,

        /// Fraction of epochs spent collecting dynamics data
        #[arg(long, default_value = "0.1")]
        warmup_ratio: f64,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Checkpoint directory (empty string disables checkpointing)
        #[arg(long, default_value = "checkpoints")]
        data_dir: String,
    },

    /// List registered tasks
    ListTasks,

    /// Roll a random policy through an environment
    Demo {
        /// Task name from the registry
        #[arg(default_value = "Goal_Point_8Hazards")]
        task: String,

        /// Number of steps
        #[arg(long, default_value = "200")]
        steps: usize,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            task: _task,
            epochs: _epochs,
            steps: _steps,
            target_kl: _target_kl,
            warmup_ratio: _warmup_ratio,
            seed: _seed,
            data_dir: _data_dir,
        } => {
            #[cfg(feature = "torch")]
            {
                train(
                    &_task,
                    _epochs,
                    _steps,
                    _target_kl,
                    _warmup_ratio,
                    _seed,
                    &_data_dir,
                )?;
            }
            #[cfg(not(feature = "torch"))]
            {
                tracing::error!("Training requires the 'torch' feature. Rebuild with:");
                tracing::error!("  cargo build --features torch");
                tracing::error!("Note: libtorch must be installed. See README.md for details.");
            }
        }
        Commands::ListTasks => {
            for name in task_registry().names() {
                println!("{}", name);
            }
        }
        Commands::Demo { task, steps, seed } => {
            demo(&task, steps, seed)?;
        }
    }

    Ok(())
}

fn demo(task_name: &str, steps: usize, seed: u64) -> Result<()> {
    use rand::SeedableRng;

    let task = task_registry().lookup(task_name)?;
    let mut env = PlanarHazards::from_task(&task, seed);
    let bounds = env.action_bounds();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut obs = retry_reset(&mut env);
    let mut total_reward = 0.0f64;
    let mut total_cost = 0.0f64;
    let mut episodes = 0usize;

    for _ in 0..steps {
        let action = bounds.sample(&mut rng);
        let t = shieldrl::env::fault_tolerant_step(&mut env, &action.view(), &obs);
        total_reward += t.reward as f64;
        total_cost += t.info.cost as f64;
        if t.done {
            episodes += 1;
            obs = retry_reset(&mut env);
        } else {
            obs = t.observation;
        }
    }

    tracing::info!(
        steps,
        episodes,
        total_reward,
        total_cost,
        "demo finished"
    );
    Ok(())
}

#[cfg(feature = "torch")]
fn train(
    task_name: &str,
    epochs: usize,
    steps: usize,
    target_kl: f64,
    warmup_ratio: f64,
    seed: u64,
    data_dir: &str,
) -> Result<()> {
    use shieldrl::checkpoint::CheckpointConfig;
    use shieldrl::dynamics::DynamicsModel;
    use shieldrl::policy::{MlpConfig, MlpCritic, MlpGaussianActor};
    use shieldrl::training::Trainer;
    use tch::Device;

    let task = task_registry().lookup(task_name)?;
    let config = TrainerConfig {
        epochs,
        steps_per_epoch: steps,
        target_kl,
        warmup_ratio,
        seed,
        data_dir: data_dir.to_string(),
        ..Default::default()
    };

    let device = Device::cuda_if_available();
    let env = PlanarHazards::from_task(&task, seed);
    let obs_dim = env.observation_dim() as i64;
    let act_dim = env.action_bounds().dim() as i64;

    let net_config = MlpConfig::default();
    let actor = MlpGaussianActor::new(obs_dim, act_dim, &net_config, device);
    let critic = MlpCritic::new(obs_dim, &net_config, config.vf_lr, device)?;
    let dynamics = DynamicsModel::new(
        obs_dim + act_dim,
        shieldrl::dynamics::DynamicsModelConfig {
            dropout_prob: config.dynamics_dropout,
            model_lam: config.dynamics_lam,
            lr: config.dynamics_lr,
            batch_size: config.dynamics_batch_size as i64,
            epochs: config.dynamics_epochs,
            ..Default::default()
        },
        device,
    );

    tracing::info!(task = %task.name, epochs, steps, "starting training");

    let mut trainer = Trainer::new(env, actor, critic, dynamics, &task, config)?
        .with_logger(Box::new(ConsoleLogger::new()))
        .with_progress();
    if !data_dir.is_empty() {
        trainer = trainer.with_checkpoints(shieldrl::checkpoint::CheckpointManager::new(
            CheckpointConfig::new(data_dir),
        ));
    }

    let stats = trainer.run()?;
    if let Some(last) = stats.last() {
        tracing::info!(
            mean_return = last.mean_return,
            mean_cost = last.mean_cost,
            cost_rate = last.cost_rate,
            "training finished"
        );
    }
    Ok(())
}

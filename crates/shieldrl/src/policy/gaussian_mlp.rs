//! Diagonal-Gaussian MLP actor and MLP critic (libtorch backend).

use super::{ActionDecision, PolicyObjective, StochasticPolicy, ValueFunction};
use crate::distributed::Collective;
use crate::training::EpochBatch;
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1};
use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Tensor};

const LOG_2PI: f64 = 1.8378770664093453;

/// Network shape shared by actor and critic.
#[derive(Clone, Debug)]
pub struct MlpConfig {
    pub hidden_sizes: Vec<i64>,
    /// Initial (state-independent) log standard deviation of the actor
    pub init_log_std: f64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 64],
            init_log_std: -0.5,
        }
    }
}

fn mlp(root: &nn::Path, in_dim: i64, hidden: &[i64], out_dim: i64) -> nn::Sequential {
    let mut net = nn::seq();
    let mut dim = in_dim;
    for (i, &h) in hidden.iter().enumerate() {
        net = net
            .add(nn::linear(
                root / format!("hidden_{}", i),
                dim,
                h,
                Default::default(),
            ))
            .add_fn(|x| x.tanh());
        dim = h;
    }
    net.add(nn::linear(root / "out", dim, out_dim, Default::default()))
}

/// Trainable variables of a store in a deterministic (name-sorted) order, so
/// flat parameter vectors are stable across calls.
fn sorted_vars(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

fn flat_param_vec(vs: &nn::VarStore) -> Array1<f32> {
    let mut out = Vec::new();
    for (_, var) in sorted_vars(vs) {
        let flat: Vec<f32> =
            Vec::try_from(var.flatten(0, -1).to_device(Device::Cpu)).expect("param to vec");
        out.extend(flat);
    }
    Array1::from_vec(out)
}

fn set_flat_param_vec(vs: &nn::VarStore, params: &ArrayView1<f32>) {
    tch::no_grad(|| {
        let mut offset = 0usize;
        for (_, mut var) in sorted_vars(vs) {
            let numel = var.numel();
            let chunk: Vec<f32> = params
                .slice(ndarray::s![offset..offset + numel])
                .iter()
                .copied()
                .collect();
            let src = Tensor::from_slice(&chunk)
                .to_device(var.device())
                .view_as(&var);
            var.copy_(&src);
            offset += numel;
        }
        assert_eq!(offset, params.len(), "flat parameter vector size mismatch");
    });
}

fn obs_tensor(obs: &Array2<f32>, device: Device) -> Tensor {
    Tensor::from_slice(obs.as_slice().expect("contiguous obs"))
        .view([obs.nrows() as i64, obs.ncols() as i64])
        .to_device(device)
}

/// Diagonal Gaussian policy with a state-independent log-std vector.
pub struct MlpGaussianActor {
    vs: nn::VarStore,
    net: nn::Sequential,
    log_std: Tensor,
    obs_dim: i64,
    act_dim: i64,
    device: Device,
}

impl MlpGaussianActor {
    pub fn new(obs_dim: i64, act_dim: i64, config: &MlpConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let net = mlp(&(&root / "pi"), obs_dim, &config.hidden_sizes, act_dim);
        let log_std = root.var(
            "log_std",
            &[act_dim],
            nn::Init::Const(config.init_log_std),
        );

        Self {
            vs,
            net,
            log_std,
            obs_dim,
            act_dim,
            device,
        }
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn num_params(&self) -> i64 {
        self.vs.variables().values().map(|v| v.numel() as i64).sum()
    }

    pub fn save(&self, path: &str) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Per-sample log probability of `act` under the current policy.
    fn log_prob(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let mean = self.net.forward(obs);
        let log_std = &self.log_std;
        let std = log_std.exp();
        let z = (act - mean) / std;
        let per_dim: Tensor = z.pow_tensor_scalar(2) * (-0.5)
            - log_std
            - Tensor::from(0.5 * LOG_2PI).to_device(self.device);
        per_dim.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
    }

    /// Surrogate loss tensor, differentiable w.r.t. the actor parameters.
    fn surrogate_tensor(&self, batch: &EpochBatch) -> Tensor {
        let obs = obs_tensor(&batch.obs, self.device);
        let act = obs_tensor(&batch.act, self.device);
        let adv = Tensor::from_slice(batch.adv.as_slice().expect("contiguous adv"))
            .to_device(self.device);
        let logp_old = Tensor::from_slice(batch.logp.as_slice().expect("contiguous logp"))
            .to_device(self.device);

        let logp = self.log_prob(&obs, &act);
        let ratio = (logp - logp_old).exp();
        -(ratio * adv).mean(Kind::Float)
    }

    /// Sample-mean KL from the stored rollout distribution to the current
    /// policy, differentiable w.r.t. the current parameters.
    fn kl_tensor(&self, batch: &EpochBatch) -> Tensor {
        let obs = obs_tensor(&batch.obs, self.device);
        let mu_old = obs_tensor(&batch.mu, self.device);
        let log_std_old = obs_tensor(&batch.logstd, self.device);

        let mu = self.net.forward(&obs);
        let log_std = &self.log_std;
        let var = (log_std * 2.0).exp();
        let var_old = (&log_std_old * 2.0).exp();

        // KL(old || new) for diagonal Gaussians, summed over action dims.
        let per_dim: Tensor = log_std - log_std_old
            + (var_old + (mu_old - mu).pow_tensor_scalar(2)) / (var * 2.0)
            - 0.5;
        per_dim
            .sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            .mean(Kind::Float)
    }

    fn trainable_tensors(&self) -> Vec<Tensor> {
        sorted_vars(&self.vs)
            .into_iter()
            .map(|(_, t)| t)
            .collect()
    }

    fn flatten_grads(grads: Vec<Tensor>) -> Array1<f32> {
        let mut out = Vec::new();
        for g in grads {
            let flat: Vec<f32> =
                Vec::try_from(g.flatten(0, -1).to_device(Device::Cpu)).expect("grad to vec");
            out.extend(flat);
        }
        Array1::from_vec(out)
    }
}

impl StochasticPolicy for MlpGaussianActor {
    fn act(&mut self, obs: &ArrayView1<f32>) -> ActionDecision {
        tch::no_grad(|| {
            let obs_t = Tensor::from_slice(obs.as_slice().expect("contiguous obs"))
                .to_device(self.device)
                .view([1, self.obs_dim]);

            let mean = self.net.forward(&obs_t);
            let std = self.log_std.exp();
            let noise = Tensor::randn([1, self.act_dim], (Kind::Float, self.device));
            let action = &mean + noise * &std;

            let z = (&action - &mean) / &std;
            let logp = (z.pow_tensor_scalar(2) * (-0.5)
                - &self.log_std
                - Tensor::from(0.5 * LOG_2PI).to_device(self.device))
            .sum(Kind::Float)
            .double_value(&[]) as f32;

            let to_array = |t: &Tensor| -> Array1<f32> {
                Array1::from_vec(
                    Vec::try_from(t.flatten(0, -1).to_device(Device::Cpu)).expect("tensor to vec"),
                )
            };

            ActionDecision {
                action: to_array(&action),
                log_prob: logp,
                mean: to_array(&mean),
                log_std: to_array(&self.log_std),
            }
        })
    }
}

impl PolicyObjective for MlpGaussianActor {
    fn param_vec(&self) -> Array1<f32> {
        flat_param_vec(&self.vs)
    }

    fn set_param_vec(&mut self, params: &ArrayView1<f32>) {
        set_flat_param_vec(&self.vs, params);
    }

    fn surrogate_loss(&self, batch: &EpochBatch) -> f64 {
        tch::no_grad(|| self.surrogate_tensor(batch).double_value(&[]))
    }

    fn surrogate_grad(&self, batch: &EpochBatch) -> Array1<f32> {
        let loss = self.surrogate_tensor(batch);
        let vars = self.trainable_tensors();
        let grads = Tensor::run_backward(&[loss], &vars, false, false);
        Self::flatten_grads(grads)
    }

    fn mean_kl(&self, batch: &EpochBatch) -> f64 {
        tch::no_grad(|| self.kl_tensor(batch).double_value(&[]))
    }

    fn fisher_vector_product(&self, batch: &EpochBatch, x: &ArrayView1<f32>) -> Array1<f32> {
        let kl = self.kl_tensor(batch);
        let vars = self.trainable_tensors();

        // First derivative with the graph kept so it can be differentiated
        // again against the dot product with x.
        let grads = Tensor::run_backward(&[kl], &vars, true, true);
        let flat: Vec<Tensor> = grads.iter().map(|g| g.flatten(0, -1)).collect();
        let jacobian = Tensor::cat(&flat, 0);

        let x_vec: Vec<f32> = x.iter().copied().collect();
        let x_t = Tensor::from_slice(&x_vec).to_device(self.device);
        let dot = (jacobian * x_t).sum(Kind::Float);

        let hessian_x = Tensor::run_backward(&[dot], &vars, false, false);
        Self::flatten_grads(hessian_x)
    }

    fn entropy(&self, batch: &EpochBatch) -> f64 {
        // Gaussian entropy depends only on the (state-independent) log-std.
        let _ = batch;
        tch::no_grad(|| {
            let per_dim: Tensor = &self.log_std + 0.5 + 0.5 * LOG_2PI;
            per_dim.sum(Kind::Float).double_value(&[])
        })
    }
}

/// MLP state-value function with its own Adam optimizer.
pub struct MlpCritic {
    vs: nn::VarStore,
    net: nn::Sequential,
    optimizer: nn::Optimizer,
    obs_dim: i64,
    device: Device,
}

impl MlpCritic {
    pub fn new(obs_dim: i64, config: &MlpConfig, lr: f64, device: Device) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let net = mlp(&(&root / "v"), obs_dim, &config.hidden_sizes, 1);
        let optimizer = nn::Adam::default().build(&vs, lr)?;

        Ok(Self {
            vs,
            net,
            optimizer,
            obs_dim,
            device,
        })
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn num_params(&self) -> i64 {
        self.vs.variables().values().map(|v| v.numel() as i64).sum()
    }

    fn loss_tensor(&self, batch: &EpochBatch) -> Tensor {
        let obs = obs_tensor(&batch.obs, self.device);
        let ret = Tensor::from_slice(batch.ret.as_slice().expect("contiguous ret"))
            .to_device(self.device);
        let v = self.net.forward(&obs).squeeze_dim(-1);
        (v - ret).pow_tensor_scalar(2).mean(Kind::Float)
    }
}

impl ValueFunction for MlpCritic {
    fn value(&self, obs: &ArrayView1<f32>) -> f32 {
        tch::no_grad(|| {
            let obs_t = Tensor::from_slice(obs.as_slice().expect("contiguous obs"))
                .to_device(self.device)
                .view([1, self.obs_dim]);
            self.net.forward(&obs_t).double_value(&[0, 0]) as f32
        })
    }

    fn loss(&self, batch: &EpochBatch) -> f64 {
        tch::no_grad(|| self.loss_tensor(batch).double_value(&[]))
    }

    fn train_step(&mut self, batch: &EpochBatch, collective: &dyn Collective) -> f64 {
        self.optimizer.zero_grad();
        let loss = self.loss_tensor(batch);
        let loss_value = loss.double_value(&[]);
        loss.backward();

        // Average gradients across workers before applying the step.
        if collective.world_size() > 1 {
            tch::no_grad(|| {
                for (_, var) in sorted_vars(&self.vs) {
                    let mut grad = var.grad();
                    let mut flat = Array1::from_vec(
                        Vec::try_from(grad.flatten(0, -1).to_device(Device::Cpu))
                            .expect("grad to vec"),
                    );
                    collective.average(&mut flat);
                    let chunk: Vec<f32> = flat.to_vec();
                    let src = Tensor::from_slice(&chunk)
                        .to_device(var.device())
                        .view_as(&grad);
                    grad.copy_(&src);
                }
            });
        }

        self.optimizer.step();
        loss_value
    }

    fn param_vec(&self) -> Array1<f32> {
        flat_param_vec(&self.vs)
    }

    fn set_param_vec(&mut self, params: &ArrayView1<f32>) {
        set_flat_param_vec(&self.vs, params);
    }
}

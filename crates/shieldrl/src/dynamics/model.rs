//! Dropout MLP dynamics model (libtorch backend).

use super::{DynamicsData, DynamicsEstimator, DynamicsPredictor, FitReport};
use crate::Result;
use ndarray::ArrayView1;
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};

/// Hyperparameters of the dynamics regressor.
#[derive(Clone, Debug)]
pub struct DynamicsModelConfig {
    pub hidden_dims: Vec<i64>,
    pub dropout_prob: f64,
    /// Weight of the L2 penalty added to the training loss
    pub model_lam: f64,
    pub lr: f64,
    pub batch_size: i64,
    pub epochs: usize,
}

impl Default for DynamicsModelConfig {
    fn default() -> Self {
        Self {
            hidden_dims: vec![64, 128, 256, 512],
            dropout_prob: 0.1,
            model_lam: 1e-2,
            lr: 1e-4,
            batch_size: 64,
            epochs: 50,
        }
    }
}

/// MLP mapping concat(obs, action) to (distance, distance-rate), with
/// dropout after every hidden layer.
///
/// Dropout plays two roles: regularization during training, and the noise
/// source for ensemble predictions at correction time (`predict_noisy` keeps
/// it active; `predict` does not).
pub struct DynamicsModel {
    vs: nn::VarStore,
    hidden: Vec<nn::Linear>,
    head: nn::Linear,
    config: DynamicsModelConfig,
    device: Device,
}

impl DynamicsModel {
    pub fn new(input_dim: i64, config: DynamicsModelConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let mut hidden = Vec::with_capacity(config.hidden_dims.len());
        let mut in_dim = input_dim;
        for (i, &h) in config.hidden_dims.iter().enumerate() {
            hidden.push(nn::linear(
                &root / format!("hidden_{}", i),
                in_dim,
                h,
                Default::default(),
            ));
            in_dim = h;
        }
        let head = nn::linear(&root / "head", in_dim, 2, Default::default());

        Self {
            vs,
            hidden,
            head,
            config,
            device,
        }
    }

    /// Forward pass; `noisy` keeps dropout sampling active.
    fn forward(&self, input: &Tensor, noisy: bool) -> Tensor {
        let mut x = input.shallow_clone();
        for layer in &self.hidden {
            x = x.apply(layer).relu().dropout(self.config.dropout_prob, noisy);
        }
        x.apply(&self.head)
    }

    /// L2 penalty over all weights, scaled by `model_lam`.
    fn regularization(&self) -> Tensor {
        let mut penalty = Tensor::zeros([], (Kind::Float, self.device));
        for (name, var) in self.vs.variables() {
            if name.contains("weight") {
                penalty = penalty + var.pow_tensor_scalar(2).sum(Kind::Float);
            }
        }
        penalty * self.config.model_lam
    }

    /// Deterministic prediction (dropout disabled).
    pub fn predict(&self, obs: &ArrayView1<f32>, action: &ArrayView1<f32>) -> (f32, f32) {
        self.run(obs, action, false)
    }

    fn run(&self, obs: &ArrayView1<f32>, action: &ArrayView1<f32>, noisy: bool) -> (f32, f32) {
        let mut input: Vec<f32> = Vec::with_capacity(obs.len() + action.len());
        input.extend(obs.iter().copied());
        input.extend(action.iter().copied());

        tch::no_grad(|| {
            let input = Tensor::from_slice(&input)
                .to_device(self.device)
                .view([1, -1]);
            let output = self.forward(&input, noisy).squeeze().to_device(Device::Cpu);
            (
                output.double_value(&[0]) as f32,
                output.double_value(&[1]) as f32,
            )
        })
    }

    pub fn save(&self, path: &str) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    pub fn load(&mut self, path: &str) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }
}

impl DynamicsPredictor for DynamicsModel {
    fn predict_noisy(&self, obs: &ArrayView1<f32>, action: &ArrayView1<f32>) -> (f32, f32) {
        self.run(obs, action, true)
    }
}

impl DynamicsEstimator for DynamicsModel {
    /// Train on a 70/30 split of the collected data, minimizing SSE plus the
    /// model's L2 penalty over minibatches with Adam.
    fn fit(&mut self, data: &DynamicsData) -> Result<FitReport> {
        let n = data.len() as i64;
        let split = (n as f64 * 0.7) as i64;
        let input_dim = data.inputs.ncols() as i64;

        let inputs = Tensor::from_slice(data.inputs.as_slice().expect("contiguous inputs"))
            .view([n, input_dim])
            .to_device(self.device);
        let targets = Tensor::from_slice(data.targets.as_slice().expect("contiguous targets"))
            .view([n, 2])
            .to_device(self.device);

        let train_x = inputs.narrow(0, 0, split);
        let train_y = targets.narrow(0, 0, split);
        let test_x = inputs.narrow(0, split, n - split);
        let test_y = targets.narrow(0, split, n - split);

        tracing::info!(
            train = split,
            test = n - split,
            "training dynamics model"
        );

        let mut optimizer = nn::Adam::default().build(&self.vs, self.config.lr)?;
        let batch = self.config.batch_size;
        let mut epoch_losses = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            let perm = Tensor::randperm(split, (Kind::Int64, self.device));
            let mut total_sse = 0.0f64;

            let mut start = 0;
            while start < split {
                let len = batch.min(split - start);
                let idx = perm.narrow(0, start, len);
                let x = train_x.index_select(0, &idx);
                let y = train_y.index_select(0, &idx);

                optimizer.zero_grad();
                let pred = self.forward(&x, true);
                let sse = (pred - &y).pow_tensor_scalar(2).sum(Kind::Float);
                let loss = (&sse + self.regularization()) / len as f64;
                total_sse += sse.double_value(&[]);
                loss.backward();
                optimizer.step();

                start += len;
            }

            let mean_loss = total_sse / split as f64;
            epoch_losses.push(mean_loss);
            tracing::debug!(epoch, loss = mean_loss, "dynamics epoch");
        }

        // Held-out evaluation with dropout disabled.
        let test_loss = tch::no_grad(|| {
            let pred = self.forward(&test_x, false);
            let sse = (pred - &test_y).pow_tensor_scalar(2).sum(Kind::Float);
            sse.double_value(&[]) / (n - split) as f64
        });
        tracing::info!(test_loss, "dynamics model trained");

        Ok(FitReport {
            epoch_losses,
            test_loss,
            train_len: split as usize,
            test_len: (n - split) as usize,
        })
    }
}

//! Offline storage for dynamics-model training pairs.

use ndarray::{s, Array1, Array2, ArrayView1};

/// Training data in model-ready form: rows of concat(obs, action) against
/// rows of (distance, distance-rate).
#[derive(Clone, Debug)]
pub struct DynamicsData {
    pub inputs: Array2<f32>,
    pub targets: Array2<f32>,
}

impl DynamicsData {
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }
}

/// Fixed-capacity dataset of (obs, action, d, ddot) tuples collected during
/// the warmup phase and consumed exactly once.
pub struct DynamicsDataset {
    obs: Array2<f32>,
    act: Array2<f32>,
    d: Array1<f32>,
    ddot: Array1<f32>,
    ptr: usize,
    capacity: usize,
}

impl DynamicsDataset {
    pub fn new(obs_dim: usize, act_dim: usize, capacity: usize) -> Self {
        Self {
            obs: Array2::zeros((capacity, obs_dim)),
            act: Array2::zeros((capacity, act_dim)),
            d: Array1::zeros(capacity),
            ddot: Array1::zeros(capacity),
            ptr: 0,
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

    /// Append one timestep of interaction. Illegal once full.
    pub fn store(&mut self, obs: &ArrayView1<f32>, act: &ArrayView1<f32>, d: f32, ddot: f32) {
        assert!(self.ptr < self.capacity, "dynamics dataset overflow");
        self.obs.row_mut(self.ptr).assign(obs);
        self.act.row_mut(self.ptr).assign(act);
        self.d[self.ptr] = d;
        self.ddot[self.ptr] = ddot;
        self.ptr += 1;
    }

    /// Assemble the model-ready data. Legal only once the dataset is full.
    pub fn get(&self) -> DynamicsData {
        assert!(self.is_full(), "dynamics dataset must be full before get");
        let n = self.capacity;
        let obs_dim = self.obs.ncols();
        let act_dim = self.act.ncols();

        let mut inputs = Array2::zeros((n, obs_dim + act_dim));
        inputs.slice_mut(s![.., ..obs_dim]).assign(&self.obs);
        inputs.slice_mut(s![.., obs_dim..]).assign(&self.act);

        let mut targets = Array2::zeros((n, 2));
        targets.column_mut(0).assign(&self.d);
        targets.column_mut(1).assign(&self.ddot);

        DynamicsData { inputs, targets }
    }
}

//! Learned constraint dynamics: offline dataset and regression model.

mod dataset;
#[cfg(feature = "torch")]
mod model;

pub use dataset::{DynamicsData, DynamicsDataset};
#[cfg(feature = "torch")]
pub use model::{DynamicsModel, DynamicsModelConfig};

use crate::Result;
use ndarray::ArrayView1;

/// Forward prediction of (distance, distance-rate) from (obs, action).
pub trait DynamicsPredictor {
    /// One stochastic forward pass. Repeated calls give independent draws
    /// from the model's internal noise (dropout), which the classifier turns
    /// into an uncertainty estimate.
    fn predict_noisy(&self, obs: &ArrayView1<f32>, action: &ArrayView1<f32>) -> (f32, f32);
}

/// Summary of one supervised training run.
#[derive(Clone, Debug)]
pub struct FitReport {
    /// Mean training loss per epoch
    pub epoch_losses: Vec<f64>,
    /// Final loss on the held-out split
    pub test_loss: f64,
    pub train_len: usize,
    pub test_len: usize,
}

/// A trainable dynamics predictor.
///
/// Seamed as a trait so the trainer and the safety classifier can be
/// exercised with scripted models in tests.
pub trait DynamicsEstimator: DynamicsPredictor {
    /// Fit the model on the collected dataset. Consumes the data once;
    /// the model must come back in evaluation mode.
    fn fit(&mut self, data: &DynamicsData) -> Result<FitReport>;
}

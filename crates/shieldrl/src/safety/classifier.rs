//! Uncertainty-aware safety classification of candidate actions.

use super::{Ensemble, SafetyIndex};
use crate::dynamics::DynamicsPredictor;
use ndarray::{Array1, ArrayView1};

/// Verdict of a single classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    Unsafe,
    /// The dynamics model produced a non-finite prediction. Propagates up
    /// and aborts the enclosing ray search.
    PredictionError,
}

/// Classifies candidate actions for a fixed state snapshot.
///
/// The boundary search calls this many times per correction; binding the
/// observation and the measured baseline index once keeps the search loop
/// free of simulator access.
pub trait ActionClassifier {
    fn classify(&mut self, action: &ArrayView1<f32>) -> SafetyVerdict;
}

/// Classifier backed by repeated noisy forward passes of a learned
/// dynamics model.
///
/// An action is safe when the upper confidence bound of the predicted
/// future safety index stays below `max(0, current_index)`, i.e. the
/// predicted future is no worse than the present (or than zero, whichever
/// is looser).
pub struct EnsembleClassifier<'a, D: DynamicsPredictor> {
    dynamics: &'a D,
    index: SafetyIndex,
    observation: Array1<f32>,
    /// Measured (ground-truth) safety index of the current state
    current_index: f32,
    ensemble_size: usize,
    beta: f32,
}

impl<'a, D: DynamicsPredictor> EnsembleClassifier<'a, D> {
    pub fn new(
        dynamics: &'a D,
        index: SafetyIndex,
        observation: Array1<f32>,
        current_index: f32,
        ensemble_size: usize,
        beta: f32,
    ) -> Self {
        Self {
            dynamics,
            index,
            observation,
            current_index,
            ensemble_size,
            beta,
        }
    }
}

impl<D: DynamicsPredictor> ActionClassifier for EnsembleClassifier<'_, D> {
    fn classify(&mut self, action: &ArrayView1<f32>) -> SafetyVerdict {
        let obs = self.observation.view();
        let dynamics = &self.dynamics;
        let index = self.index;

        let ensemble = Ensemble::gather(self.ensemble_size, || {
            let (d, ddot) = dynamics.predict_noisy(&obs, action);
            if !d.is_finite() || !ddot.is_finite() {
                return f32::NAN;
            }
            index.evaluate(d, ddot)
        });

        let Some(ensemble) = ensemble else {
            tracing::warn!("dynamics model produced a non-finite prediction");
            return SafetyVerdict::PredictionError;
        };

        if ensemble.upper_bound(self.beta) < self.current_index.max(0.0) {
            SafetyVerdict::Safe
        } else {
            SafetyVerdict::Unsafe
        }
    }
}

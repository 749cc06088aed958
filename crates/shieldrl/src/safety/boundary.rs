//! Boundary-seeking action correction.
//!
//! Given a nominal action judged unsafe, search along rays in action space
//! for the nearest point where the predicted safety index crosses back into
//! bounds, and return the minimal-norm such point. The classifier is the only
//! collaborator; the search itself never touches the simulator.

use super::{ActionClassifier, SafetyVerdict};
use crate::spaces::ActionBounds;
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Tuning knobs for the correction search.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CorrectionConfig {
    /// Number of search rays per correction call
    pub ray_count: usize,
    /// Full-sweep retries with fresh random directions
    pub max_trials: usize,
    /// Initial step size; also the convergence threshold for the
    /// contraction phase
    pub step_bound: f32,
    /// Standard deviation of randomly drawn ray directions
    pub direction_scale: f32,
    /// Hard cap on iterations per ray attempt. The expand/contract loop has
    /// no natural bound; exceeding the cap aborts the attempt the same way a
    /// prediction fault would.
    pub max_ray_iters: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            ray_count: 5,
            max_trials: 1,
            step_bound: 1e-4,
            direction_scale: 0.1,
            max_ray_iters: 200,
        }
    }
}

/// Diagnostic classification of a correction call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// At least one valid boundary point was found
    CorrectionFound,
    /// Every ray terminated on the nominal action itself
    NominalAlreadySafe,
    /// Every ray left the action bounds
    AllOutOfBounds,
    /// Zero valid candidates without either explanation; logged, recovered
    /// as if no correction was found
    Inconsistent,
}

/// Result of one correction call.
#[derive(Clone, Debug)]
pub struct Correction {
    /// Minimum-norm valid boundary point, if any. `None` means the caller
    /// falls back to the nominal action (fail-open).
    pub action: Option<Array1<f32>>,
    pub outcome: CorrectionOutcome,
    /// All candidates that survived filtering
    pub candidates: Vec<Array1<f32>>,
}

enum RayResult {
    /// Contraction converged onto a boundary point
    Converged(Array1<f32>),
    /// Search aborted (out of bounds, prediction fault, or iteration cap);
    /// carries the point where it stopped
    Aborted(Array1<f32>),
}

/// Boundary-seeking action correction over a bounded action space.
#[derive(Clone, Debug)]
pub struct BoundarySearch {
    config: CorrectionConfig,
}

impl BoundarySearch {
    pub fn new(config: CorrectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Find the minimal-norm safe correction of `nominal`.
    ///
    /// The nominal action is clipped into bounds first. If no valid boundary
    /// point exists the caller is expected to use the nominal action
    /// unmodified; that fail-open default is deliberate and is surfaced via
    /// [`CorrectionOutcome`].
    pub fn correct<C, R>(
        &self,
        nominal: &ArrayView1<f32>,
        bounds: &ActionBounds,
        classifier: &mut C,
        rng: &mut R,
    ) -> Correction
    where
        C: ActionClassifier,
        R: Rng,
    {
        let cfg = &self.config;
        let u = bounds.clip(nominal);
        let dim = u.len();

        let mut endpoints: Vec<Array1<f32>> = Vec::new();
        let mut at_least_one = false;

        for trial in 0..cfg.max_trials {
            if at_least_one {
                break;
            }
            // The first trial uses the deterministic fan in 2-D; retries
            // always redraw random directions.
            let directions = if trial == 0 {
                self.initial_directions(dim, rng)
            } else {
                self.random_directions(dim, rng)
            };

            endpoints.clear();
            for dir in &directions {
                match self.search_ray(&u, dir, bounds, classifier) {
                    RayResult::Converged(p) => {
                        at_least_one = true;
                        endpoints.push(p);
                    }
                    RayResult::Aborted(p) => endpoints.push(p),
                }
            }
        }

        self.filter_and_select(&u, endpoints, bounds)
    }

    /// Directions for the first sweep: an even angular fan in 2-D, random
    /// Gaussian draws otherwise.
    fn initial_directions<R: Rng>(&self, dim: usize, rng: &mut R) -> Vec<Array1<f32>> {
        if dim == 2 {
            let m = self.config.ray_count;
            (0..m)
                .map(|j| {
                    let theta = j as f32 * (2.0 * std::f32::consts::PI / m as f32);
                    Array1::from_vec(vec![theta.sin() / 2.0, theta.cos() / 2.0])
                })
                .collect()
        } else {
            self.random_directions(dim, rng)
        }
    }

    fn random_directions<R: Rng>(&self, dim: usize, rng: &mut R) -> Vec<Array1<f32>> {
        let normal = Normal::new(0.0f32, self.config.direction_scale)
            .expect("direction scale must be positive");
        (0..self.config.ray_count)
            .map(|_| Array1::from_iter((0..dim).map(|_| normal.sample(rng))))
            .collect()
    }

    /// Expand/contract search along a single ray.
    ///
    /// The step size eta doubles while the prediction stays unsafe, drops to
    /// a quarter when the ray first crosses into safety (so contraction
    /// starts at half the last expansion step), then halves as the point
    /// oscillates around the crossing. Convergence is declared when eta
    /// shrinks back to the initial bound during contraction.
    fn search_ray<C: ActionClassifier>(
        &self,
        start: &Array1<f32>,
        dir: &Array1<f32>,
        bounds: &ActionBounds,
        classifier: &mut C,
    ) -> RayResult {
        let cfg = &self.config;
        let mut p = start.clone();
        let mut eta = cfg.step_bound;
        let mut decreasing = false;
        let mut boundary: Option<Array1<f32>> = None;

        for _ in 0..cfg.max_ray_iters {
            let verdict = classifier.classify(&p.view());

            if !bounds.contains(&p.view()) {
                return RayResult::Aborted(p);
            }
            if verdict == SafetyVerdict::PredictionError {
                return RayResult::Aborted(p);
            }
            if eta <= cfg.step_bound && decreasing {
                // Converged: settle on the last point observed safe.
                let point = boundary.expect("decreasing implies a recorded boundary");
                return RayResult::Converged(point);
            }

            match (verdict, decreasing) {
                (SafetyVerdict::Unsafe, false) => {
                    p = &p + &(dir * eta);
                    eta *= 2.0;
                }
                (SafetyVerdict::Safe, false) => {
                    decreasing = true;
                    boundary = Some(p.clone());
                    eta *= 0.25;
                }
                (SafetyVerdict::Unsafe, true) => {
                    p = &p + &(dir * eta);
                    eta *= 0.5;
                }
                (SafetyVerdict::Safe, true) => {
                    boundary = Some(p.clone());
                    p = &p - &(dir * eta);
                    eta *= 0.5;
                }
                (SafetyVerdict::PredictionError, _) => unreachable!(),
            }
        }

        // Iteration cap exceeded: the step decay failed to terminate the
        // contraction. Abort like a prediction fault.
        tracing::debug!("ray search exceeded iteration cap, aborting attempt");
        RayResult::Aborted(p)
    }

    /// Drop endpoints that left the bounds or never moved off the nominal
    /// action, then pick the minimum-norm survivor.
    fn filter_and_select(
        &self,
        u: &Array1<f32>,
        endpoints: Vec<Array1<f32>>,
        bounds: &ActionBounds,
    ) -> Correction {
        let total = endpoints.len();
        let mut out = 0usize;
        let mut on_nominal = 0usize;
        let mut candidates: Vec<Array1<f32>> = Vec::new();

        for point in endpoints {
            if !bounds.contains(&point.view()) {
                out += 1;
                continue;
            }
            if point == *u {
                on_nominal += 1;
                continue;
            }
            candidates.push(point);
        }

        let outcome = if !candidates.is_empty() {
            CorrectionOutcome::CorrectionFound
        } else if on_nominal == total && total > 0 {
            CorrectionOutcome::NominalAlreadySafe
        } else if out == total && total > 0 {
            CorrectionOutcome::AllOutOfBounds
        } else {
            tracing::warn!(
                total,
                out_of_bounds = out,
                on_nominal,
                "correction produced no valid candidate for an unexplained reason"
            );
            CorrectionOutcome::Inconsistent
        };

        let action = candidates
            .iter()
            .min_by(|a, b| {
                norm(a)
                    .partial_cmp(&norm(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();

        Correction {
            action,
            outcome,
            candidates,
        }
    }
}

fn norm(v: &Array1<f32>) -> f32 {
    v.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt() as f32
}

//! Trust-region policy update: natural gradient via conjugate gradient,
//! KL-constrained backtracking line search, value regression driven
//! separately by the trainer.

use super::EpochBatch;
use crate::policy::PolicyObjective;
use ndarray::{Array1, ArrayView1};

const EPS: f64 = 1e-8;

/// Approximately solve `A x = b` with truncated conjugate gradient.
///
/// `apply_a` computes the matrix-vector product; iteration stops at
/// `max_iters` or as soon as the search direction collapses.
pub fn conjugate_gradient(
    mut apply_a: impl FnMut(&ArrayView1<f32>) -> Array1<f32>,
    b: &ArrayView1<f32>,
    max_iters: usize,
) -> Array1<f32> {
    let mut x = Array1::zeros(b.len());
    // With x = 0 the initial residual is b itself.
    let mut r = b.to_owned();
    let mut p = r.clone();
    let mut r_dot_old = dot(&r.view(), &r.view());

    for _ in 0..max_iters {
        let z = apply_a(&p.view());
        let alpha = r_dot_old / (dot(&p.view(), &z.view()) + EPS);
        x = &x + &(&p * alpha as f32);
        r = &r - &(&z * alpha as f32);
        let r_dot_new = dot(&r.view(), &r.view());
        p = &r + &(&p * (r_dot_new / r_dot_old) as f32);
        r_dot_old = r_dot_new;

        if norm(&p.view()) < EPS {
            break;
        }
    }
    x
}

fn dot(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x as f64 * y as f64).sum()
}

fn norm(a: &ArrayView1<f32>) -> f64 {
    dot(a, a).sqrt()
}

/// Outcome of one trust-region policy update.
#[derive(Clone, Debug)]
pub struct UpdateReport {
    /// Surrogate loss before the update
    pub loss_pi_old: f64,
    /// Surrogate loss after the update (equal to old when the search failed)
    pub loss_pi: f64,
    /// KL divergence of the accepted step (0 when the search failed)
    pub kl: f64,
    /// Mean policy entropy before the update
    pub entropy: f64,
    /// Line search exponent that was accepted, if any
    pub accepted_step: Option<usize>,
    /// Quadratic form `x . Hx` of the natural gradient step. Negative values
    /// indicate a non-PSD curvature estimate; recorded, not rejected.
    pub step_scale: f64,
}

/// KL-constrained natural-gradient policy update.
#[derive(Clone, Debug)]
pub struct TrustRegion {
    pub target_kl: f64,
    pub backtrack_coeff: f64,
    pub backtrack_iters: usize,
    pub cg_iters: usize,
}

impl TrustRegion {
    pub fn new(
        target_kl: f64,
        backtrack_coeff: f64,
        backtrack_iters: usize,
        cg_iters: usize,
    ) -> Self {
        Self {
            target_kl,
            backtrack_coeff,
            backtrack_iters,
            cg_iters,
        }
    }

    /// Run one update on `policy` over the epoch batch.
    ///
    /// On success the policy holds the accepted parameters; on line-search
    /// failure it is restored to the old parameters and training continues.
    pub fn update<P: PolicyObjective>(&self, policy: &mut P, batch: &EpochBatch) -> UpdateReport {
        let loss_pi_old = policy.surrogate_loss(batch);
        let entropy = policy.entropy(batch);

        let g = policy.surrogate_grad(batch);
        let x = conjugate_gradient(
            |v| policy.fisher_vector_product(batch, v),
            &g.view(),
            self.cg_iters,
        );

        let hx = policy.fisher_vector_product(batch, &x.view());
        let s = dot(&x.view(), &hx.view());
        if s < 0.0 {
            tracing::warn!(s, "negative curvature in natural gradient step");
        }

        let scale = (2.0 * self.target_kl / (s + EPS)).sqrt();
        let direction = x.mapv(|v| v * scale as f32);
        let old_params = policy.param_vec();

        let mut accepted = None;
        let mut loss_pi = loss_pi_old;
        let mut kl = 0.0;

        for j in 0..self.backtrack_iters {
            let step = self.backtrack_coeff.powi(j as i32);
            let candidate = &old_params - &direction.mapv(|v| v * step as f32);
            policy.set_param_vec(&candidate.view());

            let kl_j = policy.mean_kl(batch);
            let loss_j = policy.surrogate_loss(batch);

            if kl_j <= self.target_kl && loss_j <= loss_pi_old {
                tracing::info!(step = j, "accepting new params in line search");
                accepted = Some(j);
                loss_pi = loss_j;
                kl = kl_j;
                break;
            }
        }

        if accepted.is_none() {
            tracing::warn!("line search failed, keeping old params");
            policy.set_param_vec(&old_params.view());
        }

        UpdateReport {
            loss_pi_old,
            loss_pi,
            kl,
            entropy,
            accepted_step: accepted,
            step_scale: s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn empty_batch() -> EpochBatch {
        EpochBatch {
            obs: Array2::zeros((1, 1)),
            act: Array2::zeros((1, 1)),
            ret: Array1::zeros(1),
            adv: Array1::zeros(1),
            logp: Array1::zeros(1),
            mu: Array2::zeros((1, 1)),
            logstd: Array2::zeros((1, 1)),
        }
    }

    /// Analytic quadratic objective:
    ///   loss(theta)  = 0.5 * ||theta||^2  (sign-flippable gradient)
    ///   KL(theta)    = 0.5 * k * ||theta - ref||^2
    ///   FVP          = f * x
    ///
    /// Keeping k below f means the curvature model overestimates the true
    /// KL, so the unconstrained natural step lands strictly inside the
    /// budget instead of exactly on it.
    struct Quadratic {
        theta: Array1<f32>,
        reference: Array1<f32>,
        fisher_diag: f32,
        kl_diag: f32,
        /// When set, the reported gradient points away from descent, so any
        /// actual step increases the loss and the line search must fail.
        flip_grad: bool,
    }

    impl Quadratic {
        fn new(theta: Array1<f32>, fisher_diag: f32, kl_diag: f32, flip_grad: bool) -> Self {
            Self {
                reference: theta.clone(),
                theta,
                fisher_diag,
                kl_diag,
                flip_grad,
            }
        }
    }

    impl PolicyObjective for Quadratic {
        fn param_vec(&self) -> Array1<f32> {
            self.theta.clone()
        }

        fn set_param_vec(&mut self, params: &ArrayView1<f32>) {
            self.theta = params.to_owned();
        }

        fn surrogate_loss(&self, _batch: &EpochBatch) -> f64 {
            0.5 * self.theta.iter().map(|&v| (v as f64).powi(2)).sum::<f64>()
        }

        fn surrogate_grad(&self, _batch: &EpochBatch) -> Array1<f32> {
            if self.flip_grad {
                self.theta.mapv(|v| -v)
            } else {
                self.theta.clone()
            }
        }

        fn mean_kl(&self, _batch: &EpochBatch) -> f64 {
            let diff = &self.theta - &self.reference;
            0.5 * self.kl_diag as f64 * diff.iter().map(|&v| (v as f64).powi(2)).sum::<f64>()
        }

        fn fisher_vector_product(
            &self,
            _batch: &EpochBatch,
            x: &ArrayView1<f32>,
        ) -> Array1<f32> {
            x.mapv(|v| v * self.fisher_diag)
        }

        fn entropy(&self, _batch: &EpochBatch) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_cg_solves_diagonal_system() {
        let a_diag = array![4.0f32, 2.0, 1.0];
        let b = array![8.0f32, 4.0, 3.0];
        let x = conjugate_gradient(|v| (&a_diag * v).to_owned(), &b.view(), 50);
        assert!((x[0] - 2.0).abs() < 1e-4);
        assert!((x[1] - 2.0).abs() < 1e-4);
        assert!((x[2] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_cg_converges_fast_on_identity() {
        let b = array![1.0f32, -2.0, 0.5, 3.0];
        let x = conjugate_gradient(|v| v.to_owned(), &b.view(), 1);
        // One iteration is exact for A = I.
        for (xi, bi) in x.iter().zip(b.iter()) {
            assert!((xi - bi).abs() < 1e-5);
        }
    }

    #[test]
    fn test_accepts_at_first_step() {
        // The unconstrained step lands strictly inside the KL budget, so
        // j = 0 must be accepted with a lower loss.
        let mut policy = Quadratic::new(array![1.0, -2.0, 0.5], 2.0, 1.0, false);
        let engine = TrustRegion::new(0.01, 0.8, 10, 50);
        let report = engine.update(&mut policy, &empty_batch());

        assert_eq!(report.accepted_step, Some(0));
        assert!(report.loss_pi < report.loss_pi_old);
        assert!(report.kl <= 0.01);
        assert!(report.step_scale > 0.0);
    }

    #[test]
    fn test_failed_search_restores_params() {
        // The flipped gradient makes every candidate step increase the loss;
        // after exhausting the backtracking budget the parameters must be
        // exactly the old ones.
        let mut policy = Quadratic::new(array![1.0, -2.0, 0.5], 1.0, 1.0, true);
        let before = policy.param_vec();
        let engine = TrustRegion::new(0.01, 0.8, 5, 50);
        let report = engine.update(&mut policy, &empty_batch());

        assert_eq!(report.accepted_step, None);
        assert_eq!(policy.param_vec(), before);
        assert_eq!(report.loss_pi, report.loss_pi_old);
        assert_eq!(report.kl, 0.0);
    }

    #[test]
    fn test_kl_of_accepted_step_within_budget() {
        let mut policy = Quadratic::new(array![3.0, 3.0], 1.0, 0.5, false);
        let target_kl = 0.05;
        let engine = TrustRegion::new(target_kl, 0.8, 100, 50);
        let report = engine.update(&mut policy, &empty_batch());

        assert!(report.accepted_step.is_some());
        assert!(report.kl <= target_kl + 1e-9);
    }
}

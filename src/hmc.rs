//! A single-chain Hamiltonian (Hybrid) Monte Carlo update.
//!
//! Unlike a free-running sampler, the update here is one transition of one
//! parameter block inside a Gibbs sweep: the block's log full-conditional is
//! supplied through the [`HamiltonianTarget`] trait, momenta are drawn from
//! `N(0, I)`, the leapfrog integrator simulates the dynamics for `n_leapfrog`
//! steps, and the standard Metropolis test `min(1, exp(H(q, p) - H(q*, p*)))`
//! with `H = -log p(q) + ½|p|²` decides whether the proposal is kept.

use num_traits::{Float, ToPrimitive};
use rand::Rng;
use rand_distr::{Distribution, Standard, StandardNormal};

use crate::euclidean::EuclideanVector;

/// A log-density with gradient for one parameter block.
///
/// The potential energy used by the integrator is `U(q) = -logp(q)`.
pub trait HamiltonianTarget<V: EuclideanVector> {
    /// Returns the unnormalized log-density at `position` and writes its
    /// gradient into `grad`.
    ///
    /// Positions outside the support should return `-inf`; the proposal is
    /// then rejected.
    fn logp_and_grad(&self, position: &V, grad: &mut V) -> V::Scalar;
}

/// Result of one HMC transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HmcOutcome<V: EuclideanVector> {
    /// The new position, equal to the input on rejection.
    pub position: V,
    pub accepted: bool,
    /// `min(1, exp(-ΔH))`, zero for non-finite proposals.
    pub accept_prob: f64,
    /// The step size the integrator actually used.
    pub step_size: V::Scalar,
}

/// Leapfrog settings for one HMC transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmcUpdate<T> {
    /// The step size for the leapfrog integrator.
    pub step_size: T,
    /// The number of leapfrog steps to take per update.
    pub n_leapfrog: usize,
}

impl<T> HmcUpdate<T>
where
    T: Float + ToPrimitive,
{
    pub fn new(step_size: T, n_leapfrog: usize) -> Self {
        Self {
            step_size,
            n_leapfrog,
        }
    }

    /// Performs one HMC transition starting at `current`.
    ///
    /// The update consists of:
    /// 1) Sampling momenta from a standard normal distribution.
    /// 2) Running the leapfrog integrator to propose a new position.
    /// 3) Performing the accept/reject step.
    ///
    /// Starting from a point outside the support (`logp = -inf`), every
    /// proposal that lands inside it is accepted.
    pub fn step<V, G, R>(&self, target: &G, current: &V, rng: &mut R) -> HmcOutcome<V>
    where
        V: EuclideanVector<Scalar = T>,
        G: HamiltonianTarget<V> + ?Sized,
        R: Rng + ?Sized,
        StandardNormal: Distribution<T>,
        Standard: Distribution<T>,
    {
        let half = T::from(0.5).unwrap_or_else(T::zero);

        let mut momentum = current.zeros_like();
        momentum.fill_standard_normal(rng);
        let ke_current = half * momentum.dot(&momentum);

        let mut grad = current.zeros_like();
        let logp_current = target.logp_and_grad(current, &mut grad);
        let h_current = -logp_current + ke_current;

        let mut position = current.clone();
        let logp_proposed =
            self.leapfrog(target, &mut position, &mut momentum, &mut grad, logp_current);
        let ke_proposed = half * momentum.dot(&momentum);
        let h_proposed = -logp_proposed + ke_proposed;

        // A current state with logp = -inf gives log_accept = +inf, so any
        // finite proposal is accepted and the chain moves back into the
        // support. NaN (both energies infinite) counts as a rejection.
        let log_accept = (h_current - h_proposed).to_f64().unwrap_or(f64::NAN);
        let proposal_ok =
            !log_accept.is_nan() && log_accept != f64::NEG_INFINITY && position.is_finite();
        let accept_prob = if proposal_ok {
            log_accept.min(0.0).exp()
        } else {
            0.0
        };

        // Draw the uniform even for hopeless proposals so the random stream
        // does not depend on the outcome.
        let u: T = rng.gen();
        let ln_u = u.to_f64().unwrap_or(0.0).ln();
        let accepted = proposal_ok && log_accept >= ln_u;

        HmcOutcome {
            position: if accepted { position } else { current.clone() },
            accepted,
            accept_prob,
            step_size: self.step_size,
        }
    }

    /// Runs `n_leapfrog` half-step / full-step / half-step updates in place.
    ///
    /// `grad` and `logp` must be the gradient and log-density at the starting
    /// `position`. Returns the log-density at the final position; integration
    /// stops early once the trajectory leaves the support.
    fn leapfrog<V, G>(
        &self,
        target: &G,
        position: &mut V,
        momentum: &mut V,
        grad: &mut V,
        mut logp: T,
    ) -> T
    where
        V: EuclideanVector<Scalar = T>,
        G: HamiltonianTarget<V> + ?Sized,
    {
        let half = T::from(0.5).unwrap_or_else(T::zero) * self.step_size;
        for _ in 0..self.n_leapfrog {
            momentum.add_scaled_assign(grad, half);
            position.add_scaled_assign(momentum, self.step_size);
            logp = target.logp_and_grad(position, grad);
            if !logp.is_finite() || !grad.is_finite() {
                return T::neg_infinity();
            }
            momentum.add_scaled_assign(grad, half);
        }
        logp
    }
}

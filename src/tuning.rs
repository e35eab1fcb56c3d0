//! Online step-size adaptation for the HMC blocks.
//!
//! During the first `window` iterations the log step size follows dual
//! averaging (Hoffman & Gelman, 2014), which drives the mean acceptance
//! probability towards `target`. The window closes at the running average
//! `exp(log_delta_bar)`. From then on a Robbins-Monro step
//! `ln delta += (k + t0)^-kappa (accept_prob - target)` keeps tracking the
//! target, with a gain that shrinks in the number `k` of post-window
//! iterations so the step size settles.

use serde::{Deserialize, Serialize};

const GAMMA: f64 = 0.05;
const T0: f64 = 10.0;
const KAPPA: f64 = 0.75;
const MIN_STEP: f64 = 1e-10;
const MAX_STEP: f64 = 1e3;

/// Tuning state of one HMC block.
///
/// Updates are value-returning: [`TuningState::update`] consumes nothing and
/// hands back the next state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningState {
    /// Step size to use on the next iteration.
    pub delta_curr: f64,
    /// Running average of the log step size, where the window hands over.
    pub log_delta_bar: f64,
    /// Number of dual-averaging iterations.
    pub window: usize,
    /// Target acceptance probability.
    pub target: f64,
    /// Last iteration seen by `update`.
    pub iteration: usize,
    /// Running mean of `target - accept_prob`.
    pub h_bar: f64,
    /// Shrinkage point `ln(10 delta)`, fixed by the first step size used.
    pub mu: f64,
    /// Sum of the acceptance probabilities seen inside the window.
    pub accept_sum_in_window: f64,
}

impl TuningState {
    /// Fresh tuning state starting from step size `initial`.
    pub fn initialize(window: usize, target: f64, initial: f64) -> Self {
        Self {
            delta_curr: initial,
            log_delta_bar: initial.ln(),
            window,
            target,
            iteration: 0,
            h_bar: 0.0,
            mu: (10.0 * initial).ln(),
            accept_sum_in_window: 0.0,
        }
    }

    /// True on the iteration that closes the dual-averaging window.
    pub fn window_closed_now(&self) -> bool {
        self.iteration == self.window && self.window > 0
    }

    /// Mean acceptance probability over the window iterations seen so far.
    pub fn window_acceptance(&self) -> f64 {
        let n = self.iteration.min(self.window);
        if n == 0 {
            0.0
        } else {
            self.accept_sum_in_window / n as f64
        }
    }

    /// Folds in iteration `iteration` (1-based), which ran with step size
    /// `delta_used` and had Metropolis acceptance probability `accept_prob`.
    pub fn update(&self, delta_used: f64, iteration: usize, accept_prob: f64) -> Self {
        let mut next = *self;
        next.iteration = iteration;
        let a = if accept_prob.is_nan() {
            0.0
        } else {
            accept_prob.clamp(0.0, 1.0)
        };
        if iteration == 1 {
            next.mu = (10.0 * delta_used).ln();
        }
        if iteration <= self.window {
            let i = iteration as f64;
            let w = 1.0 / (i + T0);
            next.h_bar = (1.0 - w) * self.h_bar + w * (self.target - a);
            let log_delta = next.mu - (i.sqrt() / GAMMA) * next.h_bar;
            let eta = i.powf(-KAPPA);
            next.log_delta_bar = eta * log_delta + (1.0 - eta) * self.log_delta_bar;
            next.delta_curr = if iteration == self.window {
                next.log_delta_bar.exp()
            } else {
                log_delta.exp()
            };
            next.accept_sum_in_window += a;
        } else {
            let k = (iteration - self.window) as f64;
            let gain = (k + T0).powf(-KAPPA);
            let log_delta = self.delta_curr.ln() + gain * (a - self.target);
            next.delta_curr = log_delta.exp().clamp(MIN_STEP, MAX_STEP);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejections_shrink_the_step() {
        let mut state = TuningState::initialize(100, 0.75, 0.1);
        for i in 1..=10 {
            state = state.update(state.delta_curr, i, 0.0);
        }
        assert!(state.delta_curr < 0.1, "delta {}", state.delta_curr);
    }

    #[test]
    fn acceptances_grow_the_step() {
        let mut state = TuningState::initialize(100, 0.75, 0.1);
        for i in 1..=10 {
            state = state.update(state.delta_curr, i, 1.0);
        }
        assert!(state.delta_curr > 0.1, "delta {}", state.delta_curr);
        assert_abs_diff_eq!(state.accept_sum_in_window, 10.0);
        assert_abs_diff_eq!(state.window_acceptance(), 1.0);
    }

    #[test]
    fn window_closes_at_the_running_average() {
        let mut state = TuningState::initialize(5, 0.65, 0.2);
        for i in 1..=5 {
            state = state.update(state.delta_curr, i, if i % 2 == 0 { 0.9 } else { 0.3 });
        }
        assert!(state.window_closed_now());
        assert_eq!(state.delta_curr, state.log_delta_bar.exp());

        // On-target iterations leave the step where the window put it.
        let closed = state.delta_curr;
        for i in 6..=20 {
            state = state.update(state.delta_curr, i, 0.65);
        }
        assert_abs_diff_eq!(state.delta_curr, closed, epsilon = 1e-12);
    }

    #[test]
    fn post_window_gain_shrinks() {
        let mut state = TuningState::initialize(10, 0.7, 0.1);
        for i in 1..=10 {
            state = state.update(state.delta_curr, i, 0.7);
        }
        let early = state.update(state.delta_curr, 11, 1.0);
        let late = state.update(state.delta_curr, 5_000, 1.0);
        let start = state.delta_curr.ln();
        let early_move = early.delta_curr.ln() - start;
        let late_move = late.delta_curr.ln() - start;
        assert!(early_move > late_move && late_move > 0.0);
        assert_abs_diff_eq!(early_move, 0.3 * 11.0f64.powf(-KAPPA), epsilon = 1e-12);

        let down = state.update(state.delta_curr, 11, 0.0);
        assert!(down.delta_curr < state.delta_curr);
    }

    #[test]
    fn update_does_not_mutate_input() {
        let state = TuningState::initialize(10, 0.7, 0.05);
        let next = state.update(0.05, 1, 1.0);
        assert_eq!(state.iteration, 0);
        assert_eq!(next.iteration, 1);
        assert_ne!(state, next);
    }

    #[test]
    fn nan_acceptance_counts_as_rejection() {
        let state = TuningState::initialize(10, 0.7, 0.05);
        assert_eq!(
            state.update(0.05, 1, f64::NAN),
            state.update(0.05, 1, 0.0)
        );
    }

    /// Synthetic acceptance model `P(accept) = exp(-delta)`: the adapted step
    /// should settle where that probability equals the target.
    #[test]
    fn converges_to_target_rate_on_synthetic_model() {
        let target: f64 = 0.7;
        let mut state = TuningState::initialize(20_000, target, 1.0);
        for i in 1..=20_000 {
            state = state.update(state.delta_curr, i, (-state.delta_curr).exp());
        }
        let delta_star = -target.ln();
        assert!(
            (state.log_delta_bar.exp() - delta_star).abs() < 0.05,
            "adapted {} vs optimum {delta_star}",
            state.log_delta_bar.exp()
        );
        assert!((state.window_acceptance() - target).abs() < 0.03);
    }

    /// The acceptance curve steepens from `exp(-delta)` to `exp(-3 delta)`
    /// once the window has closed; the step size follows it.
    #[test]
    fn keeps_tracking_after_window() {
        let target: f64 = 0.7;
        let window = 2_000;
        let mut state = TuningState::initialize(window, target, 0.5);
        for i in 1..=window {
            state = state.update(state.delta_curr, i, (-state.delta_curr).exp());
        }
        let mut late_sum = 0.0;
        let total = window + 5_000;
        for i in (window + 1)..=total {
            let p = (-3.0 * state.delta_curr).exp();
            if i > total - 1_000 {
                late_sum += p;
            }
            state = state.update(state.delta_curr, i, p);
        }
        let delta_star = -target.ln() / 3.0;
        assert!(
            (state.delta_curr - delta_star).abs() < 0.01,
            "tracked {} vs optimum {delta_star}",
            state.delta_curr
        );
        assert!((late_sum / 1_000.0 - target).abs() < 0.01);
    }

    #[test]
    fn post_window_step_stays_bounded() {
        let mut state = TuningState::initialize(1, 0.7, 900.0);
        for i in 1..=200 {
            state = state.update(state.delta_curr, i, 1.0);
        }
        assert!(state.delta_curr <= MAX_STEP);
    }
}

//! Storage for the draws of one chain.
//!
//! Every array is allocated once, at its final size, and filled slot by slot
//! by the Gibbs driver. Growth happens only when a chain is continued, through
//! [`SampleChain::concat`].

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{LeapfrogSteps, Priors, StepSizes};
use crate::error::SamplerError;
use crate::state::{Block, HmcBlock, ParameterState};

/// What is needed to reconstruct a chain's run for continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub priors: Priors,
    pub leapfrog: LeapfrogSteps,
    pub proposal_sd_theta: f64,
    /// Step-size control of the first run.
    pub step_sizes: StepSizes,
    /// Total Gibbs sweeps run, across all continuations.
    pub n_sample: usize,
    /// Leading sweeps not stored, including draws dropped by [`SampleChain::trim`].
    pub burnin: usize,
    /// Seed of the first run.
    pub seed: u64,
}

/// Post-burnin draws of every parameter block, one row per kept sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleChain {
    /// `n_keep × N.w`.
    pub w: Array2<f64>,
    pub theta: Array1<f64>,
    pub phi: Array1<f64>,
    pub beta_case: Array2<f64>,
    pub beta_control: Array2<f64>,
    pub beta_loc: Array2<f64>,
    pub alpha_case: Array1<f64>,
    pub alpha_control: Array1<f64>,
    /// Accept indicators, `n_keep × 7`, columns ordered as [`Block::ALL`].
    pub accepted: Array2<bool>,
    /// Step size after every sweep (burnin included), `n_sample × 6`,
    /// columns ordered as [`HmcBlock::ALL`].
    pub deltas: Array2<f64>,
    pub metadata: ChainMetadata,
}

impl SampleChain {
    /// Allocates storage for `n_keep` draws and `metadata.n_sample` step-size rows.
    pub fn allocate(
        n_keep: usize,
        n_cells: usize,
        n_case_covariates: usize,
        n_location_covariates: usize,
        metadata: ChainMetadata,
    ) -> Self {
        Self {
            w: Array2::zeros((n_keep, n_cells)),
            theta: Array1::zeros(n_keep),
            phi: Array1::zeros(n_keep),
            beta_case: Array2::zeros((n_keep, n_case_covariates)),
            beta_control: Array2::zeros((n_keep, n_case_covariates)),
            beta_loc: Array2::zeros((n_keep, n_location_covariates)),
            alpha_case: Array1::zeros(n_keep),
            alpha_control: Array1::zeros(n_keep),
            accepted: Array2::from_elem((n_keep, Block::ALL.len()), false),
            deltas: Array2::zeros((metadata.n_sample, HmcBlock::ALL.len())),
            metadata,
        }
    }

    /// Writes `state` and its accept indicators into slot `slot`.
    pub fn record(&mut self, slot: usize, state: &ParameterState, accepted: &[bool; 7]) {
        self.w.row_mut(slot).assign(&state.w);
        self.theta[slot] = state.theta;
        self.phi[slot] = state.phi;
        self.beta_case.row_mut(slot).assign(&state.beta_case);
        self.beta_control.row_mut(slot).assign(&state.beta_control);
        self.beta_loc.row_mut(slot).assign(&state.beta_loc);
        self.alpha_case[slot] = state.alpha_case;
        self.alpha_control[slot] = state.alpha_control;
        for (dst, &a) in self.accepted.row_mut(slot).iter_mut().zip(accepted) {
            *dst = a;
        }
    }

    /// Writes the step sizes in force after sweep `iteration` (0-based).
    pub fn record_deltas(&mut self, iteration: usize, deltas: &[f64; 6]) {
        for (dst, &d) in self.deltas.row_mut(iteration).iter_mut().zip(deltas) {
            *dst = d;
        }
    }

    /// Number of stored draws.
    pub fn len(&self) -> usize {
        self.theta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of stored sweeps in which each block accepted, ordered as
    /// [`Block::ALL`]. All zeros for an empty chain.
    pub fn acceptance_rates(&self) -> Array1<f64> {
        let n = self.len();
        if n == 0 {
            return Array1::zeros(Block::ALL.len());
        }
        self.accepted
            .columns()
            .into_iter()
            .map(|col| col.iter().filter(|&&a| a).count() as f64 / n as f64)
            .collect()
    }

    /// Rate of one block.
    pub fn acceptance_rate(&self, block: Block) -> f64 {
        self.acceptance_rates()[block.index()]
    }

    /// Step-size trajectory of one HMC block.
    pub fn delta_trajectory(&self, block: HmcBlock) -> Array1<f64> {
        self.deltas.column(block.index()).to_owned()
    }

    /// The `i`-th stored draw.
    pub fn draw(&self, i: usize) -> Option<ParameterState> {
        if i >= self.len() {
            return None;
        }
        Some(ParameterState {
            w: self.w.row(i).to_owned(),
            theta: self.theta[i],
            phi: self.phi[i],
            beta_case: self.beta_case.row(i).to_owned(),
            beta_control: self.beta_control.row(i).to_owned(),
            beta_loc: self.beta_loc.row(i).to_owned(),
            alpha_case: self.alpha_case[i],
            alpha_control: self.alpha_control[i],
        })
    }

    pub fn last_state(&self) -> Option<ParameterState> {
        self.len().checked_sub(1).and_then(|i| self.draw(i))
    }

    /// Last recorded step size of every HMC block.
    pub fn last_deltas(&self) -> Option<[f64; 6]> {
        let last = self.deltas.nrows().checked_sub(1)?;
        let row = self.deltas.row(last);
        if row.len() != HmcBlock::ALL.len() {
            return None;
        }
        let mut out = [0.0; 6];
        for (dst, &d) in out.iter_mut().zip(row.iter()) {
            *dst = d;
        }
        Some(out)
    }

    /// Drops the first `k` stored draws and adds them to the burnin count.
    pub fn trim(&self, k: usize) -> Result<Self, SamplerError> {
        if k > self.len() {
            return Err(SamplerError::TrimExceedsDraws {
                requested: k,
                available: self.len(),
            });
        }
        let mut metadata = self.metadata.clone();
        metadata.burnin += k;
        Ok(Self {
            w: self.w.slice(s![k.., ..]).to_owned(),
            theta: self.theta.slice(s![k..]).to_owned(),
            phi: self.phi.slice(s![k..]).to_owned(),
            beta_case: self.beta_case.slice(s![k.., ..]).to_owned(),
            beta_control: self.beta_control.slice(s![k.., ..]).to_owned(),
            beta_loc: self.beta_loc.slice(s![k.., ..]).to_owned(),
            alpha_case: self.alpha_case.slice(s![k..]).to_owned(),
            alpha_control: self.alpha_control.slice(s![k..]).to_owned(),
            accepted: self.accepted.slice(s![k.., ..]).to_owned(),
            deltas: self.deltas.clone(),
            metadata,
        })
    }

    /// Appends the draws of `next`, a run that started from this chain's
    /// last state. The stored draws of `self` are copied unchanged.
    pub fn concat(&self, next: &SampleChain) -> Result<Self, SamplerError> {
        let cat2 = |a: &Array2<f64>, b: &Array2<f64>, what: &'static str| {
            concatenate(Axis(0), &[a.view(), b.view()]).map_err(|_| {
                SamplerError::DimensionMismatch {
                    what,
                    expected: a.ncols(),
                    found: b.ncols(),
                }
            })
        };
        let cat1 = |a: &Array1<f64>, b: &Array1<f64>| {
            a.iter().chain(b.iter()).copied().collect::<Array1<f64>>()
        };
        let accepted = concatenate(Axis(0), &[self.accepted.view(), next.accepted.view()])
            .map_err(|_| SamplerError::DimensionMismatch {
                what: "accept indicator columns",
                expected: self.accepted.ncols(),
                found: next.accepted.ncols(),
            })?;

        let mut metadata = self.metadata.clone();
        metadata.n_sample += next.metadata.n_sample;
        Ok(Self {
            w: cat2(&self.w, &next.w, "w columns")?,
            theta: cat1(&self.theta, &next.theta),
            phi: cat1(&self.phi, &next.phi),
            beta_case: cat2(&self.beta_case, &next.beta_case, "beta.ca columns")?,
            beta_control: cat2(&self.beta_control, &next.beta_control, "beta.co columns")?,
            beta_loc: cat2(&self.beta_loc, &next.beta_loc, "beta.loc columns")?,
            alpha_case: cat1(&self.alpha_case, &next.alpha_case),
            alpha_control: cat1(&self.alpha_control, &next.alpha_control),
            accepted,
            deltas: cat2(&self.deltas, &next.deltas, "step size columns")?,
            metadata,
        })
    }

    /// Posterior mean of every block, `None` for an empty chain.
    pub fn posterior_mean(&self) -> Option<ParameterState> {
        Some(ParameterState {
            w: self.w.mean_axis(Axis(0))?,
            theta: self.theta.mean()?,
            phi: self.phi.mean()?,
            beta_case: self.beta_case.mean_axis(Axis(0))?,
            beta_control: self.beta_control.mean_axis(Axis(0))?,
            beta_loc: self.beta_loc.mean_axis(Axis(0))?,
            alpha_case: self.alpha_case.mean()?,
            alpha_control: self.alpha_control.mean()?,
        })
    }

    /// Posterior mean log relative risk of cases to controls at every cell:
    /// the average over draws of
    /// `(x beta.ca + alpha.ca w) - (x beta.co + alpha.co w)`.
    ///
    /// `x_grid` holds the case/control covariates of every grid cell,
    /// `N.w × p`.
    pub fn log_risk_surface(&self, x_grid: ArrayView2<f64>) -> Result<Array1<f64>, SamplerError> {
        if x_grid.nrows() != self.w.ncols() {
            return Err(SamplerError::DimensionMismatch {
                what: "risk grid rows",
                expected: self.w.ncols(),
                found: x_grid.nrows(),
            });
        }
        if x_grid.ncols() != self.beta_case.ncols() {
            return Err(SamplerError::DimensionMismatch {
                what: "risk grid columns",
                expected: self.beta_case.ncols(),
                found: x_grid.ncols(),
            });
        }
        if self.is_empty() {
            return Err(SamplerError::InvalidData(
                "risk surface needs at least one stored draw".into(),
            ));
        }
        let n = self.len() as f64;
        let mut surface = Array1::<f64>::zeros(x_grid.nrows());
        for i in 0..self.len() {
            let beta_diff = &self.beta_case.row(i) - &self.beta_control.row(i);
            let alpha_diff = self.alpha_case[i] - self.alpha_control[i];
            surface += &x_grid.dot(&beta_diff);
            surface.scaled_add(alpha_diff, &self.w.row(i));
        }
        Ok(surface / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::test_priors;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn metadata(n_sample: usize, burnin: usize) -> ChainMetadata {
        ChainMetadata {
            priors: test_priors(),
            leapfrog: LeapfrogSteps::default(),
            proposal_sd_theta: 0.3,
            step_sizes: StepSizes::default(),
            n_sample,
            burnin,
            seed: 42,
        }
    }

    fn state(v: f64) -> ParameterState {
        ParameterState {
            w: arr1(&[v, -v, 2.0 * v]),
            theta: 1.0 + v,
            phi: 2.0 + v,
            beta_case: arr1(&[v, 1.0]),
            beta_control: arr1(&[0.0, v]),
            beta_loc: arr1(&[v]),
            alpha_case: v,
            alpha_control: -v,
        }
    }

    /// Chain of `n` draws where draw `i` is `state(i)` and the accept pattern
    /// alternates.
    fn filled(n: usize) -> SampleChain {
        let mut chain = SampleChain::allocate(n, 3, 2, 1, metadata(n + 2, 2));
        for i in 0..n {
            let flag = i % 2 == 0;
            chain.record(i, &state(i as f64), &[flag, true, false, flag, flag, true, false]);
        }
        for i in 0..n + 2 {
            chain.record_deltas(i, &[0.1 + i as f64, 0.2, 0.3, 0.4, 0.5, 0.6]);
        }
        chain
    }

    #[test]
    fn record_and_read_back() {
        let chain = filled(4);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.draw(2), Some(state(2.0)));
        assert_eq!(chain.last_state(), Some(state(3.0)));
        assert_eq!(chain.draw(4), None);
        assert_eq!(chain.last_deltas(), Some([5.1, 0.2, 0.3, 0.4, 0.5, 0.6]));
        assert_eq!(chain.delta_trajectory(HmcBlock::W).len(), 6);
    }

    #[test]
    fn acceptance_rates_in_block_order() {
        let chain = filled(4);
        let rates = chain.acceptance_rates();
        assert_eq!(rates.len(), 7);
        assert_eq!(rates, arr1(&[0.5, 1.0, 0.0, 0.5, 0.5, 1.0, 0.0]));
        assert_eq!(chain.acceptance_rate(Block::Theta), 1.0);
        assert_eq!(filled(0).acceptance_rates(), Array1::<f64>::zeros(7));
    }

    #[test]
    fn trim_composes() {
        let chain = filled(10);
        let twice = chain.trim(3).unwrap().trim(4).unwrap();
        let once = chain.trim(7).unwrap();
        assert_eq!(twice, once);
        assert_eq!(once.len(), 3);
        assert_eq!(once.metadata.burnin, 2 + 7);
        assert_eq!(once.draw(0), Some(state(7.0)));
    }

    #[test]
    fn trim_beyond_length_fails() {
        let chain = filled(3);
        assert!(chain.trim(3).unwrap().is_empty());
        assert_eq!(
            chain.trim(4).unwrap_err(),
            SamplerError::TrimExceedsDraws {
                requested: 4,
                available: 3
            }
        );
    }

    #[test]
    fn concat_keeps_prefix_and_weights_rates() {
        let first = filled(4);
        let mut second = SampleChain::allocate(2, 3, 2, 1, metadata(2, 0));
        for i in 0..2 {
            second.record(i, &state(10.0 + i as f64), &[true; 7]);
            second.record_deltas(i, &[1.0; 6]);
        }
        let joined = first.concat(&second).unwrap();
        assert_eq!(joined.len(), 6);
        for i in 0..4 {
            assert_eq!(joined.draw(i), first.draw(i));
        }
        assert_eq!(joined.draw(5), Some(state(11.0)));
        assert_eq!(joined.metadata.n_sample, 8);
        assert_eq!(joined.deltas.nrows(), 8);

        // Weighted average of 4 draws at the old rate and 2 at 1.0.
        let expected = (first.acceptance_rates() * 4.0 + 2.0) / 6.0;
        for (a, b) in joined.acceptance_rates().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn posterior_mean_and_risk_surface() {
        let chain = filled(3);
        let mean = chain.posterior_mean().unwrap();
        assert_abs_diff_eq!(mean.theta, 2.0);
        assert_eq!(mean.w, arr1(&[1.0, -1.0, 2.0]));
        assert!(filled(0).posterior_mean().is_none());

        // Draw i: beta diff = [i, 1 - i], alpha diff = 2i, w = [i, -i, 2i].
        let x = arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let surface = chain.log_risk_surface(x.view()).unwrap();
        let expected: Vec<f64> = (0..3)
            .map(|cell| {
                (0..3)
                    .map(|i| {
                        let i = i as f64;
                        let fixed = [i, 1.0 - i, 1.0][cell];
                        let w = [i, -i, 2.0 * i][cell];
                        fixed + 2.0 * i * w
                    })
                    .sum::<f64>()
                    / 3.0
            })
            .collect();
        for (a, b) in surface.iter().zip(expected) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }

        let bad = arr2(&[[1.0, 0.0]]);
        assert!(chain.log_risk_surface(bad.view()).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let chain = filled(2);
        let json = serde_json::to_string(&chain).unwrap();
        let back: SampleChain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }
}

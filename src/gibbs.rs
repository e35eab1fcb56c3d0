//! The Gibbs driver.
//!
//! One sweep updates the blocks strictly in the order
//! `beta.loc → w → theta → phi → beta.ca → alpha.ca → beta.co → alpha.co`,
//! each conditioning on the latest values of all the others. The six
//! gradient-friendly blocks move by HMC with their own step-size schedule, the
//! range by a random-walk Metropolis step, and the marginal variance by a
//! conjugate draw.

use log::{debug, info, warn};
use ndarray::{arr1, Array1};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::chain::{ChainMetadata, SampleChain};
use crate::config::{SamplerConfig, StepSizeControl};
use crate::covariance::SpatialCovariance;
use crate::data::{Dataset, DistanceMatrix};
use crate::distributions::sample_conjugate_variance;
use crate::error::SamplerError;
use crate::hmc::{HamiltonianTarget, HmcOutcome, HmcUpdate};
use crate::metropolis_hastings::RangeUpdate;
use crate::potentials::{
    AlphaTarget, CoefficientTarget, CountChannel, FieldConditioning, FieldTarget, LocationTarget,
};
use crate::state::{Block, HmcBlock, ParameterState};
use crate::tuning::TuningState;

/// Consecutive HMC rejections of one block after which a warning is logged.
const REJECTION_STREAK_WARN: usize = 50;
const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum StepSchedule {
    Adaptive(TuningState),
    Fixed(f64),
}

impl StepSchedule {
    fn from_control(control: StepSizeControl) -> Self {
        match control {
            StepSizeControl::Adaptive {
                window,
                target,
                initial,
            } => StepSchedule::Adaptive(TuningState::initialize(window, target, initial)),
            StepSizeControl::Fixed(delta) => StepSchedule::Fixed(delta),
        }
    }

    fn current(&self) -> f64 {
        match self {
            StepSchedule::Adaptive(tuning) => tuning.delta_curr,
            StepSchedule::Fixed(delta) => *delta,
        }
    }
}

/// Step-size schedule and rejection bookkeeping of one HMC block.
#[derive(Debug, Clone, Copy)]
struct BlockTuner {
    block: HmcBlock,
    schedule: StepSchedule,
    rejection_streak: usize,
}

impl BlockTuner {
    /// One HMC transition of `current`, followed by the step-size update.
    fn advance<G>(
        &mut self,
        n_leapfrog: usize,
        target: &G,
        current: &Array1<f64>,
        iteration: usize,
        rng: &mut SmallRng,
    ) -> HmcOutcome<Array1<f64>>
    where
        G: HamiltonianTarget<Array1<f64>>,
    {
        let out = HmcUpdate::new(self.schedule.current(), n_leapfrog).step(target, current, rng);
        if let StepSchedule::Adaptive(tuning) = self.schedule {
            let next = tuning.update(out.step_size, iteration, out.accept_prob);
            if next.window_closed_now() {
                info!(
                    "{:?}: tuning window closed at step size {:.3e}, mean acceptance {:.3}",
                    self.block,
                    next.delta_curr,
                    next.window_acceptance()
                );
            }
            self.schedule = StepSchedule::Adaptive(next);
        }
        if out.accepted {
            self.rejection_streak = 0;
        } else {
            self.rejection_streak += 1;
            if self.rejection_streak % REJECTION_STREAK_WARN == 0 {
                warn!(
                    "{:?}: {} consecutive HMC rejections at iteration {iteration} (step size {:.3e})",
                    self.block,
                    self.rejection_streak,
                    out.step_size
                );
            }
        }
        out
    }
}

/// A single chain of the Gibbs sampler, owning its state and random stream.
pub struct GibbsSampler<'a> {
    data: &'a Dataset,
    distances: &'a DistanceMatrix,
    config: SamplerConfig,
    state: ParameterState,
    tuners: [BlockTuner; 6],
    range_update: RangeUpdate,
    rng: SmallRng,
}

impl<'a> GibbsSampler<'a> {
    /// Validates the inputs and resolves the starting state.
    ///
    /// Every dimension check happens here, before any sweep.
    pub fn new(
        data: &'a Dataset,
        distances: &'a DistanceMatrix,
        config: SamplerConfig,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        data.validate()?;
        data.check_distances(distances)?;
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let state =
            ParameterState::initialize(data, distances, &config.priors, &config.initial, &mut rng)?;
        state.check_dims(data)?;
        let tuners = HmcBlock::ALL.map(|block| BlockTuner {
            block,
            schedule: StepSchedule::from_control(config.step_sizes.get(block)),
            rejection_streak: 0,
        });
        Ok(Self {
            data,
            distances,
            range_update: RangeUpdate::new(config.proposal_sd_theta),
            config,
            state,
            tuners,
            rng,
        })
    }

    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    /// Step size each HMC block will use next, ordered as [`HmcBlock::ALL`].
    pub fn step_sizes(&self) -> [f64; 6] {
        self.tuners.map(|t| t.schedule.current())
    }

    /// Runs one full sweep; `iteration` is 1-based. Returns the accept
    /// indicators ordered as [`Block::ALL`].
    pub fn sweep(&mut self, iteration: usize) -> Result<[bool; 7], SamplerError> {
        let Self {
            data,
            distances,
            config,
            state,
            tuners,
            range_update,
            rng,
        } = self;
        let data: &Dataset = data;
        let priors = &config.priors;
        let leapfrog = &config.leapfrog;
        let mut accepted = [false; 7];

        let target = LocationTarget::new(data, state.w.view(), priors.beta_var);
        let out = tuners[HmcBlock::BetaLoc.index()].advance(
            leapfrog.beta_loc,
            &target,
            &state.beta_loc,
            iteration,
            rng,
        );
        state.beta_loc = out.position;
        accepted[Block::BetaLoc.index()] = out.accepted;

        let cov = SpatialCovariance::new(distances, state.theta, state.phi)?;
        let given = FieldConditioning {
            beta_case: state.beta_case.view(),
            beta_control: state.beta_control.view(),
            beta_loc: state.beta_loc.view(),
            alpha_case: state.alpha_case,
            alpha_control: state.alpha_control,
        };
        let target = FieldTarget::new(data, given, cov.inverse());
        let out = tuners[HmcBlock::W.index()].advance(leapfrog.w, &target, &state.w, iteration, rng);
        state.w = out.position;
        accepted[Block::W.index()] = out.accepted;

        let range = range_update.step(distances, state.w.view(), cov, priors, rng);
        state.theta = range.covariance.theta();
        accepted[Block::Theta.index()] = range.accepted;

        state.phi = sample_conjugate_variance(
            data.n_cells(),
            range.covariance.correlation_quad_form(state.w.view()),
            priors.phi_shape,
            priors.phi_scale,
            rng,
        )?;

        let w_obs = data.field_at_observations(state.w.view());

        let cases = CountChannel::cases(data);
        let target = CoefficientTarget::new(cases, state.alpha_case, w_obs.view(), priors.beta_var);
        let out = tuners[HmcBlock::BetaCase.index()].advance(
            leapfrog.beta_case,
            &target,
            &state.beta_case,
            iteration,
            rng,
        );
        state.beta_case = out.position;
        accepted[Block::BetaCase.index()] = out.accepted;

        let target = AlphaTarget::new(
            cases,
            state.beta_case.view(),
            w_obs.view(),
            priors.alpha_case_mean,
            priors.alpha_case_var,
        );
        let out = tuners[HmcBlock::AlphaCase.index()].advance(
            leapfrog.alpha_case,
            &target,
            &arr1(&[state.alpha_case]),
            iteration,
            rng,
        );
        state.alpha_case = out.position[0];
        accepted[Block::AlphaCase.index()] = out.accepted;

        let controls = CountChannel::controls(data);
        let target =
            CoefficientTarget::new(controls, state.alpha_control, w_obs.view(), priors.beta_var);
        let out = tuners[HmcBlock::BetaControl.index()].advance(
            leapfrog.beta_control,
            &target,
            &state.beta_control,
            iteration,
            rng,
        );
        state.beta_control = out.position;
        accepted[Block::BetaControl.index()] = out.accepted;

        let target = AlphaTarget::new(
            controls,
            state.beta_control.view(),
            w_obs.view(),
            priors.alpha_control_mean,
            priors.alpha_control_var,
        );
        let out = tuners[HmcBlock::AlphaControl.index()].advance(
            leapfrog.alpha_control,
            &target,
            &arr1(&[state.alpha_control]),
            iteration,
            rng,
        );
        state.alpha_control = out.position[0];
        accepted[Block::AlphaControl.index()] = out.accepted;

        Ok(accepted)
    }

    /// Runs `n_sample` sweeps, storing every sweep after the burnin.
    pub fn run(mut self) -> Result<SampleChain, SamplerError> {
        let n_sample = self.config.n_sample;
        let burnin = self.config.burnin;
        info!(
            "Starting chain: {} cells, {} observations, {n_sample} sweeps ({burnin} burnin), seed {}",
            self.data.n_cells(),
            self.data.n_obs(),
            self.config.seed
        );

        let metadata = ChainMetadata {
            priors: self.config.priors,
            leapfrog: self.config.leapfrog,
            proposal_sd_theta: self.config.proposal_sd_theta,
            step_sizes: self.config.step_sizes,
            n_sample,
            burnin,
            seed: self.config.seed,
        };
        let mut chain = SampleChain::allocate(
            self.config.n_keep(),
            self.data.n_cells(),
            self.data.n_case_covariates(),
            self.data.n_location_covariates(),
            metadata,
        );

        for iteration in 1..=n_sample {
            let accepted = self.sweep(iteration)?;
            chain.record_deltas(iteration - 1, &self.step_sizes());
            if iteration > burnin {
                chain.record(iteration - burnin - 1, &self.state, &accepted);
            }
            if iteration % PROGRESS_EVERY == 0 {
                debug!(
                    "Iteration {iteration}/{n_sample}: theta = {:.4}, phi = {:.4}, step sizes {:?}",
                    self.state.theta,
                    self.state.phi,
                    self.step_sizes()
                );
            }
        }

        info!(
            "Chain finished: {} draws kept, acceptance rates {:?}",
            chain.len(),
            chain.acceptance_rates().to_vec()
        );
        Ok(chain)
    }
}

/// Runs one chain from scratch.
pub fn run_chain(
    data: &Dataset,
    distances: &DistanceMatrix,
    config: SamplerConfig,
) -> Result<SampleChain, SamplerError> {
    GibbsSampler::new(data, distances, config)?.run()
}

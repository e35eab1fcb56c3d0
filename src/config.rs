//! Sampler configuration, resolved once when a chain is constructed.
//!
//! Everything the Gibbs driver needs is spelled out here; no block reads a
//! value that is not a field of [`SamplerConfig`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;
use crate::state::HmcBlock;

/// Prior hyperparameters.
///
/// No `Default`: every hyperparameter, including the alpha prior means, is
/// supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    /// Gamma shape and rate for the range `theta`.
    pub theta_shape: f64,
    pub theta_rate: f64,
    /// Inverse-gamma shape and scale for the marginal variance `phi`.
    pub phi_shape: f64,
    pub phi_scale: f64,
    /// Normal mean and variance for `alpha.ca`.
    pub alpha_case_mean: f64,
    pub alpha_case_var: f64,
    /// Normal mean and variance for `alpha.co`.
    pub alpha_control_mean: f64,
    pub alpha_control_var: f64,
    /// Variance of the weak `N(0, beta_var I)` prior on every coefficient vector.
    pub beta_var: f64,
}

impl Priors {
    pub fn new(
        theta: (f64, f64),
        phi: (f64, f64),
        alpha_case: (f64, f64),
        alpha_control: (f64, f64),
    ) -> Self {
        Self {
            theta_shape: theta.0,
            theta_rate: theta.1,
            phi_shape: phi.0,
            phi_scale: phi.1,
            alpha_case_mean: alpha_case.0,
            alpha_case_var: alpha_case.1,
            alpha_control_mean: alpha_control.0,
            alpha_control_var: alpha_control.1,
            beta_var: 100.0,
        }
    }

    fn validate(&self) -> Result<(), SamplerError> {
        let positive = [
            ("theta shape", self.theta_shape),
            ("theta rate", self.theta_rate),
            ("phi shape", self.phi_shape),
            ("phi scale", self.phi_scale),
            ("alpha.ca prior variance", self.alpha_case_var),
            ("alpha.co prior variance", self.alpha_control_var),
            ("beta prior variance", self.beta_var),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SamplerError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !self.alpha_case_mean.is_finite() || !self.alpha_control_mean.is_finite() {
            return Err(SamplerError::InvalidConfig(
                "alpha prior means must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Leapfrog step counts, one per HMC block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeapfrogSteps {
    pub w: usize,
    pub beta_case: usize,
    pub beta_control: usize,
    pub alpha_case: usize,
    pub alpha_control: usize,
    pub beta_loc: usize,
}

impl Default for LeapfrogSteps {
    fn default() -> Self {
        Self::uniform(20)
    }
}

impl LeapfrogSteps {
    pub fn uniform(n: usize) -> Self {
        Self {
            w: n,
            beta_case: n,
            beta_control: n,
            alpha_case: n,
            alpha_control: n,
            beta_loc: n,
        }
    }

    pub fn get(&self, block: HmcBlock) -> usize {
        match block {
            HmcBlock::W => self.w,
            HmcBlock::BetaCase => self.beta_case,
            HmcBlock::BetaControl => self.beta_control,
            HmcBlock::AlphaCase => self.alpha_case,
            HmcBlock::AlphaControl => self.alpha_control,
            HmcBlock::BetaLoc => self.beta_loc,
        }
    }
}

/// How one HMC block chooses its step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepSizeControl {
    /// Dual-averaging adaptation over the first `window` iterations.
    Adaptive {
        window: usize,
        target: f64,
        initial: f64,
    },
    /// Step size held fixed for the whole run.
    Fixed(f64),
}

impl Default for StepSizeControl {
    fn default() -> Self {
        StepSizeControl::Adaptive {
            window: 1000,
            target: 0.75,
            initial: 0.05,
        }
    }
}

impl StepSizeControl {
    pub fn is_adaptive(&self) -> bool {
        matches!(self, StepSizeControl::Adaptive { .. })
    }

    fn validate(&self, block: HmcBlock) -> Result<(), SamplerError> {
        let ok = match *self {
            StepSizeControl::Adaptive {
                window: _,
                target,
                initial,
            } => target > 0.0 && target < 1.0 && initial > 0.0 && initial.is_finite(),
            StepSizeControl::Fixed(delta) => delta > 0.0 && delta.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(SamplerError::InvalidConfig(format!(
                "invalid step size control for {block:?}: {self:?}"
            )))
        }
    }
}

/// Step-size control for every HMC block.
///
/// The location block has its own window like every other block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepSizes {
    pub w: StepSizeControl,
    pub beta_case: StepSizeControl,
    pub beta_control: StepSizeControl,
    pub alpha_case: StepSizeControl,
    pub alpha_control: StepSizeControl,
    pub beta_loc: StepSizeControl,
}

impl StepSizes {
    /// Every block fixed at the given step sizes, indexed by [`HmcBlock::ALL`].
    pub fn fixed(deltas: [f64; 6]) -> Self {
        let mut out = Self::default();
        for (block, delta) in HmcBlock::ALL.into_iter().zip(deltas) {
            *out.get_mut(block) = StepSizeControl::Fixed(delta);
        }
        out
    }

    pub fn get(&self, block: HmcBlock) -> StepSizeControl {
        match block {
            HmcBlock::W => self.w,
            HmcBlock::BetaCase => self.beta_case,
            HmcBlock::BetaControl => self.beta_control,
            HmcBlock::AlphaCase => self.alpha_case,
            HmcBlock::AlphaControl => self.alpha_control,
            HmcBlock::BetaLoc => self.beta_loc,
        }
    }

    pub fn get_mut(&mut self, block: HmcBlock) -> &mut StepSizeControl {
        match block {
            HmcBlock::W => &mut self.w,
            HmcBlock::BetaCase => &mut self.beta_case,
            HmcBlock::BetaControl => &mut self.beta_control,
            HmcBlock::AlphaCase => &mut self.alpha_case,
            HmcBlock::AlphaControl => &mut self.alpha_control,
            HmcBlock::BetaLoc => &mut self.beta_loc,
        }
    }
}

/// Optional starting values; `None` fields are drawn at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialValues {
    pub w: Option<Array1<f64>>,
    pub theta: Option<f64>,
    pub phi: Option<f64>,
    pub beta_case: Option<Array1<f64>>,
    pub beta_control: Option<Array1<f64>>,
    pub beta_loc: Option<Array1<f64>>,
    pub alpha_case: Option<f64>,
    pub alpha_control: Option<f64>,
}

/// Full configuration of one chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Total number of Gibbs sweeps.
    pub n_sample: usize,
    /// Leading sweeps that are run but not stored.
    pub burnin: usize,
    pub seed: u64,
    pub leapfrog: LeapfrogSteps,
    /// Standard deviation of the random-walk proposal for `theta`.
    pub proposal_sd_theta: f64,
    pub step_sizes: StepSizes,
    pub priors: Priors,
    pub initial: InitialValues,
}

impl SamplerConfig {
    /// Configuration with default leapfrog counts, proposal scale and
    /// adaptive step sizes.
    pub fn new(n_sample: usize, burnin: usize, priors: Priors) -> Self {
        Self {
            n_sample,
            burnin,
            seed: 42,
            leapfrog: LeapfrogSteps::default(),
            proposal_sd_theta: 0.3,
            step_sizes: StepSizes::default(),
            priors,
            initial: InitialValues::default(),
        }
    }

    /// Sets a new random seed.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_leapfrog(mut self, leapfrog: LeapfrogSteps) -> Self {
        self.leapfrog = leapfrog;
        self
    }

    pub fn with_proposal_sd_theta(mut self, sd: f64) -> Self {
        self.proposal_sd_theta = sd;
        self
    }

    pub fn with_step_sizes(mut self, step_sizes: StepSizes) -> Self {
        self.step_sizes = step_sizes;
        self
    }

    pub fn with_initial(mut self, initial: InitialValues) -> Self {
        self.initial = initial;
        self
    }

    /// Number of draws that will be stored.
    pub fn n_keep(&self) -> usize {
        self.n_sample - self.burnin
    }

    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.burnin > self.n_sample {
            return Err(SamplerError::InvalidConfig(format!(
                "burnin ({}) exceeds n_sample ({})",
                self.burnin, self.n_sample
            )));
        }
        if !(self.proposal_sd_theta > 0.0 && self.proposal_sd_theta.is_finite()) {
            return Err(SamplerError::InvalidConfig(format!(
                "proposal_sd_theta must be positive, got {}",
                self.proposal_sd_theta
            )));
        }
        for block in HmcBlock::ALL {
            if self.leapfrog.get(block) == 0 {
                return Err(SamplerError::InvalidConfig(format!(
                    "leapfrog count for {block:?} must be positive"
                )));
            }
            self.step_sizes.get(block).validate(block)?;
        }
        self.priors.validate()
    }
}

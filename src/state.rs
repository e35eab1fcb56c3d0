//! The parameter blocks of the model and the chain's current state.

use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::{InitialValues, Priors};
use crate::covariance::SpatialCovariance;
use crate::data::{Dataset, DistanceMatrix};
use crate::distributions::{sample_gamma, sample_inverse_gamma};
use crate::error::SamplerError;

/// The seven blocks that go through an accept/reject step, in the order of
/// the acceptance vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    W,
    Theta,
    BetaCase,
    BetaControl,
    AlphaCase,
    AlphaControl,
    BetaLoc,
}

impl Block {
    pub const ALL: [Block; 7] = [
        Block::W,
        Block::Theta,
        Block::BetaCase,
        Block::BetaControl,
        Block::AlphaCase,
        Block::AlphaControl,
        Block::BetaLoc,
    ];

    /// Position in the acceptance vector.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The six blocks updated by HMC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HmcBlock {
    W,
    BetaCase,
    BetaControl,
    AlphaCase,
    AlphaControl,
    BetaLoc,
}

impl HmcBlock {
    pub const ALL: [HmcBlock; 6] = [
        HmcBlock::W,
        HmcBlock::BetaCase,
        HmcBlock::BetaControl,
        HmcBlock::AlphaCase,
        HmcBlock::AlphaControl,
        HmcBlock::BetaLoc,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn block(self) -> Block {
        match self {
            HmcBlock::W => Block::W,
            HmcBlock::BetaCase => Block::BetaCase,
            HmcBlock::BetaControl => Block::BetaControl,
            HmcBlock::AlphaCase => Block::AlphaCase,
            HmcBlock::AlphaControl => Block::AlphaControl,
            HmcBlock::BetaLoc => Block::BetaLoc,
        }
    }
}

/// Current values of every model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    /// Latent spatial field over all `N.w` cells.
    pub w: Array1<f64>,
    /// Covariance range.
    pub theta: f64,
    /// Marginal variance.
    pub phi: f64,
    pub beta_case: Array1<f64>,
    pub beta_control: Array1<f64>,
    pub beta_loc: Array1<f64>,
    pub alpha_case: f64,
    pub alpha_control: f64,
}

impl ParameterState {
    /// Resolves `initial` against the data, drawing every missing value.
    ///
    /// Coefficient vectors are sized from their own design matrices: the case
    /// and control coefficients from `X.c`, the location coefficients from
    /// `X.loc`. Draws happen in a fixed order so a seed fully determines the
    /// starting point.
    pub fn initialize<R: Rng + ?Sized>(
        data: &Dataset,
        distances: &DistanceMatrix,
        priors: &Priors,
        initial: &InitialValues,
        rng: &mut R,
    ) -> Result<Self, SamplerError> {
        let p_case = data.n_case_covariates();
        let p_loc = data.n_location_covariates();

        let theta = match initial.theta {
            Some(theta) => theta,
            None => sample_gamma(priors.theta_shape, priors.theta_rate, rng)?,
        };
        let phi = match initial.phi {
            Some(phi) => phi,
            None => sample_inverse_gamma(priors.phi_shape, priors.phi_scale, rng)?,
        };
        if !(theta > 0.0 && theta.is_finite() && phi > 0.0 && phi.is_finite()) {
            return Err(SamplerError::InvalidConfig(format!(
                "initial theta and phi must be positive, got {theta} and {phi}"
            )));
        }

        let beta_case = resolve_vector("initial beta.ca", &initial.beta_case, p_case, rng)?;
        let beta_control = resolve_vector("initial beta.co", &initial.beta_control, p_case, rng)?;
        let beta_loc = resolve_vector("initial beta.loc", &initial.beta_loc, p_loc, rng)?;
        let alpha_case = match initial.alpha_case {
            Some(a) => a,
            None => rng.sample::<f64, _>(StandardNormal).abs(),
        };
        let alpha_control = match initial.alpha_control {
            Some(a) => a,
            None => -rng.sample::<f64, _>(StandardNormal).abs(),
        };

        let w = match &initial.w {
            Some(w) => {
                check_len("initial w", w.len(), data.n_cells())?;
                w.clone()
            }
            None => SpatialCovariance::new(distances, theta, phi)?.sample(rng),
        };

        let state = Self {
            w,
            theta,
            phi,
            beta_case,
            beta_control,
            beta_loc,
            alpha_case,
            alpha_control,
        };
        if !state.is_finite() {
            return Err(SamplerError::InvalidConfig(
                "initial values contain non-finite entries".into(),
            ));
        }
        Ok(state)
    }

    pub fn is_finite(&self) -> bool {
        self.w.iter().all(|x| x.is_finite())
            && self.beta_case.iter().all(|x| x.is_finite())
            && self.beta_control.iter().all(|x| x.is_finite())
            && self.beta_loc.iter().all(|x| x.is_finite())
            && [self.theta, self.phi, self.alpha_case, self.alpha_control]
                .iter()
                .all(|x| x.is_finite())
    }

    /// Checks every block against the data's dimensions.
    pub fn check_dims(&self, data: &Dataset) -> Result<(), SamplerError> {
        check_len("w length", self.w.len(), data.n_cells())?;
        check_len("beta.ca length", self.beta_case.len(), data.n_case_covariates())?;
        check_len("beta.co length", self.beta_control.len(), data.n_case_covariates())?;
        check_len("beta.loc length", self.beta_loc.len(), data.n_location_covariates())
    }
}

fn check_len(what: &'static str, found: usize, expected: usize) -> Result<(), SamplerError> {
    if found != expected {
        return Err(SamplerError::DimensionMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn resolve_vector<R: Rng + ?Sized>(
    what: &'static str,
    supplied: &Option<Array1<f64>>,
    len: usize,
    rng: &mut R,
) -> Result<Array1<f64>, SamplerError> {
    match supplied {
        Some(v) => {
            check_len(what, v.len(), len)?;
            Ok(v.clone())
        }
        None => Ok((0..len).map(|_| rng.sample(StandardNormal)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{grid_dataset, test_priors};
    use ndarray::arr1;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn block_indices_follow_acceptance_order() {
        for (i, block) in Block::ALL.iter().enumerate() {
            assert_eq!(block.index(), i);
        }
        assert_eq!(HmcBlock::BetaLoc.block(), Block::BetaLoc);
        assert_eq!(HmcBlock::W.block().index(), 0);
    }

    #[test]
    fn drawn_initial_values_have_model_dimensions() {
        let (data, d) = grid_dataset(4, 7);
        let mut rng = SmallRng::seed_from_u64(42);
        let state = ParameterState::initialize(
            &data,
            &d,
            &test_priors(),
            &InitialValues::default(),
            &mut rng,
        )
        .unwrap();
        state.check_dims(&data).unwrap();
        assert_eq!(state.beta_loc.len(), data.n_location_covariates());
        assert!(state.theta > 0.0 && state.phi > 0.0);
        assert!(state.alpha_case >= 0.0 && state.alpha_control <= 0.0);
    }

    #[test]
    fn supplied_values_are_kept_and_checked() {
        let (data, d) = grid_dataset(3, 7);
        let mut rng = SmallRng::seed_from_u64(1);
        let initial = InitialValues {
            theta: Some(1.5),
            phi: Some(0.5),
            alpha_case: Some(0.3),
            beta_loc: Some(arr1(&[-1.0, 0.5])),
            ..InitialValues::default()
        };
        let state =
            ParameterState::initialize(&data, &d, &test_priors(), &initial, &mut rng).unwrap();
        assert_eq!(state.theta, 1.5);
        assert_eq!(state.phi, 0.5);
        assert_eq!(state.alpha_case, 0.3);
        assert_eq!(state.beta_loc, arr1(&[-1.0, 0.5]));

        let bad = InitialValues {
            beta_case: Some(arr1(&[1.0, 2.0, 3.0, 4.0, 5.0])),
            ..InitialValues::default()
        };
        let err =
            ParameterState::initialize(&data, &d, &test_priors(), &bad, &mut rng).unwrap_err();
        assert!(matches!(err, SamplerError::DimensionMismatch { .. }));
    }
}

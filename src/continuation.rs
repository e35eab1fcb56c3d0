//! Resuming a finished chain.
//!
//! The continued run starts from the chain's last stored state, holds every
//! HMC step size at its last recorded value (adaptation is over), stores all
//! of its sweeps, and is appended to the original draws.

use log::info;

use crate::chain::SampleChain;
use crate::config::{InitialValues, SamplerConfig, StepSizes};
use crate::data::{Dataset, DistanceMatrix};
use crate::error::SamplerError;
use crate::gibbs::run_chain;

/// Runs `n_sample` more sweeps of `chain` and returns the concatenated chain.
///
/// Fails with [`SamplerError::InvalidCheckpoint`] when the chain has no stored
/// draw, no step-size trajectory, or metadata that no longer describes a
/// valid run.
pub fn continue_chain(
    data: &Dataset,
    distances: &DistanceMatrix,
    chain: &SampleChain,
    n_sample: usize,
    seed: u64,
) -> Result<SampleChain, SamplerError> {
    let last = chain
        .last_state()
        .ok_or_else(|| SamplerError::InvalidCheckpoint("chain has no stored draws".into()))?;
    if chain.deltas.nrows() != chain.metadata.n_sample {
        return Err(SamplerError::InvalidCheckpoint(format!(
            "step-size trajectory has {} rows for {} recorded sweeps",
            chain.deltas.nrows(),
            chain.metadata.n_sample
        )));
    }
    let deltas = chain.last_deltas().ok_or_else(|| {
        SamplerError::InvalidCheckpoint("chain has no trailing step sizes".into())
    })?;
    if let Some(bad) = deltas.iter().find(|d| !(**d > 0.0 && d.is_finite())) {
        return Err(SamplerError::InvalidCheckpoint(format!(
            "trailing step size {bad} is not a positive number"
        )));
    }

    let meta = &chain.metadata;
    let initial = InitialValues {
        w: Some(last.w),
        theta: Some(last.theta),
        phi: Some(last.phi),
        beta_case: Some(last.beta_case),
        beta_control: Some(last.beta_control),
        beta_loc: Some(last.beta_loc),
        alpha_case: Some(last.alpha_case),
        alpha_control: Some(last.alpha_control),
    };
    let config = SamplerConfig::new(n_sample, 0, meta.priors)
        .set_seed(seed)
        .with_leapfrog(meta.leapfrog)
        .with_proposal_sd_theta(meta.proposal_sd_theta)
        .with_step_sizes(StepSizes::fixed(deltas))
        .with_initial(initial);
    config.validate().map_err(|e| {
        SamplerError::InvalidCheckpoint(format!("chain metadata does not describe a valid run: {e}"))
    })?;

    info!(
        "Continuing chain of {} draws for {n_sample} more sweeps with step sizes {deltas:?}",
        chain.len()
    );
    let extension = run_chain(data, distances, config)?;
    chain.concat(&extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{grid_dataset, test_priors};
    use ndarray::Array2;

    fn base_chain() -> (Dataset, DistanceMatrix, SampleChain) {
        let (data, d) = grid_dataset(3, 21);
        let config = SamplerConfig::new(12, 4, test_priors()).set_seed(5);
        let chain = run_chain(&data, &d, config).unwrap();
        (data, d, chain)
    }

    #[test]
    fn continued_chain_extends_the_original() {
        let (data, d, chain) = base_chain();
        let longer = continue_chain(&data, &d, &chain, 6, 99).unwrap();
        assert_eq!(longer.len(), chain.len() + 6);
        for i in 0..chain.len() {
            assert_eq!(longer.draw(i), chain.draw(i));
        }
        assert_eq!(longer.metadata.n_sample, 18);
        assert_eq!(longer.metadata.burnin, 4);

        // Continued sweeps run at the frozen step sizes.
        let frozen = chain.last_deltas().unwrap();
        for row in longer.deltas.rows().into_iter().skip(12) {
            assert_eq!(row.to_vec(), frozen.to_vec());
        }
    }

    #[test]
    fn continued_chain_can_be_continued_again() {
        let (data, d, chain) = base_chain();
        let once = continue_chain(&data, &d, &chain, 3, 1).unwrap();
        let twice = continue_chain(&data, &d, &once, 3, 2).unwrap();
        assert_eq!(twice.len(), chain.len() + 6);
        assert_eq!(twice.deltas.nrows(), 18);
    }

    #[test]
    fn empty_chain_is_an_invalid_checkpoint() {
        let (data, d, chain) = base_chain();
        let empty = chain.trim(chain.len()).unwrap();
        let err = continue_chain(&data, &d, &empty, 5, 1).unwrap_err();
        assert!(matches!(err, SamplerError::InvalidCheckpoint(_)));
    }

    #[test]
    fn missing_step_sizes_are_an_invalid_checkpoint() {
        let (data, d, mut chain) = base_chain();
        chain.deltas = Array2::zeros((0, 6));
        let err = continue_chain(&data, &d, &chain, 5, 1).unwrap_err();
        assert!(matches!(err, SamplerError::InvalidCheckpoint(_)));

        let (_, _, mut chain) = base_chain();
        chain.metadata.proposal_sd_theta = 0.0;
        let err = continue_chain(&data, &d, &chain, 5, 1).unwrap_err();
        assert!(matches!(err, SamplerError::InvalidCheckpoint(_)));
    }
}

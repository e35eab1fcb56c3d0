//! MCMC for spatial case-control counts under preferential sampling.
//!
//! A latent Gaussian field `w` with exponential covariance drives the case
//! and control intensities and, through a logistic model, where sampling
//! happened at all. [`gibbs::run_chain`] runs the sampler;
//! [`continuation::continue_chain`] extends a finished chain.

pub mod chain;
pub mod config;
pub mod continuation;
pub mod covariance;
pub mod data;
pub mod distributions;
pub mod error;
pub mod euclidean;
pub mod gibbs;
pub mod hmc;
pub mod metropolis_hastings;
pub mod potentials;
pub mod state;
pub mod tuning;

#[cfg(test)]
mod test_fixtures;

pub use chain::{ChainMetadata, SampleChain};
pub use config::{InitialValues, LeapfrogSteps, Priors, SamplerConfig, StepSizeControl, StepSizes};
pub use continuation::continue_chain;
pub use data::{Dataset, DistanceMatrix, LocationData};
pub use error::SamplerError;
pub use gibbs::{run_chain, GibbsSampler};
pub use state::{Block, HmcBlock, ParameterState};

/*!
# Metropolis–Hastings update for the covariance range

The range `theta` has no gradient-friendly full conditional worth the cost of
HMC (every evaluation refactors an `N.w × N.w` matrix), so it moves by a
symmetric Gaussian random walk:

- **Proposal**: `theta* = theta + N(0, proposal_sd²)`.
- **Target**: the `Gamma(shape, rate)` prior times the Gaussian-process
  likelihood `N(w; 0, Sigma(theta, phi))` of the current field.
- **Support**: `theta* <= 0` has log-density `-inf` and is always rejected.
  A proposal whose covariance does not factor is rejected as well.

The update hands back the factored covariance at the resulting `theta`, so the
conjugate variance draw that follows can reuse it.

## Example Usage

```rust
use ndarray::arr2;
use prefsample::config::Priors;
use prefsample::covariance::SpatialCovariance;
use prefsample::data::DistanceMatrix;
use prefsample::metropolis_hastings::RangeUpdate;
use rand::{rngs::SmallRng, SeedableRng};

let coords = arr2(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
let d = DistanceMatrix::from_coordinates(&coords).unwrap();
let priors = Priors::new((2.0, 1.0), (2.0, 1.0), (1.0, 4.0), (-1.0, 4.0));

let mut rng = SmallRng::seed_from_u64(42);
let current = SpatialCovariance::new(&d, 1.0, 1.0).unwrap();
let w = current.sample(&mut rng);

let out = RangeUpdate::new(0.3).step(&d, w.view(), current, &priors, &mut rng);
assert!(out.covariance.theta() > 0.0);
```
*/

use log::warn;
use ndarray::ArrayView1;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::Priors;
use crate::covariance::SpatialCovariance;
use crate::data::DistanceMatrix;
use crate::distributions::gamma_log_density;

/// Random-walk settings for the range update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeUpdate {
    /// Standard deviation of the Gaussian increment.
    pub proposal_sd: f64,
}

/// Result of one range update.
#[derive(Debug, Clone)]
pub struct RangeOutcome {
    /// Covariance at the post-update `theta` (and the unchanged `phi`).
    pub covariance: SpatialCovariance,
    pub accepted: bool,
    /// The proposed value, kept for diagnostics.
    pub proposed: f64,
}

impl RangeUpdate {
    pub fn new(proposal_sd: f64) -> Self {
        Self { proposal_sd }
    }

    /// Unnormalized log full conditional of `theta` given `w` and `phi`,
    /// evaluated through an already-factored covariance.
    pub fn log_target(cov: &SpatialCovariance, w: ArrayView1<f64>, priors: &Priors) -> f64 {
        gamma_log_density(cov.theta(), priors.theta_shape, priors.theta_rate) + cov.log_density(w)
    }

    /// Performs one Metropolis–Hastings step from `current`.
    ///
    /// Exactly one normal and one uniform are drawn per call, whatever the
    /// outcome.
    pub fn step<R: Rng + ?Sized>(
        &self,
        distances: &DistanceMatrix,
        w: ArrayView1<f64>,
        current: SpatialCovariance,
        priors: &Priors,
        rng: &mut R,
    ) -> RangeOutcome {
        let z: f64 = rng.sample(StandardNormal);
        let ln_u = rng.gen::<f64>().ln();
        let proposed = current.theta() + self.proposal_sd * z;

        let rejected = |covariance| RangeOutcome {
            covariance,
            accepted: false,
            proposed,
        };
        if proposed <= 0.0 {
            return rejected(current);
        }
        let candidate = match SpatialCovariance::new(distances, proposed, current.phi()) {
            Ok(c) => c,
            Err(e) => {
                warn!("Rejecting theta proposal {proposed}: {e}");
                return rejected(current);
            }
        };

        let log_ratio =
            Self::log_target(&candidate, w, priors) - Self::log_target(&current, w, priors);
        if log_ratio.is_finite() && log_ratio >= ln_u {
            RangeOutcome {
                covariance: candidate,
                accepted: true,
                proposed,
            }
        } else {
            rejected(current)
        }
    }
}

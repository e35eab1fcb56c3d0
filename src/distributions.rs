/*!
Prior densities and the closed-form draws used by the non-HMC blocks.

Log-densities are returned up to the normalizing terms that cancel inside a
Metropolis ratio, except where noted. Arguments outside the support yield
`f64::NEG_INFINITY`, never an error.

# Examples

```rust
use prefsample::distributions::{gamma_log_density, sample_inverse_gamma};
use rand::{rngs::SmallRng, SeedableRng};

assert_eq!(gamma_log_density(-1.0, 2.0, 1.0), f64::NEG_INFINITY);

let mut rng = SmallRng::seed_from_u64(42);
let phi = sample_inverse_gamma(3.0, 2.0, &mut rng).unwrap();
assert!(phi > 0.0);
```
*/

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::error::SamplerError;

/// Unnormalized log-density of `Gamma(shape, rate)` at `x`.
pub fn gamma_log_density(x: f64, shape: f64, rate: f64) -> f64 {
    if x <= 0.0 || !x.is_finite() {
        return f64::NEG_INFINITY;
    }
    (shape - 1.0) * x.ln() - rate * x
}

/// Unnormalized log-density of `Normal(mean, var)` at `x`.
pub fn normal_log_density(x: f64, mean: f64, var: f64) -> f64 {
    -0.5 * (x - mean).powi(2) / var
}

/// Builds `Gamma(shape, 1 / inverse_scale)`. Both parameters must be positive
/// and finite, and so must `1 / inverse_scale`.
fn gamma_with_inverse_scale(
    family: &str,
    shape: f64,
    inverse_scale: f64,
) -> Result<Gamma<f64>, SamplerError> {
    let scale = 1.0 / inverse_scale;
    let shape_ok = shape > 0.0 && shape.is_finite();
    if !(shape_ok && inverse_scale > 0.0 && scale > 0.0 && scale.is_finite()) {
        return Err(SamplerError::InvalidConfig(format!(
            "{family} parameters ({shape}, {inverse_scale}) must be positive and finite"
        )));
    }
    Gamma::new(shape, scale).map_err(|e| {
        SamplerError::InvalidConfig(format!("{family} parameters ({shape}, {inverse_scale}): {e}"))
    })
}

/// Draws from `InverseGamma(shape, scale)` as the reciprocal of a
/// `Gamma(shape, rate = scale)` draw.
///
/// The result is strictly positive; a draw that underflows to zero in the
/// gamma step (possible for tiny shapes) is redrawn.
pub fn sample_inverse_gamma<R: Rng + ?Sized>(
    shape: f64,
    scale: f64,
    rng: &mut R,
) -> Result<f64, SamplerError> {
    let gamma = gamma_with_inverse_scale("inverse-gamma", shape, scale)?;
    loop {
        let g = gamma.sample(rng);
        let x = 1.0 / g;
        if g > 0.0 && x.is_finite() {
            return Ok(x);
        }
    }
}

/// Draws from `Gamma(shape, rate)`.
pub fn sample_gamma<R: Rng + ?Sized>(shape: f64, rate: f64, rng: &mut R) -> Result<f64, SamplerError> {
    let gamma = gamma_with_inverse_scale("gamma", shape, rate)?;
    Ok(gamma.sample(rng))
}

/// Conjugate draw of the marginal variance of an `n_cells`-dimensional
/// Gaussian field: `InverseGamma(n_cells / 2 + shape, correlation_quad / 2 + scale)`,
/// where `correlation_quad = wᵗ R^-1 w` for the unit-variance correlation `R`.
pub fn sample_conjugate_variance<R: Rng + ?Sized>(
    n_cells: usize,
    correlation_quad: f64,
    shape: f64,
    scale: f64,
    rng: &mut R,
) -> Result<f64, SamplerError> {
    if !(correlation_quad >= 0.0 && correlation_quad.is_finite()) {
        return Err(SamplerError::InvalidData(format!(
            "field quadratic form must be non-negative, got {correlation_quad}"
        )));
    }
    sample_inverse_gamma(n_cells as f64 / 2.0 + shape, correlation_quad / 2.0 + scale, rng)
}

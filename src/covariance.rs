//! Exponential spatial covariance `Sigma[i,j] = phi * exp(-d[i,j] / theta)`.
//!
//! The matrix is factored once with a Cholesky decomposition; that single
//! factor serves the Gaussian log-density, the linear solves, and the explicit
//! inverse used by the spatial-field gradient.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::data::DistanceMatrix;
use crate::error::SamplerError;

/// A factored exponential covariance for one `(theta, phi)` pair.
#[derive(Debug, Clone)]
pub struct SpatialCovariance {
    theta: f64,
    phi: f64,
    sigma: DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
    inverse: Array2<f64>,
    log_det: f64,
}

/// Builds the dense exponential covariance matrix without factoring it.
pub fn exponential_covariance(d: &DistanceMatrix, theta: f64, phi: f64) -> DMatrix<f64> {
    let n = d.n_cells();
    DMatrix::from_fn(n, n, |i, j| phi * (-d.get(i, j) / theta).exp())
}

impl SpatialCovariance {
    /// Builds and factors `Sigma`.
    ///
    /// Fails with [`SamplerError::NumericalInstability`] when the matrix does
    /// not factor, and with [`SamplerError::InvalidConfig`] when `theta` or
    /// `phi` is not a positive finite number.
    pub fn new(d: &DistanceMatrix, theta: f64, phi: f64) -> Result<Self, SamplerError> {
        if !(theta > 0.0 && theta.is_finite() && phi > 0.0 && phi.is_finite()) {
            return Err(SamplerError::InvalidConfig(format!(
                "covariance needs theta > 0 and phi > 0, got theta = {theta}, phi = {phi}"
            )));
        }
        let sigma = exponential_covariance(d, theta, phi);
        let chol = Cholesky::new(sigma.clone())
            .ok_or(SamplerError::NumericalInstability { theta, phi })?;
        let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|x| x.ln()).sum::<f64>();
        if !log_det.is_finite() {
            return Err(SamplerError::NumericalInstability { theta, phi });
        }
        let inv = chol.inverse();
        if inv.iter().any(|x| !x.is_finite()) {
            return Err(SamplerError::NumericalInstability { theta, phi });
        }
        let n = sigma.nrows();
        let inverse = Array2::from_shape_fn((n, n), |(i, j)| inv[(i, j)]);
        Ok(Self {
            theta,
            phi,
            sigma,
            chol,
            inverse,
            log_det,
        })
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn dim(&self) -> usize {
        self.sigma.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.sigma
    }

    /// `Sigma^-1`, computed from the Cholesky factor.
    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }

    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    /// Solves `Sigma x = v`.
    pub fn solve(&self, v: ArrayView1<f64>) -> Array1<f64> {
        let b = DVector::from_iterator(v.len(), v.iter().copied());
        let x = self.chol.solve(&b);
        Array1::from_iter(x.iter().copied())
    }

    /// `wᵗ Sigma^-1 w`.
    pub fn quad_form(&self, w: ArrayView1<f64>) -> f64 {
        w.dot(&self.solve(w))
    }

    /// `wᵗ R^-1 w` for the unit-variance correlation matrix `R = Sigma / phi`.
    pub fn correlation_quad_form(&self, w: ArrayView1<f64>) -> f64 {
        self.phi * self.quad_form(w)
    }

    /// Log-density of `w ~ N(0, Sigma)`.
    pub fn log_density(&self, w: ArrayView1<f64>) -> f64 {
        let n = w.len() as f64;
        -0.5 * (n * (2.0 * PI).ln() + self.log_det + self.quad_form(w))
    }

    /// Draws `w ~ N(0, Sigma)` as `L z`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        let n = self.dim();
        let z = DVector::from_iterator(n, (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)));
        let lz = self.chol.l() * z;
        Array1::from_iter(lz.iter().copied())
    }
}

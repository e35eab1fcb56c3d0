//! Vector operations the leapfrog integrator needs, implemented for
//! `ndarray::Array1`.

use ndarray::LinalgScalar;
use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Abstraction over a mutable Euclidean vector that supports the in-place
/// operations required by the leapfrog integrator.
pub trait EuclideanVector: Clone {
    type Scalar: Float + LinalgScalar + Copy + std::fmt::Debug;

    /// Returns the dimensionality of the vector.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a zero-initialized vector with the same shape.
    fn zeros_like(&self) -> Self;

    /// In-place fused multiply-add: `self += alpha * other`.
    fn add_scaled_assign(&mut self, other: &Self, alpha: Self::Scalar);

    /// Dot product between two vectors.
    fn dot(&self, other: &Self) -> Self::Scalar;

    /// Fills the vector with samples from N(0, 1) in-place.
    fn fill_standard_normal<R: Rng + ?Sized>(&mut self, rng: &mut R)
    where
        StandardNormal: Distribution<Self::Scalar>;

    /// True when every coordinate is finite.
    fn is_finite(&self) -> bool;
}

impl<T> EuclideanVector for ndarray::Array1<T>
where
    T: Float + LinalgScalar + Copy + std::fmt::Debug,
{
    type Scalar = T;

    fn len(&self) -> usize {
        self.len()
    }

    fn zeros_like(&self) -> Self {
        ndarray::Array1::zeros(self.len())
    }

    fn add_scaled_assign(&mut self, other: &Self, alpha: Self::Scalar) {
        ndarray::Zip::from(self).and(other).for_each(|a, b| {
            *a = *a + *b * alpha;
        });
    }

    fn dot(&self, other: &Self) -> Self::Scalar {
        ndarray::Array1::dot(self, other)
    }

    fn fill_standard_normal<R: Rng + ?Sized>(&mut self, rng: &mut R)
    where
        StandardNormal: Distribution<Self::Scalar>,
    {
        self.iter_mut().for_each(|x| *x = rng.sample(StandardNormal));
    }

    fn is_finite(&self) -> bool {
        self.iter().all(|x| x.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn fused_multiply_add() {
        let mut a = arr1(&[1.0, 2.0, 3.0]);
        let b = arr1(&[1.0, -1.0, 0.5]);
        a.add_scaled_assign(&b, 2.0);
        assert_eq!(a, arr1(&[3.0, 0.0, 4.0]));
        assert_eq!(EuclideanVector::dot(&a, &b), 3.0 + 0.0 + 2.0);
    }

    #[test]
    fn standard_normal_fill_is_seeded() {
        let mut a = ndarray::Array1::<f64>::zeros(5);
        let mut b = a.zeros_like();
        a.fill_standard_normal(&mut SmallRng::seed_from_u64(7));
        b.fill_standard_normal(&mut SmallRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(EuclideanVector::is_finite(&a));
    }
}

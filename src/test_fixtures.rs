//! Synthetic preferential-sampling data on a square grid, shared by the unit
//! tests.

use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::config::Priors;
use crate::covariance::SpatialCovariance;
use crate::data::{Dataset, DistanceMatrix, LocationData};
use crate::potentials::logistic_stable;

/// Unit-spaced `side × side` grid with a simulated field, sampling pattern and
/// case/control counts.
///
/// Both design matrices are `[1, centered x-coordinate]`. The first and last
/// cells are always sampled so the observation set is never empty.
pub fn grid_dataset(side: usize, seed: u64) -> (Dataset, DistanceMatrix) {
    let n = side * side;
    let coords = Array2::from_shape_fn((n, 2), |(i, k)| {
        if k == 0 {
            (i % side) as f64
        } else {
            (i / side) as f64
        }
    });
    let distances = DistanceMatrix::from_coordinates(&coords).unwrap();
    let mut rng = SmallRng::seed_from_u64(seed);
    let w = SpatialCovariance::new(&distances, 2.0, 1.0)
        .unwrap()
        .sample(&mut rng);

    let center = (side as f64 - 1.0) / 2.0;
    let z = coords.column(0).mapv(|x| (x - center) / side as f64);

    let mut sampled = Array1::zeros(n);
    for i in 0..n {
        let forced = i == 0 || i == n - 1;
        if forced || rng.gen::<f64>() < logistic_stable(-0.5 + w[i]) {
            sampled[i] = 1.0;
        }
    }
    let ids: Vec<usize> = (0..n).filter(|&i| sampled[i] == 1.0).collect();
    let loc_covariates = Array2::from_shape_fn((n, 2), |(i, k)| if k == 0 { 1.0 } else { z[i] });

    let m = ids.len();
    let design = Array2::from_shape_fn((m, 2), |(k, j)| if j == 0 { 1.0 } else { z[ids[k]] });
    let mut cases = Array1::zeros(m);
    let mut controls = Array1::zeros(m);
    for (k, &cell) in ids.iter().enumerate() {
        let mu_ca = (1.0 + 0.5 * z[cell] + w[cell]).exp();
        let mu_co = (1.5 + 0.2 * z[cell] - 0.5 * w[cell]).exp();
        let y_ca: f64 = Poisson::new(mu_ca).unwrap().sample(&mut rng);
        let y_co: f64 = Poisson::new(mu_co).unwrap().sample(&mut rng);
        cases[k] = y_ca;
        controls[k] = y_co;
    }

    let location = LocationData::new(sampled, loc_covariates, ids).unwrap();
    let data = Dataset::new(cases, controls, design, location).unwrap();
    (data, distances)
}

pub fn test_priors() -> Priors {
    Priors::new((2.0, 1.0), (2.0, 1.0), (1.0, 4.0), (-1.0, 4.0))
}

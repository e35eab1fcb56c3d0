use ndarray::{Array1, Array2};
use prefsample::{Dataset, DistanceMatrix, LocationData, Priors};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `side × side` unit grid with a smooth field, a checkerboard-plus-hotspot
/// sampling pattern and Poisson counts at the sampled cells.
pub fn grid(side: usize, seed: u64) -> (Dataset, DistanceMatrix) {
    let n = side * side;
    let coords = Array2::from_shape_fn((n, 2), |(i, k)| {
        if k == 0 {
            (i % side) as f64
        } else {
            (i / side) as f64
        }
    });
    let distances = DistanceMatrix::from_coordinates(&coords).unwrap();

    let w: Array1<f64> = (0..n)
        .map(|i| (coords[[i, 0]] * 0.8).sin() + (coords[[i, 1]] * 0.6).cos() - 0.5)
        .collect();
    let center = (side as f64 - 1.0) / 2.0;
    let z = coords.column(0).mapv(|x| (x - center) / side as f64);

    let sampled: Array1<f64> = (0..n)
        .map(|i| if i % 2 == 0 || w[i] > 0.5 { 1.0 } else { 0.0 })
        .collect();
    let ids: Vec<usize> = (0..n).filter(|&i| sampled[i] == 1.0).collect();
    let loc_covariates = Array2::from_shape_fn((n, 2), |(i, k)| if k == 0 { 1.0 } else { z[i] });

    let mut rng = SmallRng::seed_from_u64(seed);
    let m = ids.len();
    let design = Array2::from_shape_fn((m, 2), |(k, j)| if j == 0 { 1.0 } else { z[ids[k]] });
    let mut cases = Array1::zeros(m);
    let mut controls = Array1::zeros(m);
    for (k, &cell) in ids.iter().enumerate() {
        let y_ca: f64 = Poisson::new((1.0 + 0.5 * z[cell] + w[cell]).exp())
            .unwrap()
            .sample(&mut rng);
        let y_co: f64 = Poisson::new((1.5 - 0.5 * w[cell]).exp())
            .unwrap()
            .sample(&mut rng);
        cases[k] = y_ca;
        controls[k] = y_co;
    }

    let location = LocationData::new(sampled, loc_covariates, ids).unwrap();
    let data = Dataset::new(cases, controls, design, location).unwrap();
    (data, distances)
}

pub fn priors() -> Priors {
    Priors::new((2.0, 1.0), (2.0, 1.0), (1.0, 4.0), (-1.0, 4.0))
}

//! Observed data consumed by the sampler: case/control counts, the sampling
//! indicator over the grid, and the pairwise distances between grid cells.
//!
//! Fields are private and every constructor ends in `validate`, so a value
//! built through the API is consistent. Deserialized values skip the
//! constructors; the sampler calls [`Dataset::validate`] again before the
//! first sweep.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

const SYMMETRY_TOL: f64 = 1e-10;

/// Sampling structure over the `N.w` grid cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    /// 1.0 where the cell was sampled, 0.0 otherwise. Length `N.w`.
    sampled: Array1<f64>,
    /// Covariates of the observation (sampling) process, `N.w × p_loc`.
    covariates: Array2<f64>,
    /// Grid cell of every case/control observation.
    ids: Vec<usize>,
}

impl LocationData {
    pub fn new(
        sampled: Array1<f64>,
        covariates: Array2<f64>,
        ids: Vec<usize>,
    ) -> Result<Self, SamplerError> {
        let location = Self {
            sampled,
            covariates,
            ids,
        };
        location.validate()?;
        Ok(location)
    }

    /// Checks the grid, the indicator values and every observation index.
    pub fn validate(&self) -> Result<(), SamplerError> {
        let n_cells = self.sampled.len();
        if n_cells == 0 {
            return Err(SamplerError::InvalidData("grid has no cells".into()));
        }
        if self.covariates.nrows() != n_cells {
            return Err(SamplerError::DimensionMismatch {
                what: "location covariate rows",
                expected: n_cells,
                found: self.covariates.nrows(),
            });
        }
        if let Some(bad) = self.sampled.iter().find(|&&s| s != 0.0 && s != 1.0) {
            return Err(SamplerError::InvalidData(format!(
                "sampling indicator must be 0 or 1, found {bad}"
            )));
        }
        if let Some(&index) = self.ids.iter().find(|&&i| i >= n_cells) {
            return Err(SamplerError::IndexOutOfRange { index, n_cells });
        }
        if self.covariates.iter().any(|x| !x.is_finite()) {
            return Err(SamplerError::InvalidData(
                "location covariates contain non-finite values".into(),
            ));
        }
        Ok(())
    }

    pub fn n_cells(&self) -> usize {
        self.sampled.len()
    }

    pub fn sampled(&self) -> ArrayView1<'_, f64> {
        self.sampled.view()
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }
}

/// Case and control counts observed at the sampled cells.
///
/// Cases and controls share the design matrix `X.c` and the cell map `ids`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    case_counts: Array1<f64>,
    control_counts: Array1<f64>,
    /// Standardized design matrix `X.c`, one row per observation.
    design: Array2<f64>,
    /// Log-offset added to both count predictors. Zeros unless supplied.
    offset: Array1<f64>,
    location: LocationData,
}

impl Dataset {
    pub fn new(
        case_counts: Array1<f64>,
        control_counts: Array1<f64>,
        design: Array2<f64>,
        location: LocationData,
    ) -> Result<Self, SamplerError> {
        let offset = Array1::zeros(location.ids.len());
        let data = Self {
            case_counts,
            control_counts,
            design,
            offset,
            location,
        };
        data.validate()?;
        Ok(data)
    }

    /// Replaces the zero log-offset.
    pub fn with_offset(mut self, offset: Array1<f64>) -> Result<Self, SamplerError> {
        self.offset = offset;
        self.validate()?;
        Ok(self)
    }

    /// Re-checks every shape, count and index invariant.
    pub fn validate(&self) -> Result<(), SamplerError> {
        self.location.validate()?;
        let n_obs = self.n_obs();
        for (what, len) in [
            ("case count length", self.case_counts.len()),
            ("control count length", self.control_counts.len()),
            ("case design rows", self.design.nrows()),
            ("offset length", self.offset.len()),
        ] {
            if len != n_obs {
                return Err(SamplerError::DimensionMismatch {
                    what,
                    expected: n_obs,
                    found: len,
                });
            }
        }
        if self.design.ncols() == 0 {
            return Err(SamplerError::InvalidData(
                "case design matrix has no columns".into(),
            ));
        }
        check_counts("case", self.case_counts.view())?;
        check_counts("control", self.control_counts.view())?;
        if self.design.iter().any(|x| !x.is_finite()) {
            return Err(SamplerError::InvalidData(
                "case design matrix contains non-finite values".into(),
            ));
        }
        if self.offset.iter().any(|x| !x.is_finite()) {
            return Err(SamplerError::InvalidData(
                "offset contains non-finite values".into(),
            ));
        }
        Ok(())
    }

    pub fn case_counts(&self) -> ArrayView1<'_, f64> {
        self.case_counts.view()
    }

    pub fn control_counts(&self) -> ArrayView1<'_, f64> {
        self.control_counts.view()
    }

    pub fn design(&self) -> ArrayView2<'_, f64> {
        self.design.view()
    }

    pub fn offset(&self) -> ArrayView1<'_, f64> {
        self.offset.view()
    }

    pub fn location(&self) -> &LocationData {
        &self.location
    }

    /// Number of grid cells, `N.w`.
    pub fn n_cells(&self) -> usize {
        self.location.n_cells()
    }

    /// Number of case/control observations.
    pub fn n_obs(&self) -> usize {
        self.location.ids.len()
    }

    pub fn n_case_covariates(&self) -> usize {
        self.design.ncols()
    }

    pub fn n_location_covariates(&self) -> usize {
        self.location.covariates.ncols()
    }

    /// Gathers the field at the observed cells, `w[ids]`.
    pub fn field_at_observations(&self, w: ArrayView1<f64>) -> Array1<f64> {
        self.location.ids.iter().map(|&i| w[i]).collect()
    }

    /// Checks that `distances` is defined over this dataset's grid.
    pub fn check_distances(&self, distances: &DistanceMatrix) -> Result<(), SamplerError> {
        if distances.n_cells() != self.n_cells() {
            return Err(SamplerError::DimensionMismatch {
                what: "distance matrix size",
                expected: self.n_cells(),
                found: distances.n_cells(),
            });
        }
        Ok(())
    }
}

fn check_counts(label: &str, counts: ArrayView1<f64>) -> Result<(), SamplerError> {
    if counts
        .iter()
        .any(|&y| !y.is_finite() || y < 0.0 || y.fract() != 0.0)
    {
        return Err(SamplerError::InvalidData(format!(
            "{label} counts must be non-negative integers"
        )));
    }
    Ok(())
}

/// Symmetric, nonnegative, zero-diagonal `N.w × N.w` distance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix(Array2<f64>);

impl DistanceMatrix {
    pub fn new(d: Array2<f64>) -> Result<Self, SamplerError> {
        let n = d.nrows();
        if d.ncols() != n {
            return Err(SamplerError::DimensionMismatch {
                what: "distance matrix columns",
                expected: n,
                found: d.ncols(),
            });
        }
        for i in 0..n {
            if d[[i, i]] != 0.0 {
                return Err(SamplerError::InvalidDistanceMatrix(format!(
                    "diagonal entry {i} is {}",
                    d[[i, i]]
                )));
            }
            for j in (i + 1)..n {
                let (a, b) = (d[[i, j]], d[[j, i]]);
                if !a.is_finite() || a < 0.0 {
                    return Err(SamplerError::InvalidDistanceMatrix(format!(
                        "entry ({i}, {j}) is {a}"
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOL * a.abs().max(1.0) {
                    return Err(SamplerError::InvalidDistanceMatrix(format!(
                        "not symmetric at ({i}, {j}): {a} vs {b}"
                    )));
                }
            }
        }
        Ok(Self(d))
    }

    /// Euclidean distances between the rows of `coords`.
    pub fn from_coordinates(coords: &Array2<f64>) -> Result<Self, SamplerError> {
        let n = coords.nrows();
        let mut d = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let diff = &coords.index_axis(Axis(0), i) - &coords.index_axis(Axis(0), j);
                let dist = diff.dot(&diff).sqrt();
                d[[i, j]] = dist;
                d[[j, i]] = dist;
            }
        }
        Self::new(d)
    }

    pub fn n_cells(&self) -> usize {
        self.0.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[[i, j]]
    }
}

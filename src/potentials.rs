//! Log full-conditionals (and gradients) of the six HMC blocks.
//!
//! Model:
//! - cases:    `Y.ca ~ Poisson(exp(X.c beta.ca + alpha.ca w[ids] + offset))`
//! - controls: `Y.co ~ Poisson(exp(X.c beta.co + alpha.co w[ids] + offset))`
//! - sampling: `Y.l ~ Bernoulli(logistic(X.loc beta.loc + w))` over all cells
//! - field:    `w ~ N(0, Sigma)`
//!
//! Every target borrows the data and the other blocks' current values; a
//! fresh target is built for each block update so it always conditions on the
//! latest draws.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::data::Dataset;
use crate::distributions::normal_log_density;
use crate::hmc::HamiltonianTarget;

/// Stable logistic transform.
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

/// Stable `ln(1 + exp(x))`.
pub fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Poisson log-likelihood `Σ y η - exp(η)` and the residuals `y - exp(η)`.
fn poisson_terms(counts: ArrayView1<f64>, eta: &Array1<f64>) -> (f64, Array1<f64>) {
    let mut ll = 0.0;
    let resid = ndarray::Zip::from(counts).and(eta).map_collect(|&y, &e| {
        let mu = e.exp();
        ll += y * e - mu;
        y - mu
    });
    (ll, resid)
}

/// One Poisson channel (cases or controls) with its data views.
#[derive(Debug, Clone, Copy)]
pub struct CountChannel<'a> {
    pub counts: ArrayView1<'a, f64>,
    pub design: ArrayView2<'a, f64>,
    pub offset: ArrayView1<'a, f64>,
}

impl<'a> CountChannel<'a> {
    pub fn cases(data: &'a Dataset) -> Self {
        Self {
            counts: data.case_counts(),
            design: data.design(),
            offset: data.offset(),
        }
    }

    pub fn controls(data: &'a Dataset) -> Self {
        Self {
            counts: data.control_counts(),
            design: data.design(),
            offset: data.offset(),
        }
    }

    /// `X beta + offset`.
    fn fixed_part(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        self.design.dot(&beta) + &self.offset
    }
}

/// Full conditional of a case or control coefficient vector.
pub struct CoefficientTarget<'a> {
    channel: CountChannel<'a>,
    /// `alpha * w[ids] + offset`, fixed while beta moves.
    shift: Array1<f64>,
    beta_var: f64,
}

impl<'a> CoefficientTarget<'a> {
    pub fn new(channel: CountChannel<'a>, alpha: f64, w_obs: ArrayView1<f64>, beta_var: f64) -> Self {
        let shift = &w_obs * alpha + &channel.offset;
        Self {
            channel,
            shift,
            beta_var,
        }
    }
}

impl HamiltonianTarget<Array1<f64>> for CoefficientTarget<'_> {
    fn logp_and_grad(&self, beta: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let eta = self.channel.design.dot(beta) + &self.shift;
        let (ll, resid) = poisson_terms(self.channel.counts, &eta);
        let g = self.channel.design.t().dot(&resid) - beta / self.beta_var;
        grad.assign(&g);
        ll - 0.5 * beta.dot(beta) / self.beta_var
    }
}

/// Full conditional of a preferential-sampling scalar (`alpha.ca` or `alpha.co`).
///
/// The position is a length-one vector.
pub struct AlphaTarget<'a> {
    counts: ArrayView1<'a, f64>,
    /// `X beta + offset`, fixed while alpha moves.
    base: Array1<f64>,
    w_obs: ArrayView1<'a, f64>,
    prior_mean: f64,
    prior_var: f64,
}

impl<'a> AlphaTarget<'a> {
    pub fn new(
        channel: CountChannel<'a>,
        beta: ArrayView1<f64>,
        w_obs: ArrayView1<'a, f64>,
        prior_mean: f64,
        prior_var: f64,
    ) -> Self {
        Self {
            counts: channel.counts,
            base: channel.fixed_part(beta),
            w_obs,
            prior_mean,
            prior_var,
        }
    }
}

impl HamiltonianTarget<Array1<f64>> for AlphaTarget<'_> {
    fn logp_and_grad(&self, alpha: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let a = alpha[0];
        let eta = &self.base + &(&self.w_obs * a);
        let (ll, resid) = poisson_terms(self.counts, &eta);
        grad[0] = resid.dot(&self.w_obs) - (a - self.prior_mean) / self.prior_var;
        ll + normal_log_density(a, self.prior_mean, self.prior_var)
    }
}

/// Full conditional of the location coefficients: logistic regression of the
/// full-length sampling indicator on `X.loc` with the full field as offset.
pub struct LocationTarget<'a> {
    sampled: ArrayView1<'a, f64>,
    covariates: ArrayView2<'a, f64>,
    w: ArrayView1<'a, f64>,
    beta_var: f64,
}

impl<'a> LocationTarget<'a> {
    pub fn new(data: &'a Dataset, w: ArrayView1<'a, f64>, beta_var: f64) -> Self {
        Self {
            sampled: data.location().sampled(),
            covariates: data.location().covariates(),
            w,
            beta_var,
        }
    }
}

impl HamiltonianTarget<Array1<f64>> for LocationTarget<'_> {
    fn logp_and_grad(&self, beta: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let eta = self.covariates.dot(beta) + &self.w;
        let mut ll = 0.0;
        let resid = ndarray::Zip::from(self.sampled)
            .and(&eta)
            .map_collect(|&y, &e| {
                ll += y * e - softplus(e);
                y - logistic_stable(e)
            });
        let g = self.covariates.t().dot(&resid) - beta / self.beta_var;
        grad.assign(&g);
        ll - 0.5 * beta.dot(beta) / self.beta_var
    }
}

/// Full conditional of the spatial field `w`.
///
/// Combines both count channels (through `w[ids]`), the sampling indicator
/// (through the full `w`), and the Gaussian-process prior with precision
/// `Sigma^-1`.
pub struct FieldTarget<'a> {
    ids: &'a [usize],
    case_counts: ArrayView1<'a, f64>,
    control_counts: ArrayView1<'a, f64>,
    sampled: ArrayView1<'a, f64>,
    case_base: Array1<f64>,
    control_base: Array1<f64>,
    loc_base: Array1<f64>,
    alpha_case: f64,
    alpha_control: f64,
    precision: &'a Array2<f64>,
}

/// Current values of the blocks the field conditions on.
#[derive(Debug, Clone, Copy)]
pub struct FieldConditioning<'a> {
    pub beta_case: ArrayView1<'a, f64>,
    pub beta_control: ArrayView1<'a, f64>,
    pub beta_loc: ArrayView1<'a, f64>,
    pub alpha_case: f64,
    pub alpha_control: f64,
}

impl<'a> FieldTarget<'a> {
    pub fn new(
        data: &'a Dataset,
        given: FieldConditioning<'_>,
        precision: &'a Array2<f64>,
    ) -> Self {
        Self {
            ids: data.location().ids(),
            case_counts: data.case_counts(),
            control_counts: data.control_counts(),
            sampled: data.location().sampled(),
            case_base: CountChannel::cases(data).fixed_part(given.beta_case),
            control_base: CountChannel::controls(data).fixed_part(given.beta_control),
            loc_base: data.location().covariates().dot(&given.beta_loc),
            alpha_case: given.alpha_case,
            alpha_control: given.alpha_control,
            precision,
        }
    }
}

impl HamiltonianTarget<Array1<f64>> for FieldTarget<'_> {
    fn logp_and_grad(&self, w: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        let q_w = self.precision.dot(w);
        let mut logp = -0.5 * w.dot(&q_w);
        grad.assign(&(-&q_w));

        let eta_loc = &self.loc_base + w;
        for ((g, &y), &e) in grad.iter_mut().zip(self.sampled).zip(&eta_loc) {
            logp += y * e - softplus(e);
            *g += y - logistic_stable(e);
        }

        for (k, &cell) in self.ids.iter().enumerate() {
            let wc = w[cell];
            let e_ca = self.case_base[k] + self.alpha_case * wc;
            let mu_ca = e_ca.exp();
            let e_co = self.control_base[k] + self.alpha_control * wc;
            let mu_co = e_co.exp();
            logp += self.case_counts[k] * e_ca - mu_ca + self.control_counts[k] * e_co - mu_co;
            grad[cell] += self.alpha_case * (self.case_counts[k] - mu_ca)
                + self.alpha_control * (self.control_counts[k] - mu_co);
        }
        logp
    }
}

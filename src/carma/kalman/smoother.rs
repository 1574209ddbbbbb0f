//! Rauch–Tung–Striebel fixed-interval smoother.
//!
//! Purpose
//! -------
//! Refine the filtered states with the full sequence. The forward pass
//! retains, per point, the filtered `(X, P)`, the prediction
//! `(XMinus, PMinus)` and the F used to reach it; the backward pass then runs
//! from N − 2 down to 0:
//!
//! - `J_k = P_k F_{k+1}ᵀ PMinus_{k+1}⁻¹`, obtained by solving
//!   `PMinus_{k+1} J_kᵀ = F_{k+1} P_k` (Cholesky, LU fallback);
//! - `x̂_k = x_k + J_k (x̂_{k+1} − xMinus_{k+1})`;
//! - `P̂_k = P_k + J_k (P̂_{k+1} − PMinus_{k+1}) J_kᵀ`, symmetrized.
//!
//! Invariants & assumptions
//! ------------------------
//! - The last smoothed state equals the last filtered state; a single-point
//!   series is returned unchanged.
//! - Smoothing leaves the engine in `FilterPhase::Smoothed`.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Array3};

use crate::{
    carma::{
        core::data::LnLikeData,
        errors::{CarmaError, CarmaResult},
        kalman::{
            filter::LN_2PI,
            system::{CarmaSystem, FilterPhase},
        },
    },
    linalg::symmetrize,
};

/// Smoothed trajectory of a series.
///
/// Fields
/// ------
/// - `states`: `(n, p)` smoothed means.
/// - `covariances`: `(n, p, p)` smoothed covariances.
/// - `fitted`: smoothed observable `H x̂`.
/// - `fitted_var`: its variance `P̂[0, 0]`.
/// - `residuals`: `y − H x̂`; NaN at masked points.
/// - `ln_like`: log-likelihood of the forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedPath {
    pub states: Array2<f64>,
    pub covariances: Array3<f64>,
    pub fitted: Array1<f64>,
    pub fitted_var: Array1<f64>,
    pub residuals: Array1<f64>,
    pub ln_like: f64,
}

#[derive(Debug, Clone)]
struct ForwardStep {
    x: DVector<f64>,
    p: DMatrix<f64>,
    x_minus: DVector<f64>,
    p_minus: DMatrix<f64>,
    f: DMatrix<f64>,
}

impl CarmaSystem {
    /// Forward filter, then RTS backward pass over `data`.
    ///
    /// # Errors
    /// - Everything `ln_like` can return.
    /// - `SingularPredictedCovariance` if PMinus cannot be factored.
    pub fn smooth(&mut self, data: &LnLikeData) -> CarmaResult<SmoothedPath> {
        let n = data.len();
        let p = self.shape().p;
        let mut steps: Vec<ForwardStep> = Vec::with_capacity(n);
        let mut total = 0.0;
        let mut n_obs = 0usize;

        self.forward_pass(data, |sys, i, innov| {
            if data.is_observed(i) {
                total += innov.contribution;
                n_obs += 1;
            }
            let ws = sys.ready_workspace()?;
            let f = if i == 0 { DMatrix::identity(p, p) } else { ws.f.clone() };
            steps.push(ForwardStep {
                x: ws.x.clone(),
                p: ws.p.clone(),
                x_minus: ws.x_minus.clone(),
                p_minus: ws.p_minus.clone(),
                f,
            });
            Ok(())
        })?;
        let ln_like = total - 0.5 * n_obs as f64 * LN_2PI;
        data.record_ln_like(ln_like);

        let mut smoothed_x: Vec<DVector<f64>> = steps.iter().map(|s| s.x.clone()).collect();
        let mut smoothed_p: Vec<DMatrix<f64>> = steps.iter().map(|s| s.p.clone()).collect();
        for k in (0..n.saturating_sub(1)).rev() {
            let next = &steps[k + 1];
            let j = rts_gain(&steps[k].p, &next.f, &next.p_minus, k + 1)?;

            let x_corr = &smoothed_x[k + 1] - &next.x_minus;
            smoothed_x[k] = &steps[k].x + &j * x_corr;

            let p_corr = &smoothed_p[k + 1] - &next.p_minus;
            let mut p_k = &steps[k].p + &j * p_corr * j.transpose();
            symmetrize(&mut p_k);
            smoothed_p[k] = p_k;
        }

        let mut path = SmoothedPath {
            states: Array2::zeros((n, p)),
            covariances: Array3::zeros((n, p, p)),
            fitted: Array1::zeros(n),
            fitted_var: Array1::zeros(n),
            residuals: Array1::from_elem(n, f64::NAN),
            ln_like,
        };
        for i in 0..n {
            for r in 0..p {
                path.states[[i, r]] = smoothed_x[i][r];
                for c in 0..p {
                    path.covariances[[i, r, c]] = smoothed_p[i][(r, c)];
                }
            }
            path.fitted[i] = smoothed_x[i][0];
            path.fitted_var[i] = smoothed_p[i][(0, 0)];
            if data.is_observed(i) {
                path.residuals[i] = data.y[i] - path.fitted[i];
            }
        }

        self.set_phase(FilterPhase::Smoothed);
        Ok(path)
    }
}

/// Smoother gain `J = P Fᵀ PMinus⁻¹`.
fn rts_gain(
    p: &DMatrix<f64>, f: &DMatrix<f64>, p_minus: &DMatrix<f64>, index: usize,
) -> CarmaResult<DMatrix<f64>> {
    let rhs = f * p;
    let j_t = match p_minus.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => p_minus
            .clone()
            .lu()
            .solve(&rhs)
            .ok_or(CarmaError::SingularPredictedCovariance { index })?,
    };
    if j_t.iter().any(|v| !v.is_finite()) {
        return Err(CarmaError::SingularPredictedCovariance { index });
    }
    Ok(j_t.transpose())
}

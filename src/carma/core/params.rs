//! CARMA(p, q) parameterization: model-space coefficients and the
//! stability-preserving optimizer-space map.
//!
//! ## What this module defines
//! - [`CarmaParams`]: owned model-space coefficients `(a₁..a_p, b₀..b_q)`.
//! - [`stable_polynomial`]: logits → monic polynomial with every root in the
//!   open left half plane.
//! - [`factor_logits`]: the inverse of [`stable_polynomial`] given the roots.
//!
//! ## Mapping conventions
//! - θ has the same length as Θ: `[AR factor logits (p) | MA factor logits
//!   (q) | MA scale logit (1)]`.
//! - A monic polynomial of degree n is a product of `n / 2` quadratic factors
//!   `z² + c₁ z + c₀` and, for odd n, one trailing linear factor `z + c`.
//!   Quadratic factor k reads `c₁` from logit `2k` and `c₀` from `2k + 1`;
//!   the linear factor reads logit `n − 1`. Every coefficient is
//!   `softplus(logit) > 0`, which is exactly the Hurwitz condition for
//!   degree ≤ 2, so every product is stable.
//! - `b(z) = b_q · m(z)` with `m` the monic MA polynomial and
//!   `b_q = softplus(θ_scale)`.
//! - The likelihood depends on B only through BBᵀ, so the sign of `b_q` is
//!   not identifiable; [`CarmaParams::to_theta`] maps `|b_q|`.
use nalgebra::Complex;
use ndarray::{Array1, ArrayView1};

use crate::{
    carma::{
        core::{
            options::EngineOptions,
            polynomial::multiply_monic,
            shape::CarmaShape,
            validation::{check_params, validate_theta},
        },
        errors::{CarmaError, CarmaResult},
    },
    optimization::numerical_stability::transformations::{safe_softplus, safe_softplus_inv},
};

/// Roots whose imaginary part is below this fraction of `max(1, |λ|)` are
/// treated as real when pairing factors.
const REAL_ROOT_EPS: f64 = 1e-12;

/// Model-space CARMA(p, q) coefficients.
///
/// `ar = [a₁..a_p]` and `ma = [b₀..b_q]`; see the module docs for the
/// polynomial conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct CarmaParams {
    pub ar: Array1<f64>,
    pub ma: Array1<f64>,
}

impl CarmaParams {
    /// Build parameters and check their lengths and finiteness against
    /// `shape`. Admissibility (stability, invertibility) is left to the
    /// validator.
    ///
    /// # Errors
    /// - [`CarmaError::ThetaLengthMismatch`], [`CarmaError::NonFiniteParameter`],
    ///   [`CarmaError::DegenerateMaOrder`] per `validate_theta`.
    pub fn new(ar: Array1<f64>, ma: Array1<f64>, shape: &CarmaShape) -> CarmaResult<Self> {
        let params = CarmaParams { ar, ma };
        if params.ar.len() != shape.p || params.ma.len() != shape.q + 1 {
            return Err(CarmaError::ThetaLengthMismatch {
                expected: shape.n_params(),
                actual: params.ar.len() + params.ma.len(),
            });
        }
        validate_theta(&params.to_vec(), shape)?;
        Ok(params)
    }

    /// Split a model-space vector Θ into AR and MA blocks.
    pub fn from_model_vec(theta: &[f64], shape: &CarmaShape) -> CarmaResult<Self> {
        validate_theta(theta, shape)?;
        Ok(CarmaParams {
            ar: Array1::from(theta[..shape.p].to_vec()),
            ma: Array1::from(theta[shape.p..].to_vec()),
        })
    }

    /// Concatenate into Θ = [a₁..a_p, b₀..b_q].
    pub fn to_vec(&self) -> Vec<f64> {
        self.ar.iter().chain(self.ma.iter()).copied().collect()
    }

    /// Map an optimizer-space vector θ into model-space parameters.
    ///
    /// Parameters
    /// ----------
    /// - `theta`: `ArrayView1<f64>`
    ///   Layout `[AR logits (p) | MA logits (q) | scale logit]`.
    /// - `shape`: `&CarmaShape`
    ///
    /// Returns
    /// -------
    /// `CarmaResult<CarmaParams>`
    ///   Coefficients whose AR and MA roots lie strictly in the left half
    ///   plane, up to floating-point rounding in the factor products.
    ///
    /// Errors
    /// ------
    /// - `ThetaLengthMismatch` if `theta.len() != p + q + 1`.
    /// - `NonFiniteParameter` if an entry of θ is NaN/±inf.
    pub fn from_theta(theta: ArrayView1<f64>, shape: &CarmaShape) -> CarmaResult<Self> {
        let expected = shape.n_params();
        if theta.len() != expected {
            return Err(CarmaError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CarmaError::NonFiniteParameter { index, value });
        }
        let logits: Vec<f64> = theta.iter().copied().collect();
        let (p, q) = (shape.p, shape.q);

        let ar = stable_polynomial(&logits[..p]);
        let monic_ma = stable_polynomial(&logits[p..p + q]);
        let b_q = safe_softplus(logits[p + q]);
        let ma: Vec<f64> =
            (0..=q).map(|j| if j == q { b_q } else { b_q * monic_ma[q - j - 1] }).collect();

        Ok(CarmaParams { ar: Array1::from(ar), ma: Array1::from(ma) })
    }

    /// Map admissible model-space parameters back into optimizer space.
    ///
    /// # Errors
    /// - Any rejection or degeneracy from the validator: only strictly
    ///   stable, invertible, non-redundant parameters have a θ image.
    pub fn to_theta(&self, shape: &CarmaShape, opts: &EngineOptions) -> CarmaResult<Array1<f64>> {
        let roots = check_params(&self.to_vec(), shape, opts)?;
        let mut theta = factor_logits(&roots.ar);
        theta.extend(factor_logits(&roots.ma));
        theta.push(safe_softplus_inv(self.ma[shape.q].abs()));
        Ok(Array1::from(theta))
    }
}

/// Monic polynomial (non-leading coefficients, descending powers) built from
/// factor logits. An empty slice yields the constant polynomial 1.
pub fn stable_polynomial(logits: &[f64]) -> Vec<f64> {
    let degree = logits.len();
    let mut poly: Vec<f64> = Vec::with_capacity(degree);
    for k in 0..degree / 2 {
        let factor = [safe_softplus(logits[2 * k]), safe_softplus(logits[2 * k + 1])];
        poly = multiply_monic(&poly, &factor);
    }
    if degree % 2 == 1 {
        poly = multiply_monic(&poly, &[safe_softplus(logits[degree - 1])]);
    }
    poly
}

/// Factor logits reproducing the monic polynomial with the given roots.
///
/// Conjugate pairs become quadratic factors first, then real roots are
/// paired in ascending order, and a leftover real root becomes the trailing
/// linear factor. Roots must lie strictly in the left half plane.
pub fn factor_logits(roots: &[Complex<f64>]) -> Vec<f64> {
    let is_real = |r: &Complex<f64>| r.im.abs() <= REAL_ROOT_EPS * r.norm().max(1.0);
    let mut reals: Vec<f64> = roots.iter().filter(|r| is_real(r)).map(|r| r.re).collect();
    reals.sort_by(f64::total_cmp);

    let mut logits = Vec::with_capacity(roots.len());
    for r in roots.iter().filter(|r| !is_real(r) && r.im > 0.0) {
        logits.push(safe_softplus_inv(-2.0 * r.re));
        logits.push(safe_softplus_inv(r.norm_sqr()));
    }
    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => {
                logits.push(safe_softplus_inv(-(r1 + r2)));
                logits.push(safe_softplus_inv(r1 * r2));
            }
            [r] => logits.push(safe_softplus_inv(-r)),
            _ => {}
        }
    }
    logits
}

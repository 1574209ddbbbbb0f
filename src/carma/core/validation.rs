//! Validation helpers for CARMA parameters, observation bundles, and random
//! draw buffers.
//!
//! Purpose
//! -------
//! Centralize every admissibility check the engine relies on so that the
//! builder, spectral engine, and Kalman loop can assume clean inputs. The
//! parameter checks implement the admissible region of Θ; the series checks
//! implement the observation-bundle contract.
//!
//! Key behaviors
//! -------------
//! - [`validate_theta`] enforces length (fatal), finiteness and a non-zero
//!   leading MA coefficient (rejections).
//! - [`check_params`] runs the full validator in order: stability of the AR
//!   roots, invertibility of the MA roots, distinct AR roots, and no AR/MA
//!   cancellation. On success it returns the roots so callers can report
//!   them without recomputation.
//! - [`validate_series`] enforces the observation-bundle invariants.
//! - [`validate_draws`] checks caller-supplied random buffers.
//!
//! Invariants & assumptions
//! ------------------------
//! - Θ = [a₁..a_p, b₀..b_q] with `a(z) = z^p + a₁ z^{p−1} + … + a_p` and
//!   `b(z) = b₀ + b₁ z + … + b_q z^q`.
//! - MA roots are the roots of `b(z) / b_q`.
//! - The boundary `Re(λ) = 0` is inadmissible. A root counts as stable only
//!   when `Re λ < −stability_margin · max(1, |λ|)`, so axis roots whose
//!   computed real part is a rounding-level negative are still rejected.
//!
//! Conventions
//! -----------
//! - The validator fails closed: NaN/±inf in Θ or in any derived root is a
//!   rejection, never a pass.
//! - All functions are pure; none touches engine state.
//!
//! Testing notes
//! -------------
//! - Unit tests cover acceptance of a stable CARMA(2, 1), rejection of
//!   boundary, duplicate, non-invertible and cancelling configurations, and
//!   the series contract.
use nalgebra::Complex;
use ndarray::ArrayView1;

use crate::carma::{
    core::{options::EngineOptions, polynomial::polynomial_roots, shape::CarmaShape},
    errors::{CarmaError, CarmaResult},
};

/// AR and MA roots of an admissible parameter vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootSet {
    /// Roots of a(z), i.e. eigenvalues of A.
    pub ar: Vec<Complex<f64>>,
    /// Roots of b(z).
    pub ma: Vec<Complex<f64>>,
}

/// Validate the length and finiteness of Θ and the leading MA coefficient.
///
/// # Errors
/// - [`CarmaError::ThetaLengthMismatch`] if `theta.len() != p + q + 1`.
/// - [`CarmaError::NonFiniteParameter`] for the first NaN/±inf entry.
/// - [`CarmaError::DegenerateMaOrder`] if `b_q == 0`.
pub fn validate_theta(theta: &[f64], shape: &CarmaShape) -> CarmaResult<()> {
    let expected = shape.n_params();
    if theta.len() != expected {
        return Err(CarmaError::ThetaLengthMismatch { expected, actual: theta.len() });
    }
    if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(CarmaError::NonFiniteParameter { index, value });
    }
    let b_q = theta[expected - 1];
    if b_q == 0.0 {
        return Err(CarmaError::DegenerateMaOrder { value: b_q });
    }
    Ok(())
}

/// Run the full admissibility check on Θ and return its roots.
///
/// Parameters
/// ----------
/// - `theta`: `&[f64]`
///   Parameter vector `[a₁..a_p, b₀..b_q]`.
/// - `shape`: `&CarmaShape`
///   Model order.
/// - `opts`: `&EngineOptions`
///   Supplies `stability_margin`, `root_tolerance` and `max_schur_iter`.
///
/// Returns
/// -------
/// `CarmaResult<RootSet>`
///   The AR and MA roots when Θ is admissible.
///
/// Errors
/// ------
/// - Anything from [`validate_theta`].
/// - `UnstableAr`, `NonInvertibleMa`, `RepeatedArRoot`, `CommonRoot`.
/// - `EigenNonConvergence` when a root solve stalls.
pub fn check_params(
    theta: &[f64], shape: &CarmaShape, opts: &EngineOptions,
) -> CarmaResult<RootSet> {
    validate_theta(theta, shape)?;
    let p = shape.p;
    let q = shape.q;

    let ar = polynomial_roots(&theta[..p], opts.max_schur_iter)?;
    for (index, root) in ar.iter().enumerate() {
        if !left_of_axis(*root, opts.stability_margin) {
            return Err(CarmaError::UnstableAr { index, re: root.re, im: root.im });
        }
    }

    let ma_monic = ma_monic_coefficients(&theta[p..], q);
    let ma = polynomial_roots(&ma_monic, opts.max_schur_iter)?;
    for (index, root) in ma.iter().enumerate() {
        if !left_of_axis(*root, opts.stability_margin) {
            return Err(CarmaError::NonInvertibleMa { index, re: root.re, im: root.im });
        }
    }

    for i in 0..ar.len() {
        for j in (i + 1)..ar.len() {
            let distance = (ar[i] - ar[j]).norm();
            if coincide(ar[i], distance, opts.root_tolerance) {
                return Err(CarmaError::RepeatedArRoot { first: i, second: j, distance });
            }
        }
    }

    for (ar_index, &lambda) in ar.iter().enumerate() {
        for (ma_index, &mu) in ma.iter().enumerate() {
            let distance = (lambda - mu).norm();
            if coincide(lambda, distance, opts.root_tolerance) {
                return Err(CarmaError::CommonRoot { ar_index, ma_index, distance });
            }
        }
    }

    Ok(RootSet { ar, ma })
}

/// Non-leading coefficients of `b(z) / b_q` in descending powers.
///
/// `ma` holds `[b₀..b_q]`; the result is `[b_{q−1}/b_q, …, b₀/b_q]`.
pub fn ma_monic_coefficients(ma: &[f64], q: usize) -> Vec<f64> {
    let b_q = ma[q];
    (1..=q).map(|k| ma[q - k] / b_q).collect()
}

/// Validate an observation bundle.
///
/// # Errors
/// - [`CarmaError::EmptySeries`] if `t` is empty.
/// - [`CarmaError::SeriesLengthMismatch`] if `y`, `yerr`, or `mask` differ in
///   length from `t`.
/// - [`CarmaError::NonFiniteData`] for non-finite `t`, or non-finite `y` /
///   `yerr` at observed points.
/// - [`CarmaError::UnsortedTime`] if `t` decreases.
/// - [`CarmaError::InvalidMask`] for mask values other than 0 or 1.
/// - [`CarmaError::NegativeError`] for negative `yerr` at observed points.
pub fn validate_series(
    t: ArrayView1<f64>, y: ArrayView1<f64>, yerr: ArrayView1<f64>, mask: Option<ArrayView1<f64>>,
) -> CarmaResult<()> {
    let n = t.len();
    if n == 0 {
        return Err(CarmaError::EmptySeries);
    }
    check_len("y", n, y.len())?;
    check_len("yerr", n, yerr.len())?;
    if let Some(m) = mask.as_ref() {
        check_len("mask", n, m.len())?;
    }

    for i in 0..n {
        if !t[i].is_finite() {
            return Err(CarmaError::NonFiniteData { name: "t", index: i, value: t[i] });
        }
        if i > 0 && t[i] < t[i - 1] {
            return Err(CarmaError::UnsortedTime { index: i, prev: t[i - 1], next: t[i] });
        }
        let observed = match mask.as_ref() {
            Some(m) => {
                let value = m[i];
                if value != 0.0 && value != 1.0 {
                    return Err(CarmaError::InvalidMask { index: i, value });
                }
                value == 1.0
            }
            None => true,
        };
        if !observed {
            continue;
        }
        if !y[i].is_finite() {
            return Err(CarmaError::NonFiniteData { name: "y", index: i, value: y[i] });
        }
        if !yerr[i].is_finite() {
            return Err(CarmaError::NonFiniteData { name: "yerr", index: i, value: yerr[i] });
        }
        if yerr[i] < 0.0 {
            return Err(CarmaError::NegativeError { index: i, value: yerr[i] });
        }
    }
    Ok(())
}

/// Check that a draw buffer has exactly `expected` entries.
pub fn validate_draws(name: &'static str, expected: usize, actual: usize) -> CarmaResult<()> {
    if expected != actual {
        return Err(CarmaError::DrawLengthMismatch { name, expected, actual });
    }
    Ok(())
}

// ---- Helper Methods ----

/// `Re λ < −margin · max(1, |λ|)` with a finite imaginary part.
///
/// A root on the imaginary axis comes back from the Schur solve with a real
/// part of order ε·‖A‖ of either sign, so a plain `Re λ < 0` test lets it
/// through about half the time.
fn left_of_axis(root: Complex<f64>, margin: f64) -> bool {
    root.im.is_finite() && root.re < -margin * root.norm().max(1.0)
}

fn coincide(anchor: Complex<f64>, distance: f64, tol: f64) -> bool {
    !(distance > tol * anchor.norm().max(1.0))
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> CarmaResult<()> {
    if expected != actual {
        return Err(CarmaError::SeriesLengthMismatch { name, expected, actual });
    }
    Ok(())
}

//! Discretizer: F(Δt) = Re(V · diag(exp(w Δt)) · V⁻¹).
//!
//! The matrix exponential of a diagonalizable A is exact in its eigenbasis,
//! so no Padé iteration is needed on the hot path. Poles come in exact
//! conjugate pairs (see `core::spectral`), hence the complex product is real
//! up to round-off; the residual is checked against `imag_tolerance` and
//! never silently dropped.
use nalgebra::{Complex, DMatrix};

use crate::carma::{
    core::{options::EngineOptions, spectral::SpectralDecomposition},
    errors::{CarmaError, CarmaResult},
};

/// Complex scratch for the eigenbasis product.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscretizeScratch {
    scaled: DMatrix<Complex<f64>>,
    product: DMatrix<Complex<f64>>,
}

impl DiscretizeScratch {
    pub fn new(p: usize) -> DiscretizeScratch {
        DiscretizeScratch { scaled: DMatrix::zeros(p, p), product: DMatrix::zeros(p, p) }
    }
}

/// Check that Δt is finite and non-negative.
///
/// # Errors
/// - [`CarmaError::InvalidTimeStep`] otherwise.
pub fn validate_dt(dt: f64) -> CarmaResult<()> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(CarmaError::InvalidTimeStep { dt });
    }
    Ok(())
}

/// Write F(Δt) into `out`.
///
/// Δt = 0 writes the identity exactly.
///
/// # Errors
/// - [`CarmaError::InvalidTimeStep`] for negative or non-finite Δt.
/// - [`CarmaError::ComplexResidual`] when
///   `max |Im| > imag_tolerance · max(1, max |Re|)`.
pub fn transition_matrix_into(
    spec: &SpectralDecomposition, dt: f64, opts: &EngineOptions, scratch: &mut DiscretizeScratch,
    out: &mut DMatrix<f64>,
) -> CarmaResult<()> {
    validate_dt(dt)?;
    if dt == 0.0 {
        out.fill_with_identity();
        return Ok(());
    }

    let p = spec.w.len();
    for k in 0..p {
        let growth = (spec.w[k] * dt).exp();
        for i in 0..p {
            scratch.scaled[(i, k)] = spec.vr[(i, k)] * growth;
        }
    }
    scratch.product.gemm(
        Complex::new(1.0, 0.0),
        &scratch.scaled,
        &spec.vr_inv,
        Complex::new(0.0, 0.0),
    );

    let max_imag = scratch.product.iter().map(|z| z.im.abs()).fold(0.0, f64::max);
    let max_real = scratch.product.iter().map(|z| z.re.abs()).fold(0.0, f64::max);
    let tolerance = opts.imag_tolerance * max_real.max(1.0);
    if !(max_imag <= tolerance) {
        return Err(CarmaError::ComplexResidual { max_imag, tolerance });
    }
    for (dst, z) in out.iter_mut().zip(scratch.product.iter()) {
        *dst = z.re;
    }
    Ok(())
}

/// Allocating wrapper around [`transition_matrix_into`].
pub fn transition_matrix(
    spec: &SpectralDecomposition, dt: f64, opts: &EngineOptions,
) -> CarmaResult<DMatrix<f64>> {
    let p = spec.w.len();
    let mut scratch = DiscretizeScratch::new(p);
    let mut out = DMatrix::zeros(p, p);
    transition_matrix_into(spec, dt, opts, &mut scratch, &mut out)?;
    Ok(out)
}

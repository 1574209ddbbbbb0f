//! Continuous-time CARMA system matrices.
//!
//! The builder writes the observer canonical form of a CARMA(p, q) model:
//!
//! - `A[i][0] = −a_{i+1}`, `A[i][i+1] = 1`, zero elsewhere;
//! - `B[p−1−j] = b_j` for `j ≤ q`, zero-padded;
//! - `H = e₁`.
//!
//! With this layout `H (sI − A)⁻¹ B = b(s) / a(s)`, the first column of A
//! carries the AR coefficients, and the eigenvectors of A have a closed
//! form used by the spectral engine.
use nalgebra::{DMatrix, DVector};

use crate::{
    carma::{
        core::{polynomial::fill_companion, shape::CarmaShape},
        errors::{CarmaError, CarmaResult},
    },
    linalg::zero_fill,
};

/// Owned buffers for A, B, H and BBᵀ.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSystem {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub h: DVector<f64>,
    pub bbt: DMatrix<f64>,
}

impl ContinuousSystem {
    /// Zeroed buffers for a state of dimension `p`.
    pub fn new(p: usize) -> ContinuousSystem {
        ContinuousSystem {
            a: DMatrix::zeros(p, p),
            b: DVector::zeros(p),
            h: DVector::zeros(p),
            bbt: DMatrix::zeros(p, p),
        }
    }

    pub fn dim(&self) -> usize {
        self.a.nrows()
    }
}

/// Overwrite `sys` with the system matrices of Θ.
///
/// Θ is assumed admissible; only dimensions are checked here.
///
/// # Errors
/// - [`CarmaError::ThetaLengthMismatch`] if `theta.len() != p + q + 1`.
/// - [`CarmaError::InvalidModelShape`] if `sys` was sized for another `p`.
pub fn build_system(
    theta: &[f64], shape: &CarmaShape, sys: &mut ContinuousSystem,
) -> CarmaResult<()> {
    let (p, q) = (shape.p, shape.q);
    if theta.len() != shape.n_params() {
        return Err(CarmaError::ThetaLengthMismatch {
            expected: shape.n_params(),
            actual: theta.len(),
        });
    }
    if sys.dim() != p {
        return Err(CarmaError::InvalidModelShape {
            p,
            q,
            reason: "System buffers were allocated for a different order.",
        });
    }

    fill_companion(&mut sys.a, &theta[..p]);

    sys.b.fill(0.0);
    for (j, &b_j) in theta[p..].iter().enumerate() {
        sys.b[p - 1 - j] = b_j;
    }

    sys.h.fill(0.0);
    sys.h[0] = 1.0;

    zero_fill(&mut sys.bbt);
    sys.bbt.ger(1.0, &sys.b, &sys.b, 0.0);
    Ok(())
}

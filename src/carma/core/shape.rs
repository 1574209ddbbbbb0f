//! Model order (p, q) for CARMA models.
//!
//! - `p`: AR order, the dimension of the latent state.
//! - `q`: MA order, the degree of the moving-average polynomial.
//!
//! A CARMA(p, q) process is only proper when `q < p`; `p ≥ 1` is required
//! for a state to exist.
use crate::carma::errors::{CarmaError, CarmaResult};

/// Order of the CARMA(p, q) model.
///
/// Invariant: `p ≥ 1` and `q < p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarmaShape {
    pub p: usize,
    pub q: usize,
}

impl CarmaShape {
    /// Construct a validated [`CarmaShape`].
    ///
    /// # Errors
    /// - [`CarmaError::InvalidModelShape`] if `p == 0`.
    /// - [`CarmaError::InvalidModelShape`] if `q >= p`.
    pub fn new(p: usize, q: usize) -> CarmaResult<Self> {
        if p == 0 {
            return Err(CarmaError::InvalidModelShape {
                p,
                q,
                reason: "AR order p must be at least 1.",
            });
        }
        if q >= p {
            return Err(CarmaError::InvalidModelShape {
                p,
                q,
                reason: "MA order q must be strictly less than p.",
            });
        }
        Ok(CarmaShape { p, q })
    }

    /// Length of the parameter vector Θ = [a₁..a_p, b₀..b_q].
    pub fn n_params(&self) -> usize {
        self.p + self.q + 1
    }
}

//! Optimizer layer behind `CarmaModel::fit`.
//!
//! - `loglik_optimizer`: L-BFGS maximization of any [`LogLikelihood`]
//!   through argmin, with a finite-difference gradient fallback.
//! - `numerical_stability`: the overflow-safe softplus pair the θ-map is
//!   built on.
//! - `errors`: [`OptError`] and [`OptResult`], including the conversions to
//!   and from `CarmaError` and argmin's error type.
//!
//! Nothing here knows about CARMA coefficients. The model maps θ to Θ and
//! decides how inadmissible points look to the solver (a large finite
//! penalty, so line searches back off).
//!
//! [`LogLikelihood`]: loglik_optimizer::LogLikelihood
//! [`OptError`]: errors::OptError
//! [`OptResult`]: errors::OptResult

pub mod errors;
pub mod loglik_optimizer;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loglik_optimizer::prelude::*;
    pub use super::numerical_stability::prelude::*;
}

//! L-BFGS maximization of a log-likelihood, built on argmin.
//!
//! A model implements [`LogLikelihood`] over an unconstrained parameter
//! vector [`Theta`] and hands it to [`maximize`]. Internally the problem is
//! the minimization of `c(θ) = −ℓ(θ)`; everything a caller sees back
//! ([`OptimOutcome::value`], the verbose start line) is in `ℓ`.
//!
//! Layout:
//! - [`likelihood`]: the trait a model implements.
//! - [`options`]: [`Tolerances`], [`LineSearcher`], [`MLEOptions`].
//! - [`builders`]: the two L-BFGS solver variants and their aliases.
//! - [`adapter`]: argmin `CostFunction`/`Gradient` bridge with the
//!   finite-difference fallback for models without an analytic gradient.
//! - [`api`]: [`maximize`], the executor run and [`OptimOutcome`].
//!
//! CARMA models never provide `grad`, and report rejected points as a large
//! finite value rather than an error, so every cost the solver sees is
//! finite.
use ndarray::Array1;
use std::collections::HashMap;

pub mod adapter;
pub mod api;
pub mod builders;
pub mod likelihood;
pub mod options;

/// Optimizer-space parameter vector.
pub type Theta = Array1<f64>;

/// Gradient with the shape of [`Theta`].
pub type Grad = Array1<f64>;

/// Scalar objective; a log-likelihood in the trait, a cost inside argmin.
pub type Cost = f64;

/// argmin's evaluation counters, e.g. `"cost_count"`.
pub type FnEvalMap = HashMap<String, u64>;

pub use self::api::{OptimOutcome, maximize};
pub use self::builders::DEFAULT_LBFGS_MEM;
pub use self::likelihood::LogLikelihood;
pub use self::options::{LineSearcher, MLEOptions, Tolerances};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::api::{OptimOutcome, maximize};
    pub use super::likelihood::LogLikelihood;
    pub use super::options::{MLEOptions, Tolerances};
    pub use super::{Cost, Grad, Theta};
}

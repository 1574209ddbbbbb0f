//! The objective a model exposes to [`maximize`](super::maximize).
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Cost, Grad, Theta},
};

/// Log-likelihood `ℓ(θ)` over an unconstrained parameter vector.
///
/// `value` and `grad` speak in `ℓ`, never in the cost; the adapter negates.
/// Implementations report bad inputs through [`OptError`] and must not panic.
///
/// - `value`: `ℓ(θ)`. A model that wants the line search to back off from a
///   point, rather than abort, returns a very negative finite number.
/// - `check`: called once on the starting point before any iteration.
/// - `grad`: `∇ℓ(θ)`. The default reports
///   [`OptError::GradientNotImplemented`], which switches the adapter to
///   finite differences.
pub trait LogLikelihood {
    type Data: 'static;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost>;

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()>;

    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

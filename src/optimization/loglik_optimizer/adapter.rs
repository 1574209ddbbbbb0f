//! Bridge from [`LogLikelihood`] to argmin's `CostFunction` and `Gradient`.
//!
//! The optimizer minimizes `c(θ) = −ℓ(θ)`. An analytic gradient supplied by
//! the model is negated; otherwise the gradient of the cost itself is taken
//! by finite differences, so that branch needs no sign flip.
//!
//! CARMA likelihoods report rejected points as a large finite sentinel, which
//! keeps every cost finite and lets the line search back off instead of
//! aborting. A non-finite value is still an error.
use std::cell::RefCell;

use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Cost, Grad, Theta, likelihood::LogLikelihood},
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// argmin problem wrapping a borrowed model and its data.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: LogLikelihood> {
    pub f: &'a F,
    pub data: &'a F::Data,
}

impl<'a, F: LogLikelihood> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data }
    }

    /// Finite-difference gradient of the cost.
    ///
    /// Central differences first. Any failed cost evaluation inside the
    /// stencil, or a gradient that fails validation, triggers one retry with
    /// forward differences, whose failure is returned.
    fn fd_gradient(&self, theta: &Theta) -> Result<Grad, Error> {
        let failure: RefCell<Option<Error>> = RefCell::new(None);
        let cost = |x: &Theta| -> f64 {
            self.cost(x).unwrap_or_else(|err| {
                failure.borrow_mut().get_or_insert(err);
                f64::NAN
            })
        };

        let central = theta.central_diff(&cost);
        if failure.borrow().is_none() && check_gradient(&central, theta.len()).is_ok() {
            return Ok(central);
        }
        forward_gradient(theta, &cost, &failure)
    }
}

impl<'a, F: LogLikelihood> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// `−ℓ(θ)`.
    ///
    /// # Errors
    /// - Any `OptError` raised by the model's `value`.
    /// - `OptError::NonFiniteCost` for NaN or infinite log-likelihoods.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let ll = self.f.value(theta, self.data)?;
        if !ll.is_finite() {
            return Err((OptError::NonFiniteCost { value: ll }).into());
        }
        Ok(-ll)
    }
}

impl<'a, F: LogLikelihood> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// `−∇ℓ(θ)` from the model, or a finite-difference gradient of the cost
    /// when the model reports `GradientNotImplemented`.
    ///
    /// # Errors
    /// - Model gradient errors other than `GradientNotImplemented`.
    /// - Wrong-length or non-finite gradients.
    /// - Cost failures met during the forward-difference retry.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                check_gradient(&g, theta.len())?;
                Ok(-g)
            }
            Err(OptError::GradientNotImplemented) => self.fd_gradient(theta),
            Err(e) => Err(e.into()),
        }
    }
}

/// Length must equal `dim` and every entry must be finite.
fn check_gradient(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match grad.iter().enumerate().find(|(_, g)| !g.is_finite()) {
        Some((index, &value)) => Err(OptError::InvalidGradient {
            index,
            value,
            reason: "Gradient elements must be finite.",
        }),
        None => Ok(()),
    }
}

fn forward_gradient<G: Fn(&Theta) -> f64>(
    theta: &Theta, cost: &G, failure: &RefCell<Option<Error>>,
) -> Result<Grad, Error> {
    failure.replace(None);
    let grad = theta.forward_diff(cost);
    if let Some(err) = failure.take() {
        return Err(err);
    }
    check_gradient(&grad, theta.len())?;
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The sign convention for costs and analytic gradients.
    // - The finite-difference fallback when no gradient is implemented.
    // - Rejection of non-finite log-likelihood values.
    // - Gradient shape and finiteness checks.
    // -------------------------------------------------------------------------

    // ℓ(θ) = −½‖θ − c‖², optional analytic gradient.
    struct Quadratic {
        analytic: bool,
    }

    impl LogLikelihood for Quadratic {
        type Data = Theta;

        fn value(&self, theta: &Theta, c: &Theta) -> OptResult<Cost> {
            Ok(-0.5 * (theta - c).mapv(|d| d * d).sum())
        }

        fn check(&self, _theta: &Theta, _c: &Theta) -> OptResult<()> {
            Ok(())
        }

        fn grad(&self, theta: &Theta, c: &Theta) -> OptResult<Grad> {
            if self.analytic { Ok(c - theta) } else { Err(OptError::GradientNotImplemented) }
        }
    }

    struct NotANumber;

    impl LogLikelihood for NotANumber {
        type Data = ();

        fn value(&self, _theta: &Theta, _data: &()) -> OptResult<Cost> {
            Ok(f64::NAN)
        }

        fn check(&self, _theta: &Theta, _data: &()) -> OptResult<()> {
            Ok(())
        }
    }

    #[test]
    // Purpose
    // -------
    // Verify that cost and analytic gradient are the negated log-likelihood
    // and its negated gradient.
    //
    // Given
    // -----
    // - ℓ(θ) = −½‖θ − c‖² with c = (1, −2), evaluated at θ = (0, 0).
    //
    // Expect
    // ------
    // - cost = 2.5, gradient = θ − c = (−1, 2).
    fn cost_and_analytic_gradient_flip_sign() {
        // Arrange
        let model = Quadratic { analytic: true };
        let c = array![1.0, -2.0];
        let adapter = ArgMinAdapter::new(&model, &c);
        let theta = array![0.0, 0.0];

        // Act
        let cost = adapter.cost(&theta).unwrap();
        let grad = adapter.gradient(&theta).unwrap();

        // Assert
        assert_abs_diff_eq!(cost, 2.5, epsilon = 1e-15);
        assert_abs_diff_eq!(grad[0], -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(grad[1], 2.0, epsilon = 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Ensure the finite-difference fallback reproduces the analytic cost
    // gradient.
    //
    // Given
    // -----
    // - The same quadratic without an analytic gradient, at θ = (0.5, 0.25).
    //
    // Expect
    // ------
    // - Gradient ≈ θ − c to finite-difference accuracy.
    fn finite_difference_fallback_matches_analytic() {
        // Arrange
        let model = Quadratic { analytic: false };
        let c = array![1.0, -2.0];
        let adapter = ArgMinAdapter::new(&model, &c);
        let theta = array![0.5, 0.25];

        // Act
        let grad = adapter.gradient(&theta).unwrap();

        // Assert
        assert_abs_diff_eq!(grad[0], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], 2.25, epsilon = 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Check that non-finite log-likelihoods surface as errors in both cost
    // and finite-difference gradient.
    //
    // Given
    // -----
    // - A model that always returns NaN.
    //
    // Expect
    // ------
    // - `cost` and `gradient` both return `Err`.
    fn non_finite_values_are_errors() {
        // Arrange
        let adapter = ArgMinAdapter::new(&NotANumber, &());
        let theta = array![0.0];

        // Act / Assert
        assert!(adapter.cost(&theta).is_err());
        assert!(adapter.gradient(&theta).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Verify the gradient shape and finiteness rules.
    //
    // Given
    // -----
    // - A length-2 gradient checked against dimension 3, one with NaN at
    //   index 1, and a clean one.
    //
    // Expect
    // ------
    // - `GradientDimMismatch`, `InvalidGradient { index: 1, .. }`, `Ok`.
    fn gradient_shape_and_finiteness() {
        // Arrange
        let short = array![1.0, 2.0];
        let nan = array![1.0, f64::NAN];

        // Act / Assert
        assert_eq!(
            check_gradient(&short, 3),
            Err(OptError::GradientDimMismatch { expected: 3, found: 2 })
        );
        assert!(matches!(check_gradient(&nan, 2), Err(OptError::InvalidGradient { index: 1, .. })));
        assert!(check_gradient(&short, 2).is_ok());
    }
}

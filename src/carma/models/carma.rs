//! CARMA(p, q) model: maximum-likelihood fitting on top of the Kalman engine.
//!
//! This module wires a CARMA(p, q) specification to the `LogLikelihood` trait.
//! The optimizer works in the unconstrained θ-space of
//! [`CarmaParams::from_theta`], so every proposal maps to stable, invertible
//! coefficients; the engine still validates each point and numerical
//! degeneracies surface as the finite sentinel [`LN_LIKE_SENTINEL`], which
//! line searches treat as a very poor point.
//!
//! Key ideas:
//! - One engine per model, held in a `RefCell` so `value(&self, ..)` can
//!   reuse its buffers across evaluations.
//! - No analytic gradient: the optimizer adapter falls back to finite
//!   differences of the cost.
//! - After `fit`, every model-level query (`ln_like`, `residuals`, `smooth`,
//!   `simulate`) re-installs the fitted parameters first, so evaluations done
//!   by the optimizer never leak into results.
use std::cell::RefCell;

use nalgebra::Complex;
use ndarray::{Array1, ArrayView1};

use crate::{
    carma::{
        core::{
            data::LnLikeData, options::CarmaOptions, params::CarmaParams, shape::CarmaShape,
        },
        errors::{CarmaError, CarmaResult},
        kalman::{simulate::simulate_series, smoother::SmoothedPath, system::CarmaSystem},
        models::pool::LN_LIKE_SENTINEL,
    },
    optimization::{
        errors::{OptError, OptResult},
        loglik_optimizer::{LogLikelihood, OptimOutcome, Theta, maximize},
    },
};

/// CARMA(p, q) model fitted by maximum likelihood.
///
/// After [`fit`](CarmaModel::fit), [`results`](CarmaModel::results) holds the
/// optimizer outcome (θ̂ in optimizer space) and
/// [`fitted_params`](CarmaModel::fitted_params) the model-space coefficients.
///
/// # Notes
/// - Not `Sync`: one model belongs to one thread. Use
///   [`CarmaPool`](crate::carma::models::pool::CarmaPool) for concurrent
///   likelihood evaluation.
#[derive(Debug, Clone)]
pub struct CarmaModel {
    /// CARMA(p, q) model order.
    pub shape: CarmaShape,
    /// Engine thresholds and optimizer options.
    pub options: CarmaOptions,
    /// Fit results (populated after `fit`).
    pub results: Option<OptimOutcome>,
    /// Fitted parameters (populated after `fit`).
    pub fitted_params: Option<CarmaParams>,
    system: RefCell<CarmaSystem>,
}

impl CarmaModel {
    /// Construct a model with an allocated engine.
    pub fn new(shape: CarmaShape, options: CarmaOptions) -> CarmaModel {
        let system = RefCell::new(CarmaSystem::allocated(shape, options.engine));
        CarmaModel { shape, options, results: None, fitted_params: None, system }
    }

    /// Optimizer-space starting point for admissible `params`.
    ///
    /// # Errors
    /// - Any rejection from the validator: only strictly stable, invertible,
    ///   non-redundant parameters have a θ image.
    pub fn initial_theta(&self, params: &CarmaParams) -> CarmaResult<Array1<f64>> {
        params.to_theta(&self.shape, &self.options.engine)
    }

    /// Fit CARMA(p, q) by maximum likelihood (consumes `theta0`).
    ///
    /// ## Steps
    /// 1. Validate `theta0` (length, finiteness) and run L-BFGS per
    ///    `options.mle_opts`.
    /// 2. Store the optimizer outcome in `self.results`.
    /// 3. Map θ̂ to model space, install it on the engine, and store it in
    ///    `self.fitted_params`.
    ///
    /// ## Errors
    /// - Optimizer failures (`OptError`), including invalid `theta0`.
    /// - Engine errors at θ̂, converted by class.
    pub fn fit(&mut self, theta0: Array1<f64>, data: &LnLikeData) -> OptResult<()> {
        let outcome = maximize(&*self, theta0, data, &self.options.mle_opts)?;
        let params = CarmaParams::from_theta(outcome.theta_hat.view(), &self.shape)?;
        self.system.get_mut().set(&params.to_vec())?;
        self.results = Some(outcome);
        self.fitted_params = Some(params);
        Ok(())
    }

    /// Log-likelihood of `data` at the fitted parameters.
    ///
    /// # Errors
    /// - [`CarmaError::ModelNotFitted`] before `fit`.
    /// - Engine errors from the forward pass.
    pub fn ln_like(&self, data: &LnLikeData) -> CarmaResult<f64> {
        self.with_fitted(|system| system.ln_like(data))
    }

    /// Standardized innovations at the fitted parameters; NaN where masked.
    pub fn residuals(&self, data: &LnLikeData) -> CarmaResult<Array1<f64>> {
        self.with_fitted(|system| system.residuals(data))
    }

    /// RTS-smoothed path at the fitted parameters.
    pub fn smooth(&self, data: &LnLikeData) -> CarmaResult<SmoothedPath> {
        self.with_fitted(|system| system.smooth(data))
    }

    /// Synthetic series from the fitted process on the grid `t`.
    ///
    /// See [`simulate_series`] for the draw order and burn-in step.
    pub fn simulate(
        &self, t: ArrayView1<f64>, yerr: ArrayView1<f64>, mask: Option<ArrayView1<f64>>,
        n_burn: usize, seed: u64,
    ) -> CarmaResult<Array1<f64>> {
        self.with_fitted(|system| simulate_series(system, t, yerr, mask, n_burn, seed))
    }

    /// AR roots of the fitted parameters.
    pub fn ar_roots(&self) -> CarmaResult<Vec<Complex<f64>>> {
        self.with_fitted(|system| Ok(system.ar_roots()?.to_vec()))
    }

    /// MA roots of the fitted parameters (empty for q = 0).
    pub fn ma_roots(&self) -> CarmaResult<Vec<Complex<f64>>> {
        self.with_fitted(|system| Ok(system.ma_roots()?.to_vec()))
    }

    fn with_fitted<R, F>(&self, f: F) -> CarmaResult<R>
    where
        F: FnOnce(&mut CarmaSystem) -> CarmaResult<R>,
    {
        let params = self.fitted_params.as_ref().ok_or(CarmaError::ModelNotFitted)?;
        let mut system = self.system.borrow_mut();
        system.set(&params.to_vec())?;
        f(&mut system)
    }
}

impl LogLikelihood for CarmaModel {
    type Data = LnLikeData;

    /// Log-likelihood at optimizer-space `θ`.
    ///
    /// # Steps
    /// 1. Map `θ` → Θ via [`CarmaParams::from_theta`].
    /// 2. Install Θ on the engine and run the forward pass.
    /// 3. Recoverable failures (rejection, degeneracy) become
    ///    [`LN_LIKE_SENTINEL`]; fatal ones propagate.
    ///
    /// The sentinel is a cost of 1e300, not an error: argmin's line searches
    /// abort the run on `Err` but shrink the step on a large finite cost. The
    /// reachable failures sit at the edge of θ-space, where a logit is so
    /// negative that a root lands within `stability_margin` of the axis, so
    /// backing off is the right response. A gradient stencil that touches
    /// such a point is non-finite or invalid and falls through to the
    /// adapter's forward-difference retry.
    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<f64> {
        let mut system = self.system.borrow_mut();
        match evaluate(&mut system, theta.view(), &self.shape, data) {
            Ok(value) => Ok(value),
            Err(err) if err.is_recoverable() => Ok(LN_LIKE_SENTINEL),
            Err(err) => Err(err.into()),
        }
    }

    /// Validate an unconstrained parameter vector `θ`.
    ///
    /// Checks `θ.len() == p + q + 1` and that every entry is finite.
    fn check(&self, theta: &Theta, _data: &Self::Data) -> OptResult<()> {
        let expected = self.shape.n_params();
        if theta.len() != expected {
            return Err(OptError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OptError::InvalidThetaInput { index, value });
        }
        Ok(())
    }
}

fn evaluate(
    system: &mut CarmaSystem, theta: ArrayView1<f64>, shape: &CarmaShape, data: &LnLikeData,
) -> CarmaResult<f64> {
    let params = CarmaParams::from_theta(theta, shape)?;
    system.set(&params.to_vec())?;
    system.ln_like(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carma::core::options::EngineOptions;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - `value` agreeing with the engine at the mapped parameters, and its
    //   sentinel for near-axis θ.
    // - `check` rejecting wrong lengths and non-finite θ.
    // - Fitted-only accessors before `fit`.
    //
    // They intentionally DO NOT cover:
    // - Full optimizer runs (see `tests/integration_carma_pipeline.rs`).
    // -------------------------------------------------------------------------

    fn data() -> LnLikeData {
        LnLikeData::new(
            array![0.0, 0.4, 1.1, 1.5, 2.7, 3.0],
            array![0.3, 0.1, -0.2, 0.0, 0.4, 0.2],
            array![0.1, 0.1, 0.1, 0.1, 0.1, 0.1],
            None,
        )
        .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Verify that `value(θ)` equals the engine log-likelihood at
    // `from_theta(θ)`.
    //
    // Given
    // -----
    // - CARMA(2, 1) and θ = [0.2, −0.1, 0.3, 0.5].
    //
    // Expect
    // ------
    // - Identical values.
    fn value_matches_engine() {
        // Arrange
        let shape = CarmaShape::new(2, 1).unwrap();
        let model = CarmaModel::new(shape, CarmaOptions::default());
        let theta = array![0.2, -0.1, 0.3, 0.5];
        let data = data();
        let params = CarmaParams::from_theta(theta.view(), &shape).unwrap();
        let mut engine = CarmaSystem::allocated(shape, EngineOptions::default());
        engine.set(&params.to_vec()).unwrap();
        let expected = engine.ln_like(&data).unwrap();

        // Act
        let value = model.value(&theta, &data).unwrap();

        // Assert
        assert_relative_eq!(value, expected, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Verify that a θ whose mapped AR pair lies within the stability margin
    // of the imaginary axis yields the finite sentinel instead of an error.
    //
    // Given
    // -----
    // - CARMA(2, 0) and θ = [−60, 0, 0]: a(z) = z² + softplus(−60) z + ln 2,
    //   roots with Re ≈ −4e−27.
    //
    // Expect
    // ------
    // - `Ok(LN_LIKE_SENTINEL)`.
    fn near_axis_theta_returns_sentinel() {
        // Arrange
        let model = CarmaModel::new(CarmaShape::new(2, 0).unwrap(), CarmaOptions::default());
        let theta = array![-60.0, 0.0, 0.0];

        // Act
        let value = model.value(&theta, &data());

        // Assert
        assert_eq!(value, Ok(LN_LIKE_SENTINEL));
    }

    #[test]
    // Purpose
    // -------
    // Ensure `check` catches malformed θ before optimization.
    //
    // Given
    // -----
    // - CARMA(1, 0); θ of length 3 and θ containing NaN.
    //
    // Expect
    // ------
    // - `ThetaLengthMismatch` and `InvalidThetaInput { index: 1, .. }`.
    fn check_rejects_bad_theta() {
        // Arrange
        let model = CarmaModel::new(CarmaShape::new(1, 0).unwrap(), CarmaOptions::default());
        let data = data();

        // Act
        let wrong_len = model.check(&array![0.0, 0.0, 0.0], &data);
        let non_finite = model.check(&array![0.0, f64::NAN], &data);

        // Assert
        assert_eq!(wrong_len, Err(OptError::ThetaLengthMismatch { expected: 2, actual: 3 }));
        assert!(matches!(non_finite, Err(OptError::InvalidThetaInput { index: 1, .. })));
        assert!(model.check(&array![0.0, 0.0], &data).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Verify that fitted-only accessors refuse to run before `fit`.
    //
    // Given
    // -----
    // - A fresh CARMA(1, 0) model.
    //
    // Expect
    // ------
    // - `ModelNotFitted` from `ln_like` and `ar_roots`.
    fn accessors_require_fit() {
        // Arrange
        let model = CarmaModel::new(CarmaShape::new(1, 0).unwrap(), CarmaOptions::default());

        // Act / Assert
        assert_eq!(model.ln_like(&data()), Err(CarmaError::ModelNotFitted));
        assert_eq!(model.ar_roots(), Err(CarmaError::ModelNotFitted));
    }

    #[test]
    // Purpose
    // -------
    // Check that `initial_theta` inverts `from_theta` for admissible Θ.
    //
    // Given
    // -----
    // - CARMA(2, 1) with Θ = [1, 1.25, 1, 0.5].
    //
    // Expect
    // ------
    // - `from_theta(initial_theta(Θ))` reproduces Θ to 1e-10.
    fn initial_theta_round_trips() {
        // Arrange
        let shape = CarmaShape::new(2, 1).unwrap();
        let model = CarmaModel::new(shape, CarmaOptions::default());
        let params = CarmaParams::new(array![1.0, 1.25], array![1.0, 0.5], &shape).unwrap();

        // Act
        let theta = model.initial_theta(&params).unwrap();
        let back = CarmaParams::from_theta(theta.view(), &shape).unwrap();

        // Assert
        for (a, b) in back.to_vec().iter().zip(params.to_vec()) {
            assert_relative_eq!(*a, b, epsilon = 1e-10);
        }
    }
}

//! rust_carma — CARMA(p, q) state-space likelihood engine with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that exposes
//! the CARMA engine to Python via the `_rust_carma` extension module. When the
//! `python-bindings` feature is enabled, this module defines the Python-facing
//! classes and the `carma_models` submodule.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`carma`, `linalg`, `optimization`) as
//!   the public crate surface.
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer for the
//!   `_rust_carma` Python extension.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work is implemented in the inner Rust modules; this file
//!   performs only FFI glue, input conversion, and error mapping.
//! - Likelihood calls from Python follow the same contract as
//!   [`carma::CarmaPool`]: rejected or degenerate parameters return the
//!   finite sentinel, contract violations raise `ValueError`.
//!
//! Conventions
//! -----------
//! - Python-exposed classes live under `_rust_carma.carma_models`.
//! - Roots are returned as `(re, im)` tuples; matrices as row-major nested
//!   lists.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code should depend on [`carma`] directly and can ignore the
//!   PyO3 items guarded by the `python-bindings` feature.

pub mod carma;
pub mod linalg;
pub mod optimization;
pub mod utils;

#[cfg(feature = "python-bindings")]
use nalgebra::Complex;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    carma::{
        core::params::CarmaParams,
        errors::{CarmaError, CarmaResult},
        kalman::{simulate::simulate_series, system::CarmaSystem},
        models::{carma::CarmaModel, pool::LN_LIKE_SENTINEL},
    },
    optimization::loglik_optimizer::OptimOutcome,
    utils::{build_carma_model, extract_array1, extract_lnlike_data},
};

/// CARMA — Python-facing wrapper for CARMA(p, q) models.
///
/// Purpose
/// -------
/// Expose both ways of using the engine from Python: explicit parameter
/// installation (`set`, then `ln_like` / `residuals` / `smooth` /
/// `simulate`) for samplers, and maximum-likelihood fitting (`fit`).
///
/// Fields
/// ------
/// - `inner`: [`CarmaModel`]
///   Fitting surface; owns the optimizer options and cached results.
/// - `engine`: [`CarmaSystem`]
///   Standalone engine used by `set` and the evaluation methods. `fit`
///   installs the fitted parameters on it.
///
/// Notes
/// -----
/// - The class is `unsendable`: one instance belongs to one Python thread.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_carma.carma_models", unsendable)]
pub struct CARMA {
    pub inner: CarmaModel,
    engine: CarmaSystem,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CARMA {
    #[new]
    #[pyo3(
        signature = (
            p,
            q = 0,
            stability_margin = None,
            root_tolerance = None,
            eigen_rcond_min = None,
            kron_rcond_min = None,
            imag_tolerance = None,
            init_uncertainty = None,
            tol_grad = None,
            tol_cost = None,
            max_iter = None,
            line_searcher = None,
            lbfgs_mem = None,
        ),
        text_signature = "(p, /, q=0, stability_margin=None, root_tolerance=None, \
                          eigen_rcond_min=None, kron_rcond_min=None, imag_tolerance=None, \
                          init_uncertainty=None, tol_grad=None, tol_cost=None, max_iter=None, \
                          line_searcher=None, lbfgs_mem=None)"
    )]
    pub fn new(
        p: usize, q: usize, stability_margin: Option<f64>, root_tolerance: Option<f64>,
        eigen_rcond_min: Option<f64>, kron_rcond_min: Option<f64>, imag_tolerance: Option<f64>,
        init_uncertainty: Option<f64>, tol_grad: Option<f64>, tol_cost: Option<f64>,
        max_iter: Option<usize>, line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
    ) -> PyResult<Self> {
        let inner = build_carma_model(
            p,
            q,
            stability_margin,
            root_tolerance,
            eigen_rcond_min,
            kron_rcond_min,
            imag_tolerance,
            init_uncertainty,
            tol_grad,
            tol_cost,
            max_iter,
            line_searcher,
            lbfgs_mem,
        )?;
        let engine = CarmaSystem::allocated(inner.shape, inner.options.engine);
        Ok(CARMA { inner, engine })
    }

    /// `True` if Θ is admissible, `False` if it is rejected or degenerate.
    #[pyo3(text_signature = "(self, theta, /)")]
    pub fn check<'py>(&self, py: Python<'py>, theta: &Bound<'py, PyAny>) -> PyResult<bool> {
        let theta = extract_array1(py, theta, "theta")?;
        match self.engine.check(&theta.to_vec()) {
            Ok(_) => Ok(true),
            Err(err) if err.is_recoverable() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Install Θ on the engine; raises on rejection.
    #[pyo3(text_signature = "(self, theta, /)")]
    pub fn set<'py>(&mut self, py: Python<'py>, theta: &Bound<'py, PyAny>) -> PyResult<()> {
        let theta = extract_array1(py, theta, "theta")?;
        self.engine.set(&theta.to_vec())?;
        Ok(())
    }

    /// Log-likelihood at the installed Θ, or at `theta` when given.
    ///
    /// With `theta`, rejected or degenerate points return the sentinel.
    #[pyo3(
        signature = (t, y, yerr, mask = None, theta = None),
        text_signature = "(self, t, y, yerr, /, mask=None, theta=None)"
    )]
    pub fn ln_like<'py>(
        &mut self, py: Python<'py>, t: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>,
        yerr: &Bound<'py, PyAny>, mask: Option<&Bound<'py, PyAny>>,
        theta: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<f64> {
        let data = extract_lnlike_data(py, t, y, yerr, mask)?;
        let Some(theta) = theta else {
            return Ok(self.engine.ln_like(&data)?);
        };
        let theta = extract_array1(py, theta, "theta")?;
        let outcome = match self.engine.set(&theta.to_vec()) {
            Ok(()) => self.engine.ln_like(&data),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(err) if err.is_recoverable() => Ok(LN_LIKE_SENTINEL),
            Err(err) => Err(err.into()),
        }
    }

    /// Standardized innovations at the installed Θ; NaN where masked.
    #[pyo3(
        signature = (t, y, yerr, mask = None),
        text_signature = "(self, t, y, yerr, /, mask=None)"
    )]
    pub fn residuals<'py>(
        &mut self, py: Python<'py>, t: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>,
        yerr: &Bound<'py, PyAny>, mask: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Vec<f64>> {
        let data = extract_lnlike_data(py, t, y, yerr, mask)?;
        Ok(self.engine.residuals(&data)?.to_vec())
    }

    /// RTS smoother at the installed Θ.
    ///
    /// Returns `(states, fitted, fitted_var, residuals, ln_like)` with
    /// `states` as an `n × p` nested list.
    #[pyo3(
        signature = (t, y, yerr, mask = None),
        text_signature = "(self, t, y, yerr, /, mask=None)"
    )]
    pub fn smooth<'py>(
        &mut self, py: Python<'py>, t: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>,
        yerr: &Bound<'py, PyAny>, mask: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<(Vec<Vec<f64>>, Vec<f64>, Vec<f64>, Vec<f64>, f64)> {
        let data = extract_lnlike_data(py, t, y, yerr, mask)?;
        let path = self.engine.smooth(&data)?;
        let states = path.states.rows().into_iter().map(|row| row.to_vec()).collect();
        Ok((
            states,
            path.fitted.to_vec(),
            path.fitted_var.to_vec(),
            path.residuals.to_vec(),
            path.ln_like,
        ))
    }

    /// Simulate a series at the installed Θ from a seed.
    #[pyo3(
        signature = (t, yerr, mask = None, n_burn = 0, seed = 0),
        text_signature = "(self, t, yerr, /, mask=None, n_burn=0, seed=0)"
    )]
    pub fn simulate<'py>(
        &mut self, py: Python<'py>, t: &Bound<'py, PyAny>, yerr: &Bound<'py, PyAny>,
        mask: Option<&Bound<'py, PyAny>>, n_burn: usize, seed: u64,
    ) -> PyResult<Vec<f64>> {
        let t = extract_array1(py, t, "t")?;
        let yerr = extract_array1(py, yerr, "yerr")?;
        let mask = match mask {
            Some(m) => Some(extract_array1(py, m, "mask")?),
            None => None,
        };
        let y = simulate_series(
            &mut self.engine,
            t.view(),
            yerr.view(),
            mask.as_ref().map(|m| m.view()),
            n_burn,
            seed,
        )?;
        Ok(y.to_vec())
    }

    /// Fit by maximum likelihood from an optimizer-space start `theta0`.
    #[pyo3(
        signature = (t, y, yerr, theta0, mask = None),
        text_signature = "(self, t, y, yerr, theta0, /, mask=None)"
    )]
    pub fn fit<'py>(
        &mut self, py: Python<'py>, t: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>,
        yerr: &Bound<'py, PyAny>, theta0: &Bound<'py, PyAny>, mask: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<()> {
        let data = extract_lnlike_data(py, t, y, yerr, mask)?;
        let theta0 = extract_array1(py, theta0, "theta0")?;
        self.inner.fit(theta0, &data).map_err(CarmaError::from)?;
        let params = self.inner.fitted_params.as_ref().ok_or(CarmaError::ModelNotFitted)?;
        self.engine.set(&params.to_vec())?;
        Ok(())
    }

    /// Optimizer-space start for model-space Θ.
    #[pyo3(text_signature = "(self, theta, /)")]
    pub fn initial_theta<'py>(
        &self, py: Python<'py>, theta: &Bound<'py, PyAny>,
    ) -> PyResult<Vec<f64>> {
        let theta = extract_array1(py, theta, "theta")?;
        let params = CarmaParams::from_model_vec(&theta.to_vec(), &self.inner.shape)?;
        Ok(self.inner.initial_theta(&params)?.to_vec())
    }

    #[getter]
    pub fn ar_roots(&self) -> PyResult<Vec<(f64, f64)>> {
        Ok(root_pairs(self.engine.ar_roots())?)
    }

    #[getter]
    pub fn ma_roots(&self) -> PyResult<Vec<(f64, f64)>> {
        Ok(root_pairs(self.engine.ma_roots())?)
    }

    #[getter]
    pub fn results(&self) -> PyResult<CARMAOptimOutcome> {
        match &self.inner.results {
            Some(outcome) => Ok(CARMAOptimOutcome { inner: outcome.clone() }),
            None => Err(CarmaError::ModelNotFitted.into()),
        }
    }

    #[getter]
    pub fn fitted_params(&self) -> PyResult<CARMAFittedParams> {
        match &self.inner.fitted_params {
            Some(params) => Ok(CARMAFittedParams { inner: params.clone() }),
            None => Err(CarmaError::ModelNotFitted.into()),
        }
    }
}

#[cfg(feature = "python-bindings")]
fn root_pairs(roots: CarmaResult<&[Complex<f64>]>) -> CarmaResult<Vec<(f64, f64)>> {
    Ok(roots?.iter().map(|r| (r.re, r.im)).collect())
}

/// CARMAOptimOutcome — optimization outcome of a CARMA fit exposed to Python.
///
/// Instances are constructed by the `CARMA.results` getter; `theta_hat` is in
/// optimizer space.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_carma.carma_models")]
pub struct CARMAOptimOutcome {
    /// Underlying Rust OptimOutcome.
    pub inner: OptimOutcome,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CARMAOptimOutcome {
    #[getter]
    pub fn theta_hat(&self) -> Vec<f64> {
        self.inner.theta_hat.to_vec()
    }

    #[getter]
    pub fn value(&self) -> f64 {
        self.inner.value
    }

    #[getter]
    pub fn converged(&self) -> bool {
        self.inner.converged
    }

    #[getter]
    pub fn status(&self) -> String {
        self.inner.status.clone()
    }

    #[getter]
    pub fn iterations(&self) -> usize {
        self.inner.iterations
    }

    #[getter]
    pub fn grad_norm(&self) -> Option<f64> {
        self.inner.grad_norm
    }

    #[getter]
    pub fn fn_evals(&self) -> Vec<(String, u64)> {
        self.inner.fn_evals.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
}

/// CARMAFittedParams — fitted model-space coefficients.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_carma.carma_models")]
pub struct CARMAFittedParams {
    pub inner: CarmaParams,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CARMAFittedParams {
    /// `[a₁..a_p]`.
    #[getter]
    pub fn ar(&self) -> Vec<f64> {
        self.inner.ar.to_vec()
    }

    /// `[b₀..b_q]`.
    #[getter]
    pub fn ma(&self) -> Vec<f64> {
        self.inner.ma.to_vec()
    }

    /// Model-space Θ = `[a₁..a_p, b₀..b_q]`.
    #[getter]
    pub fn theta(&self) -> Vec<f64> {
        self.inner.to_vec()
    }
}

/// _rust_carma — PyO3 module initializer for the Python extension.
///
/// Creates the `carma_models` submodule, attaches it to `_rust_carma`, and
/// registers it in `sys.modules` so dotted imports work.
///
/// # Errors
/// - `PyErr` if creating the submodule or touching `sys.modules` fails.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_carma<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let carma_models_mod = PyModule::new(_py, "carma_models")?;
    carma_models(_py, m, &carma_models_mod)?;

    // Manually add submodules into sys.modules to allow for dot notation.
    _py.import("sys")?.getattr("modules")?.set_item("rust_carma.carma_models", carma_models_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn carma_models<'py>(
    _py: Python, rust_carma: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<CARMA>()?;
    m.add_class::<CARMAOptimOutcome>()?;
    m.add_class::<CARMAFittedParams>()?;
    rust_carma.add_submodule(m)?;
    Ok(())
}

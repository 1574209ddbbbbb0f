//! Python-side argument extraction for the CARMA bindings.
//!
//! Every helper converts loosely typed Python inputs (NumPy arrays, pandas
//! Series, plain sequences, optional keywords) into validated Rust values and
//! maps failures to `ValueError`/`TypeError`.
#[cfg(feature = "python-bindings")]
use ndarray::Array1;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    carma::{
        core::{
            data::LnLikeData,
            options::{CarmaOptions, EngineOptions, StateInit},
            shape::CarmaShape,
        },
        errors::CarmaError,
        models::carma::CarmaModel,
    },
    optimization::loglik_optimizer::{LineSearcher, MLEOptions, Tolerances},
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Copy an array-like argument into an owned `Array1<f64>`.
#[cfg(feature = "python-bindings")]
pub fn extract_array1<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>, name: &str,
) -> PyResult<Array1<f64>> {
    let arr = extract_f64_array(py, raw_data)?;
    let slice = arr.as_slice().map_err(|_| {
        PyValueError::new_err(format!("{name} must be a 1-D contiguous float64 array or sequence"))
    })?;
    Ok(Array1::from(slice.to_vec()))
}

/// Build a validated [`LnLikeData`] from `t`, `y`, `yerr` and an optional mask.
#[cfg(feature = "python-bindings")]
pub fn extract_lnlike_data<'py>(
    py: Python<'py>, t: &Bound<'py, PyAny>, y: &Bound<'py, PyAny>, yerr: &Bound<'py, PyAny>,
    mask: Option<&Bound<'py, PyAny>>,
) -> PyResult<LnLikeData> {
    let t = extract_array1(py, t, "t")?;
    let y = extract_array1(py, y, "y")?;
    let yerr = extract_array1(py, yerr, "yerr")?;
    let mask = match mask {
        Some(m) => Some(extract_array1(py, m, "mask")?),
        None => None,
    };
    Ok(LnLikeData::new(t, y, yerr, mask)?)
}

#[cfg(feature = "python-bindings")]
pub fn build_carma_model(
    p: usize, q: usize, stability_margin: Option<f64>, root_tolerance: Option<f64>,
    eigen_rcond_min: Option<f64>, kron_rcond_min: Option<f64>, imag_tolerance: Option<f64>,
    init_uncertainty: Option<f64>, tol_grad: Option<f64>, tol_cost: Option<f64>,
    max_iter: Option<usize>, line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> PyResult<CarmaModel> {
    let shape = CarmaShape::new(p, q)?;
    let engine = extract_engine_options(
        stability_margin,
        root_tolerance,
        eigen_rcond_min,
        kron_rcond_min,
        imag_tolerance,
        init_uncertainty,
    )?;
    let mle_opts = extract_mle_opts(tol_grad, tol_cost, max_iter, line_searcher, lbfgs_mem)?;
    Ok(CarmaModel::new(shape, CarmaOptions::new(engine, mle_opts)))
}

#[cfg(feature = "python-bindings")]
fn extract_engine_options(
    stability_margin: Option<f64>, root_tolerance: Option<f64>, eigen_rcond_min: Option<f64>,
    kron_rcond_min: Option<f64>, imag_tolerance: Option<f64>, init_uncertainty: Option<f64>,
) -> PyResult<EngineOptions> {
    let defaults = EngineOptions::default();
    let state_init = match init_uncertainty {
        Some(u) => StateInit::diffuse(u)?,
        None => StateInit::Stationary,
    };
    Ok(EngineOptions::new(
        stability_margin.unwrap_or(defaults.stability_margin),
        root_tolerance.unwrap_or(defaults.root_tolerance),
        eigen_rcond_min.unwrap_or(defaults.eigen_rcond_min),
        kron_rcond_min.unwrap_or(defaults.kron_rcond_min),
        imag_tolerance.unwrap_or(defaults.imag_tolerance),
        defaults.residual_tolerance,
        defaults.max_schur_iter,
        state_init,
    )?)
}

#[cfg(feature = "python-bindings")]
fn extract_mle_opts(
    tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> PyResult<MLEOptions> {
    use std::str::FromStr;

    let defaults = MLEOptions::default().tols;
    let tols = match (tol_grad, tol_cost, max_iter) {
        (None, None, None) => defaults,
        _ => Tolerances::new(tol_grad, tol_cost, max_iter).map_err(CarmaError::from)?,
    };
    let ls = match line_searcher {
        Some(name) => LineSearcher::from_str(name).map_err(CarmaError::from)?,
        None => LineSearcher::MoreThuente,
    };
    Ok(MLEOptions::new(tols, ls, false, lbfgs_mem).map_err(CarmaError::from)?)
}

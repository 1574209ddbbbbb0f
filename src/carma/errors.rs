//! Errors for the CARMA(p, q) engine (parameter rejection, numerical
//! degeneracy, data validation, and engine-contract violations).
//!
//! This module defines the engine error type, [`CarmaError`], together with a
//! coarse classification, [`ErrorClass`], used by the likelihood contract to
//! decide whether a failure maps to the infeasible sentinel or propagates to
//! the caller. The type implements `Display`/`Error` and converts to `PyErr`
//! when the `python-bindings` feature is enabled.
//!
//! ## Conventions
//! - **Indices are 0-based** (match Rust/NumPy).
//! - Rejections and degeneracies are *recoverable*: the sampler or optimizer
//!   treats the point as having zero posterior mass.
//! - Data and contract errors are *fatal*: they signal a programming or input
//!   problem that no choice of parameters can fix.
//! - Root coordinates are reported as `(re, im)` pairs.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

use crate::optimization::errors::OptError;

/// Crate-wide result alias for CARMA operations that may produce [`CarmaError`].
pub type CarmaResult<T> = Result<T, CarmaError>;

/// Coarse classification of a [`CarmaError`].
///
/// - `Rejection`: Θ lies outside the admissible region.
/// - `Degeneracy`: Θ is admissible but the numerics are unreliable.
/// - `Data`: the observation bundle or draw buffers are malformed.
/// - `Fatal`: engine-contract violation (dimensions, lifecycle, phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Rejection,
    Degeneracy,
    Data,
    Fatal,
}

/// Unified error type for the CARMA engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CarmaError {
    // ---- Shape / options ----
    /// CARMA orders must satisfy p ≥ 1 and q < p.
    InvalidModelShape { p: usize, q: usize, reason: &'static str },

    /// A numerical threshold or option is out of range.
    InvalidOption { name: &'static str, value: f64, reason: &'static str },

    // ---- Parameter rejection ----
    /// Θ must have length p + q + 1.
    ThetaLengthMismatch { expected: usize, actual: usize },

    /// An entry of Θ is NaN/±inf.
    NonFiniteParameter { index: usize, value: f64 },

    /// Leading MA coefficient b_q is zero, so the MA order collapses.
    DegenerateMaOrder { value: f64 },

    /// An AR root has a non-negative real part.
    UnstableAr { index: usize, re: f64, im: f64 },

    /// An MA root has a non-negative real part.
    NonInvertibleMa { index: usize, re: f64, im: f64 },

    /// Two AR roots coincide within the configured tolerance.
    RepeatedArRoot { first: usize, second: usize, distance: f64 },

    /// An AR root and an MA root coincide within the configured tolerance.
    CommonRoot { ar_index: usize, ma_index: usize, distance: f64 },

    // ---- Numerical degeneracy ----
    /// Schur iteration did not converge for a companion matrix of this order.
    EigenNonConvergence { order: usize },

    /// An eigenvector failed the residual check ‖Av − λv‖.
    EigenvectorResidual { index: usize, residual: f64 },

    /// The eigenvector matrix could not be inverted.
    SingularEigenbasis,

    /// The eigenvector matrix is too ill-conditioned to trust.
    IllConditionedEigenbasis { rcond: f64, threshold: f64 },

    /// The transition matrix retained a significant imaginary residual.
    ComplexResidual { max_imag: f64, tolerance: f64 },

    /// The Kronecker-sum system is exactly singular.
    SingularKronecker,

    /// The Kronecker-sum system is too ill-conditioned to trust.
    IllConditionedKronecker { rcond: f64, threshold: f64 },

    /// Innovation variance S was non-positive or non-finite.
    InvalidInnovationVariance { index: usize, value: f64 },

    /// Filter produced a non-finite innovation or state.
    NonFiniteState { index: usize },

    /// The predicted covariance could not be inverted during smoothing.
    SingularPredictedCovariance { index: usize },

    // ---- Data validation ----
    /// Series is empty.
    EmptySeries,

    /// Companion array has the wrong length.
    SeriesLengthMismatch { name: &'static str, expected: usize, actual: usize },

    /// A required data point is NaN/±inf.
    NonFiniteData { name: &'static str, index: usize, value: f64 },

    /// Timestamps must be non-decreasing.
    UnsortedTime { index: usize, prev: f64, next: f64 },

    /// Mask entries must be exactly 0.0 or 1.0.
    InvalidMask { index: usize, value: f64 },

    /// Measurement errors must be non-negative.
    NegativeError { index: usize, value: f64 },

    /// Random-draw buffer has the wrong length.
    DrawLengthMismatch { name: &'static str, expected: usize, actual: usize },

    // ---- Engine contract ----
    /// Time step must be finite and non-negative.
    InvalidTimeStep { dt: f64 },

    /// Engine used before `allocate`.
    NotAllocated,

    /// `allocate` called on an already allocated engine.
    AlreadyAllocated,

    /// Filtering requested before a successful `set`.
    ParametersNotSet,

    /// Kalman operations called out of order.
    PhaseViolation { operation: &'static str, phase: &'static str },

    /// Context id outside the engine pool.
    InvalidContext { ctx: usize, len: usize },

    /// An engine mutex was poisoned by a panicking worker.
    EnginePoisoned { ctx: usize },

    // ---- Estimation ----
    /// Optimizer failed; include a human-readable status/reason.
    OptimizationFailed { status: String },

    /// Model hasn't been fitted yet.
    ModelNotFitted,
}

impl CarmaError {
    /// Classify the error for sentinel mapping and reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            CarmaError::NonFiniteParameter { .. }
            | CarmaError::DegenerateMaOrder { .. }
            | CarmaError::UnstableAr { .. }
            | CarmaError::NonInvertibleMa { .. }
            | CarmaError::RepeatedArRoot { .. }
            | CarmaError::CommonRoot { .. } => ErrorClass::Rejection,

            CarmaError::EigenNonConvergence { .. }
            | CarmaError::EigenvectorResidual { .. }
            | CarmaError::SingularEigenbasis
            | CarmaError::IllConditionedEigenbasis { .. }
            | CarmaError::ComplexResidual { .. }
            | CarmaError::SingularKronecker
            | CarmaError::IllConditionedKronecker { .. }
            | CarmaError::InvalidInnovationVariance { .. }
            | CarmaError::NonFiniteState { .. }
            | CarmaError::SingularPredictedCovariance { .. } => ErrorClass::Degeneracy,

            CarmaError::EmptySeries
            | CarmaError::SeriesLengthMismatch { .. }
            | CarmaError::NonFiniteData { .. }
            | CarmaError::UnsortedTime { .. }
            | CarmaError::InvalidMask { .. }
            | CarmaError::NegativeError { .. }
            | CarmaError::DrawLengthMismatch { .. } => ErrorClass::Data,

            _ => ErrorClass::Fatal,
        }
    }

    /// `true` when the failure should surface as the infeasible sentinel.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Rejection | ErrorClass::Degeneracy)
    }
}

impl std::error::Error for CarmaError {}

impl std::fmt::Display for CarmaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Shape / options ----
            CarmaError::InvalidModelShape { p, q, reason } => {
                write!(f, "Invalid CARMA order ({p}, {q}): {reason}")
            }
            CarmaError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid option '{name}' = {value}: {reason}")
            }
            // ---- Parameter rejection ----
            CarmaError::ThetaLengthMismatch { expected, actual } => {
                write!(f, "Parameter vector length mismatch: expected {expected}, got {actual}")
            }
            CarmaError::NonFiniteParameter { index, value } => {
                write!(f, "Parameter at index {index} is non-finite: {value}")
            }
            CarmaError::DegenerateMaOrder { value } => {
                write!(f, "Leading MA coefficient must be non-zero; got: {value}")
            }
            CarmaError::UnstableAr { index, re, im } => {
                write!(f, "AR root {index} = ({re}, {im}) does not have a negative real part")
            }
            CarmaError::NonInvertibleMa { index, re, im } => {
                write!(f, "MA root {index} = ({re}, {im}) does not have a negative real part")
            }
            CarmaError::RepeatedArRoot { first, second, distance } => {
                write!(f, "AR roots {first} and {second} are repeated (distance {distance:e})")
            }
            CarmaError::CommonRoot { ar_index, ma_index, distance } => {
                write!(
                    f,
                    "AR root {ar_index} and MA root {ma_index} cancel (distance {distance:e})"
                )
            }
            // ---- Numerical degeneracy ----
            CarmaError::EigenNonConvergence { order } => {
                write!(f, "Eigenvalue iteration did not converge for order {order}")
            }
            CarmaError::EigenvectorResidual { index, residual } => {
                write!(f, "Eigenvector {index} failed the residual check: {residual:e}")
            }
            CarmaError::SingularEigenbasis => {
                write!(f, "Eigenvector matrix is singular")
            }
            CarmaError::IllConditionedEigenbasis { rcond, threshold } => {
                write!(
                    f,
                    "Eigenvector matrix is ill-conditioned: rcond {rcond:e} < threshold {threshold:e}"
                )
            }
            CarmaError::ComplexResidual { max_imag, tolerance } => {
                write!(
                    f,
                    "Transition matrix has imaginary residual {max_imag:e} above tolerance {tolerance:e}"
                )
            }
            CarmaError::SingularKronecker => {
                write!(f, "Kronecker-sum system is singular")
            }
            CarmaError::IllConditionedKronecker { rcond, threshold } => {
                write!(
                    f,
                    "Kronecker-sum system is ill-conditioned: rcond {rcond:e} < threshold {threshold:e}"
                )
            }
            CarmaError::InvalidInnovationVariance { index, value } => {
                write!(f, "Innovation variance at index {index} must be finite and > 0; got: {value}")
            }
            CarmaError::NonFiniteState { index } => {
                write!(f, "Filter produced a non-finite state at index {index}")
            }
            CarmaError::SingularPredictedCovariance { index } => {
                write!(f, "Predicted covariance at index {index} is singular")
            }
            // ---- Data validation ----
            CarmaError::EmptySeries => {
                write!(f, "Input series is empty.")
            }
            CarmaError::SeriesLengthMismatch { name, expected, actual } => {
                write!(f, "Series '{name}' has length {actual}, expected {expected}")
            }
            CarmaError::NonFiniteData { name, index, value } => {
                write!(f, "Series '{name}' is non-finite at index {index}: {value}")
            }
            CarmaError::UnsortedTime { index, prev, next } => {
                write!(f, "Timestamps must be non-decreasing: t[{index}] = {next} < {prev}")
            }
            CarmaError::InvalidMask { index, value } => {
                write!(f, "Mask entry at index {index} must be 0 or 1; got: {value}")
            }
            CarmaError::NegativeError { index, value } => {
                write!(f, "Measurement error at index {index} must be >= 0; got: {value}")
            }
            CarmaError::DrawLengthMismatch { name, expected, actual } => {
                write!(f, "Draw buffer '{name}' has length {actual}, expected {expected}")
            }
            // ---- Engine contract ----
            CarmaError::InvalidTimeStep { dt } => {
                write!(f, "Time step must be finite and >= 0; got: {dt}")
            }
            CarmaError::NotAllocated => {
                write!(f, "Engine has not been allocated.")
            }
            CarmaError::AlreadyAllocated => {
                write!(f, "Engine is already allocated.")
            }
            CarmaError::ParametersNotSet => {
                write!(f, "Engine parameters have not been set.")
            }
            CarmaError::PhaseViolation { operation, phase } => {
                write!(f, "Operation '{operation}' is not allowed in phase {phase}")
            }
            CarmaError::InvalidContext { ctx, len } => {
                write!(f, "Context id {ctx} is out of range for a pool of {len} engines")
            }
            CarmaError::EnginePoisoned { ctx } => {
                write!(f, "Engine for context {ctx} was poisoned by a panicking worker")
            }
            // ---- Estimation ----
            CarmaError::OptimizationFailed { status } => {
                write!(f, "Optimizer failed with status: {status}")
            }
            CarmaError::ModelNotFitted => {
                write!(f, "Model hasn't been fitted yet.")
            }
        }
    }
}

impl From<OptError> for CarmaError {
    fn from(err: OptError) -> Self {
        CarmaError::OptimizationFailed { status: err.to_string() }
    }
}

/// Convert a [`CarmaError`] into a Python `ValueError` with the error message.
#[cfg(feature = "python-bindings")]
impl From<CarmaError> for PyErr {
    fn from(err: CarmaError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The recoverable / fatal split used by the likelihood contract.
    // - Conversion of optimizer failures into `CarmaError`.
    //
    // They intentionally DO NOT cover:
    // - Display wording beyond a smoke check.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that rejections and degeneracies are recoverable while data and
    // contract violations are not.
    //
    // Given
    // -----
    // - One representative error from each class.
    //
    // Expect
    // ------
    // - `is_recoverable` is true only for the first two.
    fn recoverable_split_matches_classes() {
        // Arrange
        let rejection = CarmaError::UnstableAr { index: 0, re: 0.0, im: 1.0 };
        let degeneracy = CarmaError::IllConditionedKronecker { rcond: 1e-20, threshold: 1e-12 };
        let data = CarmaError::EmptySeries;
        let fatal = CarmaError::ThetaLengthMismatch { expected: 3, actual: 2 };

        // Act / Assert
        assert_eq!(rejection.class(), ErrorClass::Rejection);
        assert_eq!(degeneracy.class(), ErrorClass::Degeneracy);
        assert_eq!(data.class(), ErrorClass::Data);
        assert_eq!(fatal.class(), ErrorClass::Fatal);
        assert!(rejection.is_recoverable());
        assert!(degeneracy.is_recoverable());
        assert!(!data.is_recoverable());
        assert!(!fatal.is_recoverable());
    }

    #[test]
    // Purpose
    // -------
    // Ensure optimizer errors are wrapped with their message preserved.
    //
    // Given
    // -----
    // - `OptError::NoTolerancesProvided`.
    //
    // Expect
    // ------
    // - `CarmaError::OptimizationFailed` whose status mentions tolerances.
    fn opt_error_converts_to_optimization_failed() {
        // Arrange
        let err = OptError::NoTolerancesProvided;

        // Act
        let converted = CarmaError::from(err);

        // Assert
        match converted {
            CarmaError::OptimizationFailed { status } => assert!(status.contains("tolerances")),
            other => panic!("expected OptimizationFailed, got {other:?}"),
        }
    }
}

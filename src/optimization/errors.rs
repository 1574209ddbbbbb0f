//! Error surface of the optimizer layer.
//!
//! [`OptError`] covers three sources: configuration mistakes caught when
//! options are built, bad values met during a run (costs, gradients, the
//! final θ̂), and failures raised inside argmin. Model errors cross in
//! through `From<CarmaError>` keeping their class, and an `OptError` that
//! travelled through argmin as `argmin::core::Error` comes back unchanged.
use argmin::core::{ArgminError, Error};

use crate::carma::errors::{CarmaError, ErrorClass};

pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq)]
pub enum OptError {
    // ---- Options ----
    InvalidTolGrad { tol: f64, reason: &'static str },
    InvalidTolCost { tol: f64, reason: &'static str },
    InvalidMaxIter { max_iter: usize, reason: &'static str },
    NoTolerancesProvided,
    InvalidLineSearch { name: String, reason: &'static str },
    InvalidLBFGSMem { mem: usize, reason: &'static str },

    // ---- Values met during a run ----
    /// The model has no analytic gradient; the adapter switches to finite
    /// differences.
    GradientNotImplemented,
    GradientDimMismatch { expected: usize, found: usize },
    InvalidGradient { index: usize, value: f64, reason: &'static str },
    NonFiniteCost { value: f64 },
    MissingThetaHat,
    InvalidThetaHat { index: usize, value: f64, reason: &'static str },

    // ---- Model ----
    /// Θ outside the admissible region.
    ParameterRejected { text: String },
    /// Θ admissible but the engine's numerics broke down.
    NumericalDegeneracy { text: String },
    /// Data or contract error; no θ can fix it.
    InvalidModelInput { text: String },
    ThetaLengthMismatch { expected: usize, actual: usize },
    InvalidThetaInput { index: usize, value: f64 },

    // ---- argmin ----
    /// An `ArgminError`; `kind` names its variant.
    Solver { kind: &'static str, text: String },
    /// Any other error surfaced by argmin.
    BackendError { text: String },
}

impl std::error::Error for OptError {}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptError::InvalidTolGrad { tol, reason } => {
                write!(f, "Invalid gradient tolerance {tol}: {reason}")
            }
            OptError::InvalidTolCost { tol, reason } => {
                write!(f, "Invalid cost change tolerance {tol}: {reason}")
            }
            OptError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "Invalid maximum iterations {max_iter}: {reason}")
            }
            OptError::NoTolerancesProvided => {
                write!(f, "No tolerances provided: set tol_grad, tol_cost or max_iter")
            }
            OptError::InvalidLineSearch { name, reason } => {
                write!(f, "Unknown line search '{name}': {reason}")
            }
            OptError::InvalidLBFGSMem { mem, reason } => {
                write!(f, "Invalid L-BFGS memory {mem}: {reason}")
            }
            OptError::GradientNotImplemented => write!(f, "No analytic gradient"),
            OptError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient has {found} entries, expected {expected}")
            }
            OptError::InvalidGradient { index, value, reason } => {
                write!(f, "Gradient entry {index} = {value}: {reason}")
            }
            OptError::NonFiniteCost { value } => write!(f, "Non-finite cost {value}"),
            OptError::MissingThetaHat => write!(f, "The solver kept no best parameter vector"),
            OptError::InvalidThetaHat { index, value, reason } => {
                write!(f, "Estimate entry {index} = {value}: {reason}")
            }
            OptError::ParameterRejected { text } => write!(f, "Parameters rejected: {text}"),
            OptError::NumericalDegeneracy { text } => write!(f, "Numerical degeneracy: {text}"),
            OptError::InvalidModelInput { text } => write!(f, "Invalid model input: {text}"),
            OptError::ThetaLengthMismatch { expected, actual } => {
                write!(f, "Theta has {actual} entries, expected {expected}")
            }
            OptError::InvalidThetaInput { index, value } => {
                write!(f, "Theta entry {index} = {value} is not finite")
            }
            OptError::Solver { kind, text } => write!(f, "argmin {kind}: {text}"),
            OptError::BackendError { text } => write!(f, "Backend error: {text}"),
        }
    }
}

impl From<Error> for OptError {
    fn from(err: Error) -> Self {
        let err = match err.downcast::<OptError>() {
            Ok(opt) => return opt,
            Err(err) => err,
        };
        match err.downcast::<ArgminError>() {
            Ok(argmin) => {
                let (kind, text) = match argmin {
                    ArgminError::InvalidParameter { text } => ("invalid parameter", text),
                    ArgminError::NotImplemented { text } => ("not implemented", text),
                    ArgminError::NotInitialized { text } => ("not initialized", text),
                    ArgminError::ConditionViolated { text } => ("condition violated", text),
                    ArgminError::CheckpointNotFound { text } => ("checkpoint not found", text),
                    ArgminError::PotentialBug { text } => ("potential bug", text),
                    ArgminError::ImpossibleError { text } => ("impossible error", text),
                    other => ("error", other.to_string()),
                };
                OptError::Solver { kind, text }
            }
            Err(err) => OptError::BackendError { text: err.to_string() },
        }
    }
}

impl From<CarmaError> for OptError {
    fn from(err: CarmaError) -> Self {
        if let CarmaError::ThetaLengthMismatch { expected, actual } = err {
            return OptError::ThetaLengthMismatch { expected, actual };
        }
        let text = err.to_string();
        match err.class() {
            ErrorClass::Rejection => OptError::ParameterRejected { text },
            ErrorClass::Degeneracy => OptError::NumericalDegeneracy { text },
            ErrorClass::Data | ErrorClass::Fatal => OptError::InvalidModelInput { text },
        }
    }
}

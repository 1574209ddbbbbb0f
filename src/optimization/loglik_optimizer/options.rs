//! Optimizer configuration for CARMA fits.
//!
//! [`MLEOptions`] bundles the stopping rules ([`Tolerances`]), the line search
//! used inside L-BFGS ([`LineSearcher`]), the history size and the verbose
//! switch. Both structs validate on construction, so the solver layer never
//! re-checks them.
//!
//! Defaults: `tol_grad = 1e-6`, no cost tolerance, at most 300 iterations,
//! More–Thuente, memory [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM).
use std::str::FromStr;

use crate::optimization::errors::{OptError, OptResult};

/// Stopping rules; at least one must be set.
///
/// - `tol_grad`: stop once the cost gradient norm falls below it.
/// - `tol_cost`: stop once the change in cost falls below it.
/// - `max_iter`: hard iteration cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] when all three are `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for a
    ///   tolerance that is not finite and strictly positive.
    /// - [`OptError::InvalidMaxIter`] for `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        if let Some(tol) = tol_grad {
            positive_tolerance(tol).map_err(|reason| OptError::InvalidTolGrad { tol, reason })?;
        }
        if let Some(tol) = tol_cost {
            positive_tolerance(tol).map_err(|reason| OptError::InvalidTolCost { tol, reason })?;
        }
        if max_iter == Some(0) {
            return Err(OptError::InvalidMaxIter {
                max_iter: 0,
                reason: "Maximum iterations must be greater than zero.",
            });
        }
        Ok(Tolerances { tol_grad, tol_cost, max_iter })
    }
}

/// Line search run inside each L-BFGS iteration.
///
/// Parses case-insensitively from `"MoreThuente"` or `"HagerZhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("morethuente") {
            Ok(LineSearcher::MoreThuente)
        } else if s.eq_ignore_ascii_case("hagerzhang") {
            Ok(LineSearcher::HagerZhang)
        } else {
            Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            })
        }
    }
}

/// Everything [`maximize`](super::maximize) needs besides the model.
///
/// `verbose` only has an effect with the `obs_slog` feature, where it prints
/// the starting log-likelihood and attaches a terminal observer.
/// `lbfgs_mem = None` uses [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM).
#[derive(Debug, Clone, PartialEq)]
pub struct MLEOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl MLEOptions {
    /// # Errors
    /// - [`OptError::InvalidLBFGSMem`] for `lbfgs_mem == Some(0)`.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if lbfgs_mem == Some(0) {
            return Err(OptError::InvalidLBFGSMem {
                mem: 0,
                reason: "L-BFGS memory must be greater than zero.",
            });
        }
        Ok(MLEOptions { tols, line_searcher, verbose, lbfgs_mem })
    }
}

impl Default for MLEOptions {
    fn default() -> Self {
        MLEOptions {
            tols: Tolerances { tol_grad: Some(1e-6), tol_cost: None, max_iter: Some(300) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

// ---- Helper Methods ----

fn positive_tolerance(tol: f64) -> Result<(), &'static str> {
    if !tol.is_finite() {
        Err("Tolerance must be finite.")
    } else if tol <= 0.0 {
        Err("Tolerance must be positive.")
    } else {
        Ok(())
    }
}

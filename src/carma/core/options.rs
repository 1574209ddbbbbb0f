//! CARMA options — numerical thresholds, state initialization, and fitting
//! configuration.
//!
//! Purpose
//! -------
//! Collect every tunable threshold of the CARMA engine in one validated
//! struct so that rejection policy is explicit and reproducible, and bundle
//! it with the optimizer configuration used when fitting by maximum
//! likelihood.
//!
//! Key behaviors
//! -------------
//! - [`EngineOptions`] carries the stability margin, the root-separation
//!   tolerance, the reciprocal-condition floors for the eigenbasis and the Kronecker-sum
//!   system, the imaginary-residual tolerance of the discretizer, the
//!   eigenvector residual tolerance, the Schur iteration cap, and the state
//!   initialization policy.
//! - [`StateInit`] selects between the stationary prior (P₀ = Σ) and a
//!   diffuse prior (P₀ = u·I).
//! - [`CarmaOptions`] pairs engine options with [`MLEOptions`] for
//!   `CarmaModel::fit`.
//!
//! Invariants & assumptions
//! ------------------------
//! - All tolerances are finite and strictly positive; condition floors are
//!   additionally below 1.
//! - A diffuse uncertainty `u` is finite and strictly positive.
//!
//! Conventions
//! -----------
//! - A root λ is stable when `Re λ < −stability_margin · max(1, |λ|)`, so a
//!   root the eigenvalue solver places a rounding error left of the
//!   imaginary axis still counts as the boundary.
//! - Root separation is relative: two roots λ, μ coincide when
//!   `|λ − μ| ≤ root_tolerance · max(1, |λ|)`.
//! - The imaginary residual is relative to `max(1, max |Re F|)`.
//! - The eigenvector residual is relative to `‖A‖₁ + |λ|`.
//!
//! Downstream usage
//! ----------------
//! - Build `EngineOptions::default()` for the documented defaults, or
//!   [`EngineOptions::new`] when a sampler needs stricter or looser
//!   rejection.
//!
//! Testing notes
//! -------------
//! - Unit tests verify defaults, rejection of invalid thresholds, and the
//!   diffuse-prior constructor.
use crate::{
    carma::errors::{CarmaError, CarmaResult},
    optimization::loglik_optimizer::MLEOptions,
};

/// Default relative distance a root must keep from the imaginary axis.
///
/// The balanced Schur solve returns an axis root with |Re| of order
/// ε·‖A‖, far below this margin.
pub const DEFAULT_STABILITY_MARGIN: f64 = 1e-9;

/// Default relative tolerance below which two roots count as repeated.
///
/// The eigenvalue solver resolves a double root only to about √ε, so the
/// tolerance sits well above that.
pub const DEFAULT_ROOT_TOLERANCE: f64 = 1e-6;

/// Default floor on the reciprocal condition number of the eigenvector matrix.
pub const DEFAULT_EIGEN_RCOND_MIN: f64 = 1e-12;

/// Default floor on the reciprocal condition number of the Kronecker-sum system.
pub const DEFAULT_KRON_RCOND_MIN: f64 = 1e-12;

/// Default relative tolerance on the imaginary residual of F(Δt).
pub const DEFAULT_IMAG_TOLERANCE: f64 = 1e-6;

/// Default relative tolerance on eigenvector residuals ‖Av − λv‖.
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Default cap on Schur sweeps when computing eigenvalues.
pub const DEFAULT_MAX_SCHUR_ITER: usize = 10_000;

/// Prior used by `reset_state`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateInit {
    /// X₀ = 0, P₀ = Σ (stationary covariance).
    Stationary,
    /// X₀ = 0, P₀ = u·I.
    Diffuse(f64),
}

impl StateInit {
    /// Diffuse prior with uncertainty `u`.
    ///
    /// # Errors
    /// - [`CarmaError::InvalidOption`] if `u` is non-finite or ≤ 0.
    pub fn diffuse(u: f64) -> CarmaResult<Self> {
        if !u.is_finite() || u <= 0.0 {
            return Err(CarmaError::InvalidOption {
                name: "init_uncertainty",
                value: u,
                reason: "Initial uncertainty must be finite and > 0.",
            });
        }
        Ok(StateInit::Diffuse(u))
    }
}

/// EngineOptions — numerical thresholds for the CARMA engine.
///
/// Fields
/// ------
/// - `stability_margin`: relative distance from the imaginary axis below which
///   an AR or MA root is rejected.
/// - `root_tolerance`: relative separation below which roots are repeated.
/// - `eigen_rcond_min`: floor on `rcond(V)`; below it the point is rejected.
/// - `kron_rcond_min`: floor on `rcond(I⊗A + A⊗I)`; below it the point is
///   rejected.
/// - `imag_tolerance`: allowed imaginary residual in F(Δt).
/// - `residual_tolerance`: allowed eigenvector residual.
/// - `max_schur_iter`: Schur sweep cap (0 means unbounded).
/// - `state_init`: prior used on reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub stability_margin: f64,
    pub root_tolerance: f64,
    pub eigen_rcond_min: f64,
    pub kron_rcond_min: f64,
    pub imag_tolerance: f64,
    pub residual_tolerance: f64,
    pub max_schur_iter: usize,
    pub state_init: StateInit,
}

impl EngineOptions {
    /// Construct validated engine options.
    ///
    /// Parameters
    /// ----------
    /// - `stability_margin`, `root_tolerance`, `imag_tolerance`,
    ///   `residual_tolerance`: `f64`
    ///   Finite and > 0.
    /// - `eigen_rcond_min`, `kron_rcond_min`: `f64`
    ///   Finite, > 0 and < 1.
    /// - `max_schur_iter`: `usize`
    ///   Schur sweep cap; 0 lets the iteration run until convergence.
    /// - `state_init`: [`StateInit`]
    ///
    /// Errors
    /// ------
    /// - [`CarmaError::InvalidOption`] naming the first offending field.
    pub fn new(
        stability_margin: f64, root_tolerance: f64, eigen_rcond_min: f64, kron_rcond_min: f64,
        imag_tolerance: f64, residual_tolerance: f64, max_schur_iter: usize, state_init: StateInit,
    ) -> CarmaResult<Self> {
        verify_positive("stability_margin", stability_margin)?;
        verify_positive("root_tolerance", root_tolerance)?;
        verify_rcond("eigen_rcond_min", eigen_rcond_min)?;
        verify_rcond("kron_rcond_min", kron_rcond_min)?;
        verify_positive("imag_tolerance", imag_tolerance)?;
        verify_positive("residual_tolerance", residual_tolerance)?;
        if let StateInit::Diffuse(u) = state_init {
            StateInit::diffuse(u)?;
        }
        Ok(Self {
            stability_margin,
            root_tolerance,
            eigen_rcond_min,
            kron_rcond_min,
            imag_tolerance,
            residual_tolerance,
            max_schur_iter,
            state_init,
        })
    }

    /// Replace the state initialization policy.
    pub fn with_state_init(mut self, state_init: StateInit) -> Self {
        self.state_init = state_init;
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stability_margin: DEFAULT_STABILITY_MARGIN,
            root_tolerance: DEFAULT_ROOT_TOLERANCE,
            eigen_rcond_min: DEFAULT_EIGEN_RCOND_MIN,
            kron_rcond_min: DEFAULT_KRON_RCOND_MIN,
            imag_tolerance: DEFAULT_IMAG_TOLERANCE,
            residual_tolerance: DEFAULT_RESIDUAL_TOLERANCE,
            max_schur_iter: DEFAULT_MAX_SCHUR_ITER,
            state_init: StateInit::Stationary,
        }
    }
}

/// CarmaOptions — estimation-time configuration for CARMA models.
///
/// Bundles the engine thresholds with the maximum-likelihood optimizer
/// options. Both components are validated by their own constructors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CarmaOptions {
    /// Engine thresholds and state prior.
    pub engine: EngineOptions,
    /// Maximum-likelihood optimizer options (L-BFGS + line search).
    pub mle_opts: MLEOptions,
}

impl CarmaOptions {
    pub fn new(engine: EngineOptions, mle_opts: MLEOptions) -> CarmaOptions {
        CarmaOptions { engine, mle_opts }
    }
}

// ---- Helper Methods ----

fn verify_positive(name: &'static str, value: f64) -> CarmaResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CarmaError::InvalidOption {
            name,
            value,
            reason: "Tolerance must be finite and > 0.",
        });
    }
    Ok(())
}

fn verify_rcond(name: &'static str, value: f64) -> CarmaResult<()> {
    verify_positive(name, value)?;
    if value >= 1.0 {
        return Err(CarmaError::InvalidOption {
            name,
            value,
            reason: "Reciprocal condition floor must be < 1.",
        });
    }
    Ok(())
}

//! CarmaSystem — one CARMA(p, q) engine instance: lifecycle, parameter
//! installation, and single Kalman steps.
//!
//! Purpose
//! -------
//! Own a [`CarmaWorkspace`] and drive it through the engine lifecycle:
//! allocate → set(Θ) → reset → (predict, update)* → smooth, with explicit
//! phase tracking so out-of-order calls fail instead of producing silently
//! wrong likelihoods.
//!
//! Key behaviors
//! -------------
//! - [`CarmaSystem::set`] validates Θ, rebuilds every parameter-derived
//!   buffer, and leaves the filter uninitialized; on failure the engine
//!   forgets its parameters.
//! - [`CarmaSystem::reset_state`] installs the prior (stationary Σ or
//!   `u · I`).
//! - [`CarmaSystem::predict`] / [`CarmaSystem::update`] implement one Kalman
//!   step for a scalar observation through `H = e₁`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `update` is accepted only from `Reset` or right after `predict`;
//!   `predict` only from `Reset` or right after `update`.
//! - P and PMinus are symmetrized after every step.
//! - A masked update copies the prediction and contributes nothing.
//!
//! Conventions
//! -----------
//! - Matrices are returned to callers as `ndarray` copies; internal buffers
//!   never escape.
//! - The engine is `Send` but not shared: concurrent use goes through one
//!   engine per context (see `models::pool`).
use nalgebra::Complex;
use ndarray::{Array1, Array2};

use crate::{
    carma::{
        core::{
            noise::SolveDiagnostics,
            options::{EngineOptions, StateInit},
            shape::CarmaShape,
            spectral::SpectralDecomposition,
            validation::{RootSet, check_params},
            workspace::CarmaWorkspace,
        },
        errors::{CarmaError, CarmaResult},
    },
    linalg::{dmatrix_to_array2, dvector_to_array1, symmetrize},
};

/// Position of the engine in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    /// No prior installed since allocation or the last `set`.
    Uninitialized,
    /// Prior installed; the next step may be an update or a predict.
    Reset,
    /// Inside a forward pass.
    Filtering { awaiting_update: bool },
    /// A smoothing pass finished; reset before filtering again.
    Smoothed,
}

impl FilterPhase {
    pub fn name(&self) -> &'static str {
        match self {
            FilterPhase::Uninitialized => "Uninitialized",
            FilterPhase::Reset => "Reset",
            FilterPhase::Filtering { awaiting_update: true } => "Filtering(predicted)",
            FilterPhase::Filtering { awaiting_update: false } => "Filtering(updated)",
            FilterPhase::Smoothed => "Smoothed",
        }
    }
}

/// Result of one Kalman update.
///
/// For a masked point `innovation` and `variance` are NaN and
/// `contribution` is 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Innovation {
    /// v = y − H XMinus.
    pub innovation: f64,
    /// S = H PMinus Hᵀ + yerr².
    pub variance: f64,
    /// −0.5 ln S − 0.5 v² / S, without the 2π term.
    pub contribution: f64,
}

impl Innovation {
    pub fn masked() -> Innovation {
        Innovation { innovation: f64::NAN, variance: f64::NAN, contribution: 0.0 }
    }

    /// v / √S (NaN when masked).
    pub fn standardized(&self) -> f64 {
        self.innovation / self.variance.sqrt()
    }
}

/// CarmaSystem — a single CARMA(p, q) state-space engine.
#[derive(Debug, Clone)]
pub struct CarmaSystem {
    shape: CarmaShape,
    options: EngineOptions,
    workspace: Option<CarmaWorkspace>,
    theta: Option<Vec<f64>>,
    roots: RootSet,
    phase: FilterPhase,
    t: f64,
}

impl CarmaSystem {
    /// Unallocated engine for `shape`.
    pub fn new(shape: CarmaShape, options: EngineOptions) -> CarmaSystem {
        CarmaSystem {
            shape,
            options,
            workspace: None,
            theta: None,
            roots: RootSet::default(),
            phase: FilterPhase::Uninitialized,
            t: 0.0,
        }
    }

    /// Engine with its buffers already allocated.
    pub fn allocated(shape: CarmaShape, options: EngineOptions) -> CarmaSystem {
        let mut system = CarmaSystem::new(shape, options);
        system.workspace = Some(CarmaWorkspace::new(&shape));
        system
    }

    /// Allocate scratch buffers for (p, q).
    ///
    /// # Errors
    /// - [`CarmaError::AlreadyAllocated`] if called twice.
    pub fn allocate(&mut self) -> CarmaResult<()> {
        if self.workspace.is_some() {
            return Err(CarmaError::AlreadyAllocated);
        }
        self.workspace = Some(CarmaWorkspace::new(&self.shape));
        Ok(())
    }

    /// Release scratch buffers and forget parameters.
    ///
    /// # Errors
    /// - [`CarmaError::NotAllocated`] if nothing is allocated.
    pub fn deallocate(&mut self) -> CarmaResult<()> {
        if self.workspace.take().is_none() {
            return Err(CarmaError::NotAllocated);
        }
        self.theta = None;
        self.roots = RootSet::default();
        self.phase = FilterPhase::Uninitialized;
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.workspace.is_some()
    }

    /// Run the validator on Θ without touching engine state.
    pub fn check(&self, theta: &[f64]) -> CarmaResult<RootSet> {
        check_params(theta, &self.shape, &self.options)
    }

    /// Install Θ: validate, build A/B/H, decompose, and solve for Σ.
    ///
    /// Parameters
    /// ----------
    /// - `theta`: `&[f64]`
    ///   Model-space vector `[a₁..a_p, b₀..b_q]`.
    ///
    /// Errors
    /// ------
    /// - `NotAllocated` before `allocate`.
    /// - `ThetaLengthMismatch` (fatal) for a wrong length.
    /// - Any rejection or degeneracy; the engine is then left without
    ///   parameters and must be `set` again before filtering.
    pub fn set(&mut self, theta: &[f64]) -> CarmaResult<()> {
        let workspace = self.workspace.as_mut().ok_or(CarmaError::NotAllocated)?;
        self.theta = None;
        self.phase = FilterPhase::Uninitialized;
        let roots = check_params(theta, &self.shape, &self.options)?;
        workspace.refresh(theta, &self.shape, &roots.ar, &self.options)?;
        self.roots = roots;
        self.theta = Some(theta.to_vec());
        Ok(())
    }

    /// Install the prior: X = 0 and P = Σ or `u · I`.
    ///
    /// # Errors
    /// - `NotAllocated`, `ParametersNotSet`.
    pub fn reset_state(&mut self) -> CarmaResult<()> {
        let state_init = self.options.state_init;
        let ws = self.ready_workspace_mut()?;
        ws.x.fill(0.0);
        match state_init {
            StateInit::Stationary => ws.p.copy_from(&ws.sigma),
            StateInit::Diffuse(u) => {
                ws.p.fill_with_identity();
                ws.p *= u;
            }
        }
        ws.x_minus.copy_from(&ws.x);
        ws.p_minus.copy_from(&ws.p);
        self.phase = FilterPhase::Reset;
        self.t = 0.0;
        Ok(())
    }

    /// Time of the last processed observation.
    pub fn get_t(&self) -> f64 {
        self.t
    }

    /// Record the time of the current observation.
    pub fn set_t(&mut self, t: f64) {
        self.t = t;
    }

    /// Propagate the state over Δt: XMinus = F X, PMinus = F P Fᵀ + Q.
    ///
    /// # Errors
    /// - `PhaseViolation` unless the engine is freshly reset or has just
    ///   completed an update.
    /// - `InvalidTimeStep`, `ComplexResidual` from the discretizer.
    pub fn predict(&mut self, dt: f64) -> CarmaResult<()> {
        match self.phase {
            FilterPhase::Reset | FilterPhase::Filtering { awaiting_update: false } => {}
            phase => {
                return Err(CarmaError::PhaseViolation { operation: "predict", phase: phase.name() });
            }
        }
        let options = self.options;
        let ws = self.ready_workspace_mut()?;
        ws.discretize(dt, &options)?;

        ws.x_minus.gemv(1.0, &ws.f, &ws.x, 0.0);
        let fp = &ws.f * &ws.p;
        ws.p_minus.copy_from(&ws.q);
        ws.p_minus.gemm(1.0, &fp, &ws.f.transpose(), 1.0);
        symmetrize(&mut ws.p_minus);

        self.phase = FilterPhase::Filtering { awaiting_update: true };
        Ok(())
    }

    /// Condition on observation `y` with measurement error `yerr`.
    ///
    /// Parameters
    /// ----------
    /// - `y`, `yerr`: `f64`
    ///   Observation and its standard deviation; ignored when masked.
    /// - `observed`: `bool`
    ///   `false` skips the update and copies the prediction.
    /// - `index`: `usize`
    ///   Position in the series, used for error reporting.
    ///
    /// Errors
    /// ------
    /// - `PhaseViolation` unless the engine is freshly reset or has just
    ///   predicted.
    /// - `InvalidInnovationVariance` when S ≤ 0 or non-finite.
    /// - `NonFiniteState` when the innovation is non-finite.
    pub fn update(
        &mut self, y: f64, yerr: f64, observed: bool, index: usize,
    ) -> CarmaResult<Innovation> {
        match self.phase {
            FilterPhase::Reset | FilterPhase::Filtering { awaiting_update: true } => {}
            phase => {
                return Err(CarmaError::PhaseViolation { operation: "update", phase: phase.name() });
            }
        }
        let ws = self.ready_workspace_mut()?;

        if !observed {
            ws.x.copy_from(&ws.x_minus);
            ws.p.copy_from(&ws.p_minus);
            self.phase = FilterPhase::Filtering { awaiting_update: false };
            return Ok(Innovation::masked());
        }

        let v = y - ws.x_minus[0];
        let s = ws.p_minus[(0, 0)] + yerr * yerr;
        if !s.is_finite() || s <= 0.0 {
            return Err(CarmaError::InvalidInnovationVariance { index, value: s });
        }
        if !v.is_finite() {
            return Err(CarmaError::NonFiniteState { index });
        }

        let gain = ws.p_minus.column(0) / s;
        ws.x.copy_from(&ws.x_minus);
        ws.x.axpy(v, &gain, 1.0);
        ws.p.copy_from(&ws.p_minus);
        let top_row = ws.p_minus.row(0).clone_owned();
        ws.p.ger(-1.0, &gain, &top_row.transpose(), 1.0);
        symmetrize(&mut ws.p);

        self.phase = FilterPhase::Filtering { awaiting_update: false };
        Ok(Innovation { innovation: v, variance: s, contribution: -0.5 * s.ln() - 0.5 * v * v / s })
    }

    // ---- Getters ----

    pub fn shape(&self) -> &CarmaShape {
        &self.shape
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    /// Installed Θ, if any.
    pub fn theta(&self) -> Option<&[f64]> {
        self.theta.as_deref()
    }

    /// Roots of a(z) for the installed Θ.
    pub fn ar_roots(&self) -> CarmaResult<&[Complex<f64>]> {
        self.ready_workspace()?;
        Ok(&self.roots.ar)
    }

    /// Roots of b(z) for the installed Θ.
    pub fn ma_roots(&self) -> CarmaResult<&[Complex<f64>]> {
        self.ready_workspace()?;
        Ok(&self.roots.ma)
    }

    /// Filtered mean X and covariance P.
    pub fn state(&self) -> CarmaResult<(Array1<f64>, Array2<f64>)> {
        let ws = self.ready_workspace()?;
        Ok((dvector_to_array1(&ws.x), dmatrix_to_array2(&ws.p)))
    }

    /// Predicted mean XMinus and covariance PMinus.
    pub fn prediction(&self) -> CarmaResult<(Array1<f64>, Array2<f64>)> {
        let ws = self.ready_workspace()?;
        Ok((dvector_to_array1(&ws.x_minus), dmatrix_to_array2(&ws.p_minus)))
    }

    /// Stationary covariance Σ from the Kronecker solve.
    pub fn stationary_covariance(&self) -> CarmaResult<Array2<f64>> {
        Ok(dmatrix_to_array2(&self.ready_workspace()?.sigma))
    }

    /// F(Δt) and Q(Δt); refreshes the cache.
    pub fn transition(&mut self, dt: f64) -> CarmaResult<(Array2<f64>, Array2<f64>)> {
        let options = self.options;
        let ws = self.ready_workspace_mut()?;
        ws.discretize(dt, &options)?;
        Ok((dmatrix_to_array2(&ws.f), dmatrix_to_array2(&ws.q)))
    }

    /// Eigendecomposition and diagnostics of A.
    pub fn spectral(&self) -> CarmaResult<&SpectralDecomposition> {
        Ok(&self.ready_workspace()?.spectral)
    }

    /// Diagnostics of the Kronecker-sum solve.
    pub fn kron_diagnostics(&self) -> CarmaResult<SolveDiagnostics> {
        Ok(self.ready_workspace()?.kron_diagnostics)
    }

    // ---- Crate-internal access ----

    pub(crate) fn set_phase(&mut self, phase: FilterPhase) {
        self.phase = phase;
    }

    pub(crate) fn ready_workspace(&self) -> CarmaResult<&CarmaWorkspace> {
        let ws = self.workspace.as_ref().ok_or(CarmaError::NotAllocated)?;
        if self.theta.is_none() {
            return Err(CarmaError::ParametersNotSet);
        }
        Ok(ws)
    }

    pub(crate) fn ready_workspace_mut(&mut self) -> CarmaResult<&mut CarmaWorkspace> {
        let ws = self.workspace.as_mut().ok_or(CarmaError::NotAllocated)?;
        if self.theta.is_none() {
            return Err(CarmaError::ParametersNotSet);
        }
        Ok(ws)
    }
}

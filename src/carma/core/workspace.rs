//! CARMA workspace — per-engine buffers for system matrices, spectral data,
//! F/Q cache, and Kalman state.
//!
//! Purpose
//! -------
//! Own every matrix an engine instance mutates so that instances on
//! different threads share nothing. Buffers are sized once for (p, q) at
//! allocation and reused across parameter proposals.
//!
//! Key behaviors
//! -------------
//! - [`CarmaWorkspace::refresh`] rebuilds A, B, H, the eigendecomposition,
//!   and Σ for a new admissible Θ, overwriting every parameter-derived
//!   buffer and invalidating the F/Q cache.
//! - [`CarmaWorkspace::discretize`] refreshes F and Q for a step Δt only when
//!   Δt differs (bitwise) from the cached step.
//!
//! Invariants & assumptions
//! ------------------------
//! - `cached_dt` is `Some(dt)` only when `f` and `q` hold F(dt) and Q(dt)
//!   for the current parameters.
//! - After a failed `refresh` the parameter-derived buffers are partially
//!   written; the owning engine marks its parameters as unset.
//!
//! Conventions
//! -----------
//! - The workspace performs no validation of Θ; callers run the validator
//!   first and pass the resulting poles.
use nalgebra::{Complex, DMatrix, DVector};

use crate::carma::{
    core::{
        discretize::{DiscretizeScratch, transition_matrix_into},
        noise::{SolveDiagnostics, process_noise_into, stationary_covariance},
        options::EngineOptions,
        shape::CarmaShape,
        spectral::SpectralDecomposition,
        system::{ContinuousSystem, build_system},
    },
    errors::CarmaResult,
};

/// CarmaWorkspace — every buffer one engine instance owns.
///
/// Fields
/// ------
/// - `system`: A, B, H, BBᵀ.
/// - `spectral`: eigendecomposition and diagnostics.
/// - `sigma`, `kron_diagnostics`: stationary covariance and its solve report.
/// - `f`, `q`, `cached_dt`: transition/noise cache.
/// - `x`, `p`, `x_minus`, `p_minus`: Kalman state.
#[derive(Debug, Clone, PartialEq)]
pub struct CarmaWorkspace {
    pub system: ContinuousSystem,
    pub spectral: SpectralDecomposition,
    pub sigma: DMatrix<f64>,
    pub kron_diagnostics: SolveDiagnostics,
    pub f: DMatrix<f64>,
    pub q: DMatrix<f64>,
    pub cached_dt: Option<f64>,
    pub x: DVector<f64>,
    pub p: DMatrix<f64>,
    pub x_minus: DVector<f64>,
    pub p_minus: DMatrix<f64>,
    scratch: DiscretizeScratch,
}

impl CarmaWorkspace {
    /// Zeroed buffers for `shape`.
    pub fn new(shape: &CarmaShape) -> CarmaWorkspace {
        let p = shape.p;
        CarmaWorkspace {
            system: ContinuousSystem::new(p),
            spectral: SpectralDecomposition::new(p),
            sigma: DMatrix::zeros(p, p),
            kron_diagnostics: SolveDiagnostics::default(),
            f: DMatrix::identity(p, p),
            q: DMatrix::zeros(p, p),
            cached_dt: None,
            x: DVector::zeros(p),
            p: DMatrix::zeros(p, p),
            x_minus: DVector::zeros(p),
            p_minus: DMatrix::zeros(p, p),
            scratch: DiscretizeScratch::new(p),
        }
    }

    pub fn dim(&self) -> usize {
        self.system.dim()
    }

    /// Overwrite all parameter-derived buffers for Θ.
    ///
    /// # Errors
    /// - Dimension errors from the builder.
    /// - Degeneracies from the spectral engine and the Kronecker solve.
    pub fn refresh(
        &mut self, theta: &[f64], shape: &CarmaShape, poles: &[Complex<f64>],
        opts: &EngineOptions,
    ) -> CarmaResult<()> {
        self.cached_dt = None;
        build_system(theta, shape, &mut self.system)?;
        self.spectral.update(&self.system.a, &theta[..shape.p], poles, opts)?;
        let (sigma, diagnostics) = stationary_covariance(&self.system.a, &self.system.bbt, opts)?;
        self.sigma = sigma;
        self.kron_diagnostics = diagnostics;
        Ok(())
    }

    /// Make `f` and `q` hold F(Δt) and Q(Δt).
    ///
    /// # Errors
    /// - `InvalidTimeStep` or `ComplexResidual` from the discretizer.
    pub fn discretize(&mut self, dt: f64, opts: &EngineOptions) -> CarmaResult<()> {
        if self.cached_dt.map(f64::to_bits) == Some(dt.to_bits()) {
            return Ok(());
        }
        self.cached_dt = None;
        transition_matrix_into(&self.spectral, dt, opts, &mut self.scratch, &mut self.f)?;
        process_noise_into(&self.sigma, &self.f, &mut self.q);
        self.cached_dt = Some(dt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carma::core::validation::check_params;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Cache hits and misses in `discretize`.
    // - Cache invariance: cached F/Q equal freshly computed ones bitwise.
    // - Cache invalidation on `refresh`.
    // -------------------------------------------------------------------------

    fn refreshed(theta: &[f64], shape: &CarmaShape) -> CarmaWorkspace {
        let opts = EngineOptions::default();
        let roots = check_params(theta, shape, &opts).unwrap();
        let mut ws = CarmaWorkspace::new(shape);
        ws.refresh(theta, shape, &roots.ar, &opts).unwrap();
        ws
    }

    #[test]
    // Purpose
    // -------
    // Verify that the cache does not change results.
    //
    // Given
    // -----
    // - CARMA(2, 1); steps 0.5 → 1.0 → 0.5 on one workspace, and 0.5 on a
    //   fresh workspace.
    //
    // Expect
    // ------
    // - F and Q after the round trip are bitwise equal to the fresh ones.
    fn cache_is_result_invariant() {
        // Arrange
        let shape = CarmaShape::new(2, 1).unwrap();
        let theta = [1.0, 1.25, 1.0, 0.5];
        let opts = EngineOptions::default();
        let mut ws = refreshed(&theta, &shape);
        let mut fresh = refreshed(&theta, &shape);

        // Act
        ws.discretize(0.5, &opts).unwrap();
        ws.discretize(1.0, &opts).unwrap();
        ws.discretize(0.5, &opts).unwrap();
        fresh.discretize(0.5, &opts).unwrap();

        // Assert
        assert_eq!(ws.cached_dt, Some(0.5));
        assert_eq!(ws.f, fresh.f);
        assert_eq!(ws.q, fresh.q);
    }

    #[test]
    // Purpose
    // -------
    // Ensure `refresh` invalidates the cache.
    //
    // Given
    // -----
    // - A workspace discretized at Δt = 1 and then refreshed with new Θ.
    //
    // Expect
    // ------
    // - `cached_dt` is `None` and the next `discretize(1.0)` yields a new F.
    fn refresh_invalidates_cache() {
        // Arrange
        let shape = CarmaShape::new(2, 0).unwrap();
        let opts = EngineOptions::default();
        let mut ws = refreshed(&[3.0, 2.0, 1.0], &shape);
        ws.discretize(1.0, &opts).unwrap();
        let old_f = ws.f.clone();
        let theta = [1.0, 1.25, 1.0];
        let roots = check_params(&theta, &shape, &opts).unwrap();

        // Act
        ws.refresh(&theta, &shape, &roots.ar, &opts).unwrap();
        let cleared = ws.cached_dt;
        ws.discretize(1.0, &opts).unwrap();

        // Assert
        assert_eq!(cleared, None);
        assert_ne!(ws.f, old_f);
    }
}

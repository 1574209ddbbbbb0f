//! Simulation facility — burn-in and synthetic observations driven by
//! caller-supplied standard normal draws.
//!
//! Purpose
//! -------
//! Generate series from the installed CARMA process without the engine ever
//! owning randomness: reproducibility is the caller's draw stream. The
//! propagation reuses the cached F(Δt) and Q(Δt) and injects noise through
//! the symmetric square root `L` of Q (eigenvalues clamped at 0).
//!
//! Key behaviors
//! -------------
//! - [`CarmaSystem::burn`] advances X by `n` steps of fixed Δt, consuming
//!   `n · p` draws.
//! - [`CarmaSystem::observe`] emits `y_i = H x_i + yerr_i · z_i`, observing
//!   the current state at the first time and propagating by
//!   `t[i] − t[i−1]` afterwards; it consumes `(n − 1) · p` state draws and
//!   `n` measurement draws. Masked points emit 0.0.
//! - [`standard_normal_draws`] and [`simulate_series`] provide a seeded
//!   convenience path built on `rand` and `statrs`.
//!
//! Conventions
//! -----------
//! - Both operations require an installed prior (`reset_state`) and leave
//!   the engine in `FilterPhase::Reset` with `XMinus = X`, so a following
//!   forward pass must reset again.
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, ArrayView1};
use rand::{SeedableRng, distributions::Distribution, rngs::StdRng};
use statrs::distribution::Normal;

use crate::carma::{
    core::validation::{validate_draws, validate_series},
    errors::{CarmaError, CarmaResult},
    kalman::system::{CarmaSystem, FilterPhase},
};

impl CarmaSystem {
    /// Advance the state `n` steps of length `dt` using `draws`.
    ///
    /// # Errors
    /// - `DrawLengthMismatch` if `draws.len() != n · p`.
    /// - `PhaseViolation` before `reset_state`.
    /// - `InvalidTimeStep` / degeneracies from the discretizer.
    pub fn burn(&mut self, n: usize, dt: f64, draws: &[f64]) -> CarmaResult<()> {
        let p = self.shape().p;
        validate_draws("burn_draws", n * p, draws.len())?;
        self.require_prior("burn")?;
        let options = *self.options();

        let ws = self.ready_workspace_mut()?;
        ws.discretize(dt, &options)?;
        let l = noise_root(&ws.q);
        for z in draws.chunks(p) {
            propagate(&ws.f, &l, &mut ws.x, z);
        }
        ws.x_minus.copy_from(&ws.x);
        self.set_phase(FilterPhase::Reset);
        Ok(())
    }

    /// Sample observations at times `t` with measurement errors `yerr`.
    ///
    /// Parameters
    /// ----------
    /// - `t`, `yerr`: `ArrayView1<f64>`
    ///   Sorted times and non-negative measurement standard deviations.
    /// - `dist_draws`: `&[f64]`
    ///   State-noise draws, length `(n − 1) · p`.
    /// - `noise_draws`: `&[f64]`
    ///   Measurement-noise draws, length `n`.
    /// - `mask`: `Option<ArrayView1<f64>>`
    ///   0/1 mask; masked points emit 0.0 but the state still advances.
    ///
    /// Returns
    /// -------
    /// `CarmaResult<Array1<f64>>` with one value per time.
    pub fn observe(
        &mut self, t: ArrayView1<f64>, yerr: ArrayView1<f64>, dist_draws: &[f64],
        noise_draws: &[f64], mask: Option<ArrayView1<f64>>,
    ) -> CarmaResult<Array1<f64>> {
        let n = t.len();
        let p = self.shape().p;
        let placeholder = Array1::<f64>::zeros(n);
        validate_series(t, placeholder.view(), yerr, mask)?;
        validate_draws("dist_draws", (n - 1) * p, dist_draws.len())?;
        validate_draws("noise_draws", n, noise_draws.len())?;
        self.require_prior("observe")?;
        let options = *self.options();

        let ws = self.ready_workspace_mut()?;
        let mut y = Array1::zeros(n);
        let mut l = DMatrix::zeros(p, p);
        for i in 0..n {
            if i > 0 {
                let dt = t[i] - t[i - 1];
                if ws.cached_dt.map(f64::to_bits) != Some(dt.to_bits()) || i == 1 {
                    ws.discretize(dt, &options)?;
                    l = noise_root(&ws.q);
                }
                propagate(&ws.f, &l, &mut ws.x, &dist_draws[(i - 1) * p..i * p]);
            }
            let observed = mask.as_ref().map_or(true, |m| m[i] != 0.0);
            if observed {
                y[i] = ws.x[0] + yerr[i] * noise_draws[i];
            }
        }
        ws.x_minus.copy_from(&ws.x);
        self.set_phase(FilterPhase::Reset);
        if let Some(last) = t.last() {
            self.set_t(*last);
        }
        Ok(y)
    }

    fn require_prior(&self, operation: &'static str) -> CarmaResult<()> {
        match self.phase() {
            FilterPhase::Uninitialized => Err(CarmaError::PhaseViolation {
                operation,
                phase: FilterPhase::Uninitialized.name(),
            }),
            _ => Ok(()),
        }
    }
}

/// `n` independent N(0, 1) draws from a seeded generator.
///
/// # Errors
/// - [`CarmaError::InvalidOption`] if the normal law cannot be built.
pub fn standard_normal_draws(n: usize, seed: u64) -> CarmaResult<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    normal_draws(&mut rng, n)
}

/// Reset, burn in, and observe one synthetic series from a single seed.
///
/// The burn-in step is the mean spacing of `t` (1.0 for a single point or a
/// zero span). Draws are taken in the order burn, state, measurement.
pub fn simulate_series(
    system: &mut CarmaSystem, t: ArrayView1<f64>, yerr: ArrayView1<f64>,
    mask: Option<ArrayView1<f64>>, n_burn: usize, seed: u64,
) -> CarmaResult<Array1<f64>> {
    let n = t.len();
    if n == 0 {
        return Err(CarmaError::EmptySeries);
    }
    let p = system.shape().p;
    let span = t[n - 1] - t[0];
    let burn_dt = if n > 1 && span > 0.0 { span / (n - 1) as f64 } else { 1.0 };

    let mut rng = StdRng::seed_from_u64(seed);
    let burn = normal_draws(&mut rng, n_burn * p)?;
    let dist = normal_draws(&mut rng, (n - 1) * p)?;
    let noise = normal_draws(&mut rng, n)?;

    system.reset_state()?;
    system.burn(n_burn, burn_dt, &burn)?;
    system.observe(t, yerr, &dist, &noise, mask)
}

// ---- Helper Methods ----

fn normal_draws(rng: &mut StdRng, n: usize) -> CarmaResult<Vec<f64>> {
    let normal = Normal::new(0.0, 1.0).map_err(|_| CarmaError::InvalidOption {
        name: "normal",
        value: 1.0,
        reason: "Standard normal could not be constructed.",
    })?;
    Ok((0..n).map(|_| normal.sample(&mut *rng)).collect())
}

/// Symmetric square root of a PSD matrix with eigenvalues clamped at 0.
fn noise_root(q: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(q.clone());
    let sqrt_vals = eig.eigenvalues.map(|v| v.max(0.0).sqrt());
    &eig.eigenvectors * DMatrix::from_diagonal(&sqrt_vals) * eig.eigenvectors.transpose()
}

fn propagate(f: &DMatrix<f64>, l: &DMatrix<f64>, x: &mut DVector<f64>, z: &[f64]) {
    let z = DVector::from_column_slice(z);
    let next = f * &*x + l * z;
    x.copy_from(&next);
}

//! Likelihood-evaluation contract: one CARMA engine per worker context.
//!
//! A sampler or optimizer driver calls [`CarmaPool::ln_like`] (or
//! [`CarmaPool::ln_posterior`]) with a context id, a model-space Θ and an
//! observation bundle. The result is either a finite log-likelihood or
//! [`LN_LIKE_SENTINEL`] when Θ is rejected or numerically degenerate; only
//! contract violations (bad context id, wrong Θ length, poisoned engine)
//! come back as `Err`.
//!
//! Each context owns its engine behind a `Mutex`, so a worker mapped to its
//! own id never waits. Mapping two threads to one id serializes them.
use std::sync::{Mutex, MutexGuard};

use crate::carma::{
    core::{
        data::LnLikeData, options::EngineOptions, shape::CarmaShape, validation::check_params,
    },
    errors::{CarmaError, CarmaResult},
    kalman::system::CarmaSystem,
};

/// Finite stand-in for −∞ returned for inadmissible or degenerate Θ.
pub const LN_LIKE_SENTINEL: f64 = -1.0e300;

/// Context-indexed pool of CARMA engines.
#[derive(Debug)]
pub struct CarmaPool {
    shape: CarmaShape,
    options: EngineOptions,
    engines: Vec<Mutex<CarmaSystem>>,
}

impl CarmaPool {
    /// Allocate `n_ctx` engines for `shape`.
    ///
    /// # Errors
    /// - [`CarmaError::InvalidOption`] if `n_ctx == 0`.
    pub fn new(n_ctx: usize, shape: CarmaShape, options: EngineOptions) -> CarmaResult<Self> {
        if n_ctx == 0 {
            return Err(CarmaError::InvalidOption {
                name: "n_ctx",
                value: 0.0,
                reason: "The pool needs at least one context.",
            });
        }
        let engines =
            (0..n_ctx).map(|_| Mutex::new(CarmaSystem::allocated(shape, options))).collect();
        Ok(CarmaPool { shape, options, engines })
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn shape(&self) -> &CarmaShape {
        &self.shape
    }

    /// Log-likelihood of `data` under Θ on context `ctx`.
    ///
    /// Parameters
    /// ----------
    /// - `ctx`: `usize`
    ///   Context id in `0..len()`.
    /// - `theta`: `&[f64]`
    ///   Model-space vector `[a₁..a_p, b₀..b_q]`.
    /// - `data`: `&LnLikeData`
    ///   Validated observations; `last_ln_like` is updated on success.
    ///
    /// Returns
    /// -------
    /// `CarmaResult<f64>`
    ///   The log-likelihood, or [`LN_LIKE_SENTINEL`] for rejected or
    ///   degenerate Θ.
    ///
    /// Errors
    /// ------
    /// - `ThetaLengthMismatch`, `InvalidContext`, `EnginePoisoned`.
    pub fn ln_like(&self, ctx: usize, theta: &[f64], data: &LnLikeData) -> CarmaResult<f64> {
        self.check_len(theta)?;
        let mut engine = self.engine(ctx)?;
        let outcome = match engine.set(theta) {
            Ok(()) => engine.ln_like(data),
            Err(err) => Err(err),
        };
        sentinel_or(outcome)
    }

    /// Flat log-prior over the admissible region: 0 or the sentinel.
    ///
    /// # Errors
    /// - `ThetaLengthMismatch`, `InvalidContext`.
    pub fn ln_prior(&self, ctx: usize, theta: &[f64]) -> CarmaResult<f64> {
        self.check_len(theta)?;
        self.check_ctx(ctx)?;
        sentinel_or(check_params(theta, &self.shape, &self.options).map(|_| 0.0))
    }

    /// `ln_prior + ln_like`; the likelihood is skipped when the prior is
    /// already the sentinel.
    pub fn ln_posterior(&self, ctx: usize, theta: &[f64], data: &LnLikeData) -> CarmaResult<f64> {
        let prior = self.ln_prior(ctx, theta)?;
        if prior == LN_LIKE_SENTINEL {
            return Ok(LN_LIKE_SENTINEL);
        }
        let like = self.ln_like(ctx, theta, data)?;
        if like == LN_LIKE_SENTINEL {
            return Ok(LN_LIKE_SENTINEL);
        }
        Ok(prior + like)
    }

    /// Run `f` on the engine of context `ctx`.
    ///
    /// Gives access to smoothing, residuals and simulation without a second
    /// set of engines.
    pub fn with_engine<R, F>(&self, ctx: usize, f: F) -> CarmaResult<R>
    where
        F: FnOnce(&mut CarmaSystem) -> CarmaResult<R>,
    {
        let mut engine = self.engine(ctx)?;
        f(&mut engine)
    }

    // ---- Helper Methods ----

    fn check_len(&self, theta: &[f64]) -> CarmaResult<()> {
        let expected = self.shape.n_params();
        if theta.len() != expected {
            return Err(CarmaError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        Ok(())
    }

    fn check_ctx(&self, ctx: usize) -> CarmaResult<()> {
        if ctx >= self.engines.len() {
            return Err(CarmaError::InvalidContext { ctx, len: self.engines.len() });
        }
        Ok(())
    }

    fn engine(&self, ctx: usize) -> CarmaResult<MutexGuard<'_, CarmaSystem>> {
        self.check_ctx(ctx)?;
        self.engines[ctx].lock().map_err(|_| CarmaError::EnginePoisoned { ctx })
    }
}

/// Map recoverable failures to the sentinel; propagate the rest.
fn sentinel_or(outcome: CarmaResult<f64>) -> CarmaResult<f64> {
    match outcome {
        Ok(value) => Ok(value),
        Err(err) if err.is_recoverable() => Ok(LN_LIKE_SENTINEL),
        Err(err) => Err(err),
    }
}

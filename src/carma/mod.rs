//! carma — CARMA(p, q) state-space likelihood engine.
//!
//! Purpose
//! -------
//! Estimate continuous-time ARMA processes from irregularly sampled, noisy
//! series. The engine turns a parameter vector Θ into a continuous-time
//! state-space system, discretizes it over arbitrary gaps, and runs the
//! Kalman recursions that give the exact Gaussian log-likelihood, residuals,
//! smoothed states, and synthetic draws.
//!
//! Key behaviors
//! -------------
//! - [`core`]: shapes, options, observations, parameter validation, system
//!   builder, spectral engine, discretizer, noise-covariance solver and the
//!   per-engine workspace.
//! - [`kalman`]: the [`CarmaSystem`] lifecycle (allocate, set, reset,
//!   predict, update), likelihood, residuals, RTS smoothing, simulation.
//! - [`models`]: maximum-likelihood fitting ([`CarmaModel`]) and the
//!   context-indexed likelihood contract ([`CarmaPool`]).
//! - [`errors`]: [`CarmaError`] with its recoverable / fatal classification.
//!
//! Invariants & assumptions
//! ------------------------
//! - Θ = [a₁..a_p, b₀..b_q] with `p ≥ 1` and `q < p`.
//! - Admissible Θ has every AR and MA root strictly in the left half plane,
//!   distinct AR roots, and no AR/MA cancellation.
//! - Likelihood evaluations at inadmissible or degenerate Θ return the finite
//!   sentinel, never `Err`.
//!
//! Conventions
//! -----------
//! - Public arrays are `ndarray`; engine internals are `nalgebra`.
//! - Masked points (mask 0.0) are predicted through but never scored.

pub mod core;
pub mod errors;
pub mod kalman;
pub mod models;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    CarmaOptions, CarmaParams, CarmaShape, EngineOptions, LnLikeData, RootSet, StateInit,
};
pub use self::errors::{CarmaError, CarmaResult, ErrorClass};
pub use self::kalman::{CarmaSystem, FilterPhase, Innovation, SmoothedPath};
pub use self::models::{CarmaModel, CarmaPool, LN_LIKE_SENTINEL};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_carma::carma::prelude::*;
//
// to import the main CARMA surface in a single line.

pub mod prelude {
    pub use super::{
        CarmaError, CarmaModel, CarmaOptions, CarmaParams, CarmaPool, CarmaResult, CarmaShape,
        CarmaSystem, EngineOptions, FilterPhase, LN_LIKE_SENTINEL, LnLikeData, SmoothedPath,
        StateInit,
    };
    pub use super::kalman::{simulate_series, standard_normal_draws};
}

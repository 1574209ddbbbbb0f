//! core — CARMA(p, q) data, parameters, validation, and the numerical
//! building blocks of the state-space engine.
//!
//! Purpose
//! -------
//! Collect everything the Kalman engine needs below the filter loop: model
//! order and thresholds, the observation bundle, parameter validation, the
//! system builder, the spectral engine, the discretizer, the Kronecker-sum
//! noise solver, and the per-engine workspace that owns their buffers.
//!
//! Key behaviors
//! -------------
//! - Describe the model with [`CarmaShape`], [`EngineOptions`] and
//!   [`CarmaOptions`]; carry observations in a validated [`LnLikeData`].
//! - Decide admissibility of Θ with [`check_params`] (stability,
//!   invertibility, distinct and non-cancelling roots).
//! - Build the observer canonical system ([`build_system`]), decompose it
//!   ([`SpectralDecomposition`]), and derive F(Δt)
//!   ([`transition_matrix_into`]), Σ ([`stationary_covariance`]) and Q(Δt)
//!   ([`process_noise_into`]).
//! - Map between model space and the unconstrained optimizer space with
//!   [`CarmaParams`].
//!
//! Invariants & assumptions
//! ------------------------
//! - `p ≥ 1`, `q < p`, Θ has length `p + q + 1`.
//! - Every numerical stage fails with a typed [`CarmaError`] instead of
//!   returning non-finite matrices; rejection and degeneracy errors are
//!   recoverable at the likelihood boundary.
//! - Buffers in [`CarmaWorkspace`] are fully overwritten by each refresh;
//!   nothing leaks from one Θ to the next.
//!
//! Conventions
//! -----------
//! - Engine internals use `nalgebra` matrices; public data lives in
//!   `ndarray` containers.
//! - Indexing is 0-based; Θ = [a₁..a_p, b₀..b_q].
//! - This module performs no I/O and no logging.
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests for its own contract; cross-stage
//!   properties (semigroup, Kronecker vs eigen-basis Σ, Padé agreement, cache
//!   invariance) live next to the stage they exercise.
//!
//! [`CarmaError`]: crate::carma::errors::CarmaError

pub mod data;
pub mod discretize;
pub mod noise;
pub mod options;
pub mod params;
pub mod polynomial;
pub mod shape;
pub mod spectral;
pub mod system;
pub mod validation;
pub mod workspace;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::data::LnLikeData;
pub use self::discretize::{transition_matrix, transition_matrix_into, validate_dt};
pub use self::noise::{
    SolveDiagnostics, expert_solve, kronecker_sum, process_noise_into, stationary_covariance,
};
pub use self::options::{CarmaOptions, EngineOptions, StateInit};
pub use self::params::{CarmaParams, factor_logits, stable_polynomial};
pub use self::polynomial::{companion_matrix, polynomial_roots};
pub use self::shape::CarmaShape;
pub use self::spectral::SpectralDecomposition;
pub use self::system::{ContinuousSystem, build_system};
pub use self::validation::{
    RootSet, check_params, validate_draws, validate_series, validate_theta,
};
pub use self::workspace::CarmaWorkspace;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_carma::carma::core::prelude::*;
//
// to import the main CARMA core surface in a single line.

pub mod prelude {
    pub use super::data::LnLikeData;
    pub use super::options::{CarmaOptions, EngineOptions, StateInit};
    pub use super::params::CarmaParams;
    pub use super::shape::CarmaShape;
    pub use super::validation::{RootSet, check_params};
}

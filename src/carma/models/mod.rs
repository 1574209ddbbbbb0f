//! models — user-facing CARMA(p, q) estimation surfaces.
//!
//! Purpose
//! -------
//! Sit on top of `carma::kalman` and expose the two ways the engine is
//! consumed: maximum-likelihood fitting through the generic optimizer
//! ([`CarmaModel`]) and the context-indexed likelihood contract used by
//! external samplers ([`CarmaPool`]).
//!
//! Key behaviors
//! -------------
//! - [`CarmaModel`] implements `LogLikelihood` over unconstrained θ and
//!   provides `fit`, plus `ln_like`, `residuals`, `smooth` and `simulate` at
//!   the fitted parameters.
//! - [`CarmaPool`] owns one engine per context and implements `ln_like`,
//!   `ln_prior` and `ln_posterior` over model-space Θ.
//!
//! Invariants & assumptions
//! ------------------------
//! - Rejected or degenerate parameters never surface as `Err` from a
//!   likelihood evaluation: both surfaces return [`LN_LIKE_SENTINEL`].
//! - Contract violations (wrong lengths, bad context, poisoned engine,
//!   malformed data) are always errors.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each surface; an end-to-end fit on simulated
//!   data is in `tests/integration_carma_pipeline.rs`.

pub mod carma;
pub mod pool;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::carma::CarmaModel;
pub use self::pool::{CarmaPool, LN_LIKE_SENTINEL};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::carma::CarmaModel;
    pub use super::pool::{CarmaPool, LN_LIKE_SENTINEL};
}

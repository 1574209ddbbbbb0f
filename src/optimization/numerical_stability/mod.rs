//! numerical_stability — guarded scalar transforms for optimizer space.
//!
//! Purpose
//! -------
//! Collect the numerically stable transforms used to map unconstrained
//! optimizer coordinates onto strictly positive model quantities (the
//! coefficients of stable polynomial factors and the MA scale of a CARMA
//! model).
//!
//! Key behaviors
//! -------------
//! - [`safe_softplus`] maps ℝ → (0, ∞) without overflow.
//! - [`safe_softplus_inv`] maps (0, ∞) → ℝ without cancellation.
//!
//! Conventions
//! -----------
//! - Pure functions on `f64`; no I/O, no global state, no panics.
//! - Domain checks (finiteness, positivity) belong to the callers.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{safe_softplus, safe_softplus_inv};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::transformations::{safe_softplus, safe_softplus_inv};
}

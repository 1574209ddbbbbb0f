//! kalman — the CARMA state-space engine: lifecycle, filtering, smoothing,
//! and simulation.
//!
//! Purpose
//! -------
//! Run the Kalman recursions of a CARMA(p, q) model over irregularly
//! sampled, possibly masked observations. One [`CarmaSystem`] is one engine
//! instance: it owns its buffers and is meant to be used by one worker at a
//! time.
//!
//! Key behaviors
//! -------------
//! - [`CarmaSystem`] (in [`system`]): allocate / set / reset / predict /
//!   update with explicit [`FilterPhase`] tracking.
//! - [`filter`]: forward pass giving the log-likelihood and standardized
//!   residuals.
//! - [`smoother`]: RTS fixed-interval smoother producing a [`SmoothedPath`].
//! - [`simulate`]: burn-in and observation driven by caller draws, plus the
//!   seeded helpers [`standard_normal_draws`] and [`simulate_series`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Predict always precedes the update for the same index (except the first
//!   point, which updates straight from the prior); violations are fatal
//!   phase errors.
//! - Smoothing runs its own full forward pass, so it never consumes a
//!   partial trajectory.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each stage; end-to-end checks (simulate → fit
//!   → smooth, pooled evaluation across threads) are in
//!   `tests/integration_carma_pipeline.rs`.

pub mod filter;
pub mod simulate;
pub mod smoother;
pub mod system;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::filter::LN_2PI;
pub use self::simulate::{simulate_series, standard_normal_draws};
pub use self::smoother::SmoothedPath;
pub use self::system::{CarmaSystem, FilterPhase, Innovation};

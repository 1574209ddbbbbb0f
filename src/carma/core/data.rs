//! CARMA observation bundle — timestamps, values, measurement errors, and an
//! optional observation mask.
//!
//! Purpose
//! -------
//! Provide a validated, read-only container for the irregularly sampled
//! series that the Kalman engine consumes, so the filter loop can assume
//! well-formed input and never re-check it.
//!
//! Key behaviors
//! -------------
//! - [`LnLikeData::new`] validates lengths, ordering, finiteness, mask
//!   values and measurement-error signs once, up front.
//! - [`LnLikeData::is_observed`] / [`LnLikeData::n_observed`] centralize mask
//!   semantics.
//! - The last evaluated log-likelihood is recorded atomically so that one
//!   bundle can be shared by several engines evaluating in parallel.
//!
//! Invariants & assumptions
//! ------------------------
//! - `t`, `y`, `yerr` (and `mask` when present) have the same non-zero
//!   length.
//! - `t` is finite and non-decreasing; duplicate timestamps are allowed and
//!   produce a zero time step.
//! - For observed points (`mask[i] == 1`), `y[i]` and `yerr[i]` are finite
//!   and `yerr[i] ≥ 0`. Masked points may carry any value, including NaN.
//!
//! Conventions
//! -----------
//! - A missing mask means every point is observed.
//! - `last_ln_like` starts as NaN and is overwritten after each successful
//!   likelihood evaluation; it is bookkeeping only and never read by the
//!   engine.
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array1;

use crate::carma::{core::validation::validate_series, errors::CarmaResult};

/// LnLikeData — validated observation bundle for CARMA likelihoods.
#[derive(Debug)]
pub struct LnLikeData {
    /// Observation times, non-decreasing.
    pub t: Array1<f64>,
    /// Observed values.
    pub y: Array1<f64>,
    /// Measurement standard deviations.
    pub yerr: Array1<f64>,
    /// Optional 0/1 mask; `None` means all observed.
    pub mask: Option<Array1<f64>>,
    last_ln_like: AtomicU64,
}

impl LnLikeData {
    /// Build a validated observation bundle.
    ///
    /// # Errors
    /// - `EmptySeries`, `SeriesLengthMismatch`, `NonFiniteData`,
    ///   `UnsortedTime`, `InvalidMask`, `NegativeError` per
    ///   [`validate_series`].
    pub fn new(
        t: Array1<f64>, y: Array1<f64>, yerr: Array1<f64>, mask: Option<Array1<f64>>,
    ) -> CarmaResult<Self> {
        validate_series(t.view(), y.view(), yerr.view(), mask.as_ref().map(|m| m.view()))?;
        Ok(Self { t, y, yerr, mask, last_ln_like: AtomicU64::new(f64::NAN.to_bits()) })
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Whether point `i` enters the likelihood.
    #[inline]
    pub fn is_observed(&self, i: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m[i] != 0.0)
    }

    /// Number of observed points.
    pub fn n_observed(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_observed(i)).count()
    }

    /// Most recently recorded log-likelihood (NaN before the first evaluation).
    pub fn last_ln_like(&self) -> f64 {
        f64::from_bits(self.last_ln_like.load(Ordering::Relaxed))
    }

    pub(crate) fn record_ln_like(&self, value: f64) {
        self.last_ln_like.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Clone for LnLikeData {
    fn clone(&self) -> Self {
        Self {
            t: self.t.clone(),
            y: self.y.clone(),
            yerr: self.yerr.clone(),
            mask: self.mask.clone(),
            last_ln_like: AtomicU64::new(self.last_ln_like.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carma::errors::CarmaError;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction with and without a mask, and mask-aware counting.
    // - Rejection of unsorted timestamps.
    // - Bookkeeping of the last evaluated log-likelihood.
    //
    // They intentionally DO NOT cover:
    // - The full validation matrix (see `core::validation` tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify mask semantics and that masked points may hold NaN values.
    //
    // Given
    // -----
    // - Three points with the middle one masked and set to NaN.
    //
    // Expect
    // ------
    // - Construction succeeds; `n_observed == 2`; point 1 is not observed.
    fn masked_points_may_be_missing() {
        // Arrange
        let t = array![0.0, 1.0, 2.5];
        let y = array![0.1, f64::NAN, -0.3];
        let yerr = array![0.1, f64::NAN, 0.1];
        let mask = Some(array![1.0, 0.0, 1.0]);

        // Act
        let data = LnLikeData::new(t, y, yerr, mask).expect("masked NaN is allowed");

        // Assert
        assert_eq!(data.len(), 3);
        assert_eq!(data.n_observed(), 2);
        assert!(!data.is_observed(1));
        assert!(data.last_ln_like().is_nan());
    }

    #[test]
    // Purpose
    // -------
    // Ensure decreasing timestamps are rejected.
    //
    // Given
    // -----
    // - `t = [0, 2, 1]`.
    //
    // Expect
    // ------
    // - `CarmaError::UnsortedTime { index: 2, .. }`.
    fn unsorted_time_is_rejected() {
        // Arrange
        let t = array![0.0, 2.0, 1.0];
        let y = array![0.0, 0.0, 0.0];
        let yerr = array![0.1, 0.1, 0.1];

        // Act
        let err = LnLikeData::new(t, y, yerr, None).unwrap_err();

        // Assert
        assert!(matches!(err, CarmaError::UnsortedTime { index: 2, .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify that recorded log-likelihoods are readable and survive cloning.
    //
    // Given
    // -----
    // - A valid bundle and a recorded value of -12.5.
    //
    // Expect
    // ------
    // - `last_ln_like` returns -12.5 on the original and the clone.
    fn last_ln_like_is_recorded() {
        // Arrange
        let data = LnLikeData::new(array![0.0], array![1.0], array![0.5], None)
            .expect("single point is valid");

        // Act
        data.record_ln_like(-12.5);
        let copy = data.clone();

        // Assert
        assert_eq!(data.last_ln_like(), -12.5);
        assert_eq!(copy.last_ln_like(), -12.5);
    }
}

//! Integration tests for the CARMA likelihood pipeline.
//!
//! Purpose
//! -------
//! - Validate the end-to-end path: seeded simulation on an irregular grid,
//!   Kalman log-likelihood and residuals, RTS smoothing, pooled concurrent
//!   evaluation, and maximum-likelihood fitting through L-BFGS.
//! - Use realistic series lengths and parameter regimes so the statistical
//!   assertions are meaningful rather than toy checks.
//!
//! Coverage
//! --------
//! - `carma::kalman`: `simulate_series`, `ln_like`, `residuals`, `smooth`.
//! - `carma::models::pool::CarmaPool`: sentinel contract and threaded
//!   evaluation against standalone engines.
//! - `carma::models::carma::CarmaModel`: `initial_theta`, `fit`, and the
//!   fitted-parameter accessors.
//! - `optimization::loglik_optimizer`: L-BFGS via `MLEOptions` and
//!   `Tolerances`.
//!
//! Exclusions
//! ----------
//! - Low-level building blocks (root finding, discretization, Lyapunov
//!   solves, θ-map), covered by unit tests.
//! - Python bindings.
use approx::assert_relative_eq;
use ndarray::{Array1, array};
use rust_carma::{
    carma::{
        core::{
            data::LnLikeData,
            options::{CarmaOptions, EngineOptions},
            params::CarmaParams,
            shape::CarmaShape,
        },
        kalman::{simulate::simulate_series, system::CarmaSystem},
        models::{carma::CarmaModel, pool::CarmaPool, pool::LN_LIKE_SENTINEL},
    },
    optimization::loglik_optimizer::{LineSearcher, MLEOptions, Tolerances},
};

/// Strictly increasing irregular grid `t_i = 0.5 i + 0.2 sin(i)`.
fn irregular_grid(n: usize) -> Array1<f64> {
    Array1::from_iter((0..n).map(|i| 0.5 * i as f64 + 0.2 * (i as f64).sin()))
}

/// Simulate `n` points from Θ with constant measurement error `sigma`.
fn simulated(shape: CarmaShape, theta: &[f64], n: usize, sigma: f64, seed: u64) -> LnLikeData {
    let t = irregular_grid(n);
    let yerr = Array1::from_elem(n, sigma);
    let mut engine = CarmaSystem::allocated(shape, EngineOptions::default());
    engine.set(theta).unwrap();
    let y = simulate_series(&mut engine, t.view(), yerr.view(), None, 50, seed).unwrap();
    LnLikeData::new(t, y, yerr, None).unwrap()
}

fn engine_at(shape: CarmaShape, theta: &[f64]) -> CarmaSystem {
    let mut engine = CarmaSystem::allocated(shape, EngineOptions::default());
    engine.set(theta).unwrap();
    engine
}

#[test]
// Purpose
// -------
// Check that the likelihood of a simulated CARMA(2, 1) series prefers the
// generating parameters over a process with a different oscillation
// frequency.
//
// Given
// -----
// - 400 irregular points simulated from Θ = [1, 1.25, 1, 0.5] (AR roots
//   −0.5 ± i, MA root −2) with yerr = 0.05.
// - A stable alternative Θ' = [1, 4, 1, 0.5] (AR roots −0.5 ± 1.94i).
//
// Expect
// ------
// - Both log-likelihoods finite, ℓ(Θ) > ℓ(Θ').
fn likelihood_prefers_generating_parameters() {
    // Arrange
    let shape = CarmaShape::new(2, 1).unwrap();
    let truth = [1.0, 1.25, 1.0, 0.5];
    let other = [1.0, 4.0, 1.0, 0.5];
    let data = simulated(shape, &truth, 400, 0.05, 11);

    // Act
    let ll_truth = engine_at(shape, &truth).ln_like(&data).unwrap();
    let ll_other = engine_at(shape, &other).ln_like(&data).unwrap();

    // Assert
    assert!(ll_truth.is_finite() && ll_other.is_finite());
    assert!(ll_truth > ll_other, "ℓ(truth) = {ll_truth}, ℓ(other) = {ll_other}");
}

#[test]
// Purpose
// -------
// Verify that standardized innovations at the generating parameters look
// like a standard normal sample.
//
// Given
// -----
// - 400 points simulated from CARMA(2, 1) Θ = [1, 1.25, 1, 0.5].
//
// Expect
// ------
// - All residuals finite; sample mean within 0.25 of 0 and sample variance
//   within [0.7, 1.3].
fn residuals_at_truth_are_standardized() {
    // Arrange
    let shape = CarmaShape::new(2, 1).unwrap();
    let truth = [1.0, 1.25, 1.0, 0.5];
    let data = simulated(shape, &truth, 400, 0.05, 23);

    // Act
    let res = engine_at(shape, &truth).residuals(&data).unwrap();

    // Assert
    assert!(res.iter().all(|r| r.is_finite()));
    let n = res.len() as f64;
    let mean = res.sum() / n;
    let var = res.mapv(|r| (r - mean) * (r - mean)).sum() / (n - 1.0);
    assert!(mean.abs() < 0.25, "mean = {mean}");
    assert!((0.7..1.3).contains(&var), "var = {var}");
}

#[test]
// Purpose
// -------
// Exercise the smoother on masked data through a pooled engine.
//
// Given
// -----
// - 60 simulated CARMA(2, 1) points with every fifth observation masked.
// - A one-context pool.
//
// Expect
// ------
// - States of shape (60, 2); fitted values and variances of length 60 with
//   positive variances; residuals NaN exactly where masked; the smoother's
//   log-likelihood equal to the pool's `ln_like`.
fn smoother_through_pool_on_masked_series() {
    // Arrange
    let shape = CarmaShape::new(2, 1).unwrap();
    let truth = [1.0, 1.25, 1.0, 0.5];
    let full = simulated(shape, &truth, 60, 0.1, 5);
    let mask = Array1::from_iter((0..60).map(|i| if i % 5 == 0 { 0.0 } else { 1.0 }));
    let data = LnLikeData::new(full.t, full.y, full.yerr, Some(mask.clone())).unwrap();
    let pool = CarmaPool::new(1, shape, EngineOptions::default()).unwrap();

    // Act
    let ll = pool.ln_like(0, &truth, &data).unwrap();
    let path = pool.with_engine(0, |engine| engine.smooth(&data)).unwrap();

    // Assert
    assert_eq!(path.states.dim(), (60, 2));
    assert_eq!(path.fitted.len(), 60);
    assert!(path.fitted_var.iter().all(|v| *v > 0.0));
    for (r, m) in path.residuals.iter().zip(mask.iter()) {
        assert_eq!(r.is_nan(), *m == 0.0);
    }
    assert_relative_eq!(path.ln_like, ll, max_relative = 1e-10);
}

#[test]
// Purpose
// -------
// Check the pooled contract from several threads at once on distinct Θ.
//
// Given
// -----
// - A four-context pool over CARMA(2, 1) simulated data.
// - Context k evaluates its own Θ; context 3 gets an unstable Θ.
//
// Expect
// ------
// - Contexts 0..3 match standalone engines exactly; context 3 returns
//   `LN_LIKE_SENTINEL`.
fn pool_contexts_are_independent_across_threads() {
    // Arrange
    let shape = CarmaShape::new(2, 1).unwrap();
    let data = simulated(shape, &[1.0, 1.25, 1.0, 0.5], 120, 0.05, 8);
    let pool = CarmaPool::new(4, shape, EngineOptions::default()).unwrap();
    let thetas = [
        [1.0, 1.25, 1.0, 0.5],
        [2.0, 2.0, 0.8, 0.3],
        [0.6, 0.5, 1.2, 0.1],
        [0.5, -1.0, 1.0, 0.5],
    ];

    // Act
    let values: Vec<f64> = std::thread::scope(|s| {
        let handles: Vec<_> = thetas
            .iter()
            .enumerate()
            .map(|(ctx, theta)| {
                let (pool, data) = (&pool, &data);
                s.spawn(move || pool.ln_like(ctx, theta, data).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Assert
    for (theta, value) in thetas.iter().zip(&values).take(3) {
        let expected = engine_at(shape, theta).ln_like(&data).unwrap();
        assert_eq!(value.to_bits(), expected.to_bits());
    }
    assert_eq!(values[3], LN_LIKE_SENTINEL);
}

#[test]
// Purpose
// -------
// Run a full maximum-likelihood fit and check that it improves on the
// starting point and leaves the model in a consistent fitted state.
//
// Given
// -----
// - 300 points simulated from CARMA(1, 0) with Θ = [1, 1] (AR root −1).
// - A deliberately poor start Θ₀ = [3, 0.5] mapped through `initial_theta`.
// - More–Thuente L-BFGS with tol_grad = 1e-5 and at most 200 iterations.
//
// Expect
// ------
// - `fit` succeeds; ℓ(θ̂) ≥ ℓ(θ₀).
// - `ln_like` at the fitted parameters reproduces `results.value`.
// - The fitted AR root is real and strictly negative.
fn fit_improves_on_start_and_installs_parameters() {
    // Arrange
    let shape = CarmaShape::new(1, 0).unwrap();
    let data = simulated(shape, &[1.0, 1.0], 300, 0.05, 3);
    let tols = Tolerances::new(Some(1e-5), None, Some(200)).unwrap();
    let mle_opts = MLEOptions::new(tols, LineSearcher::MoreThuente, false, None).unwrap();
    let mut model = CarmaModel::new(shape, CarmaOptions::new(EngineOptions::default(), mle_opts));
    let start = CarmaParams::new(array![3.0], array![0.5], &shape).unwrap();
    let theta0 = model.initial_theta(&start).unwrap();
    let ll_start = engine_at(shape, &start.to_vec()).ln_like(&data).unwrap();

    // Act
    model.fit(theta0, &data).unwrap();

    // Assert
    let outcome = model.results.as_ref().unwrap();
    assert!(outcome.value >= ll_start - 1e-9);
    assert_relative_eq!(model.ln_like(&data).unwrap(), outcome.value, max_relative = 1e-9);
    let roots = model.ar_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert!(roots[0].re < 0.0);
    assert!(roots[0].im.abs() < 1e-12);
    let fitted = model.fitted_params.as_ref().unwrap();
    assert!(fitted.ar[0] > 0.0 && fitted.ma[0] > 0.0);
}

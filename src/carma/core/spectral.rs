//! Spectral engine — eigendecomposition of the companion matrix A.
//!
//! Purpose
//! -------
//! Produce the eigenvalues (poles) w, right eigenvectors V, and V⁻¹ of the
//! continuous-time state matrix, together with the conditioning diagnostics
//! that decide whether the decomposition can be trusted. The discretizer and
//! the eigen-basis stationary covariance are built on top of this.
//!
//! Key behaviors
//! -------------
//! - Balances a copy of A (power-of-two scaling) and records the scale
//!   factors and the balanced 1-norm `abnrm`.
//! - Takes the poles from the validator (Schur on the balanced companion
//!   matrix), refines each with one Newton step on a(z) when that reduces
//!   |a(λ)|, and pins conjugate partners to exact conjugates.
//! - Builds eigenvectors in closed form (`v₀ = 1`, `v_k = λ v_{k−1} + a_k`),
//!   normalizes them, and checks `‖Av − λv‖ ≤ tol · (‖A‖₁ + |λ|)`.
//! - Inverts V by complex LU with partial pivoting.
//! - Reports `rcond(V) = 1 / (‖V‖₁ ‖V⁻¹‖₁)` and rejects below
//!   `eigen_rcond_min`, plus per-eigenvalue `rconde` and per-eigenvector
//!   `rcondv`.
//!
//! Invariants & assumptions
//! ------------------------
//! - A is the observer canonical companion matrix of an admissible Θ, so
//!   the poles are distinct and V is invertible in exact arithmetic.
//! - After a successful [`SpectralDecomposition::update`], `w`, `vr` and
//!   `vr_inv` are mutually consistent; after a failure their contents are
//!   unspecified and the caller must not use them.
//!
//! Conventions
//! -----------
//! - `rconde_k = 1 / (‖u_k‖₂ ‖v_k‖₂)` where `u_k` is row k of V⁻¹ and
//!   `‖v_k‖₂ = 1`.
//! - `rcondv_k = min_{j≠k} |λ_k − λ_j| / abnrm`; 1.0 when p = 1.
use nalgebra::{Complex, DMatrix, DVector};

use crate::{
    carma::{
        core::{options::EngineOptions, polynomial::eval_with_derivative},
        errors::{CarmaError, CarmaResult},
    },
    linalg::{balance, one_norm},
};

/// Eigendecomposition of A with conditioning diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralDecomposition {
    /// Poles λ_k.
    pub w: DVector<Complex<f64>>,
    /// Unit-norm right eigenvectors as columns.
    pub vr: DMatrix<Complex<f64>>,
    /// Inverse of `vr`.
    pub vr_inv: DMatrix<Complex<f64>>,
    /// Balancing scale factors.
    pub scale: DVector<f64>,
    /// 1-norm of the balanced matrix.
    pub abnrm: f64,
    /// Reciprocal condition numbers of the eigenvalues.
    pub rconde: DVector<f64>,
    /// Separation-based reciprocal condition numbers of the eigenvectors.
    pub rcondv: DVector<f64>,
    /// Reciprocal condition number of `vr`.
    pub rcond: f64,
    balanced: DMatrix<f64>,
}

impl SpectralDecomposition {
    pub fn new(p: usize) -> SpectralDecomposition {
        SpectralDecomposition {
            w: DVector::zeros(p),
            vr: DMatrix::zeros(p, p),
            vr_inv: DMatrix::zeros(p, p),
            scale: DVector::from_element(p, 1.0),
            abnrm: 0.0,
            rconde: DVector::zeros(p),
            rcondv: DVector::zeros(p),
            rcond: 0.0,
            balanced: DMatrix::zeros(p, p),
        }
    }

    /// Recompute the decomposition for a new companion matrix.
    ///
    /// Parameters
    /// ----------
    /// - `a`: `&DMatrix<f64>`
    ///   Companion matrix built from `ar`.
    /// - `ar`: `&[f64]`
    ///   AR coefficients `[a₁..a_p]`.
    /// - `poles`: `&[Complex<f64>]`
    ///   Roots of a(z) as returned by the validator.
    /// - `opts`: `&EngineOptions`
    ///
    /// Errors
    /// ------
    /// - `EigenvectorResidual` when a closed-form eigenvector fails the
    ///   residual check.
    /// - `SingularEigenbasis` when LU cannot invert V.
    /// - `IllConditionedEigenbasis` when `rcond(V) < eigen_rcond_min`.
    pub fn update(
        &mut self, a: &DMatrix<f64>, ar: &[f64], poles: &[Complex<f64>], opts: &EngineOptions,
    ) -> CarmaResult<()> {
        let p = a.nrows();

        self.balanced.copy_from(a);
        self.scale = balance(&mut self.balanced);
        self.abnrm = one_norm(&self.balanced);

        for (k, &lambda) in poles.iter().enumerate() {
            self.w[k] = newton_polish(ar, lambda);
        }
        pair_conjugates(&mut self.w);

        let a_norm = one_norm(a);
        for k in 0..p {
            let lambda = self.w[k];
            let mut v = Complex::new(1.0, 0.0);
            self.vr[(0, k)] = v;
            for (i, &a_i) in ar.iter().enumerate().take(p - 1) {
                v = v * lambda + a_i;
                self.vr[(i + 1, k)] = v;
            }
            let norm = self.vr.column(k).norm();
            self.vr.column_mut(k).unscale_mut(norm);

            let residual = eigen_residual(a, &self.vr, k, lambda);
            if !(residual <= opts.residual_tolerance * (a_norm + lambda.norm())) {
                return Err(CarmaError::EigenvectorResidual { index: k, residual });
            }
        }

        self.vr_inv = self.vr.clone().lu().try_inverse().ok_or(CarmaError::SingularEigenbasis)?;
        self.rcond = 1.0 / (one_norm(&self.vr) * one_norm(&self.vr_inv));
        if !(self.rcond >= opts.eigen_rcond_min) {
            return Err(CarmaError::IllConditionedEigenbasis {
                rcond: self.rcond,
                threshold: opts.eigen_rcond_min,
            });
        }

        let abnrm = if self.abnrm > 0.0 { self.abnrm } else { 1.0 };
        for k in 0..p {
            self.rconde[k] = 1.0 / self.vr_inv.row(k).norm();
            let gap = (0..p)
                .filter(|&j| j != k)
                .map(|j| (self.w[k] - self.w[j]).norm())
                .fold(f64::INFINITY, f64::min);
            self.rcondv[k] = if p == 1 { 1.0 } else { gap / abnrm };
        }
        Ok(())
    }

    /// Stationary covariance from the eigen basis.
    ///
    /// With `u = V⁻¹ B`, `C = u uᴴ` and `S_ij = −C_ij / (λ_i + λ̄_j)`, returns
    /// `Re(V S Vᴴ)`, symmetrized. Used to cross-check the Kronecker solve.
    pub fn stationary_covariance(&self, b: &DVector<f64>) -> DMatrix<f64> {
        let p = self.w.len();
        let b_c = b.map(|x| Complex::new(x, 0.0));
        let u = &self.vr_inv * b_c;
        let s = DMatrix::from_fn(p, p, |i, j| {
            -(u[i] * u[j].conj()) / (self.w[i] + self.w[j].conj())
        });
        let full = &self.vr * s * self.vr.adjoint();
        let mut sigma = full.map(|z| z.re);
        crate::linalg::symmetrize(&mut sigma);
        sigma
    }

    /// Poles as an owned vector.
    pub fn poles(&self) -> Vec<Complex<f64>> {
        self.w.iter().copied().collect()
    }
}

// ---- Helper Methods ----

fn newton_polish(ar: &[f64], lambda: Complex<f64>) -> Complex<f64> {
    let (value, deriv) = eval_with_derivative(ar, lambda);
    if deriv.norm() == 0.0 {
        return lambda;
    }
    let candidate = lambda - value / deriv;
    let (new_value, _) = eval_with_derivative(ar, candidate);
    if candidate.re.is_finite() && candidate.im.is_finite() && new_value.norm() < value.norm() {
        candidate
    } else {
        lambda
    }
}

/// Force each pole with positive imaginary part and its nearest lower
/// half-plane partner to be exact conjugates.
fn pair_conjugates(w: &mut DVector<Complex<f64>>) {
    let n = w.len();
    for i in 0..n {
        if w[i].im <= 0.0 {
            continue;
        }
        let target = w[i].conj();
        let partner = (0..n)
            .filter(|&j| w[j].im < 0.0)
            .min_by(|&x, &y| (w[x] - target).norm().total_cmp(&(w[y] - target).norm()));
        if let Some(j) = partner {
            w[j] = target;
        }
    }
}

fn eigen_residual(
    a: &DMatrix<f64>, vr: &DMatrix<Complex<f64>>, k: usize, lambda: Complex<f64>,
) -> f64 {
    let p = a.nrows();
    let mut sum = 0.0;
    for i in 0..p {
        let mut av = Complex::new(0.0, 0.0);
        for j in 0..p {
            av += vr[(j, k)] * a[(i, j)];
        }
        sum += (av - vr[(i, k)] * lambda).norm_sqr();
    }
    sum.sqrt()
}

//! Monic polynomial helpers: companion matrices, roots, and products.
//!
//! Polynomials are stored by their non-leading coefficients in descending
//! powers: `[c₁, …, c_n]` represents `zⁿ + c₁ zⁿ⁻¹ + … + c_n`. This matches
//! the AR parameter layout of Θ and the first column of the observer
//! canonical form.
use nalgebra::{Complex, DMatrix, Schur};

use crate::{
    carma::errors::{CarmaError, CarmaResult},
    linalg::{balance, zero_fill},
};

/// Write the companion matrix of `zⁿ + c₁ zⁿ⁻¹ + … + c_n` into `out`.
///
/// First column holds `−c_k`, the superdiagonal holds ones; every other entry
/// is zeroed. `out` must be n×n.
pub fn fill_companion(out: &mut DMatrix<f64>, coeffs: &[f64]) {
    let n = coeffs.len();
    zero_fill(out);
    for (i, &c) in coeffs.iter().enumerate() {
        out[(i, 0)] = -c;
        if i + 1 < n {
            out[(i, i + 1)] = 1.0;
        }
    }
}

/// Allocate and return the companion matrix of the monic polynomial.
pub fn companion_matrix(coeffs: &[f64]) -> DMatrix<f64> {
    let n = coeffs.len();
    let mut m = DMatrix::zeros(n, n);
    fill_companion(&mut m, coeffs);
    m
}

/// Roots of the monic polynomial as eigenvalues of its balanced companion
/// matrix.
///
/// # Errors
/// - [`CarmaError::EigenNonConvergence`] if the Schur iteration stalls.
pub fn polynomial_roots(coeffs: &[f64], max_iter: usize) -> CarmaResult<Vec<Complex<f64>>> {
    if coeffs.is_empty() {
        return Ok(Vec::new());
    }
    let mut m = companion_matrix(coeffs);
    balance(&mut m);
    eigenvalues(m, max_iter)
}

/// Eigenvalues of a real square matrix through its real Schur form.
///
/// # Errors
/// - [`CarmaError::EigenNonConvergence`] if the Schur iteration stalls.
pub fn eigenvalues(m: DMatrix<f64>, max_iter: usize) -> CarmaResult<Vec<Complex<f64>>> {
    let order = m.nrows();
    let schur = Schur::try_new(m, f64::EPSILON, max_iter)
        .ok_or(CarmaError::EigenNonConvergence { order })?;
    Ok(schur.complex_eigenvalues().iter().copied().collect())
}

/// Evaluate the monic polynomial and its derivative at `z` (Horner).
pub fn eval_with_derivative(coeffs: &[f64], z: Complex<f64>) -> (Complex<f64>, Complex<f64>) {
    let mut value = Complex::new(1.0, 0.0);
    let mut deriv = Complex::new(0.0, 0.0);
    for &c in coeffs {
        deriv = deriv * z + value;
        value = value * z + c;
    }
    (value, deriv)
}

/// Product of two monic polynomials, both given without their leading 1.
pub fn multiply_monic(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let full = |c: &[f64]| -> Vec<f64> { std::iter::once(1.0).chain(c.iter().copied()).collect() };
    let a = full(lhs);
    let b = full(rhs);
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out.remove(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Companion layout, root recovery for real and complex roots.
    // - Horner evaluation and monic products.
    //
    // They intentionally DO NOT cover:
    // - Ill-conditioned root clusters (handled by validator tolerances).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the companion layout for z³ + 2z² + 3z + 4.
    //
    // Given
    // -----
    // - `coeffs = [2, 3, 4]`.
    //
    // Expect
    // ------
    // - First column `[-2, -3, -4]`, ones on the superdiagonal, zero elsewhere.
    fn companion_layout() {
        // Arrange / Act
        let m = companion_matrix(&[2.0, 3.0, 4.0]);

        // Assert
        let expected =
            DMatrix::from_row_slice(3, 3, &[-2.0, 1.0, 0.0, -3.0, 0.0, 1.0, -4.0, 0.0, 0.0]);
        assert_eq!(m, expected);
    }

    #[test]
    // Purpose
    // -------
    // Recover a complex-conjugate pair and a real root.
    //
    // Given
    // -----
    // - (z² + z + 1.25)(z + 2) with roots −0.5 ± i and −2.
    //
    // Expect
    // ------
    // - Three roots matching the analytic ones to 1e-10, and each is a zero
    //   of the polynomial.
    fn roots_of_mixed_polynomial() {
        // Arrange
        let coeffs = multiply_monic(&[1.0, 1.25], &[2.0]);

        // Act
        let mut roots = polynomial_roots(&coeffs, 0).expect("Schur converges");
        roots.sort_by(|a, b| a.im.partial_cmp(&b.im).unwrap());

        // Assert
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots[0].re, -0.5, epsilon = 1e-10);
        assert_relative_eq!(roots[0].im, -1.0, epsilon = 1e-10);
        assert_relative_eq!(roots[1].re, -2.0, epsilon = 1e-10);
        assert_relative_eq!(roots[1].im, 0.0, epsilon = 1e-10);
        assert_relative_eq!(roots[2].im, 1.0, epsilon = 1e-10);
        for r in roots {
            let (value, _) = eval_with_derivative(&coeffs, r);
            assert!(value.norm() < 1e-9);
        }
    }

    #[test]
    // Purpose
    // -------
    // Check the monic product and Horner derivative.
    //
    // Given
    // -----
    // - (z + 1)(z + 2) = z² + 3z + 2, evaluated at z = 1.
    //
    // Expect
    // ------
    // - Coefficients `[3, 2]`; value 6 and derivative 5 at z = 1.
    fn product_and_horner() {
        // Arrange / Act
        let coeffs = multiply_monic(&[1.0], &[2.0]);
        let (value, deriv) = eval_with_derivative(&coeffs, Complex::new(1.0, 0.0));

        // Assert
        assert_eq!(coeffs, vec![3.0, 2.0]);
        assert_eq!(value, Complex::new(6.0, 0.0));
        assert_eq!(deriv, Complex::new(5.0, 0.0));
    }
}

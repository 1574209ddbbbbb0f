//! linalg::utils — small dense-matrix helpers shared by the CARMA engine.
//!
//! Purpose
//! -------
//! Collect the handful of matrix operations the engine needs beyond what
//! `nalgebra` exposes directly: zero-filling, a debug dump, Kronecker
//! products, the matrix exponential, diagonal balancing, norms, and bridges
//! between the engine's `nalgebra` buffers and the `ndarray` containers used
//! on the public surface.
//!
//! Key behaviors
//! -------------
//! - [`zero_fill`] resets a buffer in place without reallocating.
//! - [`format_matrix`] / [`view_matrix`] render a matrix for diagnostics;
//!   `view_matrix` writes to stderr and is the only I/O in the crate's
//!   numerical layer.
//! - [`kron`] and [`expm`] provide the Kronecker product and `exp(ξ·A)`.
//! - [`balance`] applies Parlett–Reinsch power-of-two scaling so that
//!   eigenvalue iterations see rows and columns of comparable norm.
//! - [`one_norm`] and [`symmetrize`] support condition estimates and keep
//!   covariance buffers exactly symmetric.
//!
//! Invariants & assumptions
//! ------------------------
//! - All matrices are dense and column-major (`nalgebra` layout).
//! - Square-matrix helpers assume `nrows == ncols`; callers in the engine
//!   only ever pass p×p or p²×p² buffers.
//!
//! Conventions
//! -----------
//! - Balancing returns the scale vector `d` such that the balanced matrix is
//!   `D⁻¹ A D` with `D = diag(d)`.
//! - Bridges copy element by element; they never alias memory.
//!
//! Testing notes
//! -------------
//! - Unit tests check Kronecker layout, balancing similarity, the exponential
//!   of a diagonal matrix, and round trips through the `ndarray` bridges.
use nalgebra::{ComplexField, DMatrix, DVector, Scalar};
use ndarray::{Array1, Array2};

const BALANCE_RADIX: f64 = 2.0;

/// Overwrite every entry of `m` with zero, keeping its allocation.
pub fn zero_fill<T: ComplexField>(m: &mut DMatrix<T>) {
    m.fill(T::zero());
}

/// Render `m` row by row in scientific notation.
pub fn format_matrix<T>(m: &DMatrix<T>) -> String
where
    T: Scalar + std::fmt::LowerExp,
{
    let mut out = String::new();
    for i in 0..m.nrows() {
        let row: Vec<String> = (0..m.ncols()).map(|j| format!("{:>13.6e}", m[(i, j)])).collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

/// Print `m` to stderr with a label; intended for interactive debugging.
pub fn view_matrix<T>(label: &str, m: &DMatrix<T>)
where
    T: Scalar + std::fmt::LowerExp,
{
    eprintln!("{label} ({}x{}):\n{}", m.nrows(), m.ncols(), format_matrix(m));
}

/// Kronecker product `a ⊗ b`.
pub fn kron(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    a.kronecker(b)
}

/// Matrix exponential `exp(xi · a)` via Padé scaling-and-squaring.
pub fn expm(xi: f64, a: &DMatrix<f64>) -> DMatrix<f64> {
    (a * xi).exp()
}

/// Matrix 1-norm: maximum absolute column sum.
pub fn one_norm<T: ComplexField<RealField = f64>>(m: &DMatrix<T>) -> f64 {
    m.column_iter()
        .map(|col| col.iter().map(|x| x.clone().modulus()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Replace `m` by `(m + mᵀ) / 2` in place.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Balance `m` in place and return the diagonal scale factors.
///
/// Repeats radix-2 row/column scaling until no sweep reduces the combined
/// off-diagonal norm by more than 5%. Rows or columns with zero off-diagonal
/// mass are left untouched.
pub fn balance(m: &mut DMatrix<f64>) -> DVector<f64> {
    let n = m.nrows();
    let sqrdx = BALANCE_RADIX * BALANCE_RADIX;
    let mut scale = DVector::from_element(n, 1.0);
    let mut done = false;
    while !done {
        done = true;
        for i in 0..n {
            let mut r = 0.0;
            let mut c = 0.0;
            for j in 0..n {
                if j != i {
                    c += m[(j, i)].abs();
                    r += m[(i, j)].abs();
                }
            }
            if c == 0.0 || r == 0.0 {
                continue;
            }
            let s = c + r;
            let mut f = 1.0;
            let mut g = r / BALANCE_RADIX;
            while c < g {
                f *= BALANCE_RADIX;
                c *= sqrdx;
            }
            g = r * BALANCE_RADIX;
            while c > g {
                f /= BALANCE_RADIX;
                c /= sqrdx;
            }
            if (c + r) / f < 0.95 * s {
                done = false;
                let g = 1.0 / f;
                scale[i] *= f;
                for j in 0..n {
                    m[(i, j)] *= g;
                }
                for j in 0..n {
                    m[(j, i)] *= f;
                }
            }
        }
    }
    scale
}

/// Copy a dense `nalgebra` matrix into an `ndarray` matrix.
pub fn dmatrix_to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Copy a dense `nalgebra` vector into an `ndarray` vector.
pub fn dvector_to_array1(v: &DVector<f64>) -> Array1<f64> {
    Array1::from_iter(v.iter().copied())
}

/// Copy an `ndarray` matrix into a dense `nalgebra` matrix.
pub fn array2_to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Kronecker block layout and the exponential of a diagonal matrix.
    // - Balancing as a similarity transform.
    // - Symmetrization and the ndarray bridges.
    //
    // They intentionally DO NOT cover:
    // - Accuracy of nalgebra's Padé exponential beyond a diagonal case.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that `kron` lays out blocks as `a_ij · b`.
    //
    // Given
    // -----
    // - `a = [[1, 2], [3, 4]]`, `b = I₂`.
    //
    // Expect
    // ------
    // - A 4×4 matrix whose (0, 2) entry is 2 and (3, 1) entry is 3.
    fn kron_places_blocks_row_major_in_blocks() {
        // Arrange
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::<f64>::identity(2, 2);

        // Act
        let k = kron(&a, &b);

        // Assert
        assert_eq!(k.shape(), (4, 4));
        assert_eq!(k[(0, 2)], 2.0);
        assert_eq!(k[(3, 1)], 3.0);
        assert_eq!(k[(3, 3)], 4.0);
        assert_eq!(k[(0, 1)], 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Check `expm` against the closed form for a diagonal matrix.
    //
    // Given
    // -----
    // - `A = diag(-1, -2)`, `ξ = 0.5`.
    //
    // Expect
    // ------
    // - `exp(ξA) = diag(e^{-0.5}, e^{-1})`.
    fn expm_of_diagonal_matches_scalar_exponentials() {
        // Arrange
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, -2.0]));

        // Act
        let e = expm(0.5, &a);

        // Assert
        assert_relative_eq!(e[(0, 0)], (-0.5f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(1, 1)], (-1.0f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Ensure balancing is a diagonal similarity: `D⁻¹ A D` reproduces the
    // balanced matrix.
    //
    // Given
    // -----
    // - A badly scaled 3×3 companion-like matrix.
    //
    // Expect
    // ------
    // - Reconstructing `D⁻¹ A D` from the returned scales matches the balanced
    //   matrix, and every scale is a power of two.
    fn balance_is_power_of_two_similarity() {
        // Arrange
        let a = DMatrix::from_row_slice(3, 3, &[-1e3, 1.0, 0.0, -1e6, 0.0, 1.0, -1e8, 0.0, 0.0]);
        let mut balanced = a.clone();

        // Act
        let d = balance(&mut balanced);

        // Assert
        for i in 0..3 {
            assert_eq!(d[i].log2().fract(), 0.0);
            for j in 0..3 {
                assert_relative_eq!(
                    balanced[(i, j)],
                    a[(i, j)] * d[j] / d[i],
                    max_relative = 1e-14
                );
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Verify `symmetrize`, `one_norm`, and the ndarray bridges.
    //
    // Given
    // -----
    // - `m = [[1, 2], [4, -3]]`.
    //
    // Expect
    // ------
    // - Off-diagonals become 3; the 1-norm of the original is 5; the bridge
    //   round trip is lossless.
    fn symmetrize_norm_and_bridges() {
        // Arrange
        let arr = array![[1.0, 2.0], [4.0, -3.0]];
        let mut m = array2_to_dmatrix(&arr);

        // Act
        let norm = one_norm(&m);
        symmetrize(&mut m);
        let back = dmatrix_to_array2(&m);

        // Assert
        assert_eq!(norm, 5.0);
        assert_eq!(back, array![[1.0, 3.0], [3.0, -3.0]]);
        assert_eq!(dvector_to_array1(&DVector::from_vec(vec![1.0, 2.0])), array![1.0, 2.0]);
    }

    #[test]
    // Purpose
    // -------
    // Smoke-test `zero_fill` and `format_matrix`.
    //
    // Given
    // -----
    // - A 2×2 matrix of ones.
    //
    // Expect
    // ------
    // - All zeros after `zero_fill`; two rendered lines.
    fn zero_fill_and_format() {
        // Arrange
        let mut m = DMatrix::from_element(2, 2, 1.0);

        // Act
        zero_fill(&mut m);
        let text = format_matrix(&m);

        // Assert
        assert!(m.iter().all(|&x| x == 0.0));
        assert_eq!(text.lines().count(), 2);
    }
}

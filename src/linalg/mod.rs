//! linalg — dense-matrix utilities used by the CARMA engine.
//!
//! The engine keeps its internal buffers in `nalgebra` types (complex LU,
//! Schur, Cholesky and symmetric eigen-solvers are all pure Rust and single
//! threaded) and publishes results as `ndarray` containers. This module holds
//! the glue between the two plus a few primitives (`kron`, `expm`,
//! `balance`) that the spectral and noise layers build on.

pub mod utils;

pub use self::utils::{
    array2_to_dmatrix, balance, dmatrix_to_array2, dvector_to_array1, expm, format_matrix, kron,
    one_norm, symmetrize, view_matrix, zero_fill,
};

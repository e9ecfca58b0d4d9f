//! Blanchard–Kahn check of a linearized system
//! `A x[-1] + B x + C E[x[1]] + D ε = 0`.
//!
//! The system is written as a first-order pencil over the base variables and
//! one companion row per forward-looking variable. Its generalized eigenvalues
//! come from an ordered complex QZ decomposition ([qz::generalized_schur]).
//! The condition holds when there are at least as many eigenvalues outside the
//! unit circle as forward-looking variables.
//!
//! Decomposition failures are an ordinary outcome here: [check_bk_condition]
//! reports them as `false` so a caller looping over parameter draws never
//! aborts.

pub mod qz;

use nalgebra::DMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use qz::{generalized_schur, GeneralizedSchur, C64};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StabilityError {
    #[error("Pencil matrices must be square and of equal size, got {a:?} and {b:?}")]
    ShapeMismatch {
        a: (usize, usize),
        b: (usize, usize),
    },
    #[error("System matrices contain non-finite values")]
    NonFinite,
    #[error("Singular pencil: both diagonal factors vanish at position {0}")]
    SingularPencil(usize),
    #[error("QZ iteration did not converge within {0} sweeps")]
    NoConvergence(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityOptions {
    /// Threshold for forward-looking columns and for dropping eigenvalues
    /// with a vanishing denominator
    pub tol: f64,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        StabilityOptions { tol: 1e-8 }
    }
}

impl StabilityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EigenvalueRecord {
    pub modulus: f64,
    pub real: f64,
    pub imaginary: f64,
}

impl From<C64> for EigenvalueRecord {
    fn from(lambda: C64) -> Self {
        EigenvalueRecord {
            modulus: lambda.norm(),
            real: lambda.re,
            imaginary: lambda.im,
        }
    }
}

/// Generalized eigenvalues sorted ascending by modulus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eigenvalues {
    records: Vec<EigenvalueRecord>,
    n_forward: usize,
}

impl Eigenvalues {
    pub fn records(&self) -> &[EigenvalueRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of forward-looking variables of the system
    pub fn n_forward(&self) -> usize {
        self.n_forward
    }

    /// Number of eigenvalues with modulus > 1
    pub fn n_unstable(&self) -> usize {
        self.records.iter().filter(|r| r.modulus > 1.0).count()
    }

    /// One row per eigenvalue, columns `modulus`, `real`, `imaginary`
    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.records.len(), 3));
        for (mut row, record) in out.rows_mut().into_iter().zip(&self.records) {
            row[0] = record.modulus;
            row[1] = record.real;
            row[2] = record.imaginary;
        }
        out
    }
}

/// Outcome of the Blanchard–Kahn check
#[derive(Debug, Clone, PartialEq)]
pub enum BlanchardKahn {
    Satisfied {
        n_forward: usize,
        n_unstable: usize,
    },
    Violated {
        n_forward: usize,
        n_unstable: usize,
    },
    NoValidDecomposition(StabilityError),
}

impl BlanchardKahn {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, BlanchardKahn::Satisfied { .. })
    }
}

/// Columns of `c` whose absolute sum exceeds `tol`
pub fn forward_looking_columns(c: &DMatrix<f64>, tol: f64) -> Vec<usize> {
    c.column_iter()
        .enumerate()
        .filter(|(_, col)| col.iter().map(|v| v.abs()).sum::<f64>() > tol)
        .map(|(j, _)| j)
        .collect()
}

fn check_shapes(a: &DMatrix<f64>, b: &DMatrix<f64>, c: &DMatrix<f64>) -> Result<(), StabilityError> {
    let n = b.nrows();
    for m in [a, b, c] {
        if m.shape() != (n, n) {
            return Err(StabilityError::ShapeMismatch {
                a: m.shape(),
                b: b.shape(),
            });
        }
    }
    if a.iter().chain(b.iter()).chain(c.iter()).any(|v| !v.is_finite()) {
        return Err(StabilityError::NonFinite);
    }
    Ok(())
}

// Γ0 = [B, C; -I, 0] and Γ1 = [A, 0; 0, I], restricted to the base rows and
// the companion rows of the forward-looking variables.
fn companion_pencil(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    c: &DMatrix<f64>,
    forward: &[usize],
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = b.nrows();
    let idx: Vec<usize> = (0..n).chain(forward.iter().map(|j| n + j)).collect();

    let mut gamma_0 = DMatrix::zeros(2 * n, 2 * n);
    let mut gamma_1 = DMatrix::zeros(2 * n, 2 * n);
    gamma_0.view_mut((0, 0), (n, n)).copy_from(b);
    gamma_0.view_mut((0, n), (n, n)).copy_from(c);
    gamma_1.view_mut((0, 0), (n, n)).copy_from(a);
    for i in 0..n {
        gamma_0[(n + i, i)] = -1.0;
        gamma_1[(n + i, n + i)] = 1.0;
    }

    (
        gamma_0.select_rows(&idx).select_columns(&idx),
        gamma_1.select_rows(&idx).select_columns(&idx),
    )
}

/// Generalized eigenvalues of the linearized system, sorted by modulus.
pub fn compute_eigenvalues(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    c: &DMatrix<f64>,
    options: &StabilityOptions,
) -> Result<Eigenvalues, StabilityError> {
    check_shapes(a, b, c)?;
    let tol = options.tol;
    let forward = forward_looking_columns(c, tol);
    let (gamma_0, gamma_1) = companion_pencil(a, b, c, &forward);

    let lhs = gamma_1.map(|v| C64::new(v, 0.0));
    let rhs = gamma_0.map(|v| C64::new(-v, 0.0));
    let schur = generalized_schur(&lhs, &rhs, |alpha, beta| alpha.norm() <= beta.norm())?;

    let mut dropped = 0;
    let mut records: Vec<EigenvalueRecord> = Vec::with_capacity(schur.aa.nrows());
    for (alpha, beta) in schur.diagonal_pairs() {
        let denominator = beta + tol;
        if denominator.norm() <= tol {
            dropped += 1;
            continue;
        }
        records.push((alpha / denominator).into());
    }
    if dropped > 0 {
        tracing::warn!(dropped, "Dropped eigenvalues with a vanishing denominator");
    }
    records.sort_by(|x, y| x.modulus.total_cmp(&y.modulus));

    Ok(Eigenvalues {
        records,
        n_forward: forward.len(),
    })
}

/// Run the Blanchard–Kahn check, keeping decomposition failures as an
/// explicit outcome.
pub fn blanchard_kahn(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    c: &DMatrix<f64>,
    options: &StabilityOptions,
) -> BlanchardKahn {
    let eigenvalues = match compute_eigenvalues(a, b, c, options) {
        Ok(eigenvalues) => eigenvalues,
        Err(e) => {
            tracing::warn!(error = %e, "No valid decomposition for the Blanchard-Kahn check");
            return BlanchardKahn::NoValidDecomposition(e);
        }
    };
    let n_forward = eigenvalues.n_forward();
    let n_unstable = eigenvalues.n_unstable();
    tracing::debug!(n_forward, n_unstable, "Blanchard-Kahn check");
    if n_unstable >= n_forward {
        BlanchardKahn::Satisfied {
            n_forward,
            n_unstable,
        }
    } else {
        BlanchardKahn::Violated {
            n_forward,
            n_unstable,
        }
    }
}

/// `true` when the system satisfies the Blanchard–Kahn condition. Any
/// decomposition failure reads as `false`.
pub fn check_bk_condition(a: &DMatrix<f64>, b: &DMatrix<f64>, c: &DMatrix<f64>, tol: f64) -> bool {
    blanchard_kahn(a, b, c, &StabilityOptions::new().with_tol(tol)).is_satisfied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar(v: f64) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, v)
    }

    #[test]
    fn test_backward_ar1() {
        let (a, b, c) = (scalar(-0.9), scalar(1.0), scalar(0.0));
        let eig = compute_eigenvalues(&a, &b, &c, &StabilityOptions::new()).unwrap();
        assert_eq!(eig.len(), 1);
        assert_eq!(eig.n_forward(), 0);
        assert_relative_eq!(eig.records()[0].real, 0.9, epsilon = 1e-6);
        assert!(check_bk_condition(&a, &b, &c, 1e-8));
    }

    #[test]
    fn test_forward_looking_root() {
        // y = b E[y[1]]
        for (discount, expected) in [(0.99, true), (1.5, false)] {
            let (a, b, c) = (scalar(0.0), scalar(1.0), scalar(-discount));
            let eig = compute_eigenvalues(&a, &b, &c, &StabilityOptions::new()).unwrap();
            assert_eq!(eig.n_forward(), 1);
            let moduli: Vec<f64> = eig.records().iter().map(|r| r.modulus).collect();
            assert_relative_eq!(moduli[0], 0.0, epsilon = 1e-6);
            assert_relative_eq!(moduli[1], 1.0 / discount, epsilon = 1e-6);
            assert_eq!(check_bk_condition(&a, &b, &c, 1e-8), expected);
        }
    }

    #[test]
    fn test_outcomes() {
        let (a, b, c) = (scalar(0.0), scalar(1.0), scalar(-1.5));
        assert_eq!(
            blanchard_kahn(&a, &b, &c, &StabilityOptions::default()),
            BlanchardKahn::Violated {
                n_forward: 1,
                n_unstable: 0
            }
        );

        let zero = scalar(0.0);
        let outcome = blanchard_kahn(&zero, &zero, &zero, &StabilityOptions::default());
        assert!(matches!(
            outcome,
            BlanchardKahn::NoValidDecomposition(StabilityError::SingularPencil(_))
        ));
        assert!(!check_bk_condition(&zero, &zero, &zero, 1e-8));
    }

    #[test]
    fn test_degenerate_input_is_false() {
        let a = DMatrix::zeros(2, 3);
        let b = DMatrix::identity(2, 2);
        assert!(!check_bk_condition(&a, &b, &b, 1e-8));

        let nan = scalar(f64::NAN);
        assert!(!check_bk_condition(&nan, &scalar(1.0), &scalar(0.0), 1e-8));
    }

    #[test]
    fn test_forward_looking_columns() {
        let c = DMatrix::from_row_slice(2, 3, &[0.0, 1e-10, -0.5, 0.0, 0.0, 0.2]);
        assert_eq!(forward_looking_columns(&c, 1e-8), vec![2]);
    }

    #[test]
    fn test_eigenvalue_table() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![-0.5, -0.25]));
        let b = DMatrix::identity(2, 2);
        let c = DMatrix::zeros(2, 2);
        let eig = compute_eigenvalues(&a, &b, &c, &StabilityOptions::new()).unwrap();
        let table = eig.to_array();
        assert_eq!(table.shape(), &[2, 3]);
        assert_relative_eq!(table[[0, 0]], 0.25, epsilon = 1e-6);
        assert_relative_eq!(table[[1, 1]], 0.5, epsilon = 1e-6);
        assert_eq!(eig.n_unstable(), 0);
    }
}

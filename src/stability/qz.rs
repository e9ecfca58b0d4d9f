//! Ordered complex generalized Schur (QZ) decomposition.
//!
//! For a square pencil `(A, B)` this computes unitary `Q`, `Z` and upper
//! triangular `S`, `T` with `A = Q S Zᴴ` and `B = Q T Zᴴ`. The generalized
//! eigenvalues are `S[i, i] / T[i, i]`. Eigenvalues accepted by the selection
//! predicate are moved to the leading block.
//!
//! The reduction follows the textbook path: Givens QR of `B`,
//! Hessenberg-triangular reduction, single-shift implicit QZ sweeps with
//! deflation, then adjacent swaps for the reordering.

use nalgebra::{Complex, DMatrix};

use super::StabilityError;

pub type C64 = Complex<f64>;

const EXCEPTIONAL_SHIFT_EVERY: usize = 10;
const MAX_SWEEPS_PER_EIGENVALUE: usize = 30;

/// Plane rotation `G = [[c, s], [-s̄, c]]` with real `c`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rotation {
    c: f64,
    s: C64,
}

impl Rotation {
    fn identity() -> Self {
        Rotation {
            c: 1.0,
            s: C64::new(0.0, 0.0),
        }
    }

    /// Rotation with `G [f, g]ᵀ = [r, 0]ᵀ`
    fn new(f: C64, g: C64) -> Self {
        let (fa, ga) = (f.norm(), g.norm());
        if ga == 0.0 {
            return Rotation::identity();
        }
        if fa == 0.0 {
            return Rotation {
                c: 0.0,
                s: g.conj() / ga,
            };
        }
        let norm = fa.hypot(ga);
        Rotation {
            c: fa / norm,
            s: (f / fa) * g.conj() / norm,
        }
    }

    /// Rotation with `[x1, x2] Gᴴ = [0, r]`, for use on columns
    fn zeroing_left(x1: C64, x2: C64) -> Self {
        let (a1, a2) = (x1.norm(), x2.norm());
        if a1 == 0.0 {
            return Rotation::identity();
        }
        if a2 == 0.0 {
            return Rotation {
                c: 0.0,
                s: C64::new(1.0, 0.0),
            };
        }
        let norm = a1.hypot(a2);
        let c = a2 / norm;
        Rotation {
            c,
            s: -(x1.conj() / x2.conj()) * c,
        }
    }

    /// `M ← G M` on rows `i` and `j`
    fn rotate_rows(&self, m: &mut DMatrix<C64>, i: usize, j: usize) {
        for k in 0..m.ncols() {
            let (x, y) = (m[(i, k)], m[(j, k)]);
            m[(i, k)] = x * self.c + self.s * y;
            m[(j, k)] = -self.s.conj() * x + y * self.c;
        }
    }

    /// `M ← M Gᴴ` on columns `i` and `j`
    fn rotate_cols(&self, m: &mut DMatrix<C64>, i: usize, j: usize) {
        for k in 0..m.nrows() {
            let (x, y) = (m[(k, i)], m[(k, j)]);
            m[(k, i)] = x * self.c + y * self.s.conj();
            m[(k, j)] = -x * self.s + y * self.c;
        }
    }
}

/// Result of [generalized_schur]
#[derive(Debug, Clone)]
pub struct GeneralizedSchur {
    pub aa: DMatrix<C64>,
    pub bb: DMatrix<C64>,
    pub q: DMatrix<C64>,
    pub z: DMatrix<C64>,
    /// Number of leading eigenvalues accepted by the selection predicate
    pub n_selected: usize,
}

impl GeneralizedSchur {
    /// Diagonal pairs `(α_i, β_i)`; the eigenvalues are `α_i / β_i`
    pub fn diagonal_pairs(&self) -> Vec<(C64, C64)> {
        (0..self.aa.nrows())
            .map(|i| (self.aa[(i, i)], self.bb[(i, i)]))
            .collect()
    }
}

struct Pencil {
    s: DMatrix<C64>,
    t: DMatrix<C64>,
    q: DMatrix<C64>,
    z: DMatrix<C64>,
}

impl Pencil {
    fn rows(&mut self, r: &Rotation, i: usize, j: usize) {
        r.rotate_rows(&mut self.s, i, j);
        r.rotate_rows(&mut self.t, i, j);
        r.rotate_cols(&mut self.q, i, j);
    }

    fn cols(&mut self, r: &Rotation, i: usize, j: usize) {
        r.rotate_cols(&mut self.s, i, j);
        r.rotate_cols(&mut self.t, i, j);
        r.rotate_cols(&mut self.z, i, j);
    }

    fn n(&self) -> usize {
        self.s.nrows()
    }

    fn triangularize_t(&mut self) {
        let n = self.n();
        for j in 0..n {
            for i in (j + 1..n).rev() {
                let r = Rotation::new(self.t[(i - 1, j)], self.t[(i, j)]);
                self.rows(&r, i - 1, i);
                self.t[(i, j)] = C64::new(0.0, 0.0);
            }
        }
    }

    fn hessenberg_triangular(&mut self) {
        let n = self.n();
        for j in 0..n.saturating_sub(2) {
            for i in (j + 2..n).rev() {
                let r = Rotation::new(self.s[(i - 1, j)], self.s[(i, j)]);
                self.rows(&r, i - 1, i);
                self.s[(i, j)] = C64::new(0.0, 0.0);

                let w = Rotation::zeroing_left(self.t[(i, i - 1)], self.t[(i, i)]);
                self.cols(&w, i - 1, i);
                self.t[(i, i - 1)] = C64::new(0.0, 0.0);
            }
        }
    }

    // Move a zero at T[j, j] down to T[ihi, ihi] and split off an infinite
    // eigenvalue there.
    fn deflate_infinite(&mut self, j: usize, ilo: usize, ihi: usize) {
        for jj in j..ihi {
            let r = Rotation::new(self.t[(jj, jj + 1)], self.t[(jj + 1, jj + 1)]);
            self.rows(&r, jj, jj + 1);
            self.t[(jj + 1, jj + 1)] = C64::new(0.0, 0.0);
            if jj > ilo {
                let w = Rotation::zeroing_left(self.s[(jj + 1, jj - 1)], self.s[(jj + 1, jj)]);
                self.cols(&w, jj - 1, jj);
                self.s[(jj + 1, jj - 1)] = C64::new(0.0, 0.0);
            }
        }
        let w = Rotation::zeroing_left(self.s[(ihi, ihi - 1)], self.s[(ihi, ihi)]);
        self.cols(&w, ihi - 1, ihi);
        self.s[(ihi, ihi - 1)] = C64::new(0.0, 0.0);
        self.t[(ihi, ihi - 1)] = C64::new(0.0, 0.0);
    }

    // Eigenvalue of the trailing 2x2 block closest to its last diagonal ratio
    fn wilkinson_shift(&self, ihi: usize) -> C64 {
        let (k, l) = (ihi - 1, ihi);
        let (h11, h12, h21, h22) = (self.s[(k, k)], self.s[(k, l)], self.s[(l, k)], self.s[(l, l)]);
        let (t11, t12, t22) = (self.t[(k, k)], self.t[(k, l)], self.t[(l, l)]);

        let a = t11 * t22;
        let b = -(h11 * t22 + h22 * t11 - h21 * t12);
        let c = h11 * h22 - h12 * h21;
        let target = h22 / t22;

        let disc = (b * b - a * c * 4.0).sqrt();
        let roots = [(-b + disc) / (a * 2.0), (-b - disc) / (a * 2.0)];
        let best = roots
            .into_iter()
            .filter(|r| r.re.is_finite() && r.im.is_finite())
            .min_by(|x, y| (x - target).norm().total_cmp(&(y - target).norm()));
        best.unwrap_or(target)
    }

    fn sweep(&mut self, ilo: usize, ihi: usize, shift: C64) {
        let r = Rotation::new(
            self.s[(ilo, ilo)] - shift * self.t[(ilo, ilo)],
            self.s[(ilo + 1, ilo)],
        );
        self.rows(&r, ilo, ilo + 1);

        for k in ilo..ihi {
            let w = Rotation::zeroing_left(self.t[(k + 1, k)], self.t[(k + 1, k + 1)]);
            self.cols(&w, k, k + 1);
            self.t[(k + 1, k)] = C64::new(0.0, 0.0);

            if k + 2 <= ihi {
                let r = Rotation::new(self.s[(k + 1, k)], self.s[(k + 2, k)]);
                self.rows(&r, k + 1, k + 2);
                self.s[(k + 2, k)] = C64::new(0.0, 0.0);
            }
        }
    }

    fn iterate(&mut self) -> Result<(), StabilityError> {
        let n = self.n();
        if n < 2 {
            return Ok(());
        }
        let eps = f64::EPSILON;
        let s_norm = self.s.norm();
        let t_norm = self.t.norm();
        let max_sweeps = MAX_SWEEPS_PER_EIGENVALUE * n;

        let mut ihi = n - 1;
        let mut sweeps = 0;
        let mut since_deflation = 0;
        while ihi > 0 {
            let mut ilo = 0;
            for k in (1..=ihi).rev() {
                let scale = self.s[(k - 1, k - 1)].norm() + self.s[(k, k)].norm();
                let scale = if scale > 0.0 { scale } else { s_norm };
                if self.s[(k, k - 1)].norm() <= eps * scale {
                    self.s[(k, k - 1)] = C64::new(0.0, 0.0);
                    ilo = k;
                    break;
                }
            }

            if ilo == ihi {
                ihi -= 1;
                since_deflation = 0;
                continue;
            }

            if let Some(j) = (ilo..=ihi).find(|&j| self.t[(j, j)].norm() <= eps * t_norm) {
                self.deflate_infinite(j, ilo, ihi);
                ihi -= 1;
                since_deflation = 0;
                continue;
            }

            sweeps += 1;
            since_deflation += 1;
            if sweeps > max_sweeps {
                return Err(StabilityError::NoConvergence(max_sweeps));
            }

            let shift = if since_deflation % EXCEPTIONAL_SHIFT_EVERY == 0 {
                self.s[(ihi, ihi)] / self.t[(ihi, ihi)]
                    + self.s[(ihi, ihi - 1)] / self.t[(ihi - 1, ihi - 1)]
            } else {
                self.wilkinson_shift(ihi)
            };
            self.sweep(ilo, ihi, shift);
        }

        for i in 1..n {
            for j in 0..i {
                self.s[(i, j)] = C64::new(0.0, 0.0);
                self.t[(i, j)] = C64::new(0.0, 0.0);
            }
        }
        Ok(())
    }

    // Exchange the diagonal entries at k and k + 1.
    fn swap(&mut self, k: usize) {
        let l = k + 1;
        let (a11, a12, a22) = (self.s[(k, k)], self.s[(k, l)], self.s[(l, l)]);
        let (b11, b12, b22) = (self.t[(k, k)], self.t[(k, l)], self.t[(l, l)]);

        let f = b22 * a11 - a22 * b11;
        let g = b22 * a12 - a22 * b12;
        let scale = (a11.norm() + a12.norm() + a22.norm()) * (b11.norm() + b12.norm() + b22.norm());
        if f.norm() + g.norm() <= f64::EPSILON * scale {
            return;
        }

        let w = Rotation::zeroing_left(f, g);
        self.cols(&w, k, l);

        let r = if self.s[(k, k)].norm() + self.s[(l, k)].norm()
            >= self.t[(k, k)].norm() + self.t[(l, k)].norm()
        {
            Rotation::new(self.s[(k, k)], self.s[(l, k)])
        } else {
            Rotation::new(self.t[(k, k)], self.t[(l, k)])
        };
        self.rows(&r, k, l);
        self.s[(l, k)] = C64::new(0.0, 0.0);
        self.t[(l, k)] = C64::new(0.0, 0.0);
    }

    fn reorder(&mut self, select: &dyn Fn(C64, C64) -> bool) -> usize {
        let mut n_selected = 0;
        for i in 0..self.n() {
            if !select(self.s[(i, i)], self.t[(i, i)]) {
                continue;
            }
            for k in (n_selected..i).rev() {
                self.swap(k);
            }
            n_selected += 1;
        }
        n_selected
    }
}

/// Ordered generalized Schur decomposition of the pencil `(a, b)`.
///
/// `select(α, β)` decides whether the eigenvalue `α / β` belongs to the
/// leading block. A pencil with `S[i, i] ≈ T[i, i] ≈ 0` for some `i` has no
/// well defined spectrum and is reported as [StabilityError::SingularPencil].
pub fn generalized_schur(
    a: &DMatrix<C64>,
    b: &DMatrix<C64>,
    select: impl Fn(C64, C64) -> bool,
) -> Result<GeneralizedSchur, StabilityError> {
    let n = a.nrows();
    if a.ncols() != n || b.nrows() != n || b.ncols() != n {
        return Err(StabilityError::ShapeMismatch {
            a: a.shape(),
            b: b.shape(),
        });
    }
    if a.iter().chain(b.iter()).any(|v| !(v.re.is_finite() && v.im.is_finite())) {
        return Err(StabilityError::NonFinite);
    }

    let mut pencil = Pencil {
        s: a.clone(),
        t: b.clone(),
        q: DMatrix::identity(n, n),
        z: DMatrix::identity(n, n),
    };
    pencil.triangularize_t();
    pencil.hessenberg_triangular();
    pencil.iterate()?;

    let tol = f64::EPSILON * n.max(1) as f64;
    let (s_norm, t_norm) = (pencil.s.norm(), pencil.t.norm());
    if let Some(i) = (0..n).find(|&i| {
        pencil.s[(i, i)].norm() <= tol * s_norm && pencil.t[(i, i)].norm() <= tol * t_norm
    }) {
        return Err(StabilityError::SingularPencil(i));
    }

    let n_selected = pencil.reorder(&select);
    tracing::trace!(n, n_selected, "Generalized Schur decomposition");

    Ok(GeneralizedSchur {
        aa: pencil.s,
        bb: pencil.t,
        q: pencil.q,
        z: pencil.z,
        n_selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn complex(rows: usize, cols: usize, values: &[f64]) -> DMatrix<C64> {
        DMatrix::from_row_slice(rows, cols, values).map(|v| C64::new(v, 0.0))
    }

    fn max_abs(m: &DMatrix<C64>) -> f64 {
        m.iter().map(|v| v.norm()).fold(0.0, f64::max)
    }

    fn assert_decomposes(a: &DMatrix<C64>, b: &DMatrix<C64>, qz: &GeneralizedSchur) {
        let n = a.nrows();
        let eye = DMatrix::<C64>::identity(n, n);
        assert!(max_abs(&(&qz.q * &qz.aa * qz.z.adjoint() - a)) < 1e-10);
        assert!(max_abs(&(&qz.q * &qz.bb * qz.z.adjoint() - b)) < 1e-10);
        assert!(max_abs(&(qz.q.adjoint() * &qz.q - &eye)) < 1e-12);
        assert!(max_abs(&(qz.z.adjoint() * &qz.z - &eye)) < 1e-12);
        for i in 1..n {
            for j in 0..i {
                assert_eq!(qz.aa[(i, j)], C64::new(0.0, 0.0));
                assert_eq!(qz.bb[(i, j)], C64::new(0.0, 0.0));
            }
        }
    }

    fn eigenvalues(qz: &GeneralizedSchur) -> Vec<C64> {
        qz.diagonal_pairs().into_iter().map(|(a, b)| a / b).collect()
    }

    #[test]
    fn test_rotations() {
        let (f, g) = (C64::new(1.0, 2.0), C64::new(-3.0, 0.5));
        let mut m = DMatrix::from_row_slice(2, 1, &[f, g]);
        Rotation::new(f, g).rotate_rows(&mut m, 0, 1);
        assert_relative_eq!(m[(1, 0)].norm(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(m[(0, 0)].norm(), f.norm().hypot(g.norm()), epsilon = 1e-14);

        let mut m = DMatrix::from_row_slice(1, 2, &[f, g]);
        Rotation::zeroing_left(f, g).rotate_cols(&mut m, 0, 1);
        assert_relative_eq!(m[(0, 0)].norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_reconstruction() {
        let a = complex(4, 4, &[
            1.0, 2.0, 0.5, -1.0,
            0.3, -1.0, 2.0, 0.0,
            4.0, 0.1, 1.0, 1.5,
            -2.0, 0.7, 0.2, 3.0,
        ]);
        let b = complex(4, 4, &[
            2.0, 0.0, 1.0, 0.5,
            1.0, 3.0, 0.0, -0.4,
            0.0, 1.0, 1.0, 0.0,
            0.5, 0.0, -1.0, 2.0,
        ]);
        let qz = generalized_schur(&a, &b, |_, _| false).unwrap();
        assert_decomposes(&a, &b, &qz);
        assert_eq!(qz.n_selected, 0);
    }

    #[test]
    fn test_triangular_pencil_eigenvalues() {
        let a = complex(3, 3, &[3.0, 1.0, 0.0, 0.0, 0.5, 2.0, 0.0, 0.0, -1.5]);
        let b = DMatrix::identity(3, 3);
        let qz = generalized_schur(&a, &b, |_, _| false).unwrap();
        let mut moduli: Vec<f64> = eigenvalues(&qz).iter().map(|l| l.norm()).collect();
        moduli.sort_by(f64::total_cmp);
        assert_relative_eq!(moduli[0], 0.5, epsilon = 1e-10);
        assert_relative_eq!(moduli[1], 1.5, epsilon = 1e-10);
        assert_relative_eq!(moduli[2], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_complex_eigenvalues() {
        // Rotation by 90 degrees scaled by 2: eigenvalues ±2i
        let a = complex(2, 2, &[0.0, -2.0, 2.0, 0.0]);
        let b = DMatrix::identity(2, 2);
        let qz = generalized_schur(&a, &b, |_, _| false).unwrap();
        assert_decomposes(&a, &b, &qz);
        for lambda in eigenvalues(&qz) {
            assert_relative_eq!(lambda.re, 0.0, epsilon = 1e-10);
            assert_relative_eq!(lambda.im.abs(), 2.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_ordering_inside_unit_circle_first() {
        let a = complex(4, 4, &[
            2.5, 1.0, 0.0, 0.3,
            0.0, 0.2, 1.0, 0.0,
            0.0, 0.0, 1.7, 0.4,
            0.0, 0.0, 0.0, -0.6,
        ]);
        let b = complex(4, 4, &[
            1.0, 0.2, 0.1, 0.0,
            0.0, 1.0, 0.0, 0.3,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]);
        let qz = generalized_schur(&a, &b, |alpha, beta| alpha.norm() <= beta.norm()).unwrap();
        assert_decomposes(&a, &b, &qz);
        assert_eq!(qz.n_selected, 2);

        let lambdas = eigenvalues(&qz);
        assert!(lambdas[..2].iter().all(|l| l.norm() <= 1.0));
        assert!(lambdas[2..].iter().all(|l| l.norm() > 1.0));
    }

    #[test]
    fn test_infinite_eigenvalue() {
        let a = complex(2, 2, &[1.0, 2.0, 0.5, 1.0]);
        let b = complex(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let qz = generalized_schur(&a, &b, |_, _| false).unwrap();
        assert_decomposes(&a, &b, &qz);
        let pairs = qz.diagonal_pairs();
        assert_eq!(pairs.iter().filter(|(_, beta)| beta.norm() < 1e-12).count(), 1);
    }

    #[test]
    fn test_invalid_input() {
        let a = complex(2, 3, &[0.0; 6]);
        let b = complex(2, 2, &[0.0; 4]);
        assert!(matches!(
            generalized_schur(&a, &b, |_, _| true),
            Err(StabilityError::ShapeMismatch { .. })
        ));

        let a = complex(1, 1, &[f64::NAN]);
        let b = complex(1, 1, &[1.0]);
        assert_eq!(
            generalized_schur(&a, &b, |_, _| true).unwrap_err(),
            StabilityError::NonFinite
        );

        let zero = complex(2, 2, &[0.0; 4]);
        assert!(matches!(
            generalized_schur(&zero, &zero, |_, _| true),
            Err(StabilityError::SingularPencil(_))
        ));
    }
}

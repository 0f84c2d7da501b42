//! Dense linear-algebra kernels used throughout the walk.
//!
//! Conventions: a determinant is stored as an `nbasis × nelec` matrix of
//! orbital coefficients. The (mixed) Green's function between a left
//! determinant A and a right determinant B is
//!
//!   G = B (A† B)⁻¹ A†
//!
//! so that `G[(i, i)]` is the occupation of site/orbital `i`.

use nalgebra::{Complex, DMatrix, DVector};

use crate::error::{AfqmcError, Result};

pub type Complex64 = Complex<f64>;

pub const ZERO: Complex64 = Complex { re: 0.0, im: 0.0 };
pub const ONE: Complex64 = Complex { re: 1.0, im: 0.0 };

/// Promote a real matrix to complex.
pub fn to_complex(m: &DMatrix<f64>) -> DMatrix<Complex64> {
    m.map(|x| Complex64::new(x, 0.0))
}

/// Diagonalise a real symmetric matrix, eigenpairs sorted by eigenvalue.
pub fn diagonalise_sorted(h: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let eig = h.clone().symmetric_eigen();
    let n = eig.eigenvalues.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let values = DVector::from_iterator(n, order.iter().map(|&i| eig.eigenvalues[i]));
    let mut vectors = DMatrix::zeros(h.nrows(), n);
    for (col, &i) in order.iter().enumerate() {
        vectors.set_column(col, &eig.eigenvectors.column(i));
    }
    (values, vectors)
}

/// exp(scale * h) for real symmetric `h`.
pub fn expm_symmetric(h: &DMatrix<f64>, scale: f64) -> DMatrix<f64> {
    let (values, vectors) = diagonalise_sorted(h);
    let diag = DMatrix::from_diagonal(&values.map(|x| (scale * x).exp()));
    &vectors * diag * vectors.transpose()
}

/// Overlap ⟨A|B⟩ = det(A† B).
pub fn overlap(a: &DMatrix<Complex64>, b: &DMatrix<Complex64>) -> Complex64 {
    (a.adjoint() * b).determinant()
}

/// Green's function G = B (A† B)⁻¹ A† together with the overlap det(A† B).
pub fn gab(a: &DMatrix<Complex64>, b: &DMatrix<Complex64>) -> Result<(DMatrix<Complex64>, Complex64)> {
    let ovlp = a.adjoint() * b;
    let det = ovlp.determinant();
    let inv = ovlp
        .try_inverse()
        .ok_or_else(|| AfqmcError::Singular("overlap matrix A†B".to_string()))?;
    Ok((b * inv * a.adjoint(), det))
}

/// Modified QR stabilisation of a single determinant.
///
/// Replaces `phi` with orthonormal columns spanning the same space and
/// returns det(R). Phases of diag(R) are moved into Q so det(R) is real
/// and positive; a zero return means the columns were numerically
/// degenerate and `phi` has been left untouched.
pub fn reortho(phi: &mut DMatrix<Complex64>) -> f64 {
    if phi.ncols() == 0 {
        return 1.0;
    }
    let qr = phi.clone().qr();
    let mut q = qr.q();
    let r = qr.r();

    let tol = 1e-12 * r.norm();
    let mut det_r = 1.0;
    for i in 0..r.nrows().min(r.ncols()) {
        let rii = r[(i, i)];
        let norm = rii.norm();
        if norm <= tol || !norm.is_finite() {
            return 0.0;
        }
        let phase = rii / norm;
        let mut column = q.column_mut(i);
        column *= phase;
        det_r *= norm;
    }
    *phi = q;
    det_r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn random_determinant(nbasis: usize, nelec: usize, seed: f64) -> DMatrix<Complex64> {
        DMatrix::from_fn(nbasis, nelec, |i, j| {
            let x = (seed + 1.3 * i as f64 + 0.7 * j as f64).sin();
            let y = (seed * 0.5 + 0.9 * i as f64 - 0.4 * j as f64).cos();
            Complex64::new(x, 0.3 * y)
        })
    }

    #[test]
    fn test_diagonalise_sorted_orders_eigenvalues() {
        let h = DMatrix::from_row_slice(3, 3, &[2.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 2.0]);
        let (values, vectors) = diagonalise_sorted(&h);
        assert!(values[0] <= values[1] && values[1] <= values[2]);
        assert_relative_eq!(values[0], 2.0 - 2.0_f64.sqrt(), epsilon = 1e-10);
        let hv = &h * vectors.column(0);
        let lv = vectors.column(0) * values[0];
        assert_relative_eq!((hv - lv).norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_expm_symmetric_matches_series_for_diagonal() {
        let h = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -2.0]));
        let e = expm_symmetric(&h, -0.5);
        assert_relative_eq!(e[(0, 0)], (-0.5_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(1, 1)], (1.0_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(e[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gab_is_idempotent() {
        let a = random_determinant(5, 2, 0.1);
        let b = random_determinant(5, 2, 1.7);
        let (g, ovlp) = gab(&a, &b).unwrap();
        assert_relative_eq!((&g * &g - &g).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!((ovlp - overlap(&a, &b)).norm(), 0.0, epsilon = 1e-12);
        // trace equals the particle number
        assert_relative_eq!(g.trace().re, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reortho_recovers_original_determinant() {
        let original = random_determinant(6, 3, 0.4);
        let mut phi = original.clone();
        let det_r = reortho(&mut phi);
        assert!(det_r > 0.0);
        // orthonormal columns
        let s = phi.adjoint() * &phi;
        assert_relative_eq!((s - DMatrix::identity(3, 3)).norm(), 0.0, epsilon = 1e-10);
        // same span: projecting the original onto phi loses nothing
        let projected = &phi * (phi.adjoint() * &original);
        assert_relative_eq!((projected - &original).norm(), 0.0, epsilon = 1e-10);
        // det(R) accounts for the norm change
        let trial = random_determinant(6, 3, 2.2);
        let before = overlap(&trial, &original);
        let after = overlap(&trial, &phi);
        assert_relative_eq!((after * det_r - before).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reortho_flags_degenerate_columns() {
        let mut phi = DMatrix::from_element(4, 2, ONE);
        assert_eq!(reortho(&mut phi), 0.0);
    }
}

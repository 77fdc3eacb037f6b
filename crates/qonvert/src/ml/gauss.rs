//! Gauss-Jordan elimination for solution of systems of linear equations
//!
//! Fisher's discriminant requires inv(Sw).dot(Sb) - rather than inverting the
//! within-class scatter, we solve the linear system Sw.dot(X) = Sb

use super::matrix::Matrix;

/// Pivots smaller than this (relative to the largest entry of `left`) are
/// treated as zero
const PIVOT_EPSILON: f64 = 1E-12;

/// Solve `left.dot(X) = right` for X. Returns `None` if `left` is singular
pub fn solve(mut left: Matrix, mut right: Matrix) -> Option<Matrix> {
    let n = left.rows;
    assert_eq!(left.rows, left.cols, "left-hand side must be square");
    assert_eq!(left.rows, right.rows, "left and right must have equal rows");

    let scale = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|ix| left[ix].abs())
        .fold(0.0f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    for k in 0..n {
        // Partial pivoting: largest magnitude in column k, at or below row k
        let pivot = (k..n).max_by(|&a, &b| left[(a, k)].abs().total_cmp(&left[(b, k)].abs()))?;
        if left[(pivot, k)].abs() <= PIVOT_EPSILON * scale {
            return None;
        }
        if pivot != k {
            left.swap_rows(pivot, k);
            right.swap_rows(pivot, k);
        }

        let p = left[(k, k)];
        for j in 0..n {
            left[(k, j)] /= p;
        }
        for j in 0..right.cols {
            right[(k, j)] /= p;
        }

        // Clear column k in every other row
        for i in (0..n).filter(|&i| i != k) {
            let factor = left[(i, k)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                left[(i, j)] -= factor * left[(k, j)];
            }
            for j in 0..right.cols {
                right[(i, j)] -= factor * right[(k, j)];
            }
        }
    }

    right.all_finite().then(|| right)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ml::all_close;

    #[test]
    fn solves_system() {
        #[rustfmt::skip]
        let a = Matrix::new([
            0., 2., 1.,
            1., 1., 0.,
            2., 0., 3.,
        ], 3, 3);
        let x = [1., -2., 4.];
        let b = Matrix::col_vector(a.dotv(&x));

        let solved = solve(a, b).expect("system is not singular");
        assert!(all_close(&solved.col(0).collect::<Vec<_>>(), &x, 1E-10));
    }

    #[test]
    fn singular_system() {
        #[rustfmt::skip]
        let a = Matrix::new([
            1., 2.,
            2., 4.,
        ], 2, 2);
        let b = Matrix::col_vector(vec![1., 2.]);
        assert!(solve(a, b).is_none());
    }
}

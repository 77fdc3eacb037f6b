//! Dense row-major matrix of features: one row per match, one column per
//! normalized score

use super::norm;
use rayon::prelude::*;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::ops::{AddAssign, Index, IndexMut};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Row;
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Col;

#[derive(Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

pub struct Iter<'a, Axes> {
    data: &'a Matrix,
    row: usize,
    col: usize,
    axes: PhantomData<Axes>,
}

impl<'a> Iterator for Iter<'a, Row> {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data.get(self.row, self.col);
        self.col += 1;
        data
    }
}

impl<'a> Iterator for Iter<'a, Col> {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data.get(self.row, self.col);
        self.row += 1;
        data
    }
}

impl Matrix {
    /// Create a new `Matrix`
    ///
    /// # Panics
    ///
    /// * Panics if `data` does not have len == rows * cols
    pub fn new<T: Into<Vec<f64>>>(t: T, rows: usize, cols: usize) -> Matrix {
        let data = t.into();
        assert_eq!(
            data.len(),
            rows * cols,
            "data passed to Matrix::new() does not have shape ({}, {})",
            rows,
            cols
        );
        Matrix { data, rows, cols }
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn col_vector(data: Vec<f64>) -> Matrix {
        let rows = data.len();
        Matrix {
            data,
            rows,
            cols: 1,
        }
    }

    /// Build a matrix from a subset of rows of `self`, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let data = rows
            .iter()
            .flat_map(|&row| self.row_slice(row).iter().copied())
            .collect::<Vec<_>>();
        Matrix::new(data, rows.len(), self.cols)
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            None
        } else {
            self.data.get(self.cols * row + col).copied()
        }
    }

    pub fn row(&self, row: usize) -> Iter<'_, Row> {
        Iter {
            data: self,
            row,
            col: 0,
            axes: PhantomData,
        }
    }

    pub fn col(&self, col: usize) -> Iter<'_, Col> {
        Iter {
            data: self,
            row: 0,
            col,
            axes: PhantomData,
        }
    }

    pub fn row_slice(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) {
        for k in 0..self.cols {
            self.data.swap(self.cols * i + k, self.cols * j + k);
        }
    }

    /// Add `lambda` to every element of the diagonal
    pub fn add_diagonal(&mut self, lambda: f64) {
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] += lambda;
        }
    }

    pub fn trace(&self) -> f64 {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).sum()
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    // Use power method to find the eigenvector with the largest
    // corresponding eigenvalue
    pub fn power_method(&self, initial: &[f64]) -> Vec<f64> {
        let n = norm(initial);
        let mut v = initial.iter().map(|i| i / n).collect::<Vec<_>>();

        let mut last_eig = 0.0;
        for _ in 0..100 {
            let mut v1 = self.dotv(&v);
            let norm = norm(&v1);
            if norm == 0.0 || (norm - last_eig).abs() < 1E-10 {
                break;
            }
            last_eig = norm;
            v1.iter_mut().for_each(|x| *x /= norm);
            v = v1;
        }
        v
    }

    pub fn transpose(&self) -> Matrix {
        let mut mat = Matrix::zeros(self.cols, self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                mat[(col, row)] = self[(row, col)]
            }
        }
        mat
    }

    pub fn dotv(&self, rhs: &[f64]) -> Vec<f64> {
        assert_eq!(
            self.cols,
            rhs.len(),
            "lhs has shape ({},{}), rhs has shape (1,{})",
            self.rows,
            self.cols,
            rhs.len()
        );
        (0..self.rows)
            .into_par_iter()
            .map(|row| self.row(row).zip(rhs).fold(0.0, |acc, (x, y)| acc + x * y))
            .collect::<Vec<_>>()
    }

    pub fn dot(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "lhs has shape ({},{}), rhs has shape ({},{})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );
        let data = (0..self.rows)
            .into_par_iter()
            .flat_map(|row| {
                (0..rhs.cols).into_par_iter().map(move |col| {
                    self.row(row)
                        .zip(rhs.col(col))
                        .fold(0.0, |acc, (x, y)| acc + x * y)
                })
            })
            .collect::<Vec<_>>();
        Matrix {
            data,
            rows: self.rows,
            cols: rhs.cols,
        }
    }

    /// Calculate mean of each column
    pub fn mean(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|col| {
                let sum = self.col(col).sum::<f64>();
                sum / self.rows as f64
            })
            .collect()
    }

    /// Calculate (population) standard deviation of each column
    pub fn std(&self) -> Vec<f64> {
        self.mean()
            .into_iter()
            .enumerate()
            .map(|(col, mean)| {
                let ss = self.col(col).fold(0.0, |acc, x| acc + (x - mean).powi(2));
                (ss / self.rows as f64).sqrt()
            })
            .collect()
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[self.cols * row + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[self.cols * row + col]
    }
}

impl AddAssign<Matrix> for Matrix {
    fn add_assign(&mut self, rhs: Matrix) {
        assert_eq!(
            self.shape(),
            rhs.shape(),
            "matrices must have equal shape to add"
        );
        for i in 0..self.data.len() {
            self.data[i] += rhs.data[i];
        }
    }
}

impl Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for row in 0..self.rows {
            writeln!(f, "{:?}", self.row(row).collect::<Vec<_>>())?;
        }
        writeln!(f, "]")
    }
}

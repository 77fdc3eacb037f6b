//! Kernel support vector classifier
//!
//! The dual problem is solved with sequential minimal optimization, using the
//! maximal violating pair for working set selection:
//!
//! Platt, 1998 [https://www.microsoft.com/en-us/research/publication/sequential-minimal-optimization-a-fast-algorithm-for-training-support-vector-machines/]
//! Fan et al., 2005 [https://www.jmlr.org/papers/v6/fan05a.html]
//!
//! Features are standardized (zero mean, unit variance over the training set)
//! before training, and the same transformation is applied at prediction.

use super::matrix::Matrix;
use super::{check_classes, Classifier, Model, TrainingError};
use crate::settings::{Kernel, Settings, SvmType};
use rayon::prelude::*;

/// Stopping tolerance on the maximal KKT violation
const EPSILON: f64 = 1E-3;
/// Used in place of non-positive curvature
const TAU: f64 = 1E-12;
/// Larger training sets are thinned with a fixed stride
const MAX_TRAINING_SIZE: usize = 5000;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KernelFunction {
    Linear,
    Polynomial { gamma: f64, coef0: f64, degree: u32 },
    Rbf { gamma: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl KernelFunction {
    pub fn eval(&self, x: &[f64], y: &[f64]) -> f64 {
        let dot = || x.iter().zip(y).fold(0.0, |acc, (a, b)| acc + a * b);
        match *self {
            KernelFunction::Linear => dot(),
            KernelFunction::Polynomial {
                gamma,
                coef0,
                degree,
            } => (gamma * dot() + coef0).powi(degree as i32),
            KernelFunction::Rbf { gamma } => {
                let sq = x
                    .iter()
                    .zip(y)
                    .fold(0.0, |acc, (a, b)| acc + (a - b).powi(2));
                (-gamma * sq).exp()
            }
            KernelFunction::Sigmoid { gamma, coef0 } => (gamma * dot() + coef0).tanh(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SupportVectorClassifier {
    pub kernel: KernelFunction,
    pub svm_type: SvmType,
    /// Misclassification cost, C-SVC only
    pub cost: f64,
    /// Upper bound on the fraction of margin errors, nu-SVC only
    pub nu: f64,
    pub max_iterations: Option<usize>,
}

impl SupportVectorClassifier {
    pub fn from_settings(settings: &Settings) -> Self {
        let gamma = settings.gamma;
        let kernel = match settings.kernel {
            Kernel::Linear => KernelFunction::Linear,
            Kernel::Polynomial => KernelFunction::Polynomial {
                gamma,
                coef0: 0.0,
                degree: settings.polynomial_degree,
            },
            Kernel::RBF => KernelFunction::Rbf { gamma },
            Kernel::Sigmoid => KernelFunction::Sigmoid { gamma, coef0: 0.0 },
        };
        SupportVectorClassifier {
            kernel,
            svm_type: settings.svm_type,
            cost: settings.cost,
            nu: settings.nu,
            max_iterations: None,
        }
    }

    /// Per-example upper bound on the dual variables
    fn box_constraint(&self, n: usize) -> f64 {
        match self.svm_type {
            SvmType::CSVC => self.cost,
            SvmType::NuSVC => 1.0 / (self.nu * n as f64),
        }
    }

    pub fn fit(&self, features: &Matrix, labels: &[bool]) -> Result<SupportVectors, TrainingError> {
        check_classes(features, labels)?;

        let stride = (features.rows + MAX_TRAINING_SIZE - 1) / MAX_TRAINING_SIZE;
        let rows = (0..features.rows).step_by(stride.max(1)).collect::<Vec<_>>();
        if rows.len() < features.rows {
            log::debug!(
                "- thinning SVM training set from {} to {} examples",
                features.rows,
                rows.len()
            );
        }

        let mean = features.mean();
        let scale = features
            .std()
            .into_iter()
            .map(|s| if s > 0.0 { s } else { 1.0 })
            .collect::<Vec<_>>();

        let x = standardize(&features.select_rows(&rows), &mean, &scale);
        let y = rows
            .iter()
            .map(|&r| if labels[r] { 1.0 } else { -1.0 })
            .collect::<Vec<f64>>();
        let sampled = rows.iter().map(|&r| labels[r]).collect::<Vec<_>>();
        check_classes(&x, &sampled)?;

        let n = x.rows;
        let c = self.box_constraint(n);
        let max_iterations = self
            .max_iterations
            .unwrap_or_else(|| (100 * n).max(100_000));

        let k = |i: usize, j: usize| self.kernel.eval(x.row_slice(i), x.row_slice(j));
        let diag = (0..n).map(|i| k(i, i)).collect::<Vec<_>>();

        let mut alpha = vec![0.0; n];
        // Gradient of the dual objective, G = Q.alpha - 1
        let mut grad = vec![-1.0; n];

        let mut iterations = 0;
        let (m, big_m) = loop {
            // Select the maximal violating pair
            let mut i = None;
            let mut m = f64::NEG_INFINITY;
            let mut j = None;
            let mut big_m = f64::INFINITY;
            for t in 0..n {
                let v = -y[t] * grad[t];
                let up = (y[t] > 0.0 && alpha[t] < c) || (y[t] < 0.0 && alpha[t] > 0.0);
                let low = (y[t] < 0.0 && alpha[t] < c) || (y[t] > 0.0 && alpha[t] > 0.0);
                if up && v > m {
                    m = v;
                    i = Some(t);
                }
                if low && v < big_m {
                    big_m = v;
                    j = Some(t);
                }
            }

            let (i, j) = match (i, j) {
                (Some(i), Some(j)) if m - big_m >= EPSILON => (i, j),
                _ => break (m, big_m),
            };

            if iterations >= max_iterations {
                return Err(TrainingError::Nonconvergence(iterations));
            }
            iterations += 1;

            let k_ij = k(i, j);
            let (old_i, old_j) = (alpha[i], alpha[j]);
            if y[i] != y[j] {
                let quad = (diag[i] + diag[j] + 2.0 * k_ij * y[i] * y[j]).max(TAU);
                let delta = (-grad[i] - grad[j]) / quad;
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let quad = (diag[i] + diag[j] - 2.0 * k_ij).max(TAU);
                let delta = (grad[i] - grad[j]) / quad;
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (d_i, d_j) = (alpha[i] - old_i, alpha[j] - old_j);
            let (y_i, y_j) = (y[i], y[j]);
            grad.par_iter_mut().enumerate().for_each(|(t, g)| {
                *g += y[t] * (y_i * d_i * k(i, t) + y_j * d_j * k(j, t));
            });
        };

        // Bias from free support vectors, or the midpoint of the feasible
        // interval if there are none
        let free = (0..n)
            .filter(|&t| alpha[t] > 0.0 && alpha[t] < c)
            .map(|t| y[t] * grad[t])
            .collect::<Vec<_>>();
        let rho = match free.is_empty() {
            true => -(m + big_m) / 2.0,
            false => super::mean(&free),
        };

        let support = (0..n).filter(|&t| alpha[t] > 0.0).collect::<Vec<_>>();
        let coefficients = support.iter().map(|&t| alpha[t] * y[t]).collect::<Vec<_>>();
        let vectors = x.select_rows(&support);

        if !rho.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TrainingError::NonFinite);
        }

        log::trace!(
            "- SVM converged in {} iterations with {} support vectors",
            iterations,
            support.len()
        );

        Ok(SupportVectors {
            kernel: self.kernel,
            mean,
            scale,
            vectors,
            coefficients,
            rho,
        })
    }
}

fn standardize(features: &Matrix, mean: &[f64], scale: &[f64]) -> Matrix {
    let mut x = features.clone();
    for row in 0..x.rows {
        for col in 0..x.cols {
            x[(row, col)] = (x[(row, col)] - mean[col]) / scale[col];
        }
    }
    x
}

impl Classifier for SupportVectorClassifier {
    fn train(&self, features: &Matrix, labels: &[bool]) -> Result<Box<dyn Model>, TrainingError> {
        Ok(Box::new(self.fit(features, labels)?))
    }
}

/// Trained SVM: decision(x) = sum_i(coef_i * K(sv_i, x)) - rho
pub struct SupportVectors {
    kernel: KernelFunction,
    mean: Vec<f64>,
    scale: Vec<f64>,
    vectors: Matrix,
    coefficients: Vec<f64>,
    rho: f64,
}

impl SupportVectors {
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

impl Model for SupportVectors {
    fn predict(&self, features: &Matrix) -> Vec<f64> {
        let x = standardize(features, &self.mean, &self.scale);
        (0..x.rows)
            .into_par_iter()
            .map(|row| {
                let query = x.row_slice(row);
                self.coefficients
                    .iter()
                    .enumerate()
                    .fold(0.0, |acc, (sv, coef)| {
                        acc + coef * self.kernel.eval(self.vectors.row_slice(sv), query)
                    })
                    - self.rho
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn classifier(kernel: KernelFunction) -> SupportVectorClassifier {
        SupportVectorClassifier {
            kernel,
            svm_type: SvmType::CSVC,
            cost: 1.0,
            nu: 0.5,
            max_iterations: None,
        }
    }

    fn separable() -> (Matrix, Vec<bool>) {
        #[rustfmt::skip]
        let feats = Matrix::new([
            3.0, 2.5,
            2.5, 3.0,
            3.5, 3.5,
            2.8, 2.2,
            0.5, 0.0,
            0.0, 0.4,
            -0.3, 0.2,
            0.6, -0.5,
        ], 8, 2);
        let labels = vec![true, true, true, true, false, false, false, false];
        (feats, labels)
    }

    fn separates(model: &dyn Model, feats: &Matrix, labels: &[bool]) -> bool {
        model
            .predict(feats)
            .iter()
            .zip(labels)
            .all(|(d, &l)| (*d > 0.0) == l)
    }

    #[test]
    fn kernels() {
        assert_eq!(KernelFunction::Linear.eval(&[1., 2.], &[3., 4.]), 11.);
        let poly = KernelFunction::Polynomial {
            gamma: 0.5,
            coef0: 1.0,
            degree: 2,
        };
        assert_eq!(poly.eval(&[1., 2.], &[3., 4.]), 42.25);
        let rbf = KernelFunction::Rbf { gamma: 0.5 };
        assert_eq!(rbf.eval(&[1., 2.], &[1., 2.]), 1.0);
        assert!((rbf.eval(&[0., 0.], &[1., 1.]) - (-1.0f64).exp()).abs() < 1E-12);
    }

    #[test]
    fn linear_svm_separates() {
        let (feats, labels) = separable();
        let model = classifier(KernelFunction::Linear)
            .fit(&feats, &labels)
            .unwrap();
        assert!(!model.is_empty());
        assert!(separates(&model, &feats, &labels));

        // Points far out in either direction are classified with confidence
        let far = Matrix::new([10., 10., -10., -10.], 2, 2);
        let d = model.predict(&far);
        assert!(d[0] > 0.0 && d[1] < 0.0, "{:?}", d);
    }

    #[test]
    fn rbf_and_polynomial_svm_separate() {
        let (feats, labels) = separable();
        for kernel in [
            KernelFunction::Rbf { gamma: 0.5 },
            KernelFunction::Polynomial {
                gamma: 1.0,
                coef0: 1.0,
                degree: 2,
            },
        ] {
            let model = classifier(kernel).fit(&feats, &labels).unwrap();
            assert!(separates(&model, &feats, &labels), "{:?}", kernel);
        }
    }

    #[test]
    fn nu_svc() {
        let (feats, labels) = separable();
        let mut svc = classifier(KernelFunction::Linear);
        svc.svm_type = SvmType::NuSVC;
        svc.nu = 0.1;
        assert_eq!(svc.box_constraint(8), 1.25);
        let model = svc.fit(&feats, &labels).unwrap();
        assert!(separates(&model, &feats, &labels));
    }

    #[test]
    fn one_class() {
        let (feats, _) = separable();
        let err = classifier(KernelFunction::Linear)
            .fit(&feats, &[true; 8])
            .err();
        assert_eq!(
            err,
            Some(TrainingError::OneClass {
                positives: 8,
                negatives: 0
            })
        );
    }

    #[test]
    fn unlabeled_rows() {
        let (feats, labels) = separable();
        assert_eq!(
            classifier(KernelFunction::Linear)
                .fit(&feats, &labels[..7])
                .err(),
            Some(TrainingError::LabelMismatch { rows: 8, labels: 7 })
        );
    }

    #[test]
    fn iteration_limit() {
        let (feats, labels) = separable();
        let mut svc = classifier(KernelFunction::Linear);
        svc.max_iterations = Some(0);
        assert_eq!(
            svc.fit(&feats, &labels).err(),
            Some(TrainingError::Nonconvergence(0))
        );
    }
}

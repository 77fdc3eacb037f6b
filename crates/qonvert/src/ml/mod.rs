//! Linear Algebra, Machine Learning & probability calibration

pub mod gauss;
pub mod kde;
pub mod linear_discriminant;
pub mod matrix;
pub mod svm;

use matrix::Matrix;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("training set must contain both positive and negative examples ({positives} positive, {negatives} negative)")]
    OneClass { positives: usize, negatives: usize },
    #[error("did not converge after {0} iterations")]
    Nonconvergence(usize),
    #[error("model produced non-finite values")]
    NonFinite,
    #[error("scatter matrix is singular")]
    Singular,
    #[error("{labels} labels for {rows} training examples")]
    LabelMismatch { rows: usize, labels: usize },
}

/// A trained binary classifier
pub trait Model: Send + Sync {
    /// Decision values for each row of `features`, higher values indicate
    /// the positive class
    fn predict(&self, features: &Matrix) -> Vec<f64>;
}

/// Anything that can learn to separate positive from negative examples
pub trait Classifier {
    /// Fit a model, `labels[row]` is true for positive examples
    fn train(&self, features: &Matrix, labels: &[bool]) -> Result<Box<dyn Model>, TrainingError>;
}

/// Ensure that every example is labeled, and both classes are present
pub fn check_classes(features: &Matrix, labels: &[bool]) -> Result<(), TrainingError> {
    if features.rows != labels.len() {
        return Err(TrainingError::LabelMismatch {
            rows: features.rows,
            labels: labels.len(),
        });
    }
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    match positives > 0 && negatives > 0 {
        true => Ok(()),
        false => Err(TrainingError::OneClass {
            positives,
            negatives,
        }),
    }
}

#[allow(dead_code)]
fn all_close(lhs: &[f64], rhs: &[f64], eps: f64) -> bool {
    lhs.iter()
        .zip(rhs.iter())
        .all(|(l, r)| (l - r).abs() <= eps)
}

pub fn norm(slice: &[f64]) -> f64 {
    slice.iter().fold(0.0, |acc, x| acc + x.powi(2)).sqrt()
}

pub fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

pub fn std(slice: &[f64]) -> f64 {
    let mean = mean(slice);
    let x = slice.iter().fold(0.0, |acc, x| acc + (x - mean).powi(2));
    (x / slice.len() as f64).sqrt()
}

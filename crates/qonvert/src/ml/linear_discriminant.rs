//! Fisher's Linear Discriminant Analysis
//!
//! Projects normalized scores onto the single direction that best separates
//! confident targets from decoys. The projection is solved from the scatter
//! matrices using the in-house [`gauss`] solver and the power method, no
//! external linear algebra needed.
//!
//! [`gauss`]: super::gauss

use super::matrix::Matrix;
use super::{check_classes, gauss, Classifier, Model, TrainingError};

/// Relative ridge added to the within-class scatter matrix, so that constant
/// or perfectly correlated features do not make it singular
const RIDGE: f64 = 1E-6;

#[derive(Copy, Clone, Debug, Default)]
pub struct LinearDiscriminantAnalysis;

pub struct LinearDiscriminant {
    eigenvector: Vec<f64>,
}

impl Model for LinearDiscriminant {
    fn predict(&self, features: &Matrix) -> Vec<f64> {
        features.dotv(&self.eigenvector)
    }
}

impl LinearDiscriminant {
    pub fn eigenvector(&self) -> &[f64] {
        &self.eigenvector
    }
}

impl LinearDiscriminantAnalysis {
    pub fn fit(features: &Matrix, labels: &[bool]) -> Result<LinearDiscriminant, TrainingError> {
        check_classes(features, labels)?;

        // Calculate class means, and overall mean
        let x_bar = features.mean();
        let mut scatter_within = Matrix::zeros(features.cols, features.cols);
        let mut scatter_between = Matrix::zeros(features.cols, features.cols);

        // [negative class mean, positive class mean]
        let mut class_means = Vec::new();

        for class in [false, true] {
            let rows = labels
                .iter()
                .enumerate()
                .filter(|&(_, label)| *label == class)
                .map(|(row, _)| row)
                .collect::<Vec<_>>();

            let mut class_data = features.select_rows(&rows);
            let class_mean = class_data.mean();

            for row in 0..class_data.rows {
                for col in 0..class_data.cols {
                    class_data[(row, col)] -= class_mean[col];
                }
            }

            scatter_within += class_data.transpose().dot(&class_data);

            let diff = Matrix::col_vector(
                class_mean
                    .iter()
                    .zip(x_bar.iter())
                    .map(|(x, y)| (x - y) * (rows.len() as f64).sqrt())
                    .collect::<Vec<_>>(),
            );
            scatter_between += diff.dot(&diff.transpose());
            class_means.extend(class_mean);
        }

        let ridge = RIDGE * (scatter_within.trace() / features.cols as f64).max(1E-12);
        scatter_within.add_diagonal(ridge);

        // Start the power method from the difference of class means, which
        // is the optimal direction when features are uncorrelated
        let initial = (0..features.cols)
            .map(|col| class_means[features.cols + col] - class_means[col])
            .collect::<Vec<_>>();
        if super::norm(&initial) == 0.0 {
            return Err(TrainingError::Singular);
        }

        let mut evec = gauss::solve(scatter_within, scatter_between)
            .map(|mat| mat.power_method(&initial))
            .ok_or(TrainingError::Singular)?;

        if !evec.iter().all(|f| f.is_finite()) {
            return Err(TrainingError::NonFinite);
        }

        // Power method can return eigenvector with signs flipped - make it
        // so that positive class scores are higher
        let class_means = Matrix::new(class_means, 2, features.cols);
        let coef = class_means.dotv(&evec);
        if coef[1] < coef[0] {
            evec.iter_mut().for_each(|c| *c *= -1.0);
        }

        log::trace!("- linear model fit with eigenvector: {:?}", evec);
        Ok(LinearDiscriminant { eigenvector: evec })
    }
}

impl Classifier for LinearDiscriminantAnalysis {
    fn train(&self, features: &Matrix, labels: &[bool]) -> Result<Box<dyn Model>, TrainingError> {
        Ok(Box::new(Self::fit(features, labels)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ml::*;

    #[test]
    fn linear_discriminant() {
        #[rustfmt::skip]
        let feats = Matrix::new(
            [
                5., 4., 3., 2.,
                4., 5., 4., 3.,
                6., 3., 4., 5.,
                1., 0., 2., 9.,
                5., 4., 4., 3.,
                2., 1., 1., 9.5,
                1., 0., 2., 8.,
                3., 2., -2., 10.,
            ],
            8,
            4,
        );
        let labels = [true, true, true, false, true, false, false, false];

        let lda = LinearDiscriminantAnalysis::fit(&feats, &labels).expect("error training LDA");
        let scores = lda.predict(&feats);

        // Every positive example scores above every negative example
        let worst_positive = scores
            .iter()
            .zip(&labels)
            .filter(|(_, l)| **l)
            .map(|(s, _)| *s)
            .fold(f64::MAX, f64::min);
        let best_negative = scores
            .iter()
            .zip(&labels)
            .filter(|(_, l)| !**l)
            .map(|(s, _)| *s)
            .fold(f64::MIN, f64::max);
        assert!(worst_positive > best_negative, "{:?}", scores);
        assert!((norm(lda.eigenvector()) - 1.0).abs() < 1E-8);
    }

    #[test]
    fn one_class() {
        let feats = Matrix::new([1., 2., 3., 4.], 2, 2);
        assert_eq!(
            LinearDiscriminantAnalysis::fit(&feats, &[true, true]).err(),
            Some(TrainingError::OneClass {
                positives: 2,
                negatives: 0
            })
        );
    }

    #[test]
    fn unlabeled_rows() {
        let feats = Matrix::new([1., 2., 3., 4., 5., 6.], 3, 2);
        assert_eq!(
            LinearDiscriminantAnalysis::fit(&feats, &[true, false]).err(),
            Some(TrainingError::LabelMismatch { rows: 3, labels: 2 })
        );
    }

    #[test]
    fn identical_classes() {
        let feats = Matrix::new([1., 2., 1., 2.], 2, 2);
        assert!(LinearDiscriminantAnalysis::fit(&feats, &[true, false]).is_err());
    }
}

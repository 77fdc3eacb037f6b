//! Combine normalized scores into a single discriminant per match
//!
//! Every partition starts from the weighted sum of its normalized scores.
//! When a classifier method is configured, the weighted sum provides
//! provisional q-values that select confident targets as positive training
//! examples; decoys are the negative examples. Any failure to train falls
//! back to the weighted sum.

use crate::ml::kde::Estimator;
use crate::ml::linear_discriminant::LinearDiscriminantAnalysis;
use crate::ml::matrix::Matrix;
use crate::ml::svm::SupportVectorClassifier;
use crate::ml::{Classifier, Model, TrainingError};
use crate::partition::Partition;
use crate::psm::PeptideSpectrumMatch;
use crate::qvalue::QValueEstimator;
use crate::report::{Discriminant, Event};
use crate::score::ScoreCatalog;
use crate::settings::{QonverterMethod, Settings};
use std::cmp::Ordering;

/// Sum of weighted, normalized scores. Missing scores contribute nothing
pub fn weighted_sum(catalog: &ScoreCatalog, psm: &PeptideSpectrumMatch) -> f64 {
    catalog
        .iter()
        .zip(&psm.normalized)
        .filter_map(|(score, value)| value.map(|v| v * score.weight * score.orientation()))
        .sum()
}

/// One row per match, one column per catalog score. Columns are oriented so
/// that larger values are better, and missing scores are zero
pub fn features(catalog: &ScoreCatalog, psms: &[PeptideSpectrumMatch]) -> Matrix {
    let mut data = Vec::with_capacity(psms.len() * catalog.len());
    for psm in psms {
        for (idx, score) in catalog.iter().enumerate() {
            let value = psm.normalized.get(idx).copied().flatten().unwrap_or(0.0);
            data.push(value * score.orientation());
        }
    }
    Matrix::new(data, psms.len(), catalog.len())
}

/// A classifier fit to a single partition
pub struct Trained {
    pub method: QonverterMethod,
    pub model: Box<dyn Model>,
    /// Maps decision margins to probabilities, if requested & available
    pub calibration: Option<Estimator>,
}

impl Trained {
    pub fn discriminants(&self, features: &Matrix) -> Vec<f64> {
        let margins = self.model.predict(features);
        match &self.calibration {
            Some(kde) => margins.into_iter().map(|m| kde.probability(m)).collect(),
            None => margins,
        }
    }
}

pub struct DiscriminantScorer<'a> {
    settings: &'a Settings,
    catalog: &'a ScoreCatalog,
}

impl<'a> DiscriminantScorer<'a> {
    pub fn new(settings: &'a Settings, catalog: &'a ScoreCatalog) -> Self {
        Self { settings, catalog }
    }

    fn classifier(&self) -> Option<Box<dyn Classifier>> {
        match self.settings.qonverter_method {
            QonverterMethod::StaticWeighted => None,
            QonverterMethod::PartitionedSVM => {
                Some(Box::new(SupportVectorClassifier::from_settings(self.settings)))
            }
            QonverterMethod::PartitionedLDA => Some(Box::new(LinearDiscriminantAnalysis)),
        }
    }

    /// Select training examples: confident, top-ranked targets are positive,
    /// all decoys are negative. Returns (row indices, labels)
    pub fn training_set(&self, psms: &[PeptideSpectrumMatch]) -> (Vec<usize>, Vec<bool>) {
        let scores = psms.iter().map(|p| p.discriminant).collect::<Vec<_>>();
        let decoys = psms.iter().map(|p| p.decoy).collect::<Vec<_>>();
        let ids = psms.iter().map(|p| p.id).collect::<Vec<_>>();
        let provisional = QValueEstimator::new(self.settings.target_decoy_ratio)
            .estimate(&scores, &decoys, &ids);

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (idx, psm) in psms.iter().enumerate() {
            if psm.decoy {
                rows.push(idx);
                labels.push(false);
                continue;
            }
            let confident = provisional
                .as_ref()
                .map(|q| q[idx] <= self.settings.true_positive_threshold)
                .unwrap_or(false);
            if confident && psm.rank <= self.settings.max_training_rank {
                rows.push(idx);
                labels.push(true);
            }
        }
        (rows, labels)
    }

    fn train(
        &self,
        classifier: &dyn Classifier,
        partition: &mut Partition,
    ) -> Result<(), TrainingError> {
        let feats = features(self.catalog, &partition.psms);
        let (rows, labels) = self.training_set(&partition.psms);
        let training = feats.select_rows(&rows);

        let model = classifier.train(&training, &labels)?;
        let margins = model.predict(&feats);
        if margins.iter().any(|m| !m.is_finite()) {
            return Err(TrainingError::NonFinite);
        }

        let positives = labels.iter().filter(|&&l| l).count();
        let mut trained = Trained {
            method: self.settings.qonverter_method,
            model,
            calibration: None,
        };

        if self.settings.predict_probability {
            let training_margins = rows.iter().map(|&r| margins[r]).collect::<Vec<_>>();
            let decoys = labels.iter().map(|l| !l).collect::<Vec<_>>();
            match Estimator::fit(&training_margins, &decoys) {
                Ok(kde) => trained.calibration = Some(kde),
                Err(e) => {
                    log::warn!(
                        "- partition {}: probability unavailable ({}), using margins",
                        partition.key,
                        e
                    );
                    partition.report.events.push(Event::ProbabilityUnavailable {
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (psm, margin) in partition.psms.iter_mut().zip(margins) {
            psm.discriminant = match &trained.calibration {
                Some(kde) => kde.probability(margin),
                None => margin,
            };
        }

        partition.report.discriminant = Discriminant::Classifier {
            method: trained.method,
            positives,
            negatives: labels.len() - positives,
            probability: trained.calibration.is_some(),
        };
        partition.model = Some(trained);
        Ok(())
    }

    /// Assign a discriminant to every match of a (normalized) partition
    pub fn score(&self, partition: &mut Partition) {
        for psm in partition.psms.iter_mut() {
            psm.discriminant = weighted_sum(self.catalog, psm);
        }
        partition.report.discriminant = Discriminant::WeightedSum;

        let classifier = match self.classifier() {
            Some(classifier) => classifier,
            None => return,
        };

        if partition.degenerate() {
            partition.report.events.push(Event::TrainingSkipped {
                reason: "degenerate partition".into(),
            });
            return;
        }

        if let Err(e) = self.train(classifier.as_ref(), partition) {
            log::warn!(
                "- partition {}: classifier failed ({}), using weighted sum",
                partition.key,
                e
            );
            partition.report.events.push(Event::Fallback {
                reason: e.to_string(),
            });
            partition.model = None;
        }
    }
}

/// NaN sorts below every other discriminant
fn by_discriminant(a: f64, b: f64) -> Ordering {
    let key = |x: f64| if x.is_nan() { f64::NEG_INFINITY } else { x };
    key(b).total_cmp(&key(a))
}

/// Reassign ranks within each spectrum, best discriminant first. Ties keep
/// the search engine's order, then fall back to match id
pub fn rerank<'a, I>(psms: I)
where
    I: IntoIterator<Item = &'a mut PeptideSpectrumMatch>,
{
    let mut psms = psms.into_iter().collect::<Vec<_>>();
    psms.sort_by(|a, b| {
        a.spectrum
            .cmp(&b.spectrum)
            .then_with(|| by_discriminant(a.discriminant, b.discriminant))
            .then_with(|| a.original_rank.cmp(&b.original_rank))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut rank = 0;
    for idx in 0..psms.len() {
        rank = match idx > 0 && psms[idx - 1].spectrum == psms[idx].spectrum {
            true => rank + 1,
            false => 1,
        };
        psms[idx].rank = rank;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::partition::Partitioner;
    use crate::settings::Builder;

    fn catalog() -> ScoreCatalog {
        "2 off a; -1 off b; 1 linear c".parse().unwrap()
    }

    fn psm(id: u64, decoy: bool, normalized: Vec<Option<f64>>) -> PeptideSpectrumMatch {
        let protein = match decoy {
            true => "rev_P",
            false => "P",
        };
        let mut psm = PeptideSpectrumMatch::new(
            id,
            format!("scan={}", id),
            "PEPTIDE".into(),
            vec![protein.into()],
        );
        psm.assign_decoy("rev_");
        psm.normalized = normalized;
        psm
    }

    #[test]
    fn weighted_sum_respects_orientation() {
        let catalog = catalog();
        let p = psm(0, false, vec![Some(1.5), Some(2.0), Some(0.25)]);
        assert_eq!(weighted_sum(&catalog, &p), 2.0 * 1.5 - 2.0 + 0.25);

        let p = psm(1, false, vec![Some(1.5), None, None]);
        assert_eq!(weighted_sum(&catalog, &p), 3.0);
    }

    #[test]
    fn feature_matrix() {
        let catalog = catalog();
        let psms = vec![
            psm(0, false, vec![Some(1.0), Some(2.0), Some(0.5)]),
            psm(1, true, vec![None, Some(4.0), Some(0.0)]),
        ];
        let feats = features(&catalog, &psms);
        assert_eq!(feats, Matrix::new([1.0, -2.0, 0.5, 0.0, -4.0, 0.0], 2, 3));
    }

    fn settings(method: &str) -> Settings {
        Builder {
            qonverter_method: Some(method.into()),
            score_info: Some("1 off a; 1 off b".into()),
            min_partition_size: Some(10),
            min_partition_decoys: Some(2),
            true_positive_threshold: Some(0.1),
            charge_state_handling: Some("ignore".into()),
            terminal_specificity_handling: Some("ignore".into()),
            ..Default::default()
        }
        .make_settings()
        .unwrap()
    }

    /// Targets score high on both scores, decoys low, with some overlap
    fn separable(n: u64) -> Vec<PeptideSpectrumMatch> {
        (0..n)
            .map(|id| {
                let decoy = id % 2 == 1;
                let jitter = (id % 7) as f64 / 7.0;
                let (a, b) = match decoy {
                    true => (jitter, 1.0 - jitter),
                    false => (2.0 + jitter, 1.5 + jitter / 2.0),
                };
                psm(id, decoy, vec![Some(a), Some(b)])
            })
            .collect()
    }

    fn scored(method: &str, psms: Vec<PeptideSpectrumMatch>) -> Partition {
        let settings = settings(method);
        let mut partitions = Partitioner::new(&settings).partition(psms);
        assert_eq!(partitions.len(), 1);
        let mut partition = partitions.remove(0);
        DiscriminantScorer::new(&settings, &settings.score_info).score(&mut partition);
        partition
    }

    fn separates(partition: &Partition) -> bool {
        let worst_target = partition
            .psms
            .iter()
            .filter(|p| !p.decoy)
            .map(|p| p.discriminant)
            .fold(f64::MAX, f64::min);
        let best_decoy = partition
            .psms
            .iter()
            .filter(|p| p.decoy)
            .map(|p| p.discriminant)
            .fold(f64::MIN, f64::max);
        worst_target >= best_decoy
    }

    #[test]
    fn static_weighted() {
        let partition = scored("StaticWeighted", separable(40));
        assert_eq!(partition.report.discriminant, Discriminant::WeightedSum);
        assert!(partition.report.events.is_empty());
        assert!(partition.model.is_none());
        assert_eq!(partition.psms[0].discriminant, 3.5);
    }

    #[test]
    fn classifiers_train() {
        for method in ["PartitionedLDA", "PartitionedSVM"] {
            let partition = scored(method, separable(60));
            assert!(
                matches!(
                    partition.report.discriminant,
                    Discriminant::Classifier { positives: 30, negatives: 30, .. }
                ),
                "{}: {:?}",
                method,
                partition.report
            );
            assert!(separates(&partition), "{}", method);
            assert!(partition.psms.iter().all(|p| p.discriminant.is_finite()));

            // The stored model reproduces the assigned discriminants
            let catalog = "1 off a; 1 off b".parse::<ScoreCatalog>().unwrap();
            let trained = partition.model.as_ref().expect("model is kept");
            assert_eq!(trained.method, settings(method).qonverter_method);
            let rescored = trained.discriminants(&features(&catalog, &partition.psms));
            for (psm, d) in partition.psms.iter().zip(rescored) {
                assert!((psm.discriminant - d).abs() < 1E-12);
            }
        }
    }

    #[test]
    fn probabilities_are_bounded() {
        let partition = scored("PartitionedLDA", separable(60));
        if let Discriminant::Classifier { probability, .. } = partition.report.discriminant {
            if probability {
                assert!(partition
                    .psms
                    .iter()
                    .all(|p| (0.0..=1.0).contains(&p.discriminant)));
            }
        }
    }

    #[test]
    fn degenerate_partition_skips_training() {
        let partition = scored("PartitionedLDA", separable(6));
        assert!(partition.degenerate());
        assert_eq!(partition.report.discriminant, Discriminant::WeightedSum);
        assert!(matches!(
            partition.report.events.last(),
            Some(Event::TrainingSkipped { .. })
        ));
    }

    #[test]
    fn no_confident_targets_falls_back() {
        // Decoys outscore every target - nothing passes the provisional
        // threshold, so training has a single class
        let psms = separable(40)
            .into_iter()
            .map(|mut p| {
                if let Some(Some(a)) = p.normalized.get_mut(0) {
                    if p.decoy {
                        *a += 10.0;
                    }
                }
                p
            })
            .collect();
        let partition = scored("PartitionedSVM", psms);
        assert_eq!(partition.report.discriminant, Discriminant::WeightedSum);
        assert!(partition
            .report
            .events
            .iter()
            .any(|e| matches!(e, Event::Fallback { .. })));
        assert!(partition.model.is_none());
    }

    #[test]
    fn rerank_by_discriminant() {
        let mut psms = vec![
            psm(0, false, vec![]).rank(1),
            psm(1, false, vec![]).rank(2),
            psm(2, false, vec![]).rank(3),
            psm(3, false, vec![]).rank(1),
        ];
        for p in psms.iter_mut().take(3) {
            p.spectrum = "scan=1".into();
        }
        psms[0].discriminant = 0.5;
        psms[1].discriminant = 0.9;
        psms[2].discriminant = f64::NAN;
        psms[3].discriminant = 0.1;

        rerank(psms.iter_mut());
        let ranks = psms.iter().map(|p| p.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![2, 1, 3, 1]);
        assert_eq!(psms[0].original_rank, 1);
    }

    #[test]
    fn rerank_ties_keep_original_rank() {
        let mut psms = vec![psm(5, false, vec![]).rank(2), psm(9, false, vec![]).rank(1)];
        for p in psms.iter_mut() {
            p.spectrum = "scan=1".into();
            p.discriminant = 1.0;
        }
        rerank(psms.iter_mut());
        assert_eq!(psms[0].rank, 2);
        assert_eq!(psms[1].rank, 1);
    }
}

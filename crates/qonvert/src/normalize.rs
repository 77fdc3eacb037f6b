//! Per-partition rescaling of raw search engine scores

use crate::partition::PartitionKey;
use crate::psm::PeptideSpectrumMatch;
use crate::score::{NormalizationMethod, Order, ScoreCatalog, ScoreInfo};
use crate::Error;

pub struct ScoreNormalizer<'a> {
    catalog: &'a ScoreCatalog,
}

impl<'a> ScoreNormalizer<'a> {
    pub fn new(catalog: &'a ScoreCatalog) -> Self {
        Self { catalog }
    }

    /// Every catalog score must be present on at least one match of a
    /// non-empty partition
    pub fn check(&self, key: &PartitionKey, psms: &[PeptideSpectrumMatch]) -> Result<(), Error> {
        if psms.is_empty() {
            return Ok(());
        }
        for score in self.catalog {
            if !psms.iter().any(|psm| psm.scores.contains_key(&score.name)) {
                return Err(Error::MissingScore {
                    score: score.name.clone(),
                    partition: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write normalized values for every catalog score onto the matches
    pub fn normalize(
        &self,
        key: &PartitionKey,
        psms: &mut [PeptideSpectrumMatch],
    ) -> Result<(), Error> {
        self.check(key, psms)?;
        for psm in psms.iter_mut() {
            psm.normalized = vec![None; self.catalog.len()];
        }

        for (idx, score) in self.catalog.iter().enumerate() {
            // (match index, raw value)
            let mut values = Vec::with_capacity(psms.len());
            for (ix, psm) in psms.iter().enumerate() {
                if let Some(&value) = psm.scores.get(&score.name) {
                    if !value.is_finite() {
                        return Err(Error::NonFiniteScore {
                            score: score.name.clone(),
                            id: psm.id,
                        });
                    }
                    values.push((ix, value));
                }
            }

            let normalized = match score.normalization {
                NormalizationMethod::Off => values,
                NormalizationMethod::Linear => linear(score, values),
                NormalizationMethod::Quantile => quantile(score, values),
            };
            for (ix, value) in normalized {
                psms[ix].normalized[idx] = Some(value);
            }
        }
        Ok(())
    }
}

/// Min-max scaling to [0, 1]
fn linear(score: &ScoreInfo, mut values: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    let (min, max) = values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));

    for (_, v) in values.iter_mut() {
        if max == min {
            *v = 0.5;
            continue;
        }
        let x = (*v - min) / (max - min);
        *v = match score.order {
            Order::Ascending => x,
            Order::Descending => 1.0 - x,
        };
    }
    values
}

/// Empirical quantile, where 1.0 is the best observed value. Tied values get
/// the quantile of their average rank
fn quantile(score: &ScoreInfo, mut values: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    let n = values.len() as f64;
    // Sort worst to best
    values.sort_by(|a, b| match score.order {
        Order::Ascending => a.1.total_cmp(&b.1),
        Order::Descending => b.1.total_cmp(&a.1),
    });

    let mut start = 0;
    while start < values.len() {
        let mut end = start;
        while end + 1 < values.len() && values[end + 1].1 == values[start].1 {
            end += 1;
        }
        // 1-based ranks `start + 1 ..= end + 1`
        let rank = (start + end + 2) as f64 / 2.0;
        for (_, v) in values[start..=end].iter_mut() {
            *v = rank / n;
        }
        start = end + 1;
    }
    values
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn psms(values: &[Option<f64>]) -> Vec<PeptideSpectrumMatch> {
        values
            .iter()
            .enumerate()
            .map(|(id, v)| {
                let psm = PeptideSpectrumMatch::new(id as u64, "s", "PEPTIDE", vec![]);
                match v {
                    Some(v) => psm.score("s", *v),
                    None => psm.score("other", 1.0),
                }
            })
            .collect()
    }

    fn normalized(catalog: &str, values: &[Option<f64>]) -> Result<Vec<Option<f64>>, Error> {
        let catalog = catalog.parse::<ScoreCatalog>().unwrap();
        let mut psms = psms(values);
        ScoreNormalizer::new(&catalog).normalize(&PartitionKey::default(), &mut psms)?;
        Ok(psms.iter().map(|p| p.normalized[0]).collect())
    }

    #[test]
    fn off_passes_through() {
        let out = normalized("-1 off s", &[Some(3.0), None, Some(-2.0)]).unwrap();
        assert_eq!(out, vec![Some(3.0), None, Some(-2.0)]);
    }

    #[test]
    fn linear_scaling() {
        let out = normalized("1 linear s", &[Some(10.0), Some(20.0), Some(15.0), None]).unwrap();
        assert_eq!(out, vec![Some(0.0), Some(1.0), Some(0.5), None]);

        let out = normalized("-1 linear s", &[Some(10.0), Some(20.0), Some(12.5)]).unwrap();
        assert_eq!(out, vec![Some(1.0), Some(0.0), Some(0.75)]);

        let out = normalized("1 linear s", &[Some(4.0), Some(4.0)]).unwrap();
        assert_eq!(out, vec![Some(0.5), Some(0.5)]);
    }

    #[test]
    fn quantile_with_ties() {
        let out = normalized("1 quantile s", &[Some(1.0), Some(2.0), Some(2.0), Some(3.0)]).unwrap();
        assert_eq!(out, vec![Some(0.25), Some(0.625), Some(0.625), Some(1.0)]);
    }

    #[test]
    fn quantile_descending() {
        let out = normalized("-1 quantile s", &[Some(1e-5), Some(0.1), Some(1e-2)]).unwrap();
        let out = out.into_iter().map(Option::unwrap).collect::<Vec<_>>();
        assert!((out[0] - 1.0).abs() < 1E-12);
        assert!((out[1] - 1.0 / 3.0).abs() < 1E-12);
        assert!((out[2] - 2.0 / 3.0).abs() < 1E-12);
    }

    #[test]
    fn missing_score_is_a_configuration_error() {
        let err = normalized("1 off s; 1 off absent", &[Some(1.0)]).unwrap_err();
        assert!(matches!(err, Error::MissingScore { ref score, .. } if score == "absent"));
        assert!(err.is_configuration());

        // Empty partitions are fine
        assert_eq!(normalized("1 off absent", &[]).unwrap(), vec![]);
    }

    #[test]
    fn non_finite_values() {
        let err = normalized("1 linear s", &[Some(1.0), Some(f64::NAN)]).unwrap_err();
        assert!(matches!(err, Error::NonFiniteScore { .. }));
        assert!(!err.is_configuration());
    }

    #[quickcheck]
    fn quantiles_without_ties(values: Vec<i32>) -> bool {
        let mut values = values;
        values.sort_unstable();
        values.dedup();
        let n = values.len();
        // reverse so that input order != score order
        let input = values
            .iter()
            .rev()
            .map(|&v| Some(v as f64))
            .collect::<Vec<_>>();

        let out = normalized("1 quantile s", &input).unwrap();
        let mut q = out.into_iter().map(Option::unwrap).collect::<Vec<_>>();
        // highest value is first and must have quantile N/N
        let matches_order = q.windows(2).all(|w| w[0] > w[1]);
        q.sort_by(|a, b| a.total_cmp(b));
        let expected = (1..=n).map(|i| i as f64 / n as f64).collect::<Vec<_>>();
        matches_order && q == expected
    }
}

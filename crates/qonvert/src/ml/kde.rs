//! Calibrate discriminant scores into probabilities of being correct.
//! Kernel Density Estimation fits a non-parametric model to the target and
//! decoy discriminant distributions, and the posterior error probability is
//! tabulated over evenly spaced bins with linear interpolation between them
//!
//! Käll, 2008 [https://pubmed.ncbi.nlm.nih.gov/18052118/]
//! Ma, 2012 [https://pubmed.ncbi.nlm.nih.gov/23176103/]

use super::*;
use rayon::prelude::*;

pub struct Kde<'a> {
    sample: &'a [f64],
    pub bandwidth: f64,
    constant: f64,
}

impl<'a> Kde<'a> {
    /// Gaussian kernel with Silverman's rule-of-thumb bandwidth
    pub fn new(sample: &'a [f64]) -> Self {
        let factor = 4. / 3.;
        let exponent = 1. / 5.;
        let sigma = std(sample);
        let bandwidth = sigma * (factor / sample.len() as f64).powf(exponent);
        let constant = (2.0 * std::f64::consts::PI).sqrt() * bandwidth * sample.len() as f64;
        Self {
            sample,
            bandwidth,
            constant,
        }
    }

    fn kernel(&self, x: f64) -> f64 {
        (-0.5 * x.powi(2)).exp()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let h = self.bandwidth;

        let sum = self
            .sample
            .iter()
            .fold(0.0, |acc, xi| acc + self.kernel((x - xi) / h));

        sum / self.constant
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("{targets} target and {decoys} decoy scores, both are required")]
    MissingClass { targets: usize, decoys: usize },
    #[error("{0} scores have zero spread")]
    ZeroBandwidth(&'static str),
    #[error("discriminant scores are not finite")]
    NonFinite,
}

/// Number of evenly spaced bins the posterior error is tabulated over
const BINS: usize = 1000;

/// Tabulated posterior error probabilities
#[derive(Clone, Debug)]
pub struct Estimator {
    bins: Vec<f64>,
    min_score: f64,
    score_step: f64,
}

impl Estimator {
    /// Fit a monotonic estimator to target and decoy scores
    pub fn fit(scores: &[f64], decoys: &[bool]) -> Result<Estimator, CalibrationError> {
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }

        let d = scores
            .par_iter()
            .zip(decoys)
            .filter(|&(_, d)| *d)
            .map(|(s, _)| *s)
            .collect::<Vec<_>>();

        let t = scores
            .par_iter()
            .zip(decoys)
            .filter(|&(_, d)| !*d)
            .map(|(s, _)| *s)
            .collect::<Vec<_>>();

        if d.is_empty() || t.is_empty() {
            return Err(CalibrationError::MissingClass {
                targets: t.len(),
                decoys: d.len(),
            });
        }

        // P(decoy)
        let pi = d.len() as f64 / scores.len() as f64;
        let decoy = Kde::new(&d);
        let target = Kde::new(&t);
        if !(decoy.bandwidth > 0.0) {
            return Err(CalibrationError::ZeroBandwidth("decoy"));
        }
        if !(target.bandwidth > 0.0) {
            return Err(CalibrationError::ZeroBandwidth("target"));
        }

        // Essentially, np.linspace(scores.min(), scores.max(), bins)
        let mut min_score = f64::MAX;
        let mut max_score = f64::MIN;
        for s in scores {
            min_score = min_score.min(*s);
            max_score = max_score.max(*s);
        }
        let score_step = (max_score - min_score) / (BINS - 1) as f64;

        // Bins are evaluated in parallel, but each density is summed in
        // order so that results are reproducible
        let mut bins = (0..BINS)
            .into_par_iter()
            .map(|bin| {
                let score = (bin as f64 * score_step) + min_score;
                let decoy = decoy.pdf(score) * pi;
                let target = target.pdf(score) * (1.0 - pi);
                match target + decoy > 0.0 {
                    true => decoy / (target + decoy),
                    // Far outside both distributions
                    false => match score > min_score + score_step * (BINS / 2) as f64 {
                        true => 0.0,
                        false => 1.0,
                    },
                }
            })
            .collect::<Vec<_>>();

        // PEP never increases with score: walking down from the top bin,
        // each bin takes the running maximum
        let mut acc = 0.0f64;
        for x in bins.iter_mut().rev() {
            acc = acc.max(*x);
            *x = acc;
        }

        Ok(Estimator {
            bins,
            min_score,
            score_step,
        })
    }

    /// Calculate the posterior error probability for a given score, under the
    /// pre-fit non-parametric probability model.
    pub fn posterior_error(&self, score: f64) -> f64 {
        let last = self.bins.len().saturating_sub(1);
        // All training scores identical: nothing to interpolate
        if !(self.score_step > 0.0) || score.is_nan() {
            return self.bins.get(0).copied().unwrap_or(1.0);
        }
        if score <= self.min_score {
            return self.bins[0];
        }

        let bin_lo = last.min(((score - self.min_score) / self.score_step).floor() as usize);
        let bin_hi = last.min(bin_lo + 1);

        // PEP of lower & one higher bin
        let lower = self.bins[bin_lo];
        let upper = self.bins[bin_hi];

        // Calculate the discriminant score corresponding to the lower bin
        let bin_lo_score = bin_lo as f64 * self.score_step + self.min_score;
        // What percent of the way to the higher bin are we?
        let linear = ((score - bin_lo_score) / self.score_step).min(1.0);

        // Linear interpolation between lower and upper bin
        let delta = upper - lower;
        (lower + (delta * linear)).clamp(0.0, 1.0)
    }

    /// Probability that a match with this discriminant score is correct
    pub fn probability(&self, score: f64) -> f64 {
        1.0 - self.posterior_error(score)
    }
}

//! Target-decoy competition q-values

use crate::psm::{MatchId, PeptideSpectrumMatch};

pub struct QValueEstimator {
    /// Expected number of targets per decoy among incorrect matches
    target_decoy_ratio: f64,
}

impl Default for QValueEstimator {
    fn default() -> Self {
        Self {
            target_decoy_ratio: 1.0,
        }
    }
}

impl QValueEstimator {
    pub fn new(target_decoy_ratio: f64) -> Self {
        Self { target_decoy_ratio }
    }

    /// Calculate q-values for a set of scored matches, returned in the same
    /// order as the input. Higher scores are better; ties are ordered by
    /// ascending id.
    ///
    /// Returns `None` if there are no decoys - FDR cannot be estimated - or
    /// if the slices differ in length.
    pub fn estimate(&self, scores: &[f64], decoys: &[bool], ids: &[MatchId]) -> Option<Vec<f64>> {
        if scores.len() != decoys.len() || scores.len() != ids.len() {
            log::error!(
                "{} scores, {} labels and {} ids, q-values need one of each per match",
                scores.len(),
                decoys.len(),
                ids.len()
            );
            return None;
        }
        if !decoys.iter().any(|&d| d) {
            return None;
        }

        let mut order = (0..scores.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then_with(|| ids[a].cmp(&ids[b]))
        });

        // FDR Calculation:
        // * Sort by score, descending
        // * Estimate FDR
        // * Calculate q-value
        let mut decoy = 0usize;
        let mut target = 0usize;
        let mut q = vec![1.0; scores.len()];
        for &ix in &order {
            match decoys[ix] {
                true => decoy += 1,
                false => target += 1,
            }
            let fdr = self.target_decoy_ratio * decoy as f64 / target.max(1) as f64;
            q[ix] = fdr.min(1.0);
        }

        // Q-value is the minimum FDR at any given score threshold
        // `q = q[::-1].cummin()[::-1] in python`
        let mut q_min = 1.0f64;
        for &ix in order.iter().rev() {
            q_min = q_min.min(q[ix]);
            q[ix] = q_min;
        }
        Some(q)
    }

    /// Assign q-values in place, returning the number of matches with
    /// q <= `max_fdr`, or `None` if q-values could not be computed
    pub fn assign(&self, psms: &mut [PeptideSpectrumMatch], max_fdr: f64) -> Option<usize> {
        let scores = psms.iter().map(|p| p.discriminant).collect::<Vec<_>>();
        let decoys = psms.iter().map(|p| p.decoy).collect::<Vec<_>>();
        let ids = psms.iter().map(|p| p.id).collect::<Vec<_>>();

        match self.estimate(&scores, &decoys, &ids) {
            Some(q) => {
                let mut passing = 0;
                for (psm, q) in psms.iter_mut().zip(q) {
                    psm.q_value = Some(q);
                    if q <= max_fdr {
                        passing += 1;
                    }
                }
                Some(passing)
            }
            None => {
                psms.iter_mut().for_each(|psm| psm.q_value = None);
                None
            }
        }
    }
}

//! Orchestrates a qonversion run: partition, normalize, score, rerank and
//! estimate q-values for a set of peptide-spectrum matches

use crate::discriminant::{rerank, DiscriminantScorer};
use crate::normalize::ScoreNormalizer;
use crate::partition::{Partition, Partitioner};
use crate::psm::{MatchId, PeptideSpectrumMatch};
use crate::qvalue::QValueEstimator;
use crate::report::{Event, Report};
use crate::score::ScoreCatalog;
use crate::settings::Settings;
use crate::Error;
use fnv::FnvHashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

pub struct Qonverter<'a> {
    settings: &'a Settings,
}

/// Result of a qonversion run. Matches are returned in input order
#[derive(Debug)]
pub struct Qonversion {
    pub psms: Vec<PeptideSpectrumMatch>,
    pub report: Report,
    /// Scores that were actually used, in catalog order. Aligned with
    /// [`PeptideSpectrumMatch::normalized`]
    pub catalog: ScoreCatalog,
    index: FnvHashMap<MatchId, usize>,
    max_fdr: f64,
    max_import_fdr: f64,
}

impl Qonversion {
    pub fn get(&self, id: MatchId) -> Option<&PeptideSpectrumMatch> {
        self.index.get(&id).map(|&ix| &self.psms[ix])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PeptideSpectrumMatch> {
        self.psms.iter()
    }

    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }

    /// q <= MaxFDR
    pub fn passes(&self, psm: &PeptideSpectrumMatch) -> bool {
        psm.q_value.map(|q| q <= self.max_fdr).unwrap_or(false)
    }

    /// q <= MaxImportFDR
    pub fn importable(&self, psm: &PeptideSpectrumMatch) -> bool {
        psm.q_value.map(|q| q <= self.max_import_fdr).unwrap_or(false)
    }
}

impl<'a> IntoIterator for &'a Qonversion {
    type Item = &'a PeptideSpectrumMatch;
    type IntoIter = std::slice::Iter<'a, PeptideSpectrumMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.psms.iter()
    }
}

impl<'a> Qonverter<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn run(&self, psms: Vec<PeptideSpectrumMatch>) -> Result<Qonversion, Error> {
        self.run_with_abort(psms, &AtomicBool::new(false))
    }

    /// Run qonversion, checking `abort` before each partition and between
    /// phases. Setting it makes the run return [`Error::Aborted`]
    pub fn run_with_abort(
        &self,
        mut psms: Vec<PeptideSpectrumMatch>,
        abort: &AtomicBool,
    ) -> Result<Qonversion, Error> {
        let start = Instant::now();
        let settings = self.settings;
        settings.validate()?;

        let mut index = FnvHashMap::default();
        for (ix, psm) in psms.iter().enumerate() {
            if index.insert(psm.id, ix).is_some() {
                return Err(Error::DuplicateMatchId(psm.id));
            }
        }

        for psm in psms.iter_mut() {
            psm.assign_decoy(&settings.decoy_prefix);
            psm.rank = psm.original_rank;
            psm.normalized.clear();
            psm.discriminant = 0.0;
            psm.q_value = None;
            psm.retained = psm.rank <= settings.max_result_rank;
        }

        if psms.is_empty() {
            log::info!("no matches to qonvert");
            return Ok(Qonversion {
                psms,
                report: Report::default(),
                catalog: settings.score_info.clone(),
                index,
                max_fdr: settings.max_fdr,
                max_import_fdr: settings.max_import_fdr,
            });
        }

        let (catalog, dropped) = settings.score_info.retain_present(&psms);
        for name in &dropped {
            log::debug!("- score `{}` is not present in any match, ignoring it", name);
        }
        if catalog.is_empty() {
            return Err(Error::NoScores);
        }
        log::debug!("- scoring with: {}", catalog);

        let total = psms.len();
        let mut partitions = Partitioner::new(settings).partition(psms);
        let normalizer = ScoreNormalizer::new(&catalog);
        for partition in &partitions {
            normalizer.check(&partition.key, &partition.psms)?;
        }
        log::info!(
            "qonverting {} matches in {} partitions",
            total,
            partitions.len()
        );

        let checkpoint = || match abort.load(Ordering::Relaxed) {
            true => Err(Error::Aborted),
            false => Ok(()),
        };
        checkpoint()?;

        let scorer = DiscriminantScorer::new(settings, &catalog);
        partitions.par_iter_mut().for_each(|partition| {
            if abort.load(Ordering::Relaxed) {
                return;
            }
            match normalizer.normalize(&partition.key, &mut partition.psms) {
                Ok(()) => scorer.score(partition),
                Err(e) => abort_partition(partition, e),
            }
        });
        checkpoint()?;

        if settings.rerank_matches {
            rerank(partitions.iter_mut().flat_map(|p| p.psms.iter_mut()));
        }
        for psm in partitions.iter_mut().flat_map(|p| p.psms.iter_mut()) {
            psm.retained = psm.rank <= settings.max_result_rank;
        }

        let estimator = QValueEstimator::new(settings.target_decoy_ratio);
        partitions.par_iter_mut().for_each(|partition| {
            if abort.load(Ordering::Relaxed) || partition.report.aborted() {
                return;
            }
            partition.report.passing = estimator.assign(&mut partition.psms, settings.max_fdr);
            if partition.report.passing.is_none() {
                log::warn!(
                    "- partition {}: no decoys among {} matches, q-values are undefined",
                    partition.key,
                    partition.psms.len()
                );
                partition.report.events.push(Event::NonComputableFdr {
                    targets: partition.report.targets,
                });
            }
        });
        checkpoint()?;

        let mut report = Report {
            dropped_scores: dropped,
            ..Default::default()
        };
        let mut slots = (0..total).map(|_| None).collect::<Vec<_>>();
        for partition in partitions {
            log::debug!(
                "- partition {}: {} matches, {} decoys, {:?} passing",
                partition.key,
                partition.report.matches,
                partition.report.decoys,
                partition.report.passing
            );
            for psm in partition.psms {
                report.matches += 1;
                match psm.decoy {
                    true => report.decoys += 1,
                    false => report.targets += 1,
                }
                if let Some(q) = psm.q_value {
                    report.passing_max_fdr += (q <= settings.max_fdr) as usize;
                    report.passing_max_import_fdr += (q <= settings.max_import_fdr) as usize;
                }
                let ix = index[&psm.id];
                slots[ix] = Some(psm);
            }
            report.partitions.push(partition.report);
        }
        let psms = slots.into_iter().flatten().collect::<Vec<_>>();

        log::info!(
            "{} matches at {} FDR, {} at {} import FDR ({} warnings) in {}ms",
            report.passing_max_fdr,
            settings.max_fdr,
            report.passing_max_import_fdr,
            settings.max_import_fdr,
            report.warnings().count(),
            start.elapsed().as_millis()
        );

        Ok(Qonversion {
            psms,
            report,
            catalog,
            index,
            max_fdr: settings.max_fdr,
            max_import_fdr: settings.max_import_fdr,
        })
    }
}

/// A failure local to one partition: its matches get no discriminant and
/// no q-value, the rest of the run continues
fn abort_partition(partition: &mut Partition, error: Error) {
    log::warn!("- partition {} aborted: {}", partition.key, error);
    for psm in partition.psms.iter_mut() {
        psm.discriminant = f64::NAN;
        psm.q_value = None;
    }
    partition.model = None;
    partition.report.events.push(Event::Aborted {
        error: error.to_string(),
    });
}

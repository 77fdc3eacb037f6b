//! Run-level diagnostics for logging & reporting collaborators
//!
//! Recoverable conditions (degenerate partitions, classifier fallbacks,
//! non-computable FDR) never fail a qonversion run - they are recorded here
//! instead.

use crate::partition::PartitionKey;
use crate::settings::QonverterMethod;
use serde::Serialize;
use std::fmt;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Too few matches or decoys to train a classifier
    Degenerate { matches: usize, decoys: usize },
    /// Training was not attempted
    TrainingSkipped { reason: String },
    /// Training failed, weighted sum of normalized scores was used instead
    Fallback { reason: String },
    /// Probability calibration failed, raw decision margins were used
    ProbabilityUnavailable { reason: String },
    /// Partition has no decoys, q-values are undefined
    NonComputableFdr { targets: usize },
    /// Partition could not be processed at all
    Aborted { error: String },
}

impl Event {
    pub fn is_warning(&self) -> bool {
        !matches!(self, Event::TrainingSkipped { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Degenerate { matches, decoys } => write!(
                f,
                "degenerate partition ({} matches, {} decoys)",
                matches, decoys
            ),
            Event::TrainingSkipped { reason } => write!(f, "training skipped: {}", reason),
            Event::Fallback { reason } => {
                write!(f, "classifier failed ({}), using weighted sum", reason)
            }
            Event::ProbabilityUnavailable { reason } => {
                write!(f, "probability unavailable ({}), using margins", reason)
            }
            Event::NonComputableFdr { targets } => write!(
                f,
                "no decoys among {} targets, q-values are undefined",
                targets
            ),
            Event::Aborted { error } => write!(f, "partition aborted: {}", error),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Discriminant {
    WeightedSum,
    Classifier {
        method: QonverterMethod,
        positives: usize,
        negatives: usize,
        probability: bool,
    },
}

#[derive(Serialize, Clone, Debug)]
pub struct PartitionReport {
    pub key: PartitionKey,
    /// Keys of degenerate partitions that were merged into this one
    pub merged_from: Vec<PartitionKey>,
    pub matches: usize,
    pub targets: usize,
    pub decoys: usize,
    pub degenerate: bool,
    pub discriminant: Discriminant,
    /// Number of matches with q <= MaxFDR, `None` if FDR is not computable
    pub passing: Option<usize>,
    pub events: Vec<Event>,
}

impl PartitionReport {
    pub fn new(key: PartitionKey, matches: usize, decoys: usize) -> Self {
        PartitionReport {
            key,
            merged_from: Vec::new(),
            matches,
            targets: matches - decoys,
            decoys,
            degenerate: false,
            discriminant: Discriminant::WeightedSum,
            passing: None,
            events: Vec::new(),
        }
    }

    pub fn aborted(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, Event::Aborted { .. }))
    }
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct Report {
    pub matches: usize,
    pub targets: usize,
    pub decoys: usize,
    /// Matches with q <= MaxFDR
    pub passing_max_fdr: usize,
    /// Matches with q <= MaxImportFDR
    pub passing_max_import_fdr: usize,
    /// Configured scores that are not present in the input
    pub dropped_scores: Vec<String>,
    pub partitions: Vec<PartitionReport>,
}

impl Report {
    /// All warning-level events, with the partition they occurred in
    pub fn warnings(&self) -> impl Iterator<Item = (&PartitionKey, &Event)> {
        self.partitions
            .iter()
            .flat_map(|p| p.events.iter().map(move |e| (&p.key, e)))
            .filter(|(_, e)| e.is_warning())
    }

    pub fn fallbacks(&self) -> usize {
        self.warnings()
            .filter(|(_, e)| matches!(e, Event::Fallback { .. }))
            .count()
    }

    pub fn non_computable(&self) -> usize {
        self.warnings()
            .filter(|(_, e)| matches!(e, Event::NonComputableFdr { .. }))
            .count()
    }
}

//! Split matches into statistically homogeneous groups
//!
//! Matches with different charge states, terminal specificity etc. have
//! rather different score distributions - each partition gets its own
//! normalization, classifier and q-value estimate.

use crate::discriminant::Trained;
use crate::psm::{PeptideSpectrumMatch, Terminus};
use crate::report::{Event, PartitionReport};
use crate::settings::{DegenerateHandling, Handling, Settings};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Bucket values for each partitioned dimension. Dimensions that are ignored
/// are always `None`
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
pub struct PartitionKey {
    pub charge: Option<u8>,
    pub terminus: Option<Terminus>,
    pub missed_cleavages: Option<u32>,
    pub mass_error: Option<u32>,
}

impl PartitionKey {
    /// L1 distance between two keys over their shared dimensions
    pub fn distance(&self, other: &Self) -> u32 {
        fn d<T: Into<u32>>(a: Option<T>, b: Option<T>) -> u32 {
            match (a, b) {
                (Some(a), Some(b)) => {
                    let (a, b) = (a.into(), b.into());
                    a.max(b) - a.min(b)
                }
                _ => 0,
            }
        }
        d(self.charge, other.charge)
            + d(
                self.terminus.map(Terminus::ntt),
                other.terminus.map(Terminus::ntt),
            )
            + d(self.missed_cleavages, other.missed_cleavages)
            + d(self.mass_error, other.mass_error)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dim<T: fmt::Debug>(x: Option<T>) -> String {
            x.map(|x| format!("{:?}", x)).unwrap_or_else(|| "*".into())
        }
        write!(
            f,
            "[charge={} terminus={} missed_cleavages={} mass_error={}]",
            dim(self.charge),
            dim(self.terminus),
            dim(self.missed_cleavages),
            dim(self.mass_error)
        )
    }
}

pub struct Partition {
    pub key: PartitionKey,
    pub psms: Vec<PeptideSpectrumMatch>,
    /// Classifier trained on this partition, if any
    pub model: Option<Trained>,
    pub report: PartitionReport,
}

impl Partition {
    fn new(key: PartitionKey, psms: Vec<PeptideSpectrumMatch>) -> Self {
        let decoys = psms.iter().filter(|p| p.decoy).count();
        Partition {
            key,
            report: PartitionReport::new(key, psms.len(), decoys),
            psms,
            model: None,
        }
    }

    pub fn decoys(&self) -> usize {
        self.report.decoys
    }

    /// Skip classifier training for this partition?
    pub fn degenerate(&self) -> bool {
        self.report.degenerate
    }

    fn absorb(&mut self, other: Partition) {
        self.report.merged_from.push(other.key);
        self.report
            .merged_from
            .extend(other.report.merged_from.iter().copied());
        self.report.matches += other.report.matches;
        self.report.targets += other.report.targets;
        self.report.decoys += other.report.decoys;
        self.psms.extend(other.psms);
    }
}

pub struct Partitioner<'a> {
    settings: &'a Settings,
}

impl<'a> Partitioner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    fn active(handling: Handling) -> bool {
        handling == Handling::Partition
    }

    /// Clamp `value` into the last of `bins` buckets
    fn bucket(value: usize, bins: usize) -> u32 {
        value.min(bins.max(1) - 1).min(u32::MAX as usize) as u32
    }

    fn mass_error_bin(&self, mass_error: f64) -> u32 {
        let bins = self.settings.mass_error_bins;
        let bin = (mass_error.abs() / self.settings.mass_error_bin_width).round();
        match bin.is_finite() {
            true => Self::bucket(bin as usize, bins),
            false => Self::bucket(usize::MAX, bins),
        }
    }

    pub fn key(&self, psm: &PeptideSpectrumMatch) -> PartitionKey {
        let s = self.settings;
        PartitionKey {
            charge: Self::active(s.charge_state_handling).then(|| psm.charge),
            terminus: Self::active(s.terminal_specificity_handling).then(|| psm.terminus),
            missed_cleavages: Self::active(s.missed_cleavages_handling).then(|| {
                Self::bucket(psm.missed_cleavages as usize, s.missed_cleavage_bins)
            }),
            mass_error: Self::active(s.mass_error_handling)
                .then(|| self.mass_error_bin(psm.mass_error)),
        }
    }

    fn viable(&self, partition: &Partition) -> bool {
        partition.psms.len() >= self.settings.min_partition_size
            && partition.decoys() >= self.settings.min_partition_decoys
    }

    /// Assign every match to exactly one partition. Partitions are returned
    /// in key order
    pub fn partition(&self, psms: Vec<PeptideSpectrumMatch>) -> Vec<Partition> {
        let mut groups: BTreeMap<PartitionKey, Vec<PeptideSpectrumMatch>> = BTreeMap::new();
        for psm in psms {
            groups.entry(self.key(&psm)).or_default().push(psm);
        }

        let (viable, degenerate): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .map(|(key, psms)| Partition::new(key, psms))
            .partition(|p| self.viable(p));

        let merge = self.settings.degenerate_partition_handling == DegenerateHandling::Merge;
        if !merge || viable.is_empty() {
            let mut partitions = viable;
            for mut partition in degenerate {
                log::debug!(
                    "- partition {} is degenerate ({} matches, {} decoys)",
                    partition.key,
                    partition.psms.len(),
                    partition.decoys()
                );
                partition.report.degenerate = true;
                partition.report.events.push(Event::Degenerate {
                    matches: partition.psms.len(),
                    decoys: partition.decoys(),
                });
                partitions.push(partition);
            }
            partitions.sort_by_key(|p| p.key);
            return partitions;
        }

        let mut partitions = viable;
        for partition in degenerate {
            // `partitions` is sorted by key, so `min_by_key` picks the lowest
            // key among equally distant candidates
            let nearest = partitions
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.key.distance(&partition.key))
                .map(|(idx, _)| idx)
                .unwrap_or_default();
            log::debug!(
                "- merging degenerate partition {} ({} matches, {} decoys) into {}",
                partition.key,
                partition.psms.len(),
                partition.decoys(),
                partitions[nearest].key
            );
            partitions[nearest].absorb(partition);
        }
        partitions
    }
}

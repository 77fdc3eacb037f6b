use qonvert_core::partition::Partitioner;
use qonvert_core::report::Event;
use qonvert_core::settings::Builder;
use qonvert_core::{Error, MatchId, PeptideSpectrumMatch, Qonverter, Settings, Terminus};
use quickcheck_macros::quickcheck;
use std::collections::{BTreeMap, HashSet};

/// Deterministic pseudo-noise in [0, 1)
fn noise(i: u64, salt: u64) -> f64 {
    ((i * 7919 + salt * 104_729) % 1000) as f64 / 1000.0
}

/// Two candidates per spectrum over two charge states. A third of the
/// matches are decoys; targets score higher on average, with overlap
fn dataset(spectra: u64) -> Vec<PeptideSpectrumMatch> {
    let mut psms = Vec::new();
    for spectrum in 0..spectra {
        for rank in 1..=2u32 {
            let id = spectrum * 2 + rank as u64;
            let decoy = id % 3 == 0;
            let protein = match decoy {
                true => "rev_sp|P0001".to_string(),
                false => format!("sp|P{:04}", id % 50),
            };
            let shift = match decoy {
                true => 0.0,
                false => 1.5 / rank as f64,
            };
            psms.push(
                PeptideSpectrumMatch::new(
                    id,
                    format!("controllerType=0 scan={}", spectrum),
                    format!("PEPTIDE{}K", id),
                    vec![protein],
                )
                .charge(2 + (spectrum % 2) as u8)
                .terminus(Terminus::Full)
                .rank(rank)
                .mass_error(noise(id, 3) - 0.5)
                .score("myrimatch:mvh", 20.0 * (noise(id, 1) + shift))
                .score("x!tandem:expect", 10f64.powf(-4.0 * (noise(id, 2) + shift))),
            );
        }
    }
    psms
}

fn settings(method: &str) -> Settings {
    Builder {
        qonverter_method: Some(method.into()),
        score_info: Some("1 quantile myrimatch:mvh; -1 linear x!tandem:expect".into()),
        min_partition_size: Some(20),
        min_partition_decoys: Some(5),
        ..Default::default()
    }
    .make_settings()
    .unwrap()
}

#[test]
fn static_weighted_end_to_end() -> Result<(), Error> {
    let settings = settings("StaticWeighted");
    let result = Qonverter::new(&settings).run(dataset(200))?;
    assert_eq!(result.len(), 400);
    assert_eq!(result.report.partitions.len(), 2);
    assert!(result.report.passing_max_fdr > 0);
    assert!(result.report.passing_max_import_fdr >= result.report.passing_max_fdr);
    assert!(result.iter().all(|p| p.q_value.is_some()));
    assert_eq!(result.report.warnings().count(), 0);
    Ok(())
}

#[test]
fn classifiers_end_to_end() -> Result<(), Error> {
    for method in ["PartitionedSVM", "PartitionedLDA"] {
        let settings = settings(method);
        let result = Qonverter::new(&settings).run(dataset(200))?;
        assert_eq!(result.len(), 400);
        assert!(result.report.passing_max_fdr > 0, "{}", method);
        assert!(result
            .iter()
            .all(|p| p.discriminant.is_finite() && p.q_value.is_some()));
    }
    Ok(())
}

#[test]
fn idempotent() -> Result<(), Error> {
    let settings = settings("PartitionedSVM");
    let first = Qonverter::new(&settings).run(dataset(150))?;
    let second = Qonverter::new(&settings).run(first.psms.clone())?;
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.q_value, b.q_value);
        assert_eq!(a.discriminant.to_bits(), b.discriminant.to_bits());
        assert_eq!(a.rank, b.rank);
    }
    Ok(())
}

#[test]
fn q_values_are_monotone_within_partitions() -> Result<(), Error> {
    let settings = settings("PartitionedLDA");
    let psms = dataset(200);
    let partitioner = Partitioner::new(&settings);
    let keys = psms
        .iter()
        .map(|p| (p.id, partitioner.key(p)))
        .collect::<BTreeMap<_, _>>();

    let result = Qonverter::new(&settings).run(psms)?;
    let mut groups = BTreeMap::new();
    for psm in &result {
        groups.entry(keys[&psm.id]).or_insert_with(Vec::new).push(psm);
    }
    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            b.discriminant
                .total_cmp(&a.discriminant)
                .then(a.id.cmp(&b.id))
        });
        for pair in group.windows(2) {
            assert!(pair[0].q_value <= pair[1].q_value);
        }
    }
    Ok(())
}

#[test]
fn partition_without_decoys() -> Result<(), Error> {
    let mut settings = settings("StaticWeighted");
    settings.min_partition_size = 1;
    settings.min_partition_decoys = 0;
    let mut psms = dataset(50);
    // charge 4: five targets and no decoys
    for id in 1000..1005 {
        psms.push(
            PeptideSpectrumMatch::new(
                id,
                format!("scan={}", id),
                "PEPTIDEK".into(),
                vec!["sp|P9999".into()],
            )
            .charge(4)
            .score("myrimatch:mvh", 10.0)
            .score("x!tandem:expect", 0.01),
        );
    }

    let result = Qonverter::new(&settings).run(psms)?;
    for id in 1000..1005 {
        assert_eq!(result.get(MatchId(id)).and_then(|p| p.q_value), None);
    }
    assert!(result.iter().filter(|p| p.charge < 4).all(|p| p.q_value.is_some()));
    assert_eq!(result.report.non_computable(), 1);
    assert!(result.report.warnings().any(|(key, e)| {
        key.charge == Some(4) && matches!(e, Event::NonComputableFdr { targets: 5 })
    }));
    Ok(())
}

#[test]
fn malformed_score_info() {
    let builder = Builder {
        score_info: Some("1 quantile myrimatch:mvh; 1 linear".into()),
        ..Default::default()
    };
    let err = builder.make_settings().unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, Error::InvalidScoreInfo(_)));
}

#[quickcheck]
fn every_match_is_qonverted_once(spectra: u8, merge: bool) -> bool {
    let mut settings = settings("StaticWeighted");
    if !merge {
        settings.degenerate_partition_handling =
            qonvert_core::settings::DegenerateHandling::QValueOnly;
    }
    let psms = dataset(spectra as u64);
    let ids = psms.iter().map(|p| p.id).collect::<Vec<_>>();

    let result = match Qonverter::new(&settings).run(psms) {
        Ok(result) => result,
        Err(_) => return false,
    };
    let unique = result.iter().map(|p| p.id).collect::<HashSet<_>>();
    let counted = result
        .report
        .partitions
        .iter()
        .map(|p| p.matches)
        .sum::<usize>();
    result.iter().map(|p| p.id).eq(ids.iter().copied())
        && unique.len() == ids.len()
        && counted == ids.len()
}

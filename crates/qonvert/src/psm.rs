use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-assigned identifier of a match. Must be unique within one run;
/// also used as the deterministic tie-breaker when ordering by discriminant.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Terminal specificity, i.e. the number of termini consistent with the
/// digestion enzyme
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Serialize, Deserialize)]
pub enum Terminus {
    NonSpecific,
    Semi,
    Full,
}

impl Default for Terminus {
    fn default() -> Self {
        Self::Full
    }
}

impl Terminus {
    /// Convert from number of tryptic termini. Values above 2 saturate.
    pub fn from_ntt(ntt: u8) -> Self {
        match ntt {
            0 => Terminus::NonSpecific,
            1 => Terminus::Semi,
            _ => Terminus::Full,
        }
    }

    pub fn ntt(self) -> u8 {
        match self {
            Terminus::NonSpecific => 0,
            Terminus::Semi => 1,
            Terminus::Full => 2,
        }
    }
}

/// A match is a decoy only if every protein it maps to is a decoy protein
pub fn is_decoy<S: AsRef<str>>(proteins: &[S], decoy_prefix: &str) -> bool {
    !proteins.is_empty() && proteins.iter().all(|p| p.as_ref().starts_with(decoy_prefix))
}

#[derive(Clone, Debug, Serialize)]
/// A candidate peptide identification for a spectrum, with its raw scores
/// as reported by the search engine
pub struct PeptideSpectrumMatch {
    pub id: MatchId,
    /// Spectrum identifier (native id, scan number...)
    pub spectrum: String,
    pub peptide: String,
    /// Protein accessions this peptide maps to
    pub proteins: Vec<String>,
    /// Precursor charge state
    pub charge: u8,
    pub terminus: Terminus,
    pub missed_cleavages: u8,
    /// Observed - calculated precursor mass, in Da
    pub mass_error: f64,
    /// Rank of this match among all matches to the same spectrum. This is
    /// updated when matches are reranked by discriminant
    pub rank: u32,
    /// Rank as reported by the search engine
    pub original_rank: u32,
    /// Derived from protein accessions & the decoy prefix at the start of
    /// qonversion
    pub decoy: bool,
    /// Raw score values, keyed by score name (lowercase)
    pub scores: FnvHashMap<String, f64>,

    /// Normalized score values, aligned with the retained [`ScoreCatalog`]
    ///
    /// [`ScoreCatalog`]: crate::score::ScoreCatalog
    pub normalized: Vec<Option<f64>>,
    /// Combined score used for FDR calculation, higher is better
    pub discriminant: f64,
    /// Assigned q-value. `None` if FDR could not be estimated for the
    /// partition this match belongs to
    pub q_value: Option<f64>,
    /// Is rank <= MaxResultRank?
    pub retained: bool,
}

impl PeptideSpectrumMatch {
    pub fn new<S: Into<String>>(id: u64, spectrum: S, peptide: S, proteins: Vec<String>) -> Self {
        Self {
            id: MatchId(id),
            spectrum: spectrum.into(),
            peptide: peptide.into(),
            proteins,
            charge: 0,
            terminus: Terminus::default(),
            missed_cleavages: 0,
            mass_error: 0.0,
            rank: 1,
            original_rank: 1,
            decoy: false,
            scores: FnvHashMap::default(),
            normalized: Vec::new(),
            discriminant: 0.0,
            q_value: None,
            retained: true,
        }
    }

    pub fn charge(mut self, charge: u8) -> Self {
        self.charge = charge;
        self
    }

    pub fn terminus(mut self, terminus: Terminus) -> Self {
        self.terminus = terminus;
        self
    }

    pub fn missed_cleavages(mut self, missed_cleavages: u8) -> Self {
        self.missed_cleavages = missed_cleavages;
        self
    }

    pub fn mass_error(mut self, mass_error: f64) -> Self {
        self.mass_error = mass_error;
        self
    }

    pub fn rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self.original_rank = rank;
        self
    }

    pub fn score<S: AsRef<str>>(mut self, name: S, value: f64) -> Self {
        self.scores.insert(name.as_ref().to_lowercase(), value);
        self
    }

    /// Target/Decoy label, -1 is decoy, 1 is target
    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    pub fn assign_decoy(&mut self, decoy_prefix: &str) {
        self.decoy = is_decoy(&self.proteins, decoy_prefix);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decoy_requires_all_proteins() {
        assert!(is_decoy(&["rev_P1", "rev_P2"], "rev_"));
        assert!(!is_decoy(&["rev_P1", "P2"], "rev_"));
        assert!(!is_decoy(&["P1"], "rev_"));
        assert!(!is_decoy::<&str>(&[], "rev_"));
        assert!(is_decoy(&["XXX_sp|P1"], "XXX_"));
    }

    #[test]
    fn terminus_from_ntt() {
        assert_eq!(Terminus::from_ntt(0), Terminus::NonSpecific);
        assert_eq!(Terminus::from_ntt(1), Terminus::Semi);
        assert_eq!(Terminus::from_ntt(2), Terminus::Full);
        assert_eq!(Terminus::from_ntt(7), Terminus::Full);
        assert_eq!(Terminus::Semi.ntt(), 1);
    }

    #[test]
    fn scores_are_case_insensitive() {
        let mut psm = PeptideSpectrumMatch::new(1, "scan=1", "PEPTIDE", vec!["rev_P1".into()])
            .score("MyriMatch:MVH", 12.0);
        assert_eq!(psm.scores.get("myrimatch:mvh"), Some(&12.0));

        psm.assign_decoy("rev_");
        assert!(psm.decoy);
        assert_eq!(psm.label(), -1);
    }
}

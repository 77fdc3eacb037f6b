//! Score catalog: which search engine scores take part in qonversion, and how
//!
//! Scores are configured as a `;`-separated list of triplets,
//! `<weight> <off|quantile|linear> <name>`, e.g.
//! `"1 off myrimatch:mvh; -1 quantile x!tandem:expect"`. A negative weight
//! indicates that lower values of the score are better. The string is parsed
//! once into a [`ScoreCatalog`], nothing downstream deals with score strings.

use crate::psm::PeptideSpectrumMatch;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum Order {
    /// Higher values are better
    Ascending,
    /// Lower values are better
    Descending,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum NormalizationMethod {
    Off,
    Quantile,
    Linear,
}

impl FromStr for NormalizationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(NormalizationMethod::Off),
            "quantile" => Ok(NormalizationMethod::Quantile),
            "linear" => Ok(NormalizationMethod::Linear),
            _ => Err(Error::InvalidNormalization(s.into())),
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NormalizationMethod::Off => "off",
            NormalizationMethod::Quantile => "quantile",
            NormalizationMethod::Linear => "linear",
        };
        f.write_str(s)
    }
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ScoreInfo {
    pub name: String,
    /// Always non-negative, the sign of the configured weight is stored in
    /// `order`
    pub weight: f64,
    pub order: Order,
    pub normalization: NormalizationMethod,
}

impl ScoreInfo {
    /// Sign applied to a normalized value when summing weighted scores.
    ///
    /// Linear and quantile normalized values are already oriented so that
    /// larger is better; raw values of a descending score are not.
    pub fn orientation(&self) -> f64 {
        match (self.normalization, self.order) {
            (NormalizationMethod::Off, Order::Descending) => -1.0,
            _ => 1.0,
        }
    }
}

impl FromStr for ScoreInfo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let tokens = lower.split_whitespace().collect::<Vec<_>>();
        if tokens.len() < 3 {
            return Err(Error::InvalidScoreInfo(s.trim().into()));
        }

        let weight = tokens[0]
            .parse::<f64>()
            .map_err(|_| Error::InvalidWeight(tokens[0].into()))?;
        if !weight.is_finite() {
            return Err(Error::InvalidWeight(tokens[0].into()));
        }
        let normalization = tokens[1].parse::<NormalizationMethod>()?;

        Ok(ScoreInfo {
            name: tokens[2..].join(" "),
            weight: weight.abs(),
            order: match weight >= 0.0 {
                true => Order::Ascending,
                false => Order::Descending,
            },
            normalization,
        })
    }
}

impl fmt::Display for ScoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weight = match self.order {
            Order::Ascending => self.weight,
            Order::Descending => -self.weight,
        };
        write!(f, "{} {} {}", weight, self.normalization, self.name)
    }
}

/// Ordered set of [`ScoreInfo`], unique by name
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct ScoreCatalog {
    scores: Vec<ScoreInfo>,
}

impl ScoreCatalog {
    pub fn new(scores: Vec<ScoreInfo>) -> Self {
        let mut catalog = ScoreCatalog::default();
        for score in scores {
            catalog.insert(score);
        }
        catalog
    }

    /// Insert a score, replacing any previous entry with the same name
    pub fn insert(&mut self, score: ScoreInfo) {
        match self.position(&score.name) {
            Some(idx) => self.scores[idx] = score,
            None => self.scores.push(score),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoreInfo> {
        self.scores.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ScoreInfo> {
        self.scores.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.scores.iter().position(|s| s.name == name)
    }

    /// Split the catalog into scores that are present on at least one match,
    /// and the names of those that are absent from all of them
    pub fn retain_present(&self, psms: &[PeptideSpectrumMatch]) -> (ScoreCatalog, Vec<String>) {
        let (present, absent): (Vec<_>, Vec<_>) = self
            .scores
            .iter()
            .cloned()
            .partition(|score| psms.iter().any(|psm| psm.scores.contains_key(&score.name)));
        (
            ScoreCatalog { scores: present },
            absent.into_iter().map(|s| s.name).collect(),
        )
    }
}

impl FromStr for ScoreCatalog {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut catalog = ScoreCatalog::default();
        for token in s.split(';').filter(|t| !t.trim().is_empty()) {
            catalog.insert(token.parse()?);
        }
        Ok(catalog)
    }
}

impl fmt::Display for ScoreCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, score) in self.scores.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            score.fmt(f)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ScoreCatalog {
    type Item = &'a ScoreInfo;
    type IntoIter = std::slice::Iter<'a, ScoreInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.iter()
    }
}

pub mod discriminant;
pub mod ml;
pub mod normalize;
pub mod partition;
pub mod psm;
pub mod qonverter;
pub mod qvalue;
pub mod report;
pub mod score;
pub mod settings;

pub use psm::{MatchId, PeptideSpectrumMatch, Terminus};
pub use qonverter::{Qonversion, Qonverter};
pub use report::Report;
pub use score::{NormalizationMethod, Order, ScoreCatalog, ScoreInfo};
pub use settings::Settings;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid score info `{0}` (must be a space-separated triplet of <weight> <off|quantile|linear> <name>)")]
    InvalidScoreInfo(String),
    #[error("invalid normalization method `{0}` (must be 'off', 'quantile', or 'linear')")]
    InvalidNormalization(String),
    #[error("invalid score weight `{0}`")]
    InvalidWeight(String),
    #[error("invalid value `{value}` for {policy}")]
    InvalidPolicy { policy: &'static str, value: String },
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("score `{score}` is absent from every match in partition {partition}")]
    MissingScore { score: String, partition: String },
    #[error("none of the configured scores are present in the input matches")]
    NoScores,
    #[error("match id {0} appears more than once in the input")]
    DuplicateMatchId(MatchId),
    #[error("non-finite value for score `{score}` on match {id}")]
    NonFiniteScore { score: String, id: MatchId },
    #[error("qonversion aborted")]
    Aborted,
}

impl Error {
    /// Configuration errors are fatal and are raised before any partition
    /// is processed
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidScoreInfo(_)
                | Error::InvalidNormalization(_)
                | Error::InvalidWeight(_)
                | Error::InvalidPolicy { .. }
                | Error::InvalidSetting { .. }
                | Error::MissingScore { .. }
                | Error::NoScores
                | Error::DuplicateMatchId(_)
        )
    }
}

use crate::score::ScoreCatalog;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_SCORE_INFO: &str = "1 off myrimatch:mvh; 1 off xcorr; 1 off sequest:xcorr; \
    1 off sequest:deltacn; 1 off mascot:score; -1 off x!tandem:expect; \
    1 off x!tandem:hyperscore; 1 off numBlindPTMs; 1 off numPTMs";

/// Implement `FromStr` (case-insensitive) for a fieldless policy enum, so that
/// every policy value in configuration is parsed in one place
macro_rules! policy {
    ($ty:ident, $label:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($name) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(Error::InvalidPolicy {
                    policy: $label,
                    value: s.into(),
                })
            }
        }
    };
}

/// How a match attribute takes part in partitioning
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum Handling {
    Partition,
    Ignore,
}

policy!(Handling, "handling policy", { "partition" => Partition, "ignore" => Ignore });

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum QonverterMethod {
    /// Weighted sum of normalized scores
    StaticWeighted,
    /// Support vector machine trained per partition
    PartitionedSVM,
    /// Linear discriminant analysis trained per partition
    PartitionedLDA,
}

policy!(QonverterMethod, "QonverterMethod", {
    "staticweighted" => StaticWeighted,
    "partitionedsvm" => PartitionedSVM,
    "partitionedlda" => PartitionedLDA,
});

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum SvmType {
    CSVC,
    NuSVC,
}

policy!(SvmType, "SVMType", { "csvc" => CSVC, "nusvc" => NuSVC });

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum Kernel {
    Linear,
    Polynomial,
    RBF,
    Sigmoid,
}

policy!(Kernel, "Kernel", {
    "linear" => Linear,
    "polynomial" => Polynomial,
    "rbf" => RBF,
    "sigmoid" => Sigmoid,
});

/// What to do with partitions that have too few matches, or too few decoys
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum DegenerateHandling {
    /// Merge into the nearest viable partition
    Merge,
    /// Keep the partition, but only estimate q-values (no training)
    QValueOnly,
}

policy!(DegenerateHandling, "DegenerateHandling", {
    "merge" => Merge,
    "qvalueonly" => QValueOnly,
});

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// Qonversion parameters as provided by the user - any missing values are
/// filled in with defaults by [`Builder::make_settings`]
pub struct Builder {
    /// Prefix of decoy protein accessions
    pub decoy_prefix: Option<String>,
    pub max_fdr: Option<f64>,
    pub max_import_fdr: Option<f64>,
    pub max_result_rank: Option<u32>,
    pub rerank_matches: Option<bool>,
    /// Targets with a provisional q-value at or below this are used as
    /// positive training examples
    pub true_positive_threshold: Option<f64>,
    pub max_training_rank: Option<u32>,
    pub predict_probability: Option<bool>,
    pub gamma: Option<f64>,
    pub nu: Option<f64>,
    pub polynomial_degree: Option<u32>,
    pub cost: Option<f64>,
    /// `;`-separated list of `<weight> <off|quantile|linear> <name>`
    pub score_info: Option<String>,
    pub qonverter_method: Option<String>,
    pub svm_type: Option<String>,
    pub kernel: Option<String>,
    pub charge_state_handling: Option<String>,
    pub terminal_specificity_handling: Option<String>,
    pub missed_cleavages_handling: Option<String>,
    pub mass_error_handling: Option<String>,
    pub missed_cleavage_bins: Option<usize>,
    pub mass_error_bins: Option<usize>,
    /// Width of a mass error bin, in Da
    pub mass_error_bin_width: Option<f64>,
    /// Upper bound on the number of bins for any binned dimension
    pub max_partition_bins: Option<usize>,
    pub min_partition_size: Option<usize>,
    pub min_partition_decoys: Option<usize>,
    pub degenerate_partition_handling: Option<String>,
    pub target_decoy_ratio: Option<f64>,
}

fn parse_or<T: FromStr<Err = Error>>(value: Option<String>, default: T) -> Result<T, Error> {
    value.map(|v| v.trim().parse()).unwrap_or(Ok(default))
}

fn check(ok: bool, name: &'static str, reason: &str) -> Result<(), Error> {
    match ok {
        true => Ok(()),
        false => Err(Error::InvalidSetting {
            name,
            reason: reason.into(),
        }),
    }
}

impl Builder {
    pub fn make_settings(self) -> Result<Settings, Error> {
        let max_partition_bins = self.max_partition_bins.unwrap_or(16).max(1);
        let score_info = self
            .score_info
            .as_deref()
            .unwrap_or(DEFAULT_SCORE_INFO)
            .parse::<ScoreCatalog>()?;

        let settings = Settings {
            decoy_prefix: self.decoy_prefix.unwrap_or_else(|| "rev_".into()),
            max_fdr: self.max_fdr.unwrap_or(0.05),
            max_import_fdr: self.max_import_fdr.unwrap_or(0.25),
            max_result_rank: self.max_result_rank.unwrap_or(3),
            rerank_matches: self.rerank_matches.unwrap_or(false),
            true_positive_threshold: self.true_positive_threshold.unwrap_or(0.01),
            max_training_rank: self.max_training_rank.unwrap_or(1),
            predict_probability: self.predict_probability.unwrap_or(true),
            gamma: self.gamma.unwrap_or(5.0),
            nu: self.nu.unwrap_or(0.5),
            polynomial_degree: self.polynomial_degree.unwrap_or(3),
            cost: self.cost.unwrap_or(1.0),
            score_info,
            qonverter_method: parse_or(self.qonverter_method, QonverterMethod::PartitionedSVM)?,
            svm_type: parse_or(self.svm_type, SvmType::CSVC)?,
            kernel: parse_or(self.kernel, Kernel::Linear)?,
            charge_state_handling: parse_or(self.charge_state_handling, Handling::Partition)?,
            terminal_specificity_handling: parse_or(
                self.terminal_specificity_handling,
                Handling::Partition,
            )?,
            missed_cleavages_handling: parse_or(self.missed_cleavages_handling, Handling::Ignore)?,
            mass_error_handling: parse_or(self.mass_error_handling, Handling::Ignore)?,
            missed_cleavage_bins: self
                .missed_cleavage_bins
                .unwrap_or(3)
                .clamp(1, max_partition_bins),
            mass_error_bins: self
                .mass_error_bins
                .unwrap_or(3)
                .clamp(1, max_partition_bins),
            mass_error_bin_width: self.mass_error_bin_width.unwrap_or(1.0),
            min_partition_size: self.min_partition_size.unwrap_or(50),
            min_partition_decoys: self.min_partition_decoys.unwrap_or(5),
            degenerate_partition_handling: parse_or(
                self.degenerate_partition_handling,
                DegenerateHandling::Merge,
            )?,
            target_decoy_ratio: self.target_decoy_ratio.unwrap_or(1.0),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Serialize, Clone, Debug)]
/// Immutable configuration for one qonversion run
pub struct Settings {
    pub decoy_prefix: String,
    pub max_fdr: f64,
    pub max_import_fdr: f64,
    pub max_result_rank: u32,
    pub rerank_matches: bool,
    pub true_positive_threshold: f64,
    pub max_training_rank: u32,
    pub predict_probability: bool,
    pub gamma: f64,
    pub nu: f64,
    pub polynomial_degree: u32,
    pub cost: f64,
    #[serde(serialize_with = "crate::settings::serialize_display")]
    pub score_info: ScoreCatalog,
    pub qonverter_method: QonverterMethod,
    pub svm_type: SvmType,
    pub kernel: Kernel,
    pub charge_state_handling: Handling,
    pub terminal_specificity_handling: Handling,
    pub missed_cleavages_handling: Handling,
    pub mass_error_handling: Handling,
    pub missed_cleavage_bins: usize,
    pub mass_error_bins: usize,
    pub mass_error_bin_width: f64,
    pub min_partition_size: usize,
    pub min_partition_decoys: usize,
    pub degenerate_partition_handling: DegenerateHandling,
    pub target_decoy_ratio: f64,
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            decoy_prefix: "rev_".into(),
            max_fdr: 0.05,
            max_import_fdr: 0.25,
            max_result_rank: 3,
            rerank_matches: false,
            true_positive_threshold: 0.01,
            max_training_rank: 1,
            predict_probability: true,
            gamma: 5.0,
            nu: 0.5,
            polynomial_degree: 3,
            cost: 1.0,
            score_info: DEFAULT_SCORE_INFO.parse().unwrap_or_default(),
            qonverter_method: QonverterMethod::PartitionedSVM,
            svm_type: SvmType::CSVC,
            kernel: Kernel::Linear,
            charge_state_handling: Handling::Partition,
            terminal_specificity_handling: Handling::Partition,
            missed_cleavages_handling: Handling::Ignore,
            mass_error_handling: Handling::Ignore,
            missed_cleavage_bins: 3,
            mass_error_bins: 3,
            mass_error_bin_width: 1.0,
            min_partition_size: 50,
            min_partition_decoys: 5,
            degenerate_partition_handling: DegenerateHandling::Merge,
            target_decoy_ratio: 1.0,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let unit = |x: f64| (0.0..=1.0).contains(&x);
        check(!self.decoy_prefix.is_empty(), "decoy_prefix", "must not be empty")?;
        check(unit(self.max_fdr), "max_fdr", "must be within [0, 1]")?;
        check(unit(self.max_import_fdr), "max_import_fdr", "must be within [0, 1]")?;
        check(
            unit(self.true_positive_threshold),
            "true_positive_threshold",
            "must be within [0, 1]",
        )?;
        check(self.max_result_rank >= 1, "max_result_rank", "must be >= 1")?;
        check(self.max_training_rank >= 1, "max_training_rank", "must be >= 1")?;
        check(self.gamma > 0.0, "gamma", "must be positive")?;
        check(self.nu > 0.0 && self.nu <= 1.0, "nu", "must be within (0, 1]")?;
        check(self.polynomial_degree >= 1, "polynomial_degree", "must be >= 1")?;
        check(self.cost > 0.0, "cost", "must be positive")?;
        check(
            self.mass_error_bin_width > 0.0,
            "mass_error_bin_width",
            "must be positive",
        )?;
        check(
            self.target_decoy_ratio > 0.0,
            "target_decoy_ratio",
            "must be positive",
        )?;
        check(!self.score_info.is_empty(), "score_info", "no scores configured")?;
        Ok(())
    }

    /// Does the configured method train a classifier?
    pub fn trains(&self) -> bool {
        self.qonverter_method != QonverterMethod::StaticWeighted
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Builder::default().make_settings().unwrap();
        assert_eq!(settings.decoy_prefix, "rev_");
        assert_eq!(settings.max_fdr, 0.05);
        assert_eq!(settings.max_result_rank, 3);
        assert_eq!(settings.qonverter_method, QonverterMethod::PartitionedSVM);
        assert_eq!(settings.charge_state_handling, Handling::Partition);
        assert_eq!(settings.missed_cleavages_handling, Handling::Ignore);
        assert_eq!(settings.score_info.len(), 9);
        assert_eq!(settings.score_info, Settings::default().score_info);
    }

    #[test]
    fn deserialize_overrides() {
        let builder: Builder = serde_json::from_str(
            r#"{
                "decoy_prefix": "XXX_",
                "score_info": "1 quantile mvh",
                "kernel": "Polynomial",
                "mass_error_handling": "partition",
                "mass_error_bins": 100,
                "max_partition_bins": 4
            }"#,
        )
        .unwrap();
        let settings = builder.make_settings().unwrap();
        assert_eq!(settings.decoy_prefix, "XXX_");
        assert_eq!(settings.kernel, Kernel::Polynomial);
        assert_eq!(settings.mass_error_handling, Handling::Partition);
        assert_eq!(settings.mass_error_bins, 4);
        assert_eq!(settings.score_info.len(), 1);
    }

    #[test]
    fn unknown_policy_is_a_configuration_error() {
        let builder = Builder {
            charge_state_handling: Some("Bucket".into()),
            ..Default::default()
        };
        let err = builder.make_settings().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidPolicy {
                policy: "handling policy",
                value: "Bucket".into()
            }
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_score_info() {
        let builder = Builder {
            score_info: Some("1 off".into()),
            ..Default::default()
        };
        assert!(matches!(
            builder.make_settings(),
            Err(Error::InvalidScoreInfo(_))
        ));
    }

    #[test]
    fn out_of_range_values() {
        let builder = Builder {
            max_fdr: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            builder.make_settings(),
            Err(Error::InvalidSetting {
                name: "max_fdr",
                ..
            })
        ));

        let builder = Builder {
            score_info: Some(" ; ".into()),
            ..Default::default()
        };
        assert!(builder.make_settings().is_err());
    }
}

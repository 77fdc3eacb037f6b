use anyhow::{ensure, Context};
use clap::ArgMatches;
use qonvert_core::settings::Builder;
use qonvert_core::Settings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual qonversion parameters - may include overrides or default values not set by user
pub struct Parameters {
    pub version: String,
    pub settings: Settings,
    pub input_paths: Vec<String>,
    pub output_paths: Vec<String>,
    /// Inserted into every output file name, before the extension
    pub output_suffix: String,
    pub overwrite: bool,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file. Every qonversion setting may
/// be given at the top level, missing ones take their default value
pub struct Input {
    #[serde(flatten)]
    pub settings: Builder,
    pub output_directory: Option<String>,
    pub output_suffix: Option<String>,
    pub overwrite: Option<bool>,
    pub input_paths: Option<Vec<String>>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing parameters argument")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(input_paths) = matches.get_many::<String>("input_paths") {
            log::trace!("overriding `input_paths` parameter.");
            input.input_paths = Some(input_paths.into_iter().map(|p| p.into()).collect());
        }
        if let Some(decoy_prefix) = matches.get_one::<String>("decoy-prefix") {
            log::trace!("overriding `decoy_prefix` parameter.");
            input.settings.decoy_prefix = Some(decoy_prefix.into());
        }
        if let Some(max_fdr) = matches.get_one::<f64>("max-fdr").copied() {
            log::trace!("overriding `max_fdr` parameter.");
            input.settings.max_fdr = Some(max_fdr);
        }
        if let Some(output_suffix) = matches.get_one::<String>("output-suffix") {
            log::trace!("overriding `output_suffix` parameter.");
            input.output_suffix = Some(output_suffix.into());
        }
        if matches.get_flag("overwrite") {
            log::trace!("overriding `overwrite` parameter.");
            input.overwrite = Some(true);
        }

        ensure!(
            input.input_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`input_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Parameters> {
        let settings = self
            .settings
            .make_settings()
            .context("Invalid qonversion settings")?;

        if settings.max_import_fdr < settings.max_fdr {
            log::warn!(
                "`max_import_fdr` ({}) is lower than `max_fdr` ({})",
                settings.max_import_fdr,
                settings.max_fdr
            );
        }

        let input_paths = self.input_paths.unwrap_or_default();
        ensure!(!input_paths.is_empty(), "`input_paths` must be set");

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Parameters {
            version: clap::crate_version!().into(),
            settings,
            input_paths,
            output_paths: Vec::new(),
            output_suffix: self.output_suffix.unwrap_or_default(),
            overwrite: self.overwrite.unwrap_or(false),
            output_directory,
        })
    }
}

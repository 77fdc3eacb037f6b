use crate::input::Parameters;
use crate::table::PsmTable;
use anyhow::{ensure, Context};
use log::info;
use qonvert_core::{Qonversion, Qonverter};
use std::path::PathBuf;
use std::time::Instant;

pub(crate) const MATCHES: &str = "results.qonvert.tsv";
pub(crate) const REPORT: &str = "qonvert.report.json";
const RESULTS: &str = "results.json";
const OUTPUTS: [&str; 3] = [MATCHES, REPORT, RESULTS];

pub struct Runner {
    pub parameters: Parameters,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Parameters) -> anyhow::Result<Self> {
        let start = Instant::now();
        info!(
            "qonverting {} files with {:?}, scores: {}",
            parameters.input_paths.len(),
            parameters.settings.qonverter_method,
            parameters.settings.score_info
        );
        Ok(Self { parameters, start })
    }

    // Create a path for `file_name` in the specified output directory, with
    // the output suffix inserted before the first extension
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        let file_name = file_name.as_ref();
        let suffix = &self.parameters.output_suffix;
        let file_name = match file_name.split_once('.') {
            Some((stem, ext)) => format!("{}{}.{}", stem, suffix, ext),
            None => format!("{}{}", file_name, suffix),
        };
        self.parameters.output_directory.join(file_name)
    }

    fn check_outputs(&self) -> anyhow::Result<()> {
        if self.parameters.overwrite {
            return Ok(());
        }
        for name in OUTPUTS {
            let path = self.make_path(name);
            ensure!(
                !path.exists(),
                "`{}` already exists, set `overwrite` to replace it",
                path.display()
            );
        }
        Ok(())
    }

    fn qonvert(&self, table: &mut PsmTable) -> anyhow::Result<Qonversion> {
        let psms = std::mem::take(&mut table.psms);
        let qonversion = Qonverter::new(&self.parameters.settings)
            .run(psms)
            .context("Qonversion failed")?;

        for (key, event) in qonversion.report.warnings() {
            log::warn!("partition {}: {}", key, event);
        }
        info!(
            "{} partitions, {} fell back to the weighted sum, {} without computable FDR",
            qonversion.report.partitions.len(),
            qonversion.report.fallbacks(),
            qonversion.report.non_computable()
        );
        Ok(qonversion)
    }

    pub fn run(mut self) -> anyhow::Result<Qonversion> {
        self.check_outputs()?;
        let mut table = PsmTable::read_all(&self.parameters.input_paths)?;
        info!(
            "read {} matches from {} files in {:#?}",
            table.psms.len(),
            self.parameters.input_paths.len(),
            self.start.elapsed()
        );

        let qonversion = self.qonvert(&mut table)?;
        info!(
            "{} of {} matches pass q <= {}",
            qonversion.report.passing_max_fdr,
            qonversion.len(),
            self.parameters.settings.max_fdr
        );

        let path = self.write_matches(&qonversion, &table)?;
        self.parameters.output_paths.push(path);
        let path = self.write_report(&qonversion)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path(RESULTS);
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(qonversion)
    }
}

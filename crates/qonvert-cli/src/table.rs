//! Tab-separated tables of peptide-spectrum matches

use anyhow::{bail, Context};
use qonvert_core::{PeptideSpectrumMatch, Terminus};
use std::path::Path;
use std::str::FromStr;

const REQUIRED: [&str; 8] = [
    "spectrum",
    "peptide",
    "proteins",
    "charge",
    "ntt",
    "missed_cleavages",
    "mass_error",
    "rank",
];

/// Matches read from one or more tables. Match ids are assigned in reading
/// order, so `files[id]` and `spectra[id]` describe the match with that id
#[derive(Default)]
pub struct PsmTable {
    pub psms: Vec<PeptideSpectrumMatch>,
    pub files: Vec<usize>,
    pub spectra: Vec<String>,
    /// Score column names, in order of first appearance
    pub score_columns: Vec<String>,
}

fn parse<T>(field: &str, column: &str, line: u64) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    field
        .trim()
        .parse::<T>()
        .with_context(|| format!("invalid `{}` value `{}` on line {}", column, field, line))
}

impl PsmTable {
    pub fn read_all<S: AsRef<str>>(paths: &[S]) -> anyhow::Result<Self> {
        let mut table = PsmTable::default();
        for (file, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let before = table.psms.len();
            table
                .read(file, Path::new(path))
                .with_context(|| format!("Failed to read matches from `{}`", path))?;
            log::info!("- {}: {} matches", path, table.psms.len() - before);
        }
        Ok(table)
    }

    fn read(&mut self, file: usize, path: &Path) -> anyhow::Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;

        let headers = rdr.headers()?.clone();
        let mut columns = [0usize; REQUIRED.len()];
        for (column, name) in columns.iter_mut().zip(REQUIRED) {
            *column = match headers.iter().position(|h| h.trim() == name) {
                Some(ix) => ix,
                None => bail!("missing required column `{}`", name),
            };
        }

        let scores = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !REQUIRED.contains(&h.trim()))
            .map(|(ix, h)| (ix, h.trim().to_lowercase()))
            .collect::<Vec<_>>();
        for (_, name) in &scores {
            if !self.score_columns.contains(name) {
                self.score_columns.push(name.clone());
            }
        }

        for record in rdr.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let field = |ix: usize| record.get(columns[ix]).unwrap_or_default();

            let spectrum = field(0).to_string();
            let proteins = field(2)
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect::<Vec<_>>();

            // Reranking groups matches by spectrum, which must not collide
            // between files
            let mut psm = PeptideSpectrumMatch::new(
                self.psms.len() as u64,
                format!("{}:{}", file, spectrum),
                field(1).to_string(),
                proteins,
            )
            .charge(parse(field(3), REQUIRED[3], line)?)
            .terminus(Terminus::from_ntt(parse(field(4), REQUIRED[4], line)?))
            .missed_cleavages(parse(field(5), REQUIRED[5], line)?)
            .mass_error(parse(field(6), REQUIRED[6], line)?)
            .rank(parse(field(7), REQUIRED[7], line)?);

            for (ix, name) in &scores {
                let value = record.get(*ix).unwrap_or_default();
                if value.trim().is_empty() {
                    continue;
                }
                psm = psm.score(name, parse(value, name, line)?);
            }

            self.psms.push(psm);
            self.files.push(file);
            self.spectra.push(spectrum);
        }
        Ok(())
    }
}

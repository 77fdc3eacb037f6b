use crate::runner::{Runner, MATCHES, REPORT};
use crate::table::PsmTable;
use anyhow::Context;
use qonvert_core::{PeptideSpectrumMatch, Qonversion};
use rayon::prelude::*;

impl Runner {
    pub fn serialize_match(
        &self,
        psm: &PeptideSpectrumMatch,
        table: &PsmTable,
        passes: bool,
    ) -> csv::ByteRecord {
        let ix = psm.id.0 as usize;
        let mut record = csv::ByteRecord::new();
        let filename = &self.parameters.input_paths[table.files[ix]];
        record.push_field(filename.as_bytes());
        record.push_field(table.spectra[ix].as_bytes());
        record.push_field(psm.peptide.as_bytes());
        record.push_field(psm.proteins.join(";").as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.charge).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.terminus.ntt()).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.missed_cleavages).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.mass_error).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.original_rank).as_bytes());
        for name in &table.score_columns {
            match psm.scores.get(name) {
                Some(value) => record.push_field(ryu::Buffer::new().format(*value).as_bytes()),
                None => record.push_field(b""),
            }
        }
        record.push_field(itoa::Buffer::new().format(psm.label()).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.discriminant).as_bytes());
        match psm.q_value {
            Some(q) => record.push_field(ryu::Buffer::new().format(q).as_bytes()),
            None => record.push_field(b""),
        }
        record.push_field(itoa::Buffer::new().format(psm.rank).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.retained as u8).as_bytes());
        record.push_field(itoa::Buffer::new().format(passes as u8).as_bytes());
        record
    }

    pub fn write_matches(
        &self,
        qonversion: &Qonversion,
        table: &PsmTable,
    ) -> anyhow::Result<String> {
        let path = self.make_path(MATCHES);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let mut headers = vec![
            "filename",
            "spectrum",
            "peptide",
            "proteins",
            "charge",
            "ntt",
            "missed_cleavages",
            "mass_error",
            "original_rank",
        ];
        headers.extend(table.score_columns.iter().map(String::as_str));
        headers.extend([
            "label",
            "discriminant",
            "q_value",
            "rank",
            "retained",
            "passes_max_fdr",
        ]);

        wtr.write_byte_record(&csv::ByteRecord::from(headers))?;
        for record in qonversion
            .psms
            .par_iter()
            .map(|psm| self.serialize_match(psm, table, qonversion.passes(psm)))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn write_report(&self, qonversion: &Qonversion) -> anyhow::Result<String> {
        let path = self.make_path(REPORT);
        let bytes = serde_json::to_vec_pretty(&qonversion.report)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }
}

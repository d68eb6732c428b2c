use std::fs;

use camino::Utf8PathBuf;
use tempfile::Builder;

use crate::error::ConvertError;
use crate::isatab::{INVESTIGATION_FILE, Investigation, IsaTabModel, Table};

const STAGING_PREFIX: &str = ".bids2isatab-";

/// Writes an [`IsaTabModel`] as `i_investigation.txt`, `s_study.txt` and one
/// file per assay table.
///
/// Files are rendered into a staging directory inside the output directory
/// and renamed into place afterwards, so a file under its final name is always
/// complete.
#[derive(Debug, Clone)]
pub struct IsaTabWriter {
    output_dir: Utf8PathBuf,
}

impl IsaTabWriter {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the written paths, investigation first.
    pub fn write(&self, model: &IsaTabModel) -> Result<Vec<Utf8PathBuf>, ConvertError> {
        let failed = |reason: String| ConvertError::OutputWrite {
            path: self.output_dir.to_string(),
            reason,
        };

        let mut rendered = vec![(
            INVESTIGATION_FILE.to_string(),
            render_investigation(&model.investigation),
        )];
        rendered.push((model.study.file_name.clone(), render_table(&model.study)?));
        for assay in &model.assays {
            rendered.push((assay.file_name.clone(), render_table(assay)?));
        }

        fs::create_dir_all(self.output_dir.as_std_path()).map_err(|err| failed(err.to_string()))?;
        let staging = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(self.output_dir.as_std_path())
            .map_err(|err| failed(err.to_string()))?;

        for (name, content) in &rendered {
            fs::write(staging.path().join(name), content).map_err(|err| failed(err.to_string()))?;
        }

        let mut written = Vec::with_capacity(rendered.len());
        for (name, _) in &rendered {
            let target = self.output_dir.join(name);
            fs::rename(staging.path().join(name), target.as_std_path()).map_err(|err| {
                ConvertError::OutputWrite {
                    path: target.to_string(),
                    reason: err.to_string(),
                }
            })?;
            tracing::debug!("wrote {target}");
            written.push(target);
        }

        staging.close().map_err(|err| failed(err.to_string()))?;
        Ok(written)
    }
}

/// Tab-separated table with a header row and `\n` line endings. Values are
/// quoted only when they contain a tab, quote or line break.
pub fn render_table(table: &Table) -> Result<String, ConvertError> {
    let failed = |reason: String| ConvertError::OutputWrite {
        path: table.file_name.clone(),
        reason,
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(table.headers())
        .map_err(|err| failed(err.to_string()))?;
    for row in table.rows() {
        writer
            .write_record(&row)
            .map_err(|err| failed(err.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| failed(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| failed(err.to_string()))
}

/// Section headers on their own line, then `Label<TAB>"value"...` per field.
pub fn render_investigation(investigation: &Investigation) -> String {
    let mut out = String::new();
    for section in &investigation.sections {
        out.push_str(&section.name);
        out.push('\n');
        for field in &section.fields {
            out.push_str(&field.label);
            for value in &field.values {
                out.push('\t');
                out.push('"');
                out.push_str(&sanitize(value).replace('"', "\"\""));
                out.push('"');
            }
            out.push('\n');
        }
    }
    out
}

/// Investigation values live on one line.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isatab::{Column, InvestigationSection};

    #[test]
    fn table_quotes_only_when_needed() {
        let table = Table::new(
            "a_mri.txt",
            2,
            vec![
                Column::new("Sample Name", vec!["01".into(), "02".into()]),
                Column::new(
                    "Parameter Value[sequence]",
                    vec!["gre".into(), "a\tb".into()],
                ),
            ],
        );
        let text = render_table(&table).unwrap();
        assert_eq!(
            text,
            "Sample Name\tParameter Value[sequence]\n01\tgre\n02\t\"a\tb\"\n"
        );
    }

    #[test]
    fn investigation_values_are_quoted() {
        let investigation = Investigation {
            sections: vec![
                InvestigationSection::new("INVESTIGATION")
                    .field("Investigation Title", ["The \"big\" one"])
                    .empty("Investigation Description"),
            ],
        };
        assert_eq!(
            render_investigation(&investigation),
            "INVESTIGATION\nInvestigation Title\t\"The \"\"big\"\" one\"\nInvestigation Description\n"
        );
    }

    #[test]
    fn write_leaves_no_staging_directory() {
        let temp = tempfile::tempdir().unwrap();
        let out = Utf8PathBuf::from_path_buf(temp.path().join("isa")).unwrap();
        let model = IsaTabModel {
            investigation: Investigation::default(),
            study: Table::new(crate::isatab::STUDY_FILE, 0, vec![]),
            assays: vec![Table::new("a_mri.txt", 0, vec![])],
        };
        let written = IsaTabWriter::new(out.clone()).write(&model).unwrap();
        assert_eq!(written.len(), 3);

        let mut names = fs::read_dir(out.as_std_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["a_mri.txt", "i_investigation.txt", "s_study.txt"]);
    }
}

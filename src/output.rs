use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ConversionReport, ProgressEvent, ProgressSink};
use crate::error::WarningKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &ConversionReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Discards progress; for callers that only want the final report.
impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &ConversionReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_report(&mut stdout, report)
    }

    pub fn write_report<W: Write>(out: &mut W, report: &ConversionReport) -> io::Result<()> {
        writeln!(out, "Metadata extraction complete.")?;
        writeln!(out, "Dataset: {}", report.dataset)?;
        writeln!(
            out,
            "Subjects: {}, data files: {}, assay rows: {}",
            report.subjects, report.entities, report.assay_rows
        )?;
        if report.skipped_entities > 0 {
            writeln!(
                out,
                "Skipped (unsupported modality): {}",
                report.skipped_entities
            )?;
        }
        if report.malformed_sidecars > 0 {
            writeln!(out, "Malformed sidecars: {}", report.malformed_sidecars)?;
        }
        let unknown_terms = report.warnings_of(WarningKind::UnknownTermValue);
        if unknown_terms > 0 {
            writeln!(out, "Unknown term values: {unknown_terms}")?;
        }
        writeln!(out, "Warnings: {}", report.warnings.len())?;
        for file in &report.files {
            writeln!(out, "  {file}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Warning;

    #[test]
    fn text_summary_mentions_skips() {
        let report = ConversionReport {
            dataset: "ds000001".to_string(),
            output_dir: "out".to_string(),
            files: vec!["out/i_investigation.txt".to_string()],
            subjects: 2,
            entities: 3,
            assay_rows: 2,
            skipped_entities: 1,
            skipped_files: 4,
            malformed_sidecars: 0,
            warnings: vec![Warning {
                kind: WarningKind::UnsupportedModality,
                path: Some("sub-01/eeg/sub-01_task-rest_eeg.edf".to_string()),
                message: "unsupported modality 'eeg'".to_string(),
            }],
        };
        let mut buffer = Vec::new();
        TextOutput::write_report(&mut buffer, &report).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Metadata extraction complete.\n"));
        assert!(text.contains("Skipped (unsupported modality): 1"));
        assert!(!text.contains("Malformed sidecars"));
        assert!(text.contains("Warnings: 1"));
    }
}

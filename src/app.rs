use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::dataset::DatasetInfo;
use crate::error::{ConvertError, Warning, WarningKind};
use crate::mapper::{EntityRecord, MappingInput, map_dataset};
use crate::metadata::MetadataExtractor;
use crate::nifti::read_geometry;
use crate::ontology::{ParameterFilter, ParameterNames};
use crate::scanner::{ScanResult, scan};
use crate::writer::IsaTabWriter;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub filter: ParameterFilter,
    /// Extra BIDS key → parameter name synonyms.
    pub parameter_names: BTreeMap<String, String>,
}

impl ConvertOptions {
    pub fn new(
        input: impl Into<Utf8PathBuf>,
        output: impl Into<Utf8PathBuf>,
        config: ResolvedConfig,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            filter: config.filter,
            parameter_names: config.parameter_names,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Scanning,
    Extracting,
    Mapping,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::Scanning => "Scanning",
            Stage::Extracting => "Extracting",
            Stage::Mapping => "Mapping",
            Stage::Writing => "Writing",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the log.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                "phase={}; {} ({:.2?})",
                event.stage,
                event.message,
                elapsed
            ),
            None => tracing::info!("phase={}; {}", event.stage, event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub dataset: String,
    pub output_dir: String,
    pub files: Vec<String>,
    pub subjects: usize,
    pub entities: usize,
    pub assay_rows: usize,
    pub skipped_entities: usize,
    pub skipped_files: usize,
    pub malformed_sidecars: usize,
    pub warnings: Vec<Warning>,
}

impl ConversionReport {
    pub fn warnings_of(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

/// One conversion run: scan, extract, map, write.
pub struct Converter {
    options: ConvertOptions,
    names: ParameterNames,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        let names = ParameterNames::with_overrides(&options.parameter_names);
        Self { options, names }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<ConversionReport, ConvertError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            stage: Stage::Idle,
            message: format!("converting {}", self.options.input),
            elapsed: None,
        });

        let result = self.run_stages(sink, started);
        if let Err(err) = &result {
            sink.event(ProgressEvent {
                stage: Stage::Failed,
                message: err.to_string(),
                elapsed: Some(started.elapsed()),
            });
        }
        result
    }

    fn run_stages(
        &self,
        sink: &dyn ProgressSink,
        started: Instant,
    ) -> Result<ConversionReport, ConvertError> {
        sink.event(ProgressEvent {
            stage: Stage::Scanning,
            message: format!("scanning {}", self.options.input),
            elapsed: None,
        });
        let scanned = scan(&self.options.input)?;

        sink.event(ProgressEvent {
            stage: Stage::Extracting,
            message: format!("reading metadata for {} files", scanned.entities.len()),
            elapsed: Some(started.elapsed()),
        });
        let mut warnings = Vec::new();
        let (dataset, records, malformed_sidecars) = extract(&scanned, &mut warnings);

        sink.event(ProgressEvent {
            stage: Stage::Mapping,
            message: "building ISA-Tab tables".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let mapping = map_dataset(&MappingInput {
            dataset: &dataset,
            subjects: &scanned.subjects,
            records: &records,
            filter: &self.options.filter,
            names: &self.names,
        });
        for warning in &mapping.warnings {
            tracing::warn!("{}", warning.message);
        }
        warnings.extend(mapping.warnings);

        sink.event(ProgressEvent {
            stage: Stage::Writing,
            message: format!("writing to {}", self.options.output),
            elapsed: Some(started.elapsed()),
        });
        let files = IsaTabWriter::new(self.options.output.clone()).write(&mapping.model)?;

        let report = ConversionReport {
            dataset: dataset.title().to_string(),
            output_dir: self.options.output.to_string(),
            files: files.iter().map(ToString::to_string).collect(),
            subjects: scanned.subjects.len(),
            entities: scanned.entities.len(),
            assay_rows: mapping.model.assay_row_count(),
            skipped_entities: mapping.skipped_entities,
            skipped_files: scanned.skipped_files,
            malformed_sidecars,
            warnings,
        };
        sink.event(ProgressEvent {
            stage: Stage::Done,
            message: format!(
                "{} assay rows, {} warnings",
                report.assay_rows,
                report.warnings.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }
}

/// Dataset files, sidecars and image headers for every scanned entity.
fn extract(
    scanned: &ScanResult,
    warnings: &mut Vec<Warning>,
) -> (DatasetInfo, Vec<EntityRecord>, usize) {
    let mut report = |err: ConvertError| {
        tracing::warn!("{err}");
        warnings.push(Warning::from(&err));
    };
    let mut malformed_sidecars = 0;

    let (dataset, errors) = DatasetInfo::load(&scanned.root);
    for err in errors {
        report(err);
    }

    let mut extractor = MetadataExtractor::new(scanned.root.clone());
    let mut records = Vec::with_capacity(scanned.entities.len());
    for entity in &scanned.entities {
        let (metadata, errors) = extractor.resolve(entity);
        for err in errors {
            if matches!(err, ConvertError::MalformedMetadata { .. }) {
                malformed_sidecars += 1;
            }
            report(err);
        }

        let geometry = if matches!(entity.name.extension(), ".nii" | ".nii.gz") {
            match read_geometry(&entity.path) {
                Ok(geometry) => Some(geometry),
                Err(err) => {
                    report(err);
                    None
                }
            }
        } else {
            None
        };

        records.push(EntityRecord {
            entity: entity.clone(),
            metadata,
            geometry,
        });
    }

    (dataset, records, malformed_sidecars)
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::dataset::DatasetInfo;
use crate::domain::{BidsEntity, Datatype, SessionId, SubjectId, sample_name};
use crate::error::{ConvertError, Warning};
use crate::isatab::{Column, Investigation, InvestigationSection, IsaTabModel, STUDY_FILE, Table};
use crate::metadata::MetadataRecord;
use crate::nifti::ImageGeometry;
use crate::ontology::{
    ONTOLOGY_SOURCES, ParameterFilter, ParameterNames, annotate, canonical_value,
    parameter_header,
};
use crate::scanner::SubjectLayout;

const RECRUITMENT_PROTOCOL: &str = "Participant recruitment";
const MODALITY_HEADER: &str = "Parameter Value[modality]";
const RESOLUTION_HEADER: &str = "Parameter Value[resolution]";

/// Assay table an entity lands in, chosen by its datatype folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssayKind {
    MagneticResonanceImaging,
    PositronEmissionTomography,
}

impl AssayKind {
    pub fn for_datatype(datatype: &Datatype) -> Option<Self> {
        match datatype.as_str() {
            "anat" | "func" | "dwi" | "fmap" | "perf" => Some(AssayKind::MagneticResonanceImaging),
            "pet" => Some(AssayKind::PositronEmissionTomography),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            AssayKind::MagneticResonanceImaging => "a_mri.txt",
            AssayKind::PositronEmissionTomography => "a_pet.txt",
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            AssayKind::MagneticResonanceImaging => "Magnetic Resonance Imaging",
            AssayKind::PositronEmissionTomography => "Positron Emission Tomography",
        }
    }

    fn technology(&self) -> &'static str {
        match self {
            AssayKind::MagneticResonanceImaging => "MRI Scanner",
            AssayKind::PositronEmissionTomography => "PET Scanner",
        }
    }
}

impl fmt::Display for AssayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol())
    }
}

pub fn assay_kind(entity: &BidsEntity) -> Result<AssayKind, ConvertError> {
    AssayKind::for_datatype(&entity.datatype).ok_or_else(|| ConvertError::UnsupportedModality {
        path: entity.relative_path.clone(),
        datatype: entity.datatype.to_string(),
    })
}

/// Everything the extract stage learned about one entity.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity: BidsEntity,
    pub metadata: MetadataRecord,
    pub geometry: Option<ImageGeometry>,
}

pub struct MappingInput<'a> {
    pub dataset: &'a DatasetInfo,
    pub subjects: &'a [SubjectLayout],
    pub records: &'a [EntityRecord],
    pub filter: &'a ParameterFilter,
    pub names: &'a ParameterNames,
}

#[derive(Debug, Clone)]
pub struct Mapping {
    pub model: IsaTabModel,
    pub warnings: Vec<Warning>,
    pub skipped_entities: usize,
}

/// Maps scanned entities onto the ISA-Tab model. Same input, same output.
pub fn map_dataset(input: &MappingInput<'_>) -> Mapping {
    let mut warnings = Vec::new();
    let mut skipped_entities = 0;

    let mut by_kind: BTreeMap<AssayKind, Vec<&EntityRecord>> = BTreeMap::new();
    for record in input.records {
        match assay_kind(&record.entity) {
            Ok(kind) => by_kind.entry(kind).or_default().push(record),
            Err(err) => {
                skipped_entities += 1;
                warnings.push(Warning::from(&err));
            }
        }
    }
    if by_kind.is_empty() {
        by_kind.insert(AssayKind::MagneticResonanceImaging, Vec::new());
    }

    let (study, study_warnings) = build_study(input);
    warnings.extend(study_warnings);

    let mut assays = Vec::with_capacity(by_kind.len());
    let mut protocols = Vec::with_capacity(by_kind.len());
    for (kind, records) in &by_kind {
        let (table, parameters, assay_warnings) = build_assay(*kind, records, input);
        warnings.extend(assay_warnings);
        protocols.push((*kind, parameters));
        assays.push(table);
    }

    let investigation = build_investigation(input.dataset, &protocols);

    Mapping {
        model: IsaTabModel {
            investigation,
            study,
            assays,
        },
        warnings,
        skipped_entities,
    }
}

fn study_samples(input: &MappingInput<'_>) -> BTreeSet<(SubjectId, Option<SessionId>)> {
    let mut samples = BTreeSet::new();
    for subject in input.subjects {
        if subject.sessions.is_empty() {
            samples.insert((subject.id.clone(), None));
        }
        for session in &subject.sessions {
            samples.insert((subject.id.clone(), Some(session.clone())));
        }
    }
    for record in input.records {
        samples.insert((
            record.entity.subject.clone(),
            record.entity.session.clone(),
        ));
    }
    samples
}

fn build_study(input: &MappingInput<'_>) -> (Table, Vec<Warning>) {
    let samples = study_samples(input);
    let rows = samples.len();
    let participants = &input.dataset.participants;

    let mut characteristics = Vec::new();
    let mut comments = Vec::new();
    for column in &participants.columns {
        let header = match column.as_str() {
            "sex" => "Characteristics[sex]".to_string(),
            "handedness" => "Characteristics[handedness]".to_string(),
            "age" => "Characteristics[age at scan]".to_string(),
            other => format!("Comment[{other}]"),
        };
        let values = samples
            .iter()
            .map(|(subject, _)| {
                let raw = participants.get(subject, column).unwrap_or("");
                canonical_value(&header, raw)
            })
            .collect::<Vec<_>>();
        if header.starts_with("Characteristics[") {
            characteristics.push(Column::new(header, values));
        } else {
            comments.push(Column::new(header, values));
        }
    }

    let mut columns = vec![
        Column::new(
            "Source Name",
            samples.iter().map(|(s, _)| s.to_string()).collect(),
        ),
        Column::constant("Characteristics[organism]", "Homo sapiens", rows),
        Column::constant("Characteristics[organism part]", "brain", rows),
    ];
    columns.extend(characteristics);
    columns.push(Column::constant("Protocol REF", RECRUITMENT_PROTOCOL, rows));
    columns.push(Column::new(
        "Sample Name",
        samples
            .iter()
            .map(|(subject, session)| sample_name(subject, session.as_ref()))
            .collect(),
    ));
    columns.extend(comments);

    let (columns, warnings) = annotate(columns);
    (Table::new(STUDY_FILE, rows, columns), warnings)
}

fn build_assay(
    kind: AssayKind,
    records: &[&EntityRecord],
    input: &MappingInput<'_>,
) -> (Table, Vec<String>, Vec<Warning>) {
    let rows = records.len();

    // Sidecar parameters, normalized per row; the first raw key wins when two
    // keys normalize to the same name. Modality and resolution always come
    // from the file itself.
    let per_row = records
        .iter()
        .map(|record| {
            let mut params = BTreeMap::new();
            for (key, value) in record.metadata.flatten() {
                let header = parameter_header(&input.names.normalize(&key));
                if is_builtin_parameter(&header) {
                    tracing::debug!("ignoring sidecar key {key} for {}", record.entity.name);
                    continue;
                }
                params.entry(header).or_insert(value);
            }
            params
        })
        .collect::<Vec<_>>();
    let dynamic_headers = per_row
        .iter()
        .flat_map(|params| params.keys().cloned())
        .collect::<BTreeSet<_>>();

    let mut parameter_columns = vec![
        Column::new(
            MODALITY_HEADER,
            records
                .iter()
                .map(|r| r.entity.suffix().to_string())
                .collect(),
        ),
        Column::new(
            RESOLUTION_HEADER,
            records
                .iter()
                .map(|r| {
                    r.geometry
                        .as_ref()
                        .map(ImageGeometry::resolution)
                        .unwrap_or_default()
                })
                .collect(),
        ),
    ];
    for header in dynamic_headers {
        let values = per_row
            .iter()
            .map(|params| params.get(&header).cloned().unwrap_or_default())
            .collect();
        parameter_columns.push(Column::new(header, values));
    }

    let mut parameters = Vec::new();
    let mut columns = vec![
        Column::new(
            "Sample Name",
            records.iter().map(|r| r.entity.sample_name()).collect(),
        ),
        Column::constant("Protocol REF", kind.protocol(), rows),
    ];
    for column in parameter_columns {
        if !input.filter.allows(&column.header) {
            tracing::debug!("dropping {} from {}", column.header, kind.file_name());
            continue;
        }
        if let Some(name) = column
            .header
            .strip_prefix("Parameter Value[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            parameters.push(name.to_string());
        }
        columns.push(column);
    }
    columns.push(Column::new(
        "Assay Name",
        records
            .iter()
            .map(|r| r.entity.name.stem().to_string())
            .collect(),
    ));
    columns.push(Column::new(
        "Raw Data File",
        records.iter().map(|r| r.entity.relative_path.clone()).collect(),
    ));

    let (columns, warnings) = annotate(columns);
    (
        Table::new(kind.file_name(), rows, columns),
        parameters,
        warnings,
    )
}

fn is_builtin_parameter(header: &str) -> bool {
    header.eq_ignore_ascii_case(MODALITY_HEADER) || header.eq_ignore_ascii_case(RESOLUTION_HEADER)
}

/// Splits `"Jane Q. Doe"` into (`"Doe"`, `"Jane Q."`).
fn split_author(author: &str) -> (String, String) {
    let trimmed = author.trim();
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((first, last)) => (last.to_string(), first.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

fn contacts_section(
    name: &str,
    prefix: &str,
    authors: &[(String, String)],
) -> InvestigationSection {
    let blanks = || vec![String::new(); authors.len()];
    InvestigationSection::new(name)
        .field(
            &format!("{prefix} Person Last Name"),
            authors.iter().map(|(last, _)| last.clone()),
        )
        .field(
            &format!("{prefix} Person First Name"),
            authors.iter().map(|(_, first)| first.clone()),
        )
        .field(&format!("{prefix} Person Mid Initials"), blanks())
        .field(&format!("{prefix} Person Email"), blanks())
        .field(&format!("{prefix} Person Phone"), blanks())
        .field(&format!("{prefix} Person Fax"), blanks())
        .field(&format!("{prefix} Person Address"), blanks())
        .field(&format!("{prefix} Person Affiliation"), blanks())
        .field(
            &format!("{prefix} Person Roles"),
            vec!["author".to_string(); authors.len()],
        )
        .field(
            &format!("{prefix} Person Roles Term Accession Number"),
            blanks(),
        )
        .field(&format!("{prefix} Person Roles Term Source REF"), blanks())
}

fn publications_section(name: &str, prefix: &str) -> InvestigationSection {
    InvestigationSection::new(name)
        .empty(&format!("{prefix} PubMed ID"))
        .empty(&format!("{prefix} Publication DOI"))
        .empty(&format!("{prefix} Publication Author List"))
        .empty(&format!("{prefix} Publication Title"))
        .empty(&format!("{prefix} Publication Status"))
        .empty(&format!("{prefix} Publication Status Term Accession Number"))
        .empty(&format!("{prefix} Publication Status Term Source REF"))
}

fn build_investigation(
    dataset: &DatasetInfo,
    protocols: &[(AssayKind, Vec<String>)],
) -> Investigation {
    let description = &dataset.description;
    let authors = description
        .authors
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| split_author(a))
        .collect::<Vec<_>>();
    let kinds = protocols.iter().map(|(kind, _)| *kind).collect::<Vec<_>>();
    let assay_blanks = || vec![String::new(); kinds.len()];

    let mut protocol_names = vec![RECRUITMENT_PROTOCOL.to_string()];
    protocol_names.extend(kinds.iter().map(|k| k.protocol().to_string()));
    let mut protocol_parameters = vec![String::new()];
    protocol_parameters.extend(protocols.iter().map(|(_, params)| params.join(";")));
    let protocol_blanks = || vec![String::new(); protocol_names.len()];

    let sections = vec![
        InvestigationSection::new("ONTOLOGY SOURCE REFERENCE")
            .field(
                "Term Source Name",
                ONTOLOGY_SOURCES.iter().map(|(name, _, _)| *name),
            )
            .field(
                "Term Source File",
                ONTOLOGY_SOURCES.iter().map(|(_, file, _)| *file),
            )
            .field(
                "Term Source Version",
                ONTOLOGY_SOURCES.iter().map(|_| ""),
            )
            .field(
                "Term Source Description",
                ONTOLOGY_SOURCES.iter().map(|(_, _, desc)| *desc),
            ),
        InvestigationSection::new("INVESTIGATION")
            .field("Investigation Identifier", [dataset.identifier()])
            .field("Investigation Title", [dataset.title()])
            .empty("Investigation Description")
            .empty("Investigation Submission Date")
            .empty("Investigation Public Release Date")
            .field(
                "Comment[License]",
                [description.license.clone().unwrap_or_default()],
            )
            .field(
                "Comment[BIDS Version]",
                [description.bids_version.clone().unwrap_or_default()],
            ),
        publications_section("INVESTIGATION PUBLICATIONS", "Investigation"),
        contacts_section("INVESTIGATION CONTACTS", "Investigation", &authors),
        InvestigationSection::new("STUDY")
            .field("Study Identifier", [dataset.identifier()])
            .field("Study Title", [dataset.title()])
            .empty("Study Description")
            .empty("Study Submission Date")
            .empty("Study Public Release Date")
            .field("Study File Name", [STUDY_FILE]),
        InvestigationSection::new("STUDY DESIGN DESCRIPTORS")
            .empty("Study Design Type")
            .empty("Study Design Type Term Accession Number")
            .empty("Study Design Type Term Source REF"),
        publications_section("STUDY PUBLICATIONS", "Study"),
        InvestigationSection::new("STUDY FACTORS")
            .empty("Study Factor Name")
            .empty("Study Factor Type")
            .empty("Study Factor Type Term Accession Number")
            .empty("Study Factor Type Term Source REF"),
        InvestigationSection::new("STUDY ASSAYS")
            .field(
                "Study Assay Measurement Type",
                kinds.iter().map(|k| k.protocol().to_lowercase()),
            )
            .field(
                "Study Assay Measurement Type Term Accession Number",
                assay_blanks(),
            )
            .field("Study Assay Measurement Type Term Source REF", assay_blanks())
            .field(
                "Study Assay Technology Type",
                kinds.iter().map(|k| k.technology()),
            )
            .field(
                "Study Assay Technology Type Term Accession Number",
                assay_blanks(),
            )
            .field("Study Assay Technology Type Term Source REF", assay_blanks())
            .field("Study Assay Technology Platform", assay_blanks())
            .field(
                "Study Assay File Name",
                kinds.iter().map(|k| k.file_name()),
            ),
        InvestigationSection::new("STUDY PROTOCOLS")
            .field("Study Protocol Name", protocol_names.clone())
            .field(
                "Study Protocol Type",
                protocol_names.iter().map(|n| n.to_lowercase()),
            )
            .field("Study Protocol Type Term Accession Number", protocol_blanks())
            .field("Study Protocol Type Term Source REF", protocol_blanks())
            .field("Study Protocol Description", protocol_blanks())
            .field("Study Protocol URI", protocol_blanks())
            .field("Study Protocol Version", protocol_blanks())
            .field("Study Protocol Parameters Name", protocol_parameters.clone())
            .field(
                "Study Protocol Parameters Name Term Accession Number",
                protocol_blanks(),
            )
            .field(
                "Study Protocol Parameters Name Term Source REF",
                protocol_blanks(),
            )
            .field("Study Protocol Components Name", protocol_blanks())
            .field("Study Protocol Components Type", protocol_blanks())
            .field(
                "Study Protocol Components Type Term Accession Number",
                protocol_blanks(),
            )
            .field(
                "Study Protocol Components Type Term Source REF",
                protocol_blanks(),
            ),
        contacts_section("STUDY CONTACTS", "Study", &authors),
    ];

    Investigation { sections }
}

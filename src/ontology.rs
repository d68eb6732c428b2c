//! Ontology annotations for ISA-Tab columns and BIDS → ISA parameter naming.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Warning;
use crate::isatab::Column;

/// Ontology sources referenced by the annotations, for the investigation's
/// ONTOLOGY SOURCE REFERENCE section: (name, file, description).
pub const ONTOLOGY_SOURCES: &[(&str, &str, &str)] = &[
    (
        "NCBITAXON",
        "http://data.bioontology.org/ontologies/NCBITAXON",
        "National Center for Biotechnology Information (NCBI) Organismal Classification",
    ),
    (
        "UBERON",
        "http://data.bioontology.org/ontologies/UBERON",
        "Uber Anatomy Ontology",
    ),
    (
        "PATO",
        "http://data.bioontology.org/ontologies/PATO",
        "Phenotypic Quality Ontology",
    ),
    (
        "UO",
        "http://data.bioontology.org/ontologies/UO",
        "Units of Measurement Ontology",
    ),
];

/// How a known column is annotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermMapping {
    /// Each value maps to a term: (value, source, accession).
    Qualitative(&'static [(&'static str, &'static str, &'static str)]),
    /// A measured value with a fixed unit term.
    Quantitative {
        unit: &'static str,
        source: &'static str,
        accession: &'static str,
    },
    /// Known column without extra annotation.
    Plain,
}

const ORGANISM: &[(&str, &str, &str)] = &[("homo sapiens", "NCBITAXON", "NCBITaxon:9606")];
const ORGANISM_PART: &[(&str, &str, &str)] = &[("brain", "UBERON", "UBERON:0000955")];
const SEX: &[(&str, &str, &str)] = &[
    ("female", "PATO", "PATO:0000383"),
    ("male", "PATO", "PATO:0000384"),
];
const HANDEDNESS: &[(&str, &str, &str)] = &[
    ("right", "PATO", "PATO:0002203"),
    ("left", "PATO", "PATO:0002202"),
    ("ambidextrous", "PATO", "PATO:0002204"),
];

pub fn term_mapping(header: &str) -> Option<TermMapping> {
    use TermMapping::*;

    let mapping = match header {
        "Characteristics[organism]" => Qualitative(ORGANISM),
        "Characteristics[organism part]" => Qualitative(ORGANISM_PART),
        "Characteristics[sex]" => Qualitative(SEX),
        "Characteristics[handedness]" => Qualitative(HANDEDNESS),
        "Characteristics[age at scan]" => Quantitative {
            unit: "year",
            source: "UO",
            accession: "UO:0000036",
        },
        "Parameter Value[resolution]" => Quantitative {
            unit: "millimeter",
            source: "UO",
            accession: "UO:0000016",
        },
        "Parameter Value[repetition time]" | "Parameter Value[echo time]" => Quantitative {
            unit: "second",
            source: "UO",
            accession: "UO:0000010",
        },
        "Parameter Value[magnetic field strength]" => Quantitative {
            unit: "tesla",
            source: "UO",
            accession: "UO:0000228",
        },
        "Parameter Value[flip angle]" => Quantitative {
            unit: "degree",
            source: "UO",
            accession: "UO:0000185",
        },
        "Parameter Value[modality]"
        | "Parameter Value[instrument name]"
        | "Parameter Value[instrument manufacturer]"
        | "Parameter Value[coil type]"
        | "Parameter Value[sequence]"
        | "Protocol REF"
        | "Source Name"
        | "Sample Name"
        | "Assay Name"
        | "Raw Data File" => Plain,
        _ => return None,
    };
    Some(mapping)
}

/// Maps BIDS shorthand codes onto the term labels above (`F` → `female`).
pub fn canonical_value(header: &str, value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let canonical = match (header, lower.as_str()) {
        ("Characteristics[sex]", "f") => "female",
        ("Characteristics[sex]", "m") => "male",
        ("Characteristics[handedness]", "r") => "right",
        ("Characteristics[handedness]", "l") => "left",
        ("Characteristics[handedness]", "a") => "ambidextrous",
        _ => return value.trim().to_string(),
    };
    canonical.to_string()
}

/// Inserts the annotation columns after every column with a term mapping.
/// Unknown qualitative values leave the term cells empty and produce one
/// warning per distinct value.
pub fn annotate(columns: Vec<Column>) -> (Vec<Column>, Vec<Warning>) {
    let mut out = Vec::with_capacity(columns.len());
    let mut warnings = Vec::new();

    for column in columns {
        let mapping = term_mapping(&column.header);
        let rows = column.values.len();
        match mapping {
            Some(TermMapping::Qualitative(terms)) => {
                let mut sources = Vec::with_capacity(rows);
                let mut accessions = Vec::with_capacity(rows);
                let mut reported = BTreeSet::new();
                for value in &column.values {
                    let lower = value.to_lowercase();
                    match terms.iter().find(|(label, _, _)| *label == lower) {
                        Some((_, source, accession)) => {
                            sources.push(source.to_string());
                            accessions.push(accession.to_string());
                        }
                        None => {
                            if !value.is_empty() && reported.insert(value.clone()) {
                                let known =
                                    terms.iter().map(|(label, _, _)| *label).collect::<Vec<_>>();
                                warnings.push(Warning::unknown_term(&column.header, value, &known));
                            }
                            sources.push(String::new());
                            accessions.push(String::new());
                        }
                    }
                }
                out.push(column);
                out.push(Column::new("Term Source REF", sources));
                out.push(Column::new("Term Accession Number", accessions));
            }
            Some(TermMapping::Quantitative {
                unit,
                source,
                accession,
            }) => {
                out.push(column);
                out.push(Column::constant("Unit", unit, rows));
                out.push(Column::constant("Term Source REF", source, rows));
                out.push(Column::constant("Term Accession Number", accession, rows));
            }
            Some(TermMapping::Plain) | None => out.push(column),
        }
    }

    (out, warnings)
}

const PARAMETER_SYNONYMS: &[(&str, &str)] = &[
    ("manufacturermodelname", "instrument name"),
    ("manufacturer", "instrument manufacturer"),
    ("receivecoilname", "coil type"),
    ("magneticfieldstrength", "magnetic field strength"),
    ("echotime", "echo time"),
    ("repetitiontime", "repetition time"),
    ("flipangle", "flip angle"),
    ("pulsesequencetype", "sequence"),
];

/// BIDS sidecar key → ISA-Tab parameter name. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct ParameterNames {
    synonyms: BTreeMap<String, String>,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            synonyms: PARAMETER_SYNONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ParameterNames {
    /// Built-in synonyms extended (or overridden) by `extra`.
    pub fn with_overrides(extra: &BTreeMap<String, String>) -> Self {
        let mut names = Self::default();
        for (key, value) in extra {
            names.synonyms.insert(key.to_lowercase(), value.clone());
        }
        names
    }

    pub fn normalize(&self, key: &str) -> String {
        self.synonyms
            .get(&key.to_lowercase())
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

pub fn parameter_header(name: &str) -> String {
    format!("Parameter Value[{name}]")
}

/// Decides which parameter columns reach the assay tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterFilter {
    /// Keep columns without an ontology entry.
    pub keep_unknown: bool,
    /// Parameter names to drop, as they appear inside `Parameter Value[...]`.
    pub drop: BTreeSet<String>,
}

impl ParameterFilter {
    pub fn allows(&self, header: &str) -> bool {
        if !self.keep_unknown {
            return term_mapping(header).is_some();
        }
        !self
            .drop
            .iter()
            .any(|name| parameter_header(name) == header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantitative_adds_unit_group() {
        let (columns, warnings) = annotate(vec![Column::new(
            "Parameter Value[echo time]",
            vec!["0.03".into()],
        )]);
        let headers = columns.iter().map(|c| c.header.as_str()).collect::<Vec<_>>();
        assert_eq!(
            headers,
            vec![
                "Parameter Value[echo time]",
                "Unit",
                "Term Source REF",
                "Term Accession Number"
            ]
        );
        assert_eq!(columns[1].values, vec!["second"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn qualitative_maps_each_value() {
        let (columns, warnings) = annotate(vec![Column::new(
            "Characteristics[sex]",
            vec!["female".into(), "unknown".into(), "".into(), "unknown".into()],
        )]);
        assert_eq!(columns[2].values, vec!["PATO:0000383", "", "", ""]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn shorthand_values_are_canonicalized() {
        assert_eq!(canonical_value("Characteristics[sex]", "F"), "female");
        assert_eq!(canonical_value("Characteristics[handedness]", "r"), "right");
        assert_eq!(canonical_value("Comment[group]", " ctrl "), "ctrl");
    }

    #[test]
    fn parameter_names_normalize_case_insensitively() {
        let names = ParameterNames::default();
        assert_eq!(names.normalize("EchoTime"), "echo time");
        assert_eq!(names.normalize("SliceTiming"), "SliceTiming");

        let mut extra = BTreeMap::new();
        extra.insert("SoftwareVersions".to_string(), "software version".to_string());
        let names = ParameterNames::with_overrides(&extra);
        assert_eq!(names.normalize("softwareversions"), "software version");
    }

    #[test]
    fn filter_whitelist_and_drop_list() {
        let default = ParameterFilter::default();
        assert!(default.allows("Parameter Value[echo time]"));
        assert!(!default.allows("Parameter Value[SliceTiming]"));

        let keep = ParameterFilter {
            keep_unknown: true,
            drop: ["time:samples:ContentTime".to_string()].into_iter().collect(),
        };
        assert!(keep.allows("Parameter Value[SliceTiming]"));
        assert!(!keep.allows("Parameter Value[time:samples:ContentTime]"));
    }
}

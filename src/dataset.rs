use std::collections::BTreeMap;
use std::fs;
use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::SubjectId;
use crate::error::ConvertError;

pub const DESCRIPTION_FILE: &str = "dataset_description.json";
pub const PARTICIPANTS_FILE: &str = "participants.tsv";

/// Fields of `dataset_description.json` that end up in the investigation.
///
/// A field of an unexpected type is read as absent; it never discards the
/// rest of the description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, rename = "BIDSVersion", deserialize_with = "lenient_text")]
    pub bids_version: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub license: Option<String>,
    #[serde(default, rename = "DatasetDOI", deserialize_with = "lenient_text")]
    pub dataset_doi: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Null => None,
        other => {
            tracing::debug!("ignoring non-text description field: {other}");
            None
        }
    })
}

/// `Authors` is a list in BIDS, but single strings are common in the wild.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(author) => vec![author],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(author) => Some(author),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// `participants.tsv`, keyed by subject label.
#[derive(Debug, Clone, Default)]
pub struct Participants {
    /// Column names except `participant_id`, in file order.
    pub columns: Vec<String>,
    rows: BTreeMap<SubjectId, Vec<String>>,
}

impl Participants {
    pub fn get(&self, subject: &SubjectId, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .get(subject)
            .and_then(|row| row.get(idx))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self, ConvertError> {
        let malformed = |reason: String| ConvertError::MalformedMetadata {
            path: source.to_string(),
            reason,
        };
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|err| malformed(err.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();
        let id_idx = headers
            .iter()
            .position(|h| h == "participant_id")
            .ok_or_else(|| malformed("missing participant_id column".to_string()))?;
        let columns = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != id_idx)
            .map(|(_, h)| h.clone())
            .collect::<Vec<_>>();

        let mut rows = BTreeMap::new();
        for record in csv_reader.records() {
            let record = record.map_err(|err| malformed(err.to_string()))?;
            let Some(raw_id) = record.get(id_idx).map(str::trim) else {
                continue;
            };
            let subject = match SubjectId::from_folder(raw_id).or_else(|_| raw_id.parse()) {
                Ok(subject) => subject,
                Err(_) => {
                    tracing::debug!("ignoring participants row with id '{raw_id}'");
                    continue;
                }
            };
            let values = (0..headers.len())
                .filter(|idx| *idx != id_idx)
                .map(|idx| normalize_cell(record.get(idx).unwrap_or("")))
                .collect::<Vec<_>>();
            rows.insert(subject, values);
        }

        Ok(Self { columns, rows })
    }
}

fn normalize_cell(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("n/a") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Dataset-level information read once per run.
#[derive(Debug, Clone, Default)]
pub struct DatasetInfo {
    /// Root folder name, the fallback title and identifier.
    pub folder_name: String,
    pub description: DatasetDescription,
    pub participants: Participants,
}

impl DatasetInfo {
    pub fn title(&self) -> &str {
        self.description
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.folder_name)
    }

    pub fn identifier(&self) -> &str {
        self.description
            .dataset_doi
            .as_deref()
            .filter(|doi| !doi.trim().is_empty())
            .unwrap_or(&self.folder_name)
    }

    /// Reads the root-level description files. Missing files are fine; broken
    /// ones are reported and treated as absent.
    pub fn load(root: &Utf8Path) -> (Self, Vec<ConvertError>) {
        let mut errors = Vec::new();
        let folder_name = root.file_name().unwrap_or("dataset").to_string();

        let description_path = root.join(DESCRIPTION_FILE);
        let description = if description_path.as_std_path().is_file() {
            match load_description(&description_path) {
                Ok(description) => description,
                Err(err) => {
                    errors.push(err);
                    DatasetDescription::default()
                }
            }
        } else {
            tracing::debug!("no {DESCRIPTION_FILE} in {root}");
            DatasetDescription::default()
        };

        let participants_path = root.join(PARTICIPANTS_FILE);
        let participants = if participants_path.as_std_path().is_file() {
            let loaded = fs::File::open(participants_path.as_std_path())
                .map_err(|err| ConvertError::MalformedMetadata {
                    path: participants_path.to_string(),
                    reason: err.to_string(),
                })
                .and_then(|file| Participants::from_reader(file, participants_path.as_str()));
            match loaded {
                Ok(participants) => participants,
                Err(err) => {
                    errors.push(err);
                    Participants::default()
                }
            }
        } else {
            Participants::default()
        };

        (
            Self {
                folder_name,
                description,
                participants,
            },
            errors,
        )
    }
}

fn load_description(path: &Utf8Path) -> Result<DatasetDescription, ConvertError> {
    let content =
        fs::read_to_string(path.as_std_path()).map_err(|err| ConvertError::MalformedMetadata {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
    serde_json::from_str(&content).map_err(|err| ConvertError::MalformedMetadata {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_participants() {
        let tsv = "participant_id\tage\tsex\tgroup\nsub-01\t34\tF\tcontrol\nsub-02\tn/a\tM\n";
        let participants = Participants::from_reader(tsv.as_bytes(), "participants.tsv").unwrap();
        let sub01: SubjectId = "01".parse().unwrap();
        let sub02: SubjectId = "02".parse().unwrap();

        assert_eq!(participants.columns, vec!["age", "sex", "group"]);
        assert_eq!(participants.get(&sub01, "age"), Some("34"));
        assert_eq!(participants.get(&sub02, "age"), Some(""));
        assert_eq!(participants.get(&sub02, "group"), Some(""));
        assert_eq!(participants.len(), 2);
    }

    #[test]
    fn participants_without_id_column_is_malformed() {
        let err = Participants::from_reader("age\tsex\n30\tF\n".as_bytes(), "p.tsv").unwrap_err();
        assert!(matches!(err, ConvertError::MalformedMetadata { .. }));
    }

    #[test]
    fn description_title_fallback() {
        let info = DatasetInfo {
            folder_name: "ds000001".to_string(),
            description: DatasetDescription {
                name: Some("  ".to_string()),
                ..Default::default()
            },
            participants: Participants::default(),
        };
        assert_eq!(info.title(), "ds000001");
        assert_eq!(info.identifier(), "ds000001");
    }

    #[test]
    fn description_uses_bids_field_names() {
        let description: DatasetDescription = serde_json::from_str(
            r#"{"Name": "Balloon Analog Risk", "BIDSVersion": "1.8.0",
                "Authors": ["Jane Doe", "John Smith"], "DatasetDOI": "10.18112/openneuro.ds000001.v1"}"#,
        )
        .unwrap();
        assert_eq!(description.name.as_deref(), Some("Balloon Analog Risk"));
        assert_eq!(description.bids_version.as_deref(), Some("1.8.0"));
        assert_eq!(description.authors.len(), 2);
        assert!(description.dataset_doi.is_some());
    }

    #[test]
    fn description_tolerates_loosely_typed_fields() {
        let description: DatasetDescription = serde_json::from_str(
            r#"{"Name": "Face study", "BIDSVersion": 1.6, "Authors": "Jane Doe",
                "License": ["CC0"], "ReferencesAndLinks": "https://example.org"}"#,
        )
        .unwrap();
        assert_eq!(description.name.as_deref(), Some("Face study"));
        assert_eq!(description.bids_version.as_deref(), Some("1.6"));
        assert_eq!(description.authors, vec!["Jane Doe"]);
        assert_eq!(description.license, None);
    }
}

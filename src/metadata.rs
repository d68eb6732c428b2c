use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{BidsEntity, BidsName};
use crate::error::ConvertError;

/// Inheritance level of a sidecar, most general first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Dataset,
    Subject,
    Session,
    Scan,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Dataset => write!(f, "dataset"),
            Scope::Subject => write!(f, "subject"),
            Scope::Session => write!(f, "session"),
            Scope::Scan => write!(f, "scan"),
        }
    }
}

/// Merged sidecar metadata for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    pub fields: Map<String, Value>,
    /// Sidecars that contributed, in merge order.
    pub sources: Vec<(Scope, Utf8PathBuf)>,
}

impl MetadataRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Flattens nested objects into `a:b:c` keys and renders each leaf as text.
    /// Empty leaves are left out.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut prefix = Vec::new();
        flatten_into(&self.fields, &mut prefix, &mut out);
        out
    }
}

fn flatten_into<'a>(
    map: &'a Map<String, Value>,
    prefix: &mut Vec<&'a str>,
    out: &mut BTreeMap<String, String>,
) {
    for (key, value) in map {
        prefix.push(key.as_str());
        match value {
            Value::Object(inner) => flatten_into(inner, prefix, out),
            leaf => {
                if let Some(text) = render_leaf(leaf) {
                    out.insert(prefix.join(":"), text);
                }
            }
        }
        prefix.pop();
    }
}

fn render_leaf(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() || s == "UNDEFINED" => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(_) => serde_json::to_string(value).ok(),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => None,
    }
}

/// Parses one sidecar. Anything but a JSON object is malformed.
pub fn load_sidecar(path: &Utf8Path) -> Result<Map<String, Value>, ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedMetadata {
        path: path.to_string(),
        reason,
    };
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| malformed(err.to_string()))?;
    match serde_json::from_str::<Value>(&content).map_err(|err| malformed(err.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(malformed(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
struct SidecarCandidate {
    path: Utf8PathBuf,
    name: BidsName,
}

/// Resolves sidecar inheritance for entities of one dataset.
///
/// Directory listings and parsed sidecars are cached for the lifetime of the
/// extractor, so a malformed file is reported once no matter how many entities
/// inherit from it.
pub struct MetadataExtractor {
    root: Utf8PathBuf,
    listings: HashMap<Utf8PathBuf, Vec<SidecarCandidate>>,
    parsed: HashMap<Utf8PathBuf, Option<Map<String, Value>>>,
}

impl MetadataExtractor {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: HashMap::new(),
            parsed: HashMap::new(),
        }
    }

    /// Directories searched for an entity, paired with their scope.
    pub fn scope_dirs(&self, entity: &BidsEntity) -> Vec<(Scope, Utf8PathBuf)> {
        let subject_dir = self.root.join(entity.subject.folder_name());
        let mut dirs = vec![
            (Scope::Dataset, self.root.clone()),
            (Scope::Subject, subject_dir.clone()),
        ];
        if let Some(session) = &entity.session {
            dirs.push((Scope::Session, subject_dir.join(session.folder_name())));
        }
        if let Some(parent) = entity.path.parent() {
            dirs.push((Scope::Scan, parent.to_path_buf()));
        }
        dirs
    }

    /// Merges every applicable sidecar, most general scope first. Malformed
    /// sidecars contribute nothing; each is returned once as an error for the
    /// caller to report.
    pub fn resolve(&mut self, entity: &BidsEntity) -> (MetadataRecord, Vec<ConvertError>) {
        let mut record = MetadataRecord::default();
        let mut errors = Vec::new();

        for (scope, dir) in self.scope_dirs(entity) {
            let mut applicable = self
                .list_sidecars(&dir)
                .iter()
                .filter(|candidate| applies_to(&candidate.name, &entity.name))
                .cloned()
                .collect::<Vec<_>>();
            applicable.sort_by(|a, b| {
                a.name
                    .entities()
                    .len()
                    .cmp(&b.name.entities().len())
                    .then_with(|| a.name.file_name().cmp(b.name.file_name()))
            });

            for candidate in applicable {
                let fields = match self.parsed.get(&candidate.path) {
                    Some(cached) => cached.clone(),
                    None => {
                        let loaded = match load_sidecar(&candidate.path) {
                            Ok(map) => Some(map),
                            Err(err) => {
                                errors.push(err);
                                None
                            }
                        };
                        self.parsed.insert(candidate.path.clone(), loaded.clone());
                        loaded
                    }
                };
                if let Some(fields) = fields {
                    tracing::debug!(
                        "merging {scope} sidecar {} into {}",
                        candidate.path,
                        entity.name
                    );
                    for (key, value) in fields {
                        record.fields.insert(key, value);
                    }
                    record.sources.push((scope, candidate.path));
                }
            }
        }

        (record, errors)
    }

    fn list_sidecars(&mut self, dir: &Utf8Path) -> &[SidecarCandidate] {
        self.listings
            .entry(dir.to_path_buf())
            .or_insert_with(|| read_sidecar_candidates(dir))
    }
}

fn applies_to(sidecar: &BidsName, target: &BidsName) -> bool {
    sidecar.extension() == ".json"
        && sidecar.suffix() == target.suffix()
        && sidecar.entities_subset_of(target)
}

fn read_sidecar_candidates(dir: &Utf8Path) -> Vec<SidecarCandidate> {
    let Ok(entries) = fs::read_dir(dir.as_std_path()) else {
        return Vec::new();
    };
    let mut candidates = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = Utf8PathBuf::from_path_buf(entry.path()).ok()?;
            if !path.as_std_path().is_file() {
                return None;
            }
            let name = path.file_name()?.parse::<BidsName>().ok()?;
            (name.extension() == ".json").then_some(SidecarCandidate { path, name })
        })
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    candidates
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_nested_and_skip_empty() {
        let record = MetadataRecord {
            fields: json!({
                "EchoTime": 0.03,
                "Manufacturer": "Siemens",
                "Empty": "",
                "Undefined": "UNDEFINED",
                "Nothing": null,
                "SliceTiming": [0.0, 0.5],
                "time": {"samples": {"ContentTime": "120000"}},
            })
            .as_object()
            .unwrap()
            .clone(),
            sources: Vec::new(),
        };
        let flat = record.flatten();
        assert_eq!(flat.get("EchoTime").map(String::as_str), Some("0.03"));
        assert_eq!(flat.get("SliceTiming").map(String::as_str), Some("[0.0,0.5]"));
        assert_eq!(
            flat.get("time:samples:ContentTime").map(String::as_str),
            Some("120000")
        );
        assert!(!flat.contains_key("Empty"));
        assert!(!flat.contains_key("Undefined"));
        assert!(!flat.contains_key("Nothing"));
    }

    #[test]
    fn sidecar_applicability() {
        let target: BidsName = "sub-01_task-rest_run-1_bold.nii.gz".parse().unwrap();
        let yes: BidsName = "task-rest_bold.json".parse().unwrap();
        let wrong_suffix: BidsName = "task-rest_sbref.json".parse().unwrap();
        let not_json: BidsName = "task-rest_bold.tsv".parse().unwrap();
        assert!(applies_to(&yes, &target));
        assert!(!applies_to(&wrong_suffix, &target));
        assert!(!applies_to(&not_json, &target));
    }

    #[test]
    fn load_sidecar_rejects_non_object() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("T1w.json")).unwrap();
        fs::write(path.as_std_path(), "[1, 2]").unwrap();
        let err = load_sidecar(&path).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }
}

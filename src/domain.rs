use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;

use crate::error::ConvertError;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("label pattern"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)-([A-Za-z0-9]+)$").expect("entity pattern"));
static DATATYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+$").expect("datatype pattern"));

/// Participant label, stored without the `sub-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn folder_name(&self) -> String {
        format!("sub-{}", self.0)
    }

    /// Parses a `sub-<label>` folder or entity name.
    pub fn from_folder(name: &str) -> Result<Self, ConvertError> {
        let label = name
            .strip_prefix("sub-")
            .ok_or_else(|| ConvertError::InvalidLabel(name.to_string()))?;
        label.parse()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !LABEL_RE.is_match(trimmed) {
            return Err(ConvertError::InvalidLabel(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Session label, stored without the `ses-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn folder_name(&self) -> String {
        format!("ses-{}", self.0)
    }

    pub fn from_folder(name: &str) -> Result<Self, ConvertError> {
        let label = name
            .strip_prefix("ses-")
            .ok_or_else(|| ConvertError::InvalidLabel(name.to_string()))?;
        label.parse()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !LABEL_RE.is_match(trimmed) {
            return Err(ConvertError::InvalidLabel(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// The modality folder a data file lives in (`anat`, `func`, `eeg`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Datatype(String);

impl Datatype {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Datatype {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !DATATYPE_RE.is_match(value) {
            return Err(ConvertError::InvalidLabel(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

/// A file name split along the BIDS grammar:
/// `[<key>-<value>_]*<suffix><extension>`.
///
/// Top-level sidecars such as `task-rest_bold.json` carry no `sub` entity, so
/// the subject is not required here; [`BidsEntity`] enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsName {
    file_name: String,
    entities: Vec<(String, String)>,
    suffix: String,
    extension: String,
}

impl BidsName {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn entities(&self) -> &[(String, String)] {
        &self.entities
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Everything from the first dot on, e.g. `.nii.gz`.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn stem(&self) -> &str {
        &self.file_name[..self.file_name.len() - self.extension.len()]
    }

    /// True when every entity of `self` appears with the same value in `other`.
    pub fn entities_subset_of(&self, other: &BidsName) -> bool {
        self.entities
            .iter()
            .all(|(key, value)| other.get(key) == Some(value.as_str()))
    }
}

impl fmt::Display for BidsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name)
    }
}

impl FromStr for BidsName {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConvertError::InvalidFilename(value.to_string());
        let (stem, extension) = match value.find('.') {
            Some(idx) => value.split_at(idx),
            None => (value, ""),
        };
        if stem.is_empty() {
            return Err(invalid());
        }

        let mut parts = stem.split('_').collect::<Vec<_>>();
        let suffix = parts.pop().ok_or_else(invalid)?;
        if !LABEL_RE.is_match(suffix) {
            return Err(invalid());
        }

        let mut entities = Vec::with_capacity(parts.len());
        for part in parts {
            let captures = ENTITY_RE.captures(part).ok_or_else(invalid)?;
            let key = captures[1].to_string();
            if entities.iter().any(|(k, _): &(String, String)| *k == key) {
                return Err(invalid());
            }
            entities.push((key, captures[2].to_string()));
        }

        Ok(Self {
            file_name: value.to_string(),
            entities,
            suffix: suffix.to_string(),
            extension: extension.to_string(),
        })
    }
}

/// One discovered data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsEntity {
    pub subject: SubjectId,
    pub session: Option<SessionId>,
    pub datatype: Datatype,
    pub run: Option<u32>,
    pub name: BidsName,
    pub path: Utf8PathBuf,
    /// Path below the dataset root, always `/`-separated.
    pub relative_path: String,
}

impl BidsEntity {
    pub fn new(
        root: &Utf8Path,
        path: Utf8PathBuf,
        datatype: Datatype,
        name: BidsName,
    ) -> Result<Self, ConvertError> {
        let subject = name
            .get("sub")
            .ok_or_else(|| ConvertError::InvalidFilename(name.file_name().to_string()))?
            .parse::<SubjectId>()?;
        let session = name.get("ses").map(str::parse::<SessionId>).transpose()?;
        let run = name
            .get("run")
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|_| ConvertError::InvalidFilename(name.file_name().to_string()))
            })
            .transpose()?;
        let relative_path = path
            .strip_prefix(root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|_| path.to_string());

        Ok(Self {
            subject,
            session,
            datatype,
            run,
            name,
            path,
            relative_path,
        })
    }

    pub fn suffix(&self) -> &str {
        self.name.suffix()
    }

    /// ISA-Tab sample this scan was acquired from.
    pub fn sample_name(&self) -> String {
        sample_name(&self.subject, self.session.as_ref())
    }

    fn sort_key(&self) -> (&SubjectId, Option<&SessionId>, &Datatype, Option<u32>, &str) {
        (
            &self.subject,
            self.session.as_ref(),
            &self.datatype,
            self.run,
            self.name.file_name(),
        )
    }
}

impl PartialOrd for BidsEntity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BidsEntity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

pub fn sample_name(subject: &SubjectId, session: Option<&SessionId>) -> String {
    match session {
        Some(session) => format!("{subject}_ses-{session}"),
        None => subject.to_string(),
    }
}

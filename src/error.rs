use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConvertError {
    #[error("invalid BIDS dataset at {path}: {reason}")]
    InvalidDataset { path: String, reason: String },

    #[error("malformed metadata in {path}: {reason}")]
    MalformedMetadata { path: String, reason: String },

    #[error("unsupported modality '{datatype}' for {path}")]
    UnsupportedModality { path: String, datatype: String },

    #[error("cannot write ISA-Tab output to {path}: {reason}")]
    OutputWrite { path: String, reason: String },

    #[error("invalid BIDS label: {0}")]
    InvalidLabel(String),

    #[error("file name does not follow BIDS naming: {0}")]
    InvalidFilename(String),

    #[error("cannot read image header of {path}: {reason}")]
    ImageHeader { path: String, reason: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MalformedMetadata,
    UnsupportedModality,
    UnreadableImage,
    UnknownTermValue,
    Other,
}

/// A recoverable problem, reported at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub path: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn unknown_term(column: &str, value: &str, known: &[&str]) -> Self {
        Self {
            kind: WarningKind::UnknownTermValue,
            path: None,
            message: format!(
                "unknown value '{value}' for '{column}' (known: {})",
                known.join(", ")
            ),
        }
    }
}

impl From<&ConvertError> for Warning {
    fn from(error: &ConvertError) -> Self {
        let (kind, path) = match error {
            ConvertError::MalformedMetadata { path, .. } => {
                (WarningKind::MalformedMetadata, Some(path.clone()))
            }
            ConvertError::UnsupportedModality { path, .. } => {
                (WarningKind::UnsupportedModality, Some(path.clone()))
            }
            ConvertError::ImageHeader { path, .. } => {
                (WarningKind::UnreadableImage, Some(path.clone()))
            }
            _ => (WarningKind::Other, None),
        };
        Self {
            kind,
            path,
            message: error.to_string(),
        }
    }
}

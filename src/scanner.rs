//! Discovery of subjects, sessions and data files under a BIDS root.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::domain::{BidsEntity, BidsName, Datatype, SessionId, SubjectId};
use crate::error::ConvertError;

/// Extensions of files that are data rather than metadata.
pub const DATA_EXTENSIONS: &[&str] = &[
    ".nii.gz",
    ".nii",
    ".edf",
    ".bdf",
    ".vhdr",
    ".set",
    ".fif",
    ".snirf",
    ".nwb",
    ".ome.tif",
    ".ome.zarr",
    ".mefd",
];

/// Directory-shaped data formats. They are entities themselves and are not
/// descended into.
const DIRECTORY_EXTENSIONS: &[&str] = &[".ome.zarr", ".mefd"];

/// `sub-<label>/<datatype>/<file>` or `sub-<label>/ses-<label>/<datatype>/<file>`.
const MAX_SUBJECT_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectLayout {
    pub id: SubjectId,
    pub sessions: Vec<SessionId>,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Canonical dataset root.
    pub root: Utf8PathBuf,
    pub subjects: Vec<SubjectLayout>,
    /// Sorted by subject, session, datatype, run and file name.
    pub entities: Vec<BidsEntity>,
    /// Files below subject folders that are not data files.
    pub skipped_files: usize,
}

pub fn is_data_extension(extension: &str) -> bool {
    DATA_EXTENSIONS.contains(&extension)
}

pub fn scan(root: &Utf8Path) -> Result<ScanResult, ConvertError> {
    let invalid = |reason: &str| ConvertError::InvalidDataset {
        path: root.to_string(),
        reason: reason.to_string(),
    };
    if !root.as_std_path().exists() {
        return Err(invalid("directory does not exist"));
    }
    if !root.as_std_path().is_dir() {
        return Err(invalid("not a directory"));
    }
    let root = root
        .canonicalize_utf8()
        .map_err(|err| invalid(&err.to_string()))?;

    let subject_ids = list_prefixed_dirs(&root, "sub-")?
        .into_iter()
        .filter_map(|name| match SubjectId::from_folder(&name) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!("skipping folder {name}: {err}");
                None
            }
        })
        .collect::<Vec<_>>();
    if subject_ids.is_empty() {
        return Err(invalid("no sub-<label> folders found"));
    }

    let mut subjects = Vec::with_capacity(subject_ids.len());
    let mut entities = Vec::new();
    let mut skipped_files = 0;
    for id in subject_ids {
        let subject_dir = root.join(id.folder_name());
        let sessions = list_prefixed_dirs(&subject_dir, "ses-")?
            .into_iter()
            .filter_map(|name| SessionId::from_folder(&name).ok())
            .collect::<Vec<_>>();

        let candidates = walk_subject(&subject_dir);
        tracing::debug!(
            "{} candidate files below {}",
            candidates.len(),
            id.folder_name()
        );
        for path in candidates {
            match classify(&root, &subject_dir, &id, path) {
                Some(entity) => entities.push(entity),
                None => skipped_files += 1,
            }
        }
        subjects.push(SubjectLayout { id, sessions });
    }

    entities.sort();
    subjects.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(
        "found {} subjects and {} data files in {root}",
        subjects.len(),
        entities.len()
    );

    Ok(ScanResult {
        root,
        subjects,
        entities,
        skipped_files,
    })
}

/// Names of the directories in `dir` starting with `prefix`, sorted.
fn list_prefixed_dirs(dir: &Utf8Path, prefix: &str) -> Result<Vec<String>, ConvertError> {
    let entries = fs::read_dir(dir.as_std_path()).map_err(|err| ConvertError::InvalidDataset {
        path: dir.to_string(),
        reason: err.to_string(),
    })?;
    let mut names = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Every file (or directory-shaped data file) up to three levels below the
/// subject folder.
fn walk_subject(subject_dir: &Utf8Path) -> Vec<PathBuf> {
    let mut visited = HashSet::new();
    let mut candidates = Vec::new();

    let mut walker = WalkDir::new(subject_dir.as_std_path())
        .follow_links(true)
        .min_depth(1)
        .max_depth(MAX_SUBJECT_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| not_yet_visited(entry, &mut visited));

    while let Some(entry) = walker.next() {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                if is_directory_data(&entry) {
                    candidates.push(entry.into_path());
                    walker.skip_current_dir();
                }
            }
            Ok(entry) => candidates.push(entry.into_path()),
            Err(err) => {
                if err.loop_ancestor().is_some() {
                    tracing::warn!("symlink loop detected: {err}");
                } else if let Some(path) = err.path().filter(|path| is_dangling_link(path)) {
                    tracing::debug!("dangling symlink {}", path.display());
                    candidates.push(path.to_path_buf());
                } else {
                    tracing::warn!("error accessing entry: {err}");
                }
            }
        }
    }

    candidates
}

fn not_yet_visited(entry: &DirEntry, visited: &mut HashSet<PathBuf>) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    match entry.path().canonicalize() {
        Ok(canonical) => {
            if visited.insert(canonical) {
                true
            } else {
                tracing::warn!("symlink loop detected: {}", entry.path().display());
                false
            }
        }
        Err(_) => true,
    }
}

fn is_directory_data(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    DIRECTORY_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn is_dangling_link(path: &std::path::Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
        && fs::metadata(path).is_err()
}

/// Turns a candidate path into an entity, or `None` when it is not a data
/// file in a recognized layout.
fn classify(
    root: &Utf8Path,
    subject_dir: &Utf8Path,
    subject: &SubjectId,
    path: PathBuf,
) -> Option<BidsEntity> {
    let path = match Utf8PathBuf::from_path_buf(path) {
        Ok(path) => path,
        Err(path) => {
            tracing::warn!("skipping non UTF-8 path {}", path.display());
            return None;
        }
    };
    let relative = path.strip_prefix(subject_dir).ok()?;
    let parts = relative.components().map(|c| c.as_str()).collect::<Vec<_>>();
    let (session, datatype, file_name) = match parts.as_slice() {
        [datatype, file] => (None, *datatype, *file),
        [session, datatype, file] => (Some(SessionId::from_folder(session).ok()?), *datatype, *file),
        _ => {
            tracing::debug!("skipping {relative}: not in a datatype folder");
            return None;
        }
    };

    let name = match file_name.parse::<BidsName>() {
        Ok(name) => name,
        Err(err) => {
            tracing::debug!("skipping {relative}: {err}");
            return None;
        }
    };
    if !is_data_extension(name.extension()) {
        return None;
    }
    if name.get("sub") != Some(subject.as_str())
        || name.get("ses") != session.as_ref().map(SessionId::as_str)
    {
        tracing::warn!("skipping {relative}: entities do not match the enclosing folders");
        return None;
    }
    let datatype = match datatype.parse::<Datatype>() {
        Ok(datatype) => datatype,
        Err(err) => {
            tracing::debug!("skipping {relative}: {err}");
            return None;
        }
    };

    match BidsEntity::new(root, path.clone(), datatype, name) {
        Ok(entity) => Some(entity),
        Err(err) => {
            tracing::warn!("skipping {relative}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_extensions() {
        assert!(is_data_extension(".nii.gz"));
        assert!(is_data_extension(".edf"));
        assert!(!is_data_extension(".json"));
        assert!(!is_data_extension(".tsv"));
    }

    #[test]
    fn classify_rejects_mismatched_session() {
        let root = Utf8Path::new("/data");
        let subject_dir = root.join("sub-01");
        let subject: SubjectId = "01".parse().unwrap();
        let ok = classify(
            root,
            &subject_dir,
            &subject,
            subject_dir.join("ses-a/anat/sub-01_ses-a_T1w.nii.gz").into(),
        );
        assert!(ok.is_some());
        let wrong = classify(
            root,
            &subject_dir,
            &subject,
            subject_dir.join("ses-a/anat/sub-01_ses-b_T1w.nii.gz").into(),
        );
        assert!(wrong.is_none());
        let missing = classify(
            root,
            &subject_dir,
            &subject,
            subject_dir.join("anat/sub-01_ses-a_T1w.nii.gz").into(),
        );
        assert!(missing.is_none());
    }

    #[test]
    fn classify_skips_sidecars_and_stray_files() {
        let root = Utf8Path::new("/data");
        let subject_dir = root.join("sub-01");
        let subject: SubjectId = "01".parse().unwrap();
        for rel in [
            "anat/sub-01_T1w.json",
            "func/sub-01_task-rest_events.tsv",
            "anat/notes.txt",
            "sub-01_scans.tsv",
        ] {
            assert!(
                classify(root, &subject_dir, &subject, subject_dir.join(rel).into()).is_none(),
                "{rel}"
            );
        }
    }
}

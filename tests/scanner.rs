mod common;

use assert_matches::assert_matches;

use bids2isatab::error::ConvertError;
use bids2isatab::scanner::scan;

use common::Fixture;

#[test]
fn missing_root_is_invalid() {
    let fixture = Fixture::new();
    let err = scan(&fixture.path("does-not-exist")).unwrap_err();
    assert_matches!(err, ConvertError::InvalidDataset { path, .. } if path.ends_with("does-not-exist"));
}

#[test]
fn root_without_subjects_is_invalid() {
    let fixture = Fixture::new();
    fixture.json("dataset_description.json", r#"{"Name": "empty"}"#);
    let err = scan(&fixture.root).unwrap_err();
    assert_matches!(err, ConvertError::InvalidDataset { .. });
}

#[test]
fn file_as_root_is_invalid() {
    let fixture = Fixture::new();
    let file = fixture.text("README", "hello");
    let err = scan(&file).unwrap_err();
    assert_matches!(err, ConvertError::InvalidDataset { reason, .. } if reason == "not a directory");
}

#[test]
fn entities_are_ordered_and_filtered() {
    let fixture = Fixture::new();
    fixture.nifti("sub-02/anat/sub-02_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    fixture.nifti("sub-01/func/sub-01_task-rest_run-2_bold.nii.gz", &[3.0, 3.0, 3.0]);
    fixture.nifti("sub-01/func/sub-01_task-rest_run-1_bold.nii.gz", &[3.0, 3.0, 3.0]);
    fixture.nifti("sub-01/anat/sub-01_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    fixture.json("sub-01/anat/sub-01_T1w.json", "{}");
    fixture.text("sub-01/func/sub-01_task-rest_run-1_events.tsv", "onset\n");
    fixture.text("sub-01/anat/notes.txt", "scanner hiccup");
    fixture.text("sub-01/sub-01_scans.tsv", "filename\n");

    let result = scan(&fixture.root).unwrap();
    let paths = result
        .entities
        .iter()
        .map(|e| e.relative_path.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        paths,
        vec![
            "sub-01/anat/sub-01_T1w.nii.gz",
            "sub-01/func/sub-01_task-rest_run-1_bold.nii.gz",
            "sub-01/func/sub-01_task-rest_run-2_bold.nii.gz",
            "sub-02/anat/sub-02_T1w.nii.gz",
        ]
    );
    assert_eq!(result.subjects.len(), 2);
    assert_eq!(result.skipped_files, 4);
    assert_eq!(result.entities[1].run, Some(1));
}

#[test]
fn sessions_are_recorded() {
    let fixture = Fixture::new();
    fixture.nifti("sub-01/ses-post/anat/sub-01_ses-post_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    fixture.nifti("sub-01/ses-pre/anat/sub-01_ses-pre_T1w.nii.gz", &[1.0, 1.0, 1.0]);

    let result = scan(&fixture.root).unwrap();
    let sessions = result.subjects[0]
        .sessions
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>();
    assert_eq!(sessions, vec!["post", "pre"]);
    assert_eq!(result.entities[0].sample_name(), "01_ses-post");
}

#[test]
fn mismatched_subject_entity_is_skipped() {
    let fixture = Fixture::new();
    fixture.nifti("sub-01/anat/sub-02_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    fixture.nifti("sub-01/anat/sub-01_T1w.nii.gz", &[1.0, 1.0, 1.0]);

    let result = scan(&fixture.root).unwrap();
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.skipped_files, 1);
}

#[cfg(unix)]
#[test]
fn dangling_symlink_is_still_an_entity() {
    let fixture = Fixture::new();
    fixture.nifti("sub-01/anat/sub-01_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    std::os::unix::fs::symlink(
        fixture.path(".git/annex/objects/missing"),
        fixture.path("sub-01/anat/sub-01_FLAIR.nii.gz"),
    )
    .unwrap();

    let result = scan(&fixture.root).unwrap();
    let names = result
        .entities
        .iter()
        .map(|e| e.name.file_name())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["sub-01_FLAIR.nii.gz", "sub-01_T1w.nii.gz"]);
}

#[cfg(unix)]
#[test]
fn symlink_loop_terminates() {
    let fixture = Fixture::new();
    fixture.nifti("sub-01/anat/sub-01_T1w.nii.gz", &[1.0, 1.0, 1.0]);
    std::os::unix::fs::symlink(fixture.path("sub-01"), fixture.path("sub-01/anat/loop")).unwrap();

    let result = scan(&fixture.root).unwrap();
    assert_eq!(result.entities.len(), 1);
}

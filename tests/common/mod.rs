#![allow(dead_code)]

use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

/// A BIDS dataset built inside a temporary directory.
pub struct Fixture {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub output: Utf8PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let root = base.join("ds000117");
        fs::create_dir_all(root.as_std_path()).unwrap();
        Self {
            _temp: temp,
            root,
            output: base.join("isa"),
        }
    }

    /// Two subjects with one T1w scan each and a dataset-level sidecar.
    pub fn two_subjects() -> Self {
        let fixture = Self::new();
        fixture.json(
            "dataset_description.json",
            r#"{"Name": "Multisubject face processing", "BIDSVersion": "1.8.0",
                "Authors": ["Daniel Wakeman", "Richard Henson"], "License": "CC0"}"#,
        );
        fixture.text(
            "participants.tsv",
            "participant_id\tage\tsex\tgroup\nsub-01\t31\tF\tcontrol\nsub-02\t25\tM\tpatient\n",
        );
        fixture.json(
            "T1w.json",
            r#"{"MagneticFieldStrength": 3, "Manufacturer": "Siemens", "EchoTime": 0.00298}"#,
        );
        fixture.nifti("sub-01/anat/sub-01_T1w.nii.gz", &[1.0, 1.0, 1.2]);
        fixture.nifti("sub-02/anat/sub-02_T1w.nii.gz", &[1.0, 1.0, 1.2]);
        fixture
    }

    pub fn path(&self, rel: &str) -> Utf8PathBuf {
        self.root.join(rel)
    }

    pub fn bytes(&self, rel: &str, content: &[u8]) -> Utf8PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path()).unwrap();
        }
        fs::write(path.as_std_path(), content).unwrap();
        path
    }

    pub fn text(&self, rel: &str, content: &str) -> Utf8PathBuf {
        self.bytes(rel, content.as_bytes())
    }

    pub fn json(&self, rel: &str, content: &str) -> Utf8PathBuf {
        self.text(rel, content)
    }

    /// Gzip-compressed NIfTI-1 header with the given voxel size in millimeters.
    pub fn nifti(&self, rel: &str, voxel_size: &[f32]) -> Utf8PathBuf {
        let header = nifti1_header(&[64, 64, 40], voxel_size, 2);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&header).unwrap();
        self.bytes(rel, &encoder.finish().unwrap())
    }

    pub fn read_output(&self, name: &str) -> String {
        fs::read_to_string(self.output.join(name).as_std_path()).unwrap()
    }
}

pub fn nifti1_header(dims: &[i16], voxel_size: &[f32], xyzt_units: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; 352];
    bytes[0..4].copy_from_slice(&348i32.to_le_bytes());
    bytes[40..42].copy_from_slice(&(dims.len() as i16).to_le_bytes());
    for (i, dim) in dims.iter().enumerate() {
        let offset = 42 + i * 2;
        bytes[offset..offset + 2].copy_from_slice(&dim.to_le_bytes());
    }
    bytes[76..80].copy_from_slice(&1.0f32.to_le_bytes());
    for (i, size) in voxel_size.iter().enumerate() {
        let offset = 80 + i * 4;
        bytes[offset..offset + 4].copy_from_slice(&size.to_le_bytes());
    }
    bytes[123] = xyzt_units;
    bytes[344..348].copy_from_slice(b"n+1\0");
    bytes
}

/// Rows of a tab-separated output file, header included.
pub fn tsv_rows(content: &str) -> Vec<Vec<String>> {
    content
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

/// Index of the first column named `header`.
pub fn column_index(rows: &[Vec<String>], header: &str) -> usize {
    rows[0]
        .iter()
        .position(|h| h == header)
        .unwrap_or_else(|| panic!("missing column {header}"))
}

pub fn relative(root: &Utf8Path, path: &Utf8Path) -> String {
    path.strip_prefix(root).unwrap().to_string()
}

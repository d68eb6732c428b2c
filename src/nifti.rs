//! Minimal NIfTI-1 / NIfTI-2 header reader.
//!
//! Only the voxel geometry is needed for the assay table, so nothing past the
//! fixed-size header is read.

use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use flate2::read::GzDecoder;

use crate::error::ConvertError;

const NIFTI1_HEADER_SIZE: usize = 348;
const NIFTI2_HEADER_SIZE: usize = 540;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Spatial part of a NIfTI header.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    /// Voxel size along the first (at most three) spatial axes, in millimeters.
    pub voxel_size_mm: Vec<f32>,
}

impl ImageGeometry {
    /// Renders the voxel size the way the assay table expects it, e.g. `1.0x1.0x1.2`.
    pub fn resolution(&self) -> String {
        self.voxel_size_mm
            .iter()
            .map(|v| format!("{v:?}"))
            .collect::<Vec<_>>()
            .join("x")
    }
}

pub fn read_geometry(path: &Utf8Path) -> Result<ImageGeometry, ConvertError> {
    let header_error = |reason: String| ConvertError::ImageHeader {
        path: path.to_string(),
        reason,
    };

    let file = File::open(path.as_std_path()).map_err(|err| header_error(err.to_string()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 2];
    reader
        .read_exact(&mut magic)
        .map_err(|err| header_error(err.to_string()))?;

    let mut header = Vec::with_capacity(NIFTI2_HEADER_SIZE);
    if magic == GZIP_MAGIC {
        GzDecoder::new(magic.as_slice().chain(reader))
            .take(NIFTI2_HEADER_SIZE as u64)
            .read_to_end(&mut header)
            .map_err(|err| header_error(err.to_string()))?;
    } else {
        header.extend_from_slice(&magic);
        reader
            .take((NIFTI2_HEADER_SIZE - magic.len()) as u64)
            .read_to_end(&mut header)
            .map_err(|err| header_error(err.to_string()))?;
    }

    parse_header(&header).map_err(header_error)
}

/// Parses a raw header buffer. Endianness is detected from `sizeof_hdr`.
pub fn parse_header(bytes: &[u8]) -> Result<ImageGeometry, String> {
    if bytes.len() < 4 {
        return Err("file too short for a NIfTI header".to_string());
    }
    let le = i32::from_le_bytes(field(bytes, 0));
    let be = i32::from_be_bytes(field(bytes, 0));
    let (version, little_endian) = match (le, be) {
        (348, _) => (1, true),
        (_, 348) => (1, false),
        (540, _) => (2, true),
        (_, 540) => (2, false),
        _ => return Err(format!("unrecognized header size {le}")),
    };

    let required = if version == 1 {
        NIFTI1_HEADER_SIZE
    } else {
        NIFTI2_HEADER_SIZE
    };
    if bytes.len() < required {
        return Err(format!(
            "truncated NIfTI-{version} header ({} of {required} bytes)",
            bytes.len()
        ));
    }

    let reader = FieldReader {
        bytes,
        little_endian,
    };
    let (ndim, pixdim, xyzt_units) = if version == 1 {
        let ndim = i64::from(reader.i16(40));
        let pixdim = (0..8).map(|i| reader.f32(76 + i * 4)).collect::<Vec<_>>();
        (ndim, pixdim, bytes[123])
    } else {
        let ndim = reader.i64(16);
        let pixdim = (0..8)
            .map(|i| reader.f64(104 + i * 8) as f32)
            .collect::<Vec<_>>();
        (ndim, pixdim, reader.i32(500) as u8)
    };

    if !(1..=7).contains(&ndim) {
        return Err(format!("invalid dimension count {ndim}"));
    }

    let scale = spatial_scale_to_mm(xyzt_units);
    let spatial = (ndim as usize).min(3);
    let voxel_size_mm = pixdim[1..=spatial]
        .iter()
        .map(|v| v.abs() * scale)
        .collect();

    Ok(ImageGeometry { voxel_size_mm })
}

/// NIfTI spatial unit codes: 1 meter, 2 millimeter, 3 micron. Unknown is read
/// as millimeters.
fn spatial_scale_to_mm(xyzt_units: u8) -> f32 {
    match xyzt_units & 0x07 {
        1 => 1000.0,
        3 => 0.001,
        _ => 1.0,
    }
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    little_endian: bool,
}

impl FieldReader<'_> {
    fn i16(&self, offset: usize) -> i16 {
        let raw = field(self.bytes, offset);
        if self.little_endian {
            i16::from_le_bytes(raw)
        } else {
            i16::from_be_bytes(raw)
        }
    }

    fn i32(&self, offset: usize) -> i32 {
        let raw = field(self.bytes, offset);
        if self.little_endian {
            i32::from_le_bytes(raw)
        } else {
            i32::from_be_bytes(raw)
        }
    }

    fn i64(&self, offset: usize) -> i64 {
        let raw = field(self.bytes, offset);
        if self.little_endian {
            i64::from_le_bytes(raw)
        } else {
            i64::from_be_bytes(raw)
        }
    }

    fn f32(&self, offset: usize) -> f32 {
        let raw = field(self.bytes, offset);
        if self.little_endian {
            f32::from_le_bytes(raw)
        } else {
            f32::from_be_bytes(raw)
        }
    }

    fn f64(&self, offset: usize) -> f64 {
        let raw = field(self.bytes, offset);
        if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        }
    }
}

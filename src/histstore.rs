//! Precomputed spectral band histogram store.
//!
//! The store is the boundary to the imagery pipeline: some external process
//! has already reduced satellite rasters to per-region, per-period band
//! histograms. This module only reads them back. Layout on disk:
//!
//! - `<root>/manifest.json` — shape and encoding of every blob in the store.
//! - `<root>/<region>/<year>.f32le` — period-major `[periods x bands x bins]`
//!   f32 little-endian values, periods contiguous from Jan 1.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store manifest file name.
pub const STORE_MANIFEST_FILE_NAME: &str = "manifest.json";
/// Store format version this reader understands.
pub const STORE_FORMAT_VERSION: i64 = 1;
/// Value encoding this reader understands.
pub const STORE_ENCODING: &str = "f32le";

/// Shape shared by every histogram blob in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramShape {
    /// Spectral bands per period.
    pub bands: usize,
    /// Histogram bins per band.
    pub bins: usize,
    /// Temporal compositing width in days (1 or 8).
    pub composite_days: u8,
}

impl HistogramShape {
    /// Values per composite period.
    pub fn period_len(&self) -> usize {
        self.bands * self.bins
    }
}

/// Parsed contents of the store `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Store format version.
    pub format_version: i64,
    /// Value encoding identifier.
    pub encoding: String,
    /// Spectral bands per period.
    pub bands: usize,
    /// Histogram bins per band.
    pub bins: usize,
    /// Temporal compositing width in days.
    pub composite_days: u8,
}

/// Errors produced while opening or reading the histogram store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No histogram blob exists for the requested region and year.
    #[error("no histograms for {region} {year}")]
    NotFound {
        /// Requested region.
        region: String,
        /// Requested year.
        year: i32,
    },
    /// Failed to read a store file.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the store manifest.
    #[error("Invalid store manifest at {path}: {source}")]
    Manifest {
        /// Manifest file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// The store declares a format or shape this reader does not support.
    #[error("Unsupported store at {path}: {reason}")]
    Unsupported {
        /// Manifest file path.
        path: PathBuf,
        /// What was unsupported.
        reason: String,
    },
    /// A blob's length is not a whole number of periods.
    #[error("Corrupt histogram blob at {path}: {len} values is not a multiple of {period_len}")]
    Corrupt {
        /// Blob file path.
        path: PathBuf,
        /// Decoded value count.
        len: usize,
        /// Expected values per period.
        period_len: usize,
    },
}

impl StoreError {
    /// Whether the error is a recoverable data gap rather than corrupt input.
    pub fn is_data_gap(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// One region-year of per-period band histograms.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSeries {
    /// Region the series belongs to.
    pub region: String,
    /// Calendar year covered.
    pub year: i32,
    /// Shape of each period.
    pub shape: HistogramShape,
    /// Period-major values, contiguous from Jan 1.
    pub values: Vec<f32>,
}

impl HistogramSeries {
    /// Number of composite periods present.
    pub fn periods(&self) -> usize {
        let stride = self.shape.period_len();
        if stride == 0 { 0 } else { self.values.len() / stride }
    }

    /// Borrow the values for one period, if present.
    pub fn period(&self, index: usize) -> Option<&[f32]> {
        let stride = self.shape.period_len();
        self.values.get(index * stride..(index + 1) * stride)
    }
}

/// Seam to the imagery collaborator: anything that can produce a full-year
/// histogram series per region.
pub trait HistogramStore {
    /// Shape shared by every series this store produces.
    fn shape(&self) -> HistogramShape;

    /// Load the full-year series for one region.
    fn load_year(&self, region: &str, year: i32) -> Result<HistogramSeries, StoreError>;
}

/// Filesystem-backed histogram store.
#[derive(Debug, Clone)]
pub struct FsHistogramStore {
    root: PathBuf,
    shape: HistogramShape,
}

impl FsHistogramStore {
    /// Open a store root, validating its manifest.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let manifest_path = root.join(STORE_MANIFEST_FILE_NAME);
        let bytes = read_file(&manifest_path)?;
        let manifest: StoreManifest =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;
        if manifest.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::Unsupported {
                path: manifest_path,
                reason: format!("format_version {}", manifest.format_version),
            });
        }
        if manifest.encoding != STORE_ENCODING {
            return Err(StoreError::Unsupported {
                path: manifest_path,
                reason: format!("encoding {:?}", manifest.encoding),
            });
        }
        if manifest.bands == 0 || manifest.bins == 0 {
            return Err(StoreError::Unsupported {
                path: manifest_path,
                reason: format!("empty shape {}x{}", manifest.bands, manifest.bins),
            });
        }
        if !matches!(manifest.composite_days, 1 | 8) {
            return Err(StoreError::Unsupported {
                path: manifest_path,
                reason: format!("composite period of {} days", manifest.composite_days),
            });
        }
        Ok(Self {
            root,
            shape: HistogramShape {
                bands: manifest.bands,
                bins: manifest.bins,
                composite_days: manifest.composite_days,
            },
        })
    }

    fn blob_path(&self, region: &str, year: i32) -> PathBuf {
        self.root.join(region).join(format!("{year}.f32le"))
    }
}

impl HistogramStore for FsHistogramStore {
    fn shape(&self) -> HistogramShape {
        self.shape
    }

    fn load_year(&self, region: &str, year: i32) -> Result<HistogramSeries, StoreError> {
        let path = self.blob_path(region, year);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                region: region.to_string(),
                year,
            });
        }
        let bytes = read_file(&path)?;
        let period_len = self.shape.period_len();
        if bytes.len() % 4 != 0 || (bytes.len() / 4) % period_len != 0 {
            return Err(StoreError::Corrupt {
                path,
                len: bytes.len() / 4,
                period_len,
            });
        }
        let values = decode_f32le(&bytes);
        Ok(HistogramSeries {
            region: region.to_string(),
            year,
            shape: self.shape,
            values,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut bytes))
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(bytes)
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    let mut out = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        out.push(f32::from_le_bytes(chunk.try_into().expect("chunk size verified")));
    }
    out
}

//! Read-back of written split artifacts.
//!
//! Loads one split directory produced by the writer: validates the manifest,
//! parses `samples.jsonl`, and expands the histogram blob. The artifacts are
//! self-describing, so nothing outside the directory is needed to reconstruct
//! the record shape.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::writer::{DATASET_FORMAT_VERSION, MANIFEST_FILE_NAME};

/// Errors produced while loading a split artifact.
#[derive(Debug, Error)]
pub enum SplitLoadError {
    /// Failed to read an artifact file.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the manifest.
    #[error("Invalid manifest at {path}: {source}")]
    Manifest {
        /// Manifest file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// The manifest declares a shape or version this loader cannot use.
    #[error("Unusable manifest at {path}: {reason}")]
    InvalidManifest {
        /// Manifest file path.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
    /// A sample record failed to parse.
    #[error("Invalid samples at {path} line {line}: {source}")]
    InvalidSamples {
        /// Samples file path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// The histogram blob does not match the manifest.
    #[error("Histogram blob at {path} does not match the manifest: {reason}")]
    BlobMismatch {
        /// Blob file path.
        path: PathBuf,
        /// What was inconsistent.
        reason: String,
    },
}

/// Parsed contents of a split `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitManifest {
    /// Dataset format version.
    pub format_version: i64,
    /// Split name (`train`, `dev`, `test`).
    pub split: String,
    /// Seed the assembly ran with.
    pub seed: String,
    /// Spectral bands per period.
    pub bands: usize,
    /// Histogram bins per band.
    pub bins: usize,
    /// Temporal compositing width in days.
    pub composite_days: u8,
    /// Periods retained by the harvest window.
    pub periods: usize,
    /// Records in this split.
    pub records: usize,
    /// File names referenced by the manifest.
    pub files: SplitFiles,
}

/// File names referenced by a split manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitFiles {
    /// JSONL sample metadata file.
    pub samples: String,
    /// Raw histogram blob file.
    pub histograms: String,
}

/// Per-example metadata record from `samples.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleRecord {
    /// Region identifier.
    pub region: String,
    /// Harvest year.
    pub year: i32,
    /// Split the record belongs to.
    pub split: String,
    /// Ground-truth yield value.
    pub label: f64,
    /// Optional crop tag.
    #[serde(default)]
    pub crop: Option<String>,
    /// Reference into the histogram blob.
    pub features: FeatureRef,
}

/// Blob reference attached to a sample record.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureRef {
    /// Byte offset into the blob.
    pub offset_bytes: u64,
    /// Value count.
    pub len_f32: usize,
    /// Encoding identifier (currently `f32le`).
    pub encoding: String,
}

/// A fully loaded split artifact.
#[derive(Debug, Clone)]
pub struct LoadedSplit {
    /// Parsed manifest.
    pub manifest: SplitManifest,
    /// Parsed sample records.
    pub samples: Vec<SampleRecord>,
    /// Blob expanded into f32 values.
    pub values: Vec<f32>,
}

impl LoadedSplit {
    /// Borrow the histogram row for a sample record.
    pub fn histogram_row(&self, record: &SampleRecord) -> Option<&[f32]> {
        if record.features.encoding != "f32le" {
            return None;
        }
        let offset = (record.features.offset_bytes / 4) as usize;
        self.values.get(offset..offset + record.features.len_f32)
    }
}

/// Load one split directory.
pub fn load_split(dir: &Path) -> Result<LoadedSplit, SplitLoadError> {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let bytes = read_file(&manifest_path)?;
    let manifest: SplitManifest =
        serde_json::from_slice(&bytes).map_err(|source| SplitLoadError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;
    if manifest.format_version != DATASET_FORMAT_VERSION {
        return Err(SplitLoadError::InvalidManifest {
            path: manifest_path,
            reason: format!("format_version {}", manifest.format_version),
        });
    }
    if manifest.bands == 0 || manifest.bins == 0 {
        return Err(SplitLoadError::InvalidManifest {
            path: manifest_path,
            reason: format!("empty shape {}x{}", manifest.bands, manifest.bins),
        });
    }

    let samples_path = dir.join(&manifest.files.samples);
    let samples = load_samples_jsonl(&samples_path)?;
    if samples.len() != manifest.records {
        return Err(SplitLoadError::InvalidManifest {
            path: manifest_path,
            reason: format!(
                "manifest declares {} records but samples hold {}",
                manifest.records,
                samples.len()
            ),
        });
    }

    let histograms_path = dir.join(&manifest.files.histograms);
    let blob = read_file(&histograms_path)?;
    if blob.len() % 4 != 0 {
        return Err(SplitLoadError::BlobMismatch {
            path: histograms_path,
            reason: format!("{} bytes is not a whole number of f32 values", blob.len()),
        });
    }
    let values: Vec<f32> = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk size verified")))
        .collect();
    let expected: usize = samples.iter().map(|record| record.features.len_f32).sum();
    if values.len() != expected {
        return Err(SplitLoadError::BlobMismatch {
            path: histograms_path,
            reason: format!("{} values on disk, records reference {expected}", values.len()),
        });
    }

    Ok(LoadedSplit {
        manifest,
        samples,
        values,
    })
}

fn load_samples_jsonl(path: &Path) -> Result<Vec<SampleRecord>, SplitLoadError> {
    let file = File::open(path).map_err(|source| SplitLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| SplitLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SampleRecord =
            serde_json::from_str(&line).map_err(|source| SplitLoadError::InvalidSamples {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })?;
        out.push(record);
    }
    Ok(out)
}

fn read_file(path: &Path) -> Result<Vec<u8>, SplitLoadError> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut bytes))
        .map_err(|source| SplitLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_minimal(dir: &Path) {
        std::fs::write(
            dir.join("histograms.f32le"),
            [1.0f32, 2.0, 3.0, 4.0]
                .into_iter()
                .flat_map(|v| v.to_le_bytes())
                .collect::<Vec<u8>>(),
        )
        .unwrap();
        std::fs::write(
            dir.join("samples.jsonl"),
            r#"{"region":"Adams","year":2010,"split":"train","label":41.5,"crop":"corn","features":{"offset_bytes":0,"len_f32":2,"encoding":"f32le"}}
{"region":"Clark","year":2010,"split":"train","label":38.0,"crop":null,"features":{"offset_bytes":8,"len_f32":2,"encoding":"f32le"}}
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            r#"{"format_version":1,"split":"train","seed":"s","bands":1,"bins":2,"composite_days":8,"periods":1,"records":2,"encoding":"f32le","files":{"samples":"samples.jsonl","histograms":"histograms.f32le"}}"#,
        )
        .unwrap();
    }

    #[test]
    fn loads_minimal_split() {
        let dir = tempdir().unwrap();
        write_minimal(dir.path());
        let loaded = load_split(dir.path()).unwrap();
        assert_eq!(loaded.manifest.split, "train");
        assert_eq!(loaded.samples.len(), 2);
        assert_eq!(loaded.histogram_row(&loaded.samples[0]).unwrap(), &[1.0, 2.0]);
        assert_eq!(loaded.histogram_row(&loaded.samples[1]).unwrap(), &[3.0, 4.0]);
        assert_eq!(loaded.samples[1].crop, None);
    }

    #[test]
    fn record_count_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        write_minimal(dir.path());
        let manifest = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            manifest.replace("\"records\":2", "\"records\":3"),
        )
        .unwrap();
        let err = load_split(dir.path()).unwrap_err();
        assert!(matches!(err, SplitLoadError::InvalidManifest { .. }));
    }

    #[test]
    fn blob_size_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        write_minimal(dir.path());
        std::fs::write(dir.path().join("histograms.f32le"), [0u8; 8]).unwrap();
        let err = load_split(dir.path()).unwrap_err();
        assert!(matches!(err, SplitLoadError::BlobMismatch { .. }));
    }
}

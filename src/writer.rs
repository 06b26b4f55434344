//! Split artifact writer.
//!
//! Materializes one directory per split under the dataset folder, each
//! holding `manifest.json`, `samples.jsonl`, and `histograms.f32le`. Splits
//! are staged into a temporary sibling directory and renamed into place, so a
//! crash never leaves a partially written artifact behind.

use std::collections::BTreeMap;
use std::fs::{File, create_dir, create_dir_all, remove_dir_all, rename};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::TryRngCore;
use thiserror::Error;
use tracing::info;

use crate::candidate::Candidate;
use crate::histstore::HistogramShape;
use crate::report::AssemblyReport;
use crate::split::Split;

/// Dataset artifact format version.
pub const DATASET_FORMAT_VERSION: i64 = 1;
/// Per-split manifest file name.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
/// Per-split sample metadata file name.
pub const SAMPLES_FILE_NAME: &str = "samples.jsonl";
/// Per-split histogram blob file name.
pub const HISTOGRAMS_FILE_NAME: &str = "histograms.f32le";
/// Run report file name, published beside the split directories.
pub const REPORT_FILE_NAME: &str = "assembly.json";

/// Errors produced while writing artifacts.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to create a directory.
    #[error("Unable to create directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write an artifact file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to serialize a manifest or record.
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        /// File path.
        path: PathBuf,
        /// JSON serialization error.
        source: serde_json::Error,
    },
    /// Failed to publish a staged artifact into place.
    #[error("Failed to publish {from} to {to}: {source}")]
    Publish {
        /// Staged path.
        from: PathBuf,
        /// Final path.
        to: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Could not produce a unique staging path.
    #[error("Unable to stage a temporary path under {path}: {source}")]
    Stage {
        /// Dataset folder.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Artifact write parameters.
#[derive(Debug, Clone)]
pub struct WriteOptions<'a> {
    /// Dataset artifact folder.
    pub dataset_folder: &'a Path,
    /// Overwrite existing artifacts instead of reporting a no-op.
    pub remake: bool,
    /// Seed recorded in every manifest.
    pub seed: &'a str,
    /// Histogram shape shared by every record.
    pub shape: HistogramShape,
    /// Periods retained by the harvest window.
    pub periods: usize,
}

/// Outcome of a write pass.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Whether writing was skipped because artifacts already exist.
    pub skipped: bool,
    /// Records written per split.
    pub records: BTreeMap<&'static str, usize>,
}

/// Whether a complete set of split artifacts already exists.
pub fn artifacts_exist(dataset_folder: &Path) -> bool {
    Split::ALL.iter().all(|split| {
        dataset_folder
            .join(split.as_str())
            .join(MANIFEST_FILE_NAME)
            .is_file()
    })
}

/// Write every split artifact plus the run report.
pub fn write_dataset(
    assignments: &[(Candidate, Split)],
    report: &AssemblyReport,
    options: &WriteOptions<'_>,
) -> Result<WriteSummary, WriteError> {
    if !options.remake && artifacts_exist(options.dataset_folder) {
        info!(
            "dataset at {} already exists and remake is off; skipping",
            options.dataset_folder.display()
        );
        return Ok(WriteSummary {
            skipped: true,
            records: BTreeMap::new(),
        });
    }

    create_dir_all(options.dataset_folder).map_err(|source| WriteError::CreateDir {
        path: options.dataset_folder.to_path_buf(),
        source,
    })?;

    let mut records = BTreeMap::new();
    for split in Split::ALL {
        let examples: Vec<&Candidate> = assignments
            .iter()
            .filter(|(_, s)| *s == split)
            .map(|(candidate, _)| candidate)
            .collect();
        write_split(&examples, split, options)?;
        records.insert(split.as_str(), examples.len());
        info!(
            "wrote {} {} examples to {}",
            examples.len(),
            split.as_str(),
            options.dataset_folder.join(split.as_str()).display()
        );
    }

    write_report(report, options.dataset_folder)?;
    Ok(WriteSummary {
        skipped: false,
        records,
    })
}

fn write_split(
    examples: &[&Candidate],
    split: Split,
    options: &WriteOptions<'_>,
) -> Result<(), WriteError> {
    let final_dir = options.dataset_folder.join(split.as_str());
    let stage_dir = stage_dir(options.dataset_folder, split.as_str())?;

    let result = populate_split_dir(&stage_dir, examples, split, options);
    if let Err(err) = result {
        let _ = remove_dir_all(&stage_dir);
        return Err(err);
    }

    if final_dir.exists() {
        remove_dir_all(&final_dir).map_err(|source| WriteError::Publish {
            from: stage_dir.clone(),
            to: final_dir.clone(),
            source,
        })?;
    }
    rename(&stage_dir, &final_dir).map_err(|source| WriteError::Publish {
        from: stage_dir,
        to: final_dir,
        source,
    })
}

fn populate_split_dir(
    dir: &Path,
    examples: &[&Candidate],
    split: Split,
    options: &WriteOptions<'_>,
) -> Result<(), WriteError> {
    let samples_path = dir.join(SAMPLES_FILE_NAME);
    let histograms_path = dir.join(HISTOGRAMS_FILE_NAME);
    let manifest_path = dir.join(MANIFEST_FILE_NAME);

    let mut samples_writer = BufWriter::new(create_file(&samples_path)?);
    let mut histograms_writer = BufWriter::new(create_file(&histograms_path)?);

    let mut offset_bytes: u64 = 0;
    for example in examples {
        for value in &example.values {
            histograms_writer
                .write_all(&value.to_le_bytes())
                .map_err(|source| WriteError::Write {
                    path: histograms_path.clone(),
                    source,
                })?;
        }

        let record = serde_json::json!({
            "region": example.region,
            "year": example.year,
            "split": split.as_str(),
            "label": example.label,
            "crop": example.crop,
            "features": {
                "offset_bytes": offset_bytes,
                "len_f32": example.values.len(),
                "encoding": "f32le",
            },
        });
        serde_json::to_writer(&mut samples_writer, &record).map_err(|source| {
            WriteError::Serialize {
                path: samples_path.clone(),
                source,
            }
        })?;
        samples_writer
            .write_all(b"\n")
            .map_err(|source| WriteError::Write {
                path: samples_path.clone(),
                source,
            })?;

        offset_bytes += (example.values.len() * std::mem::size_of::<f32>()) as u64;
    }
    flush(samples_writer, &samples_path)?;
    flush(histograms_writer, &histograms_path)?;

    let manifest = serde_json::json!({
        "format_version": DATASET_FORMAT_VERSION,
        "split": split.as_str(),
        "seed": options.seed,
        "bands": options.shape.bands,
        "bins": options.shape.bins,
        "composite_days": options.shape.composite_days,
        "periods": options.periods,
        "records": examples.len(),
        "encoding": "f32le",
        "files": {
            "samples": SAMPLES_FILE_NAME,
            "histograms": HISTOGRAMS_FILE_NAME,
        },
    });
    let mut manifest_writer = BufWriter::new(create_file(&manifest_path)?);
    serde_json::to_writer_pretty(&mut manifest_writer, &manifest).map_err(|source| {
        WriteError::Serialize {
            path: manifest_path.clone(),
            source,
        }
    })?;
    flush(manifest_writer, &manifest_path)
}

fn write_report(report: &AssemblyReport, dataset_folder: &Path) -> Result<(), WriteError> {
    let path = dataset_folder.join(REPORT_FILE_NAME);
    let data = serde_json::to_vec_pretty(report).map_err(|source| WriteError::Serialize {
        path: path.clone(),
        source,
    })?;
    let tmp_path = unique_sibling(dataset_folder, REPORT_FILE_NAME)?;
    std::fs::write(&tmp_path, data).map_err(|source| WriteError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    rename(&tmp_path, &path).map_err(|source| WriteError::Publish {
        from: tmp_path,
        to: path,
        source,
    })
}

fn create_file(path: &Path) -> Result<File, WriteError> {
    File::create(path).map_err(|source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn flush(mut writer: BufWriter<File>, path: &Path) -> Result<(), WriteError> {
    writer.flush().map_err(|source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a uniquely named staging directory next to the final artifacts.
fn stage_dir(dataset_folder: &Path, name: &str) -> Result<PathBuf, WriteError> {
    let mut last_err = None;
    for _ in 0..5 {
        let path = dataset_folder.join(format!(".{name}.tmp-{}", random_suffix(dataset_folder)?));
        match create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                last_err = Some(err);
            }
            Err(source) => {
                return Err(WriteError::CreateDir { path, source });
            }
        }
    }
    Err(WriteError::Stage {
        path: dataset_folder.to_path_buf(),
        source: last_err
            .unwrap_or_else(|| std::io::Error::other("staging retries exhausted")),
    })
}

fn unique_sibling(dir: &Path, name: &str) -> Result<PathBuf, WriteError> {
    Ok(dir.join(format!(".{name}.tmp-{}", random_suffix(dir)?)))
}

fn random_suffix(dir: &Path) -> Result<String, WriteError> {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|source| WriteError::Stage {
            path: dir.to_path_buf(),
            source: std::io::Error::other(format!(
                "failed to generate temporary suffix: {source}"
            )),
        })?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterReport;
    use crate::report::GapCounts;
    use crate::split::SplitReport;
    use tempfile::tempdir;

    fn candidate(region: &str, year: i32, values: Vec<f32>) -> Candidate {
        Candidate {
            region: region.to_string(),
            year,
            label: 40.0,
            crop: Some("corn".to_string()),
            periods: values.len() / 4,
            values,
        }
    }

    fn shape() -> HistogramShape {
        HistogramShape {
            bands: 2,
            bins: 2,
            composite_days: 8,
        }
    }

    fn report() -> AssemblyReport {
        AssemblyReport {
            seed: "seed".to_string(),
            regions: 1,
            harvest_begin: 2010,
            harvest_end: 2010,
            enumerated: 2,
            gaps: GapCounts::default(),
            candidates: 2,
            filters: FilterReport::default(),
            split: SplitReport {
                strategy: "pooled",
                excluded: 0,
                train_dropped_by_keep: 0,
                train: 1,
                dev: 0,
                test: 1,
            },
        }
    }

    fn options(folder: &Path, remake: bool) -> WriteOptions<'_> {
        WriteOptions {
            dataset_folder: folder,
            remake,
            seed: "seed",
            shape: shape(),
            periods: 1,
        }
    }

    #[test]
    fn writes_all_three_splits_and_the_report() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("dataset");
        let assignments = vec![
            (candidate("Adams", 2010, vec![1.0, 2.0, 3.0, 4.0]), Split::Train),
            (candidate("Clark", 2010, vec![5.0, 6.0, 7.0, 8.0]), Split::Test),
        ];
        let summary = write_dataset(&assignments, &report(), &options(&folder, false)).unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.records["train"], 1);
        assert_eq!(summary.records["dev"], 0);
        assert_eq!(summary.records["test"], 1);

        for split in ["train", "dev", "test"] {
            assert!(folder.join(split).join(MANIFEST_FILE_NAME).is_file());
            assert!(folder.join(split).join(SAMPLES_FILE_NAME).is_file());
            assert!(folder.join(split).join(HISTOGRAMS_FILE_NAME).is_file());
        }
        assert!(folder.join(REPORT_FILE_NAME).is_file());

        // No staging leftovers after publish.
        let leftovers: Vec<_> = std::fs::read_dir(&folder)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn remake_off_skips_existing_artifacts() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("dataset");
        let assignments = vec![(candidate("Adams", 2010, vec![1.0, 2.0, 3.0, 4.0]), Split::Train)];
        write_dataset(&assignments, &report(), &options(&folder, false)).unwrap();

        let before = std::fs::read(folder.join("train").join(SAMPLES_FILE_NAME)).unwrap();
        let summary = write_dataset(&[], &report(), &options(&folder, false)).unwrap();
        assert!(summary.skipped);
        let after = std::fs::read(folder.join("train").join(SAMPLES_FILE_NAME)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn remake_on_overwrites_unconditionally() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("dataset");
        let first = vec![(candidate("Adams", 2010, vec![1.0, 2.0, 3.0, 4.0]), Split::Train)];
        write_dataset(&first, &report(), &options(&folder, false)).unwrap();

        let second = vec![(candidate("Clark", 2011, vec![5.0, 6.0, 7.0, 8.0]), Split::Train)];
        let summary = write_dataset(&second, &report(), &options(&folder, true)).unwrap();
        assert!(!summary.skipped);
        let samples = std::fs::read_to_string(folder.join("train").join(SAMPLES_FILE_NAME)).unwrap();
        assert!(samples.contains("Clark"));
        assert!(!samples.contains("Adams"));
    }

    #[test]
    fn sample_records_carry_blob_offsets() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("dataset");
        let assignments = vec![
            (candidate("Adams", 2010, vec![1.0, 2.0, 3.0, 4.0]), Split::Train),
            (candidate("Clark", 2010, vec![5.0, 6.0, 7.0, 8.0]), Split::Train),
        ];
        write_dataset(&assignments, &report(), &options(&folder, false)).unwrap();

        let samples = std::fs::read_to_string(folder.join("train").join(SAMPLES_FILE_NAME)).unwrap();
        let lines: Vec<&str> = samples.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["features"]["offset_bytes"], 16);
        assert_eq!(second["features"]["len_f32"], 4);

        let blob = std::fs::read(folder.join("train").join(HISTOGRAMS_FILE_NAME)).unwrap();
        assert_eq!(blob.len(), 32);
    }
}

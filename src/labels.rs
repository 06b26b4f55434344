//! Ground-truth yield label table.
//!
//! Labels come from the USDA survey export as CSV with `region,year,yield`
//! columns and an optional `crop` tag. A missing label for a (region, year)
//! pair is a data gap handled by the caller, not an error here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while loading the label table.
#[derive(Debug, Error)]
pub enum LabelError {
    /// Failed to read or parse the CSV file.
    #[error("Failed to read yield labels from {path}: {source}")]
    Read {
        /// CSV file path.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
    /// The same (region, year) pair appeared twice.
    #[error("Duplicate yield label for {region} {year} in {path}")]
    Duplicate {
        /// CSV file path.
        path: PathBuf,
        /// Duplicated region.
        region: String,
        /// Duplicated year.
        year: i32,
    },
}

/// One ground-truth yield value.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldLabel {
    /// Yield value, in the survey's units.
    pub value: f64,
    /// Optional crop tag.
    pub crop: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YieldRow {
    region: String,
    year: i32,
    #[serde(rename = "yield")]
    value: f64,
    #[serde(default)]
    crop: Option<String>,
}

/// Yield labels keyed by region and harvest year.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: BTreeMap<String, BTreeMap<i32, YieldLabel>>,
    len: usize,
}

impl LabelTable {
    /// Load the table from a CSV file.
    pub fn from_csv(path: &Path) -> Result<Self, LabelError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| LabelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut table = Self::default();
        for row in reader.deserialize::<YieldRow>() {
            let row = row.map_err(|source| LabelError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let crop = row.crop.filter(|tag| !tag.is_empty());
            let previous = table.labels.entry(row.region.clone()).or_default().insert(
                row.year,
                YieldLabel {
                    value: row.value,
                    crop,
                },
            );
            if previous.is_some() {
                return Err(LabelError::Duplicate {
                    path: path.to_path_buf(),
                    region: row.region,
                    year: row.year,
                });
            }
            table.len += 1;
        }
        Ok(table)
    }

    /// Look up the label for one (region, year) pair.
    pub fn label(&self, region: &str, year: i32) -> Option<&YieldLabel> {
        self.labels.get(region)?.get(&year)
    }

    /// Total labels loaded.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no labels.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_csv(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("yields.csv");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_labels_with_optional_crop() {
        let (_dir, path) = write_csv(
            "region,year,yield,crop\nAdams,2010,41.5,corn\nClark,2010,38.0,\n",
        );
        let table = LabelTable::from_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        let adams = table.label("Adams", 2010).unwrap();
        assert_eq!(adams.value, 41.5);
        assert_eq!(adams.crop.as_deref(), Some("corn"));
        assert_eq!(table.label("Clark", 2010).unwrap().crop, None);
        assert!(table.label("Adams", 2011).is_none());
    }

    #[test]
    fn loads_labels_without_crop_column() {
        let (_dir, path) = write_csv("region,year,yield\nAdams,2010,41.5\n");
        let table = LabelTable::from_csv(&path).unwrap();
        assert_eq!(table.label("Adams", 2010).unwrap().crop, None);
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let (_dir, path) = write_csv(
            "region,year,yield\nAdams,2010,41.5\nAdams,2010,42.0\n",
        );
        let err = LabelTable::from_csv(&path).unwrap_err();
        assert!(matches!(err, LabelError::Duplicate { .. }));
    }

    #[test]
    fn malformed_row_is_a_read_error() {
        let (_dir, path) = write_csv("region,year,yield\nAdams,not-a-year,41.5\n");
        assert!(matches!(
            LabelTable::from_csv(&path),
            Err(LabelError::Read { .. })
        ));
    }
}

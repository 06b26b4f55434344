//! Run configuration loaded from a TOML file.
//!
//! The whole run is driven by one flat parameter file consumed once at
//! startup. The parsed struct is validated up front and then passed by
//! reference into each pipeline stage; nothing here is global state.

use std::path::{Path, PathBuf};

use geo::{Coord, Rect};
use serde::Deserialize;
use thiserror::Error;

use crate::window::{MonthDay, WindowSpec};

/// Errors that may occur while loading or validating the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// A parameter value fails validation.
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter {
        /// Dotted parameter name, as written in the TOML file.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// The configured region list: every boundary, or explicit names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RegionSpec {
    /// The keyword `"all"`.
    All(String),
    /// Explicit region names.
    Named(Vec<String>),
}

/// Bounding-box filter applied when expanding `regions = "all"`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    /// Western edge, degrees longitude.
    pub min_lon: f64,
    /// Southern edge, degrees latitude.
    pub min_lat: f64,
    /// Eastern edge, degrees longitude.
    pub max_lon: f64,
    /// Northern edge, degrees latitude.
    pub max_lat: f64,
}

impl BoundingBox {
    /// The box as a geometry rect.
    pub fn to_rect(self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }
}

/// `[regions]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionsConfig {
    /// Region list or `"all"`.
    pub regions: RegionSpec,
    /// Shapefile-derived boundary file (GeoJSON FeatureCollection).
    pub boundaries_path: PathBuf,
    /// Feature property holding the region name.
    #[serde(default = "default_region_column")]
    pub region_column: String,
    /// Optional bounding-box filter for `"all"` expansion.
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

fn default_region_column() -> String {
    "NAME".to_string()
}

/// `[data]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Histogram store root.
    pub histogram_folder: PathBuf,
    /// USDA yield label CSV.
    pub yield_csv: PathBuf,
    /// First candidate harvest year, inclusive.
    pub harvest_begin: i32,
    /// Last candidate harvest year, inclusive.
    pub harvest_end: i32,
}

/// `[window]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// First month-day of the harvest phase, `MM-DD`.
    pub phase_begin: MonthDay,
    /// Last month-day of the harvest phase, `MM-DD`.
    pub phase_end: MonthDay,
    /// Leading fraction of the phase window to retain.
    #[serde(default = "default_season_frac")]
    pub season_frac: f64,
}

fn default_season_frac() -> f64 {
    1.0
}

impl WindowConfig {
    /// The section as a resolved window spec.
    pub fn to_spec(&self) -> WindowSpec {
        WindowSpec {
            phase_begin: self.phase_begin,
            phase_end: self.phase_end,
            season_frac: self.season_frac,
        }
    }
}

/// `[filters]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FiltersConfig {
    /// Single year dropped from every region.
    pub year_to_skip: Option<i32>,
    /// Regions dropped entirely.
    pub filter_provinces: Vec<String>,
    /// Years dropped entirely.
    pub filter_years: Vec<i32>,
    /// Whether to apply the external skip file.
    pub use_skip_file: bool,
    /// Skip file path; required when `use_skip_file` is set.
    pub skip_file: Option<PathBuf>,
}

/// `[split]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Regions held out as the test set.
    pub test_provinces: Vec<String>,
    /// Years held out as the test set.
    pub test_years: Vec<i32>,
    /// Remove explicit test matches entirely instead of assigning them.
    pub exclude: bool,
    /// Test fraction when no explicit hold-out is configured.
    pub test_pool_frac: f64,
    /// Dev fraction drawn from the non-test pool.
    pub dev_frac_of_train: f64,
    /// Fraction of the train set to keep after splitting.
    pub train_fraction_keep: f64,
    /// Seed for every randomized draw.
    pub seed: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_provinces: Vec::new(),
            test_years: Vec::new(),
            exclude: false,
            test_pool_frac: 0.2,
            dev_frac_of_train: 0.1,
            train_fraction_keep: 1.0,
            seed: "cropset-v1".to_string(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Dataset artifact folder.
    pub dataset_folder: PathBuf,
    /// Overwrite existing artifacts instead of reporting a no-op.
    #[serde(default)]
    pub remake: bool,
    /// Log directory; defaults to `logs/` beside the dataset folder.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Resolved log directory.
    pub fn resolved_log_dir(&self) -> PathBuf {
        match &self.log_dir {
            Some(dir) => dir.clone(),
            None => match self.dataset_folder.parent() {
                Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("logs"),
                Some(parent) => parent.join("logs"),
                None => PathBuf::from("logs"),
            },
        }
    }
}

/// The full assembly run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    /// Region catalog parameters.
    pub regions: RegionsConfig,
    /// Data source parameters.
    pub data: DataConfig,
    /// Harvest window parameters.
    pub window: WindowConfig,
    /// Candidate filter parameters.
    #[serde(default)]
    pub filters: FiltersConfig,
    /// Split assignment parameters.
    #[serde(default)]
    pub split: SplitConfig,
    /// Output parameters.
    pub output: OutputConfig,
}

impl AssemblyConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints; every rejection names the parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.regions.regions {
            RegionSpec::All(keyword) if keyword != "all" => {
                return Err(invalid(
                    "regions.regions",
                    format!("expected \"all\" or a list of names, got {keyword:?}"),
                ));
            }
            RegionSpec::Named(names) if names.is_empty() => {
                return Err(invalid("regions.regions", "empty region list".to_string()));
            }
            _ => {}
        }
        if let Some(bbox) = &self.regions.bbox {
            if bbox.min_lon >= bbox.max_lon || bbox.min_lat >= bbox.max_lat {
                return Err(invalid(
                    "regions.bbox",
                    "min corner must be strictly below max corner".to_string(),
                ));
            }
        }
        if self.data.harvest_begin > self.data.harvest_end {
            return Err(invalid(
                "data.harvest_begin",
                format!(
                    "harvest_begin {} is after harvest_end {}",
                    self.data.harvest_begin, self.data.harvest_end
                ),
            ));
        }
        if self.window.phase_begin > self.window.phase_end {
            return Err(invalid(
                "window.phase_begin",
                format!(
                    "phase_begin {} is after phase_end {}",
                    self.window.phase_begin, self.window.phase_end
                ),
            ));
        }
        if !(self.window.season_frac > 0.0 && self.window.season_frac <= 1.0) {
            return Err(invalid(
                "window.season_frac",
                format!("{} is outside (0, 1]", self.window.season_frac),
            ));
        }
        if !(0.0..1.0).contains(&self.split.test_pool_frac) {
            return Err(invalid(
                "split.test_pool_frac",
                format!("{} is outside [0, 1)", self.split.test_pool_frac),
            ));
        }
        if !(0.0..1.0).contains(&self.split.dev_frac_of_train) {
            return Err(invalid(
                "split.dev_frac_of_train",
                format!("{} is outside [0, 1)", self.split.dev_frac_of_train),
            ));
        }
        if !(self.split.train_fraction_keep > 0.0 && self.split.train_fraction_keep <= 1.0) {
            return Err(invalid(
                "split.train_fraction_keep",
                format!("{} is outside (0, 1]", self.split.train_fraction_keep),
            ));
        }
        if self.split.seed.is_empty() {
            return Err(invalid("split.seed", "seed must not be empty".to_string()));
        }
        if self.split.exclude
            && self.split.test_provinces.is_empty()
            && self.split.test_years.is_empty()
        {
            return Err(invalid(
                "split.exclude",
                "exclude is set but neither test_provinces nor test_years is".to_string(),
            ));
        }
        if self.filters.use_skip_file && self.filters.skip_file.is_none() {
            return Err(invalid(
                "filters.skip_file",
                "use_skip_file is set but no skip_file path is configured".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { name, reason }
}

//! Pipeline orchestration from configuration to written artifacts.
//!
//! Assembly is a single-pass batch computation: resolve regions, join the
//! histogram store with the label table over every (region, year) pair,
//! window each series, filter, split, and write. Per-pair loading is an
//! independent map and runs on the rayon pool for throughput; candidates are
//! re-sorted afterwards so parallelism never changes split assignment.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::candidate::{Candidate, sort_canonical};
use crate::config::{AssemblyConfig, ConfigError};
use crate::filters::{self, FilterError};
use crate::histstore::{FsHistogramStore, HistogramStore, StoreError};
use crate::labels::{LabelError, LabelTable};
use crate::regions::{BoundarySet, CatalogError, resolve_regions};
use crate::report::{AssemblyReport, GapCounts};
use crate::split::{SplitOptions, assign_splits};
use crate::window::{WindowError, WindowSpec, window_series};
use crate::writer::{self, WriteError, WriteOptions};

/// Errors that abort an assembly run.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Outcome of one assembly run.
#[derive(Debug)]
pub struct AssemblyOutcome {
    /// Whether the run was a no-op because artifacts already exist.
    pub skipped: bool,
    /// The run report; absent when the run was skipped.
    pub report: Option<AssemblyReport>,
}

enum Loaded {
    Candidate(Candidate),
    Gap(Gap),
}

#[derive(Clone, Copy)]
enum Gap {
    MissingLabel,
    MissingHistograms,
    ShortSeries,
}

/// Run the full assembly described by `config`.
pub fn run(config: &AssemblyConfig) -> Result<AssemblyOutcome, AssemblyError> {
    config.validate()?;

    if !config.output.remake && writer::artifacts_exist(&config.output.dataset_folder) {
        info!(
            "dataset at {} already exists and remake is off; nothing to do",
            config.output.dataset_folder.display()
        );
        return Ok(AssemblyOutcome {
            skipped: true,
            report: None,
        });
    }

    let boundaries = BoundarySet::load(
        &config.regions.boundaries_path,
        &config.regions.region_column,
    )?;
    let bbox = config.regions.bbox.map(|bbox| bbox.to_rect());
    let regions = resolve_regions(&config.regions.regions, &boundaries, bbox.as_ref())?;
    info!(
        "resolved {} regions against {} boundaries",
        regions.len(),
        boundaries.len()
    );

    let store = FsHistogramStore::open(&config.data.histogram_folder)?;
    let labels = LabelTable::from_csv(&config.data.yield_csv)?;
    info!("loaded {} yield labels", labels.len());

    let skip = match &config.filters.skip_file {
        Some(path) if config.filters.use_skip_file => Some(filters::load_skip_file(path)?),
        _ => None,
    };

    let window_spec = config.window.to_spec();
    let years = config.data.harvest_begin..=config.data.harvest_end;
    let (mut candidates, gaps) = build_candidates(&store, &labels, &window_spec, &regions, years)?;
    sort_canonical(&mut candidates);

    let (survivors, filter_report) = filters::apply_filters(
        candidates,
        &config.filters,
        skip.as_ref(),
    );

    let split_options = SplitOptions::from_config(&config.split);
    let (assignments, split_report) = assign_splits(survivors, &split_options);

    let enumerated =
        regions.len() * (config.data.harvest_end - config.data.harvest_begin + 1) as usize;
    let report = AssemblyReport {
        seed: config.split.seed.clone(),
        regions: regions.len(),
        harvest_begin: config.data.harvest_begin,
        harvest_end: config.data.harvest_end,
        enumerated,
        candidates: filter_report.entering,
        gaps,
        filters: filter_report,
        split: split_report,
    };

    let shape = store.shape();
    let periods = window_spec
        .period_range(config.data.harvest_begin, shape.composite_days)
        .retained;
    let write_options = WriteOptions {
        dataset_folder: &config.output.dataset_folder,
        remake: config.output.remake,
        seed: &config.split.seed,
        shape,
        periods,
    };
    let summary = writer::write_dataset(&assignments, &report, &write_options)?;

    report.log();
    Ok(AssemblyOutcome {
        skipped: summary.skipped,
        report: Some(report),
    })
}

/// Join the store and label table over every (region, year) pair, windowing
/// each series. Pairs missing data are counted, logged, and dropped.
pub fn build_candidates<S>(
    store: &S,
    labels: &LabelTable,
    window_spec: &WindowSpec,
    regions: &[String],
    years: std::ops::RangeInclusive<i32>,
) -> Result<(Vec<Candidate>, GapCounts), StoreError>
where
    S: HistogramStore + Sync,
{
    let keys: Vec<(String, i32)> = regions
        .iter()
        .flat_map(|region| years.clone().map(move |year| (region.clone(), year)))
        .collect();

    let progress = progress_bar(keys.len() as u64, "loading histograms");
    let loaded = keys
        .par_iter()
        .map(|(region, year)| {
            let result = load_candidate(store, labels, window_spec, region, *year);
            progress.inc(1);
            result
        })
        .collect::<Result<Vec<Loaded>, StoreError>>();
    progress.finish_and_clear();

    let mut candidates = Vec::new();
    let mut gaps = GapCounts::default();
    for item in loaded? {
        match item {
            Loaded::Candidate(candidate) => candidates.push(candidate),
            Loaded::Gap(Gap::MissingLabel) => gaps.missing_label += 1,
            Loaded::Gap(Gap::MissingHistograms) => gaps.missing_histograms += 1,
            Loaded::Gap(Gap::ShortSeries) => gaps.short_series += 1,
        }
    }
    Ok((candidates, gaps))
}

fn load_candidate<S>(
    store: &S,
    labels: &LabelTable,
    window_spec: &WindowSpec,
    region: &str,
    year: i32,
) -> Result<Loaded, StoreError>
where
    S: HistogramStore,
{
    let Some(label) = labels.label(region, year) else {
        warn!("no yield label for {region} {year}; dropping");
        return Ok(Loaded::Gap(Gap::MissingLabel));
    };

    let series = match store.load_year(region, year) {
        Ok(series) => series,
        Err(err) if err.is_data_gap() => {
            warn!("{err}; dropping");
            return Ok(Loaded::Gap(Gap::MissingHistograms));
        }
        Err(err) => return Err(err),
    };

    match window_series(&series, window_spec) {
        Ok(window) => Ok(Loaded::Candidate(Candidate {
            region: region.to_string(),
            year,
            label: label.value,
            crop: label.crop.clone(),
            periods: window.periods,
            values: window.values,
        })),
        Err(WindowError::DataGap { .. }) => {
            warn!(
                "histogram series for {region} {year} is shorter than the harvest window; dropping"
            );
            Ok(Loaded::Gap(Gap::ShortSeries))
        }
    }
}

fn progress_bar(len: u64, title: &str) -> ProgressBar {
    ProgressBar::new(len).with_message(title.to_string()).with_style(
        ProgressStyle::default_bar()
            .template("{msg} ({pos}/{len}) [{bar:40}] {percent}%")
            .expect("progress template is valid")
            .progress_chars("=>-"),
    )
}

//! Assembly run report.
//!
//! Collects the counts a user needs to audit why the final dataset is smaller
//! than the enumerated (region, year) grid: data gaps, per-rule filter drops,
//! and split sizes. Published as `assembly.json` beside the split artifacts
//! and mirrored into the log.

use serde::Serialize;
use tracing::info;

use crate::filters::FilterReport;
use crate::split::SplitReport;

/// Candidates lost to missing data, by kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GapCounts {
    /// (region, year) pairs with no yield label.
    pub missing_label: usize,
    /// Pairs with no histogram blob in the store.
    pub missing_histograms: usize,
    /// Pairs whose series ends before the harvest window.
    pub short_series: usize,
}

impl GapCounts {
    /// Total pairs dropped for missing data.
    pub fn total(&self) -> usize {
        self.missing_label + self.missing_histograms + self.short_series
    }
}

/// Everything a downstream experiment-tracking run needs to audit one
/// assembly.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyReport {
    /// Seed used for every randomized draw.
    pub seed: String,
    /// Resolved region count.
    pub regions: usize,
    /// First candidate year, inclusive.
    pub harvest_begin: i32,
    /// Last candidate year, inclusive.
    pub harvest_end: i32,
    /// (region, year) pairs enumerated before any data checks.
    pub enumerated: usize,
    /// Pairs dropped for missing data.
    pub gaps: GapCounts,
    /// Candidates with both imagery and label data.
    pub candidates: usize,
    /// Filter stage audit trail.
    pub filters: FilterReport,
    /// Split stage audit trail.
    pub split: SplitReport,
}

impl AssemblyReport {
    /// Mirror the report into the log.
    pub fn log(&self) {
        info!(
            "assembled {} candidates from {} enumerated pairs across {} regions ({}..={})",
            self.candidates, self.enumerated, self.regions, self.harvest_begin, self.harvest_end
        );
        if self.gaps.total() > 0 {
            info!(
                "data gaps: {} missing label, {} missing histograms, {} short series",
                self.gaps.missing_label, self.gaps.missing_histograms, self.gaps.short_series
            );
        }
        for drop in &self.filters.drops {
            info!("filter {}: dropped {}", drop.rule, drop.dropped);
        }
        info!(
            "split ({}): {} train / {} dev / {} test, {} excluded, {} dropped by train_fraction_keep",
            self.split.strategy,
            self.split.train,
            self.split.dev,
            self.split.test,
            self.split.excluded,
            self.split.train_dropped_by_keep
        );
    }
}

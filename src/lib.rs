//! Dataset assembly pipeline for satellite-driven crop yield prediction.
/// Pipeline orchestration from configuration to written artifacts.
pub mod assemble;
/// Candidate example record shared across pipeline stages.
pub mod candidate;
/// Run configuration loaded from a TOML file.
pub mod config;
/// Ordered inclusion/exclusion rules over candidate examples.
pub mod filters;
/// Precomputed spectral band histogram store.
pub mod histstore;
/// Ground-truth yield label table.
pub mod labels;
/// Read-back of written split artifacts.
pub mod loader;
/// Logging setup.
pub mod logging;
/// Region catalog resolution against the boundary set.
pub mod regions;
/// Assembly run report.
pub mod report;
/// Train/dev/test split assignment.
pub mod split;
/// Harvest phase windowing.
pub mod window;
/// Split artifact writer.
pub mod writer;

//! On-disk fixtures for pipeline tests: a histogram store, a boundary file,
//! a label table, and a run configuration wired to them.

use std::path::{Path, PathBuf};

/// Spectral bands in every fixture store.
pub const BANDS: usize = 2;
/// Histogram bins per band.
pub const BINS: usize = 4;
/// Full-year period count for the 8-day composite.
pub const PERIODS: usize = 46;

/// Write a histogram store with full-year blobs for every (region, year).
pub fn write_store(root: &Path, regions: &[&str], years: &[i32]) -> PathBuf {
    let store = root.join("histograms");
    std::fs::create_dir_all(&store).unwrap();
    let manifest = serde_json::json!({
        "format_version": 1,
        "encoding": "f32le",
        "bands": BANDS,
        "bins": BINS,
        "composite_days": 8,
    });
    std::fs::write(
        store.join("manifest.json"),
        serde_json::to_vec_pretty(&manifest).unwrap(),
    )
    .unwrap();

    for (region_index, region) in regions.iter().enumerate() {
        let dir = store.join(region);
        std::fs::create_dir_all(&dir).unwrap();
        for year in years {
            let values: Vec<f32> = (0..PERIODS * BANDS * BINS)
                .map(|index| (region_index * 100_000 + (*year as usize) + index) as f32)
                .collect();
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            std::fs::write(dir.join(format!("{year}.f32le")), bytes).unwrap();
        }
    }
    store
}

/// Write a GeoJSON boundary file with one unit square per region.
pub fn write_boundaries(root: &Path, regions: &[&str]) -> PathBuf {
    let features: Vec<serde_json::Value> = regions
        .iter()
        .enumerate()
        .map(|(index, region)| {
            let x = index as f64 * 2.0;
            serde_json::json!({
                "type": "Feature",
                "properties": { "NAME": region },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [x, 0.0],
                        [x + 1.0, 0.0],
                        [x + 1.0, 1.0],
                        [x, 1.0],
                        [x, 0.0],
                    ]],
                },
            })
        })
        .collect();
    let collection = serde_json::json!({ "type": "FeatureCollection", "features": features });
    let path = root.join("boundaries.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&collection).unwrap()).unwrap();
    path
}

/// Write a yield CSV with one label per (region, year).
pub fn write_labels(root: &Path, regions: &[&str], years: &[i32]) -> PathBuf {
    let mut text = String::from("region,year,yield\n");
    for (region_index, region) in regions.iter().enumerate() {
        for year in years {
            let value = 30.0 + region_index as f64 + (*year - 2000) as f64 / 10.0;
            text.push_str(&format!("{region},{year},{value}\n"));
        }
    }
    let path = root.join("yields.csv");
    std::fs::write(&path, text).unwrap();
    path
}

/// Store + boundaries + labels for a complete (region x year) grid.
pub fn write_grid(root: &Path, regions: &[&str], years: &[i32]) {
    write_store(root, regions, years);
    write_boundaries(root, regions);
    write_labels(root, regions, years);
}

/// Base TOML configuration wired to the fixture paths under `root`.
///
/// Leaves out `[filters]` and `[split]` so tests can append their own.
pub fn base_config(root: &Path, begin: i32, end: i32, season_frac: f64) -> String {
    format!(
        r#"
[regions]
regions = "all"
boundaries_path = {boundaries:?}
region_column = "NAME"

[data]
histogram_folder = {store:?}
yield_csv = {labels:?}
harvest_begin = {begin}
harvest_end = {end}

[window]
phase_begin = "04-01"
phase_end = "09-30"
season_frac = {season_frac}

[output]
dataset_folder = {dataset:?}
"#,
        boundaries = root.join("boundaries.json"),
        store = root.join("histograms"),
        labels = root.join("yields.csv"),
        dataset = root.join("dataset"),
    )
}

/// Write `text` as the run configuration under `root` and return its path.
pub fn write_config(root: &Path, text: &str) -> PathBuf {
    let path = root.join("config.toml");
    std::fs::write(&path, text).unwrap();
    path
}

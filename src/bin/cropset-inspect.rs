//! Developer utility to summarize written dataset artifacts.

use std::path::PathBuf;

use cropset::loader::load_split;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(dataset_dir) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    for split in ["train", "dev", "test"] {
        let dir = dataset_dir.join(split);
        if !dir.join("manifest.json").is_file() {
            println!("{split}: absent");
            continue;
        }
        let loaded = load_split(&dir).map_err(|err| err.to_string())?;
        let manifest = &loaded.manifest;
        println!(
            "{split}: {} records, {} bands x {} bins x {} periods (seed {:?})",
            manifest.records, manifest.bands, manifest.bins, manifest.periods, manifest.seed
        );
        if loaded.samples.is_empty() {
            continue;
        }
        let labels: Vec<f64> = loaded.samples.iter().map(|record| record.label).collect();
        let min = labels.iter().copied().fold(f64::INFINITY, f64::min);
        let max = labels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = labels.iter().sum::<f64>() / labels.len() as f64;
        println!("  labels: min {min:.2} / mean {mean:.2} / max {max:.2}");
        let years: std::collections::BTreeSet<i32> =
            loaded.samples.iter().map(|record| record.year).collect();
        let regions: std::collections::BTreeSet<&str> = loaded
            .samples
            .iter()
            .map(|record| record.region.as_str())
            .collect();
        println!("  coverage: {} regions, years {years:?}", regions.len());
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<PathBuf>, String> {
    let mut dataset_dir: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--dataset" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--dataset requires a value".to_string())?;
                dataset_dir = Some(PathBuf::from(value));
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let dataset_dir =
        dataset_dir.ok_or_else(|| format!("--dataset is required\n\n{}", help_text()))?;
    Ok(Some(dataset_dir))
}

fn help_text() -> String {
    [
        "cropset-inspect",
        "",
        "Prints a summary of each split artifact under a dataset folder.",
        "",
        "Usage:",
        "  cropset-inspect --dataset <dir>",
    ]
    .join("\n")
}

//! Entry point for the dataset assembly pipeline.

use std::path::PathBuf;

use cropset::assemble;
use cropset::config::AssemblyConfig;
use cropset::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

struct CliOptions {
    config_path: PathBuf,
    remake: bool,
    seed: Option<String>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    let mut config =
        AssemblyConfig::load(&options.config_path).map_err(|err| err.to_string())?;
    if options.remake {
        config.output.remake = true;
    }
    if let Some(seed) = options.seed {
        config.split.seed = seed;
    }

    if let Err(err) = logging::init(&config.output.resolved_log_dir()) {
        eprintln!("Failed to initialize logging: {err}");
    }

    let outcome = assemble::run(&config).map_err(|err| err.to_string())?;
    if outcome.skipped {
        println!(
            "Dataset at {} already exists; pass --remake to regenerate.",
            config.output.dataset_folder.display()
        );
        return Ok(());
    }
    if let Some(report) = outcome.report {
        println!(
            "Assembled {} train / {} dev / {} test examples into {}",
            report.split.train,
            report.split.dev,
            report.split.test,
            config.output.dataset_folder.display()
        );
        let dropped = report.gaps.total()
            + report.filters.drops.iter().map(|d| d.dropped).sum::<usize>()
            + report.split.excluded
            + report.split.train_dropped_by_keep;
        if dropped > 0 {
            println!("Dropped {dropped} examples; see assembly.json for the breakdown.");
        }
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut config_path: Option<PathBuf> = None;
    let mut remake = false;
    let mut seed: Option<String> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--remake" => {
                remake = true;
            }
            "--seed" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                if value.is_empty() {
                    return Err("--seed must not be empty".to_string());
                }
                seed = Some(value.to_string());
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let config_path = config_path.ok_or_else(|| format!("--config is required\n\n{}", help_text()))?;
    Ok(Some(CliOptions {
        config_path,
        remake,
        seed,
    }))
}

fn help_text() -> String {
    [
        "cropset",
        "",
        "Assembles train/dev/test crop-yield datasets from per-region band",
        "histograms and USDA yield labels.",
        "",
        "Usage:",
        "  cropset --config <path> [options]",
        "",
        "Options:",
        "  --config <path>  TOML run configuration (required).",
        "  --remake         Overwrite existing artifacts instead of skipping.",
        "  --seed <string>  Override the configured split seed.",
    ]
    .join("\n")
}

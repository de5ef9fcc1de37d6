use std::path::Path;

use chrono::NaiveDateTime;
use clap::Parser;
use geodataset::config::{Commands, CopyArgs, FindArgs, MainArgs, RunConfig};
use geodataset::dataset::Dataset;
use geodataset::discovery::{Filters, Ordering};
use geodataset::dispatch::WorkerSettings;
use geodataset::error::GeoDatasetError;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn main() -> Result<(), GeoDatasetError> {
    env_logger::init();
    let args = MainArgs::parse();

    match args.command {
        Commands::Find(sub) => run_find(&sub, args.threads, false),
        Commands::Collect(sub) => run_find(&sub, args.threads, true),
        Commands::Copy(sub) => run_copy(&sub, args.threads),
    }
}

fn load_dataset(config_file: &Path, name: &str, threads: Option<usize>, show_progress: bool) -> Result<Dataset, GeoDatasetError> {
    let buf = std::fs::read_to_string(config_file)?;
    let cfg: RunConfig = toml::from_str(&buf)?;
    let entry = cfg.get(name).ok_or_else(|| GeoDatasetError::InternalError(format!("no dataset named '{name}' in {}", config_file.display())))?;

    let mut worker_threads = entry.worker_threads;
    if let Some(n) = threads {
        worker_threads = n;
    }

    let dataset = entry.build()?.with_worker_settings(WorkerSettings::threads(worker_threads).with_progress(show_progress));
    Ok(dataset)
}

fn parse_time(s: &str) -> Result<NaiveDateTime, GeoDatasetError> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT).map_err(|e| GeoDatasetError::InvalidTimeRange { msg: format!("'{s}': {e}") })
}

fn run_find(args: &FindArgs, threads: Option<usize>, eager: bool) -> Result<(), GeoDatasetError> {
    let dataset = load_dataset(&args.config_file, &args.dataset, threads, args.show_progress)?;
    let start = parse_time(&args.start)?;
    let end = parse_time(&args.end)?;

    log::info!("searching dataset '{}' in [{start}, {end}]", dataset.name);
    let files = if eager {
        dataset.list_sorted(start, end)?
    } else {
        dataset.find(start, end, Filters::default(), Ordering::Discovery, false)?
    };

    let pb = if args.show_progress {
        let pb = indicatif::ProgressBar::new(files.len() as u64);
        pb.set_style(indicatif::ProgressStyle::with_template("{bar} {human_pos}/{human_len} files listed").unwrap());
        pb
    } else {
        indicatif::ProgressBar::hidden()
    };

    for file in &files {
        println!("{}", file.path.display());
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("{} files found", files.len());
    Ok(())
}

fn run_copy(args: &CopyArgs, threads: Option<usize>) -> Result<(), GeoDatasetError> {
    let source = load_dataset(&args.config_file, &args.source, threads, args.show_progress)?;
    let destination = load_dataset(&args.config_file, &args.destination, threads, false)?;
    let start = parse_time(&args.start)?;
    let end = parse_time(&args.end)?;

    let files = source.list_sorted(start, end)?;
    log::info!("copying {} files from '{}' to '{}'", files.len(), source.name, destination.name);

    let written = source.copy(&destination, files, None)?;
    println!("wrote {} files into '{}'", written.len(), destination.name);
    Ok(())
}

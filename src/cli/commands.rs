use crate::analyzers::{DatasetAnalyzer, FlagPlotter};
use crate::cli::args::{Cli, Commands};
use crate::config::MedsConfig;
use crate::error::{ProcessingError, Result};
use crate::processors::{IntegrityChecker, MedsPipeline};
use crate::utils::filename::discover_partitions;
use crate::utils::progress::ProgressReporter;
use crate::writers::DatasetWriter;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the flags.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| {
        ProcessingError::Config(format!("Failed to install the log subscriber: {}", e))
    })?;
    Ok(())
}

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Process {
            inputs,
            save_dir,
            chunk_size,
            max_workers,
            compression,
            dataset_name,
        } => {
            let mut config = MedsConfig::load(cli.config.as_deref())?;
            if let Some(save_dir) = save_dir {
                config.save_dir = save_dir;
            }
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            if let Some(max_workers) = max_workers {
                config.max_workers = max_workers;
            }
            if let Some(compression) = compression {
                config.compression = compression;
            }
            if let Some(dataset_name) = dataset_name {
                config.dataset_name = dataset_name;
            }
            config.check()?;

            if !quiet {
                println!("Processing {} MEDS file(s)...", inputs.len());
                println!("Save directory: {}", config.save_dir.display());
                println!(
                    "Workers: {}, Chunk size: {}",
                    config.max_workers, config.chunk_size
                );
            }

            let summary = tokio::task::spawn_blocking(move || {
                let progress = ProgressReporter::new_spinner("Reading MEDS data...", quiet);
                let pipeline = MedsPipeline::from_config(&config)?;
                let summary = pipeline.run(&inputs, Some(&progress))?;
                progress.finish_with_message(&format!("Read {} rows", summary.total_rows()));
                Ok::<_, ProcessingError>(summary)
            })
            .await??;

            println!("\n{}", summary.report());
            println!("Processing complete!");
        }

        Commands::Info { file } => {
            println!("Analyzing partition dataset: {}", file.display());

            let writer = DatasetWriter::new(file.parent().unwrap_or(Path::new(".")));
            let file_info = writer.get_file_info(&file)?;
            let dataset = writer.read_dataset(&file)?;

            let checker = IntegrityChecker::new();
            let report = checker.verify(&dataset)?;

            let attributes = &dataset.attributes;
            println!("\nPartition: {}", dataset.key);
            println!("Dataset name: {}", attributes.dataset_name);
            println!("Created: {}", attributes.creation_date);
            if let Some(update_date) = &attributes.update_date {
                println!("Updated: {}", update_date);
            }
            println!("Source files: {}", attributes.source_files.join(", "));

            if !dataset.profiles.is_empty() {
                let stats = DatasetAnalyzer::new().analyze(&dataset)?;
                println!("\n{}", stats.summary());
            }

            println!("{}", checker.generate_summary(&report));
            println!("File Details:");
            println!("{}", file_info.summary());
        }

        Commands::Partitions { save_dir } => {
            let save_dir = match save_dir {
                Some(dir) => dir,
                None => MedsConfig::load(cli.config.as_deref())?.save_dir,
            };

            let partitions = discover_partitions(&save_dir)?;
            if partitions.is_empty() {
                println!("No partition datasets in {}", save_dir.display());
                return Ok(());
            }

            let writer = DatasetWriter::new(&save_dir);
            println!("Partition datasets in {}:", save_dir.display());
            for (key, path) in &partitions {
                let info = writer.get_file_info(path)?;
                println!(
                    "  {}  {:>8} profiles  {:>8.2} MB  {}",
                    key,
                    info.total_profiles,
                    info.file_size as f64 / 1_048_576.0,
                    path.display()
                );
            }
        }

        Commands::Plot {
            file,
            var1,
            var2,
            clean,
            output_dir,
        } => {
            let plotter = FlagPlotter::open(&file, output_dir.as_deref())?;
            let path = plotter.plot(&var1, &var2, clean)?;
            println!("Plot written to {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_subscriber_is_reported() -> Result<()> {
        let dir = TempDir::new()?;
        let _ = init_logging(false, None);

        let result = init_logging(true, Some(&dir.path().join("meds.log")));
        assert!(matches!(result, Err(ProcessingError::Config(_))));
        Ok(())
    }
}

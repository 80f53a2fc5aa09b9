use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meds-processor")]
#[command(about = "Chunked MEDS profile ingester with year-partitioned Parquet output")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Hide progress output")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Settings file (TOML or JSON)")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest MEDS CSV exports into the partitioned datasets
    Process {
        #[arg(required = true, help = "Input CSV files, processed in order")]
        inputs: Vec<PathBuf>,

        #[arg(short, long, help = "Directory holding the partition datasets")]
        save_dir: Option<PathBuf>,

        #[arg(long, help = "Rows per chunk [default: 1000000]")]
        chunk_size: Option<usize>,

        #[arg(long, help = "Row parsing threads [default: number of CPUs]")]
        max_workers: Option<usize>,

        #[arg(short, long, help = "snappy, gzip, lz4, zstd or none [default: snappy]")]
        compression: Option<String>,

        #[arg(long, help = "Dataset name recorded in new partitions [default: MEDS_2021]")]
        dataset_name: Option<String>,
    },

    /// Display information about a partition dataset
    Info {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List the partition datasets in a directory
    Partitions {
        #[arg(short, long, help = "Directory holding the partition datasets")]
        save_dir: Option<PathBuf>,
    },

    /// Scatter-plot one variable against another
    Plot {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(help = "Variable on the x axis")]
        var1: String,

        #[arg(help = "Variable on the inverted y axis")]
        var2: String,

        #[arg(long, help = "Keep only samples flagged 1, 5 or 8")]
        clean: bool,

        #[arg(short, long, help = "Directory receiving plots/ [default: next to the file]")]
        output_dir: Option<PathBuf>,
    },
}

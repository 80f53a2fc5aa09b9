use crate::error::{ProcessingError, Result};
use crate::models::{PartitionKey, PartitionScheme};
use crate::utils::constants::*;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Environment variable prefix, e.g. `MEDS_CHUNK_SIZE`.
pub const ENV_PREFIX: &str = "MEDS";

/// Settings for an ingestion run.
///
/// Missing keys fall back to [`MedsConfig::default`]. Sources are layered as
/// built-in defaults, then an optional TOML/JSON file, then `MEDS_*`
/// environment variables; the CLI applies its flags last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MedsConfig {
    pub save_dir: PathBuf,

    #[validate(range(min = 1))]
    pub chunk_size: usize,

    #[validate(range(min = 1))]
    pub max_workers: usize,

    #[validate(length(min = 1))]
    pub dataset_name: String,

    pub compression: String,

    #[validate(range(min = 1))]
    pub row_group_size: usize,

    #[validate(length(min = 1))]
    pub partitions: Vec<PartitionKey>,
}

impl Default for MedsConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_workers: num_cpus::get(),
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            compression: DEFAULT_COMPRESSION.to_string(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            partitions: DEFAULT_PARTITIONS
                .iter()
                .map(|&(start, end)| PartitionKey { start, end })
                .collect(),
        }
    }
}

impl MedsConfig {
    /// Load layered settings. A named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: MedsConfig = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field-level validation plus the checks that span fields.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.partition_scheme()?;

        let known = [
            COMPRESSION_SNAPPY,
            COMPRESSION_GZIP,
            COMPRESSION_LZ4,
            COMPRESSION_ZSTD,
            COMPRESSION_NONE,
        ];
        if !known.contains(&self.compression.to_lowercase().as_str()) {
            return Err(ProcessingError::Config(format!(
                "Unsupported compression: {}",
                self.compression
            )));
        }
        Ok(())
    }

    pub fn partition_scheme(&self) -> Result<PartitionScheme> {
        PartitionScheme::new(self.partitions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults_are_valid() {
        let config = MedsConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.chunk_size, 1_000_000);
        assert_eq!(config.partition_scheme().unwrap().partitions().len(), 3);
    }

    #[test]
    fn test_load_from_toml_file() -> Result<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "save_dir = \"/data/meds\"\nchunk_size = 500\ncompression = \"zstd\"\n\n\
             [[partitions]]\nstart = 1950\nend = 1999\n\n[[partitions]]\nstart = 2000\nend = 2030"
        )?;

        let config = MedsConfig::load(Some(file.path()))?;
        assert_eq!(config.save_dir, PathBuf::from("/data/meds"));
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.compression, "zstd");
        assert_eq!(config.dataset_name, "MEDS_2021");
        assert_eq!(
            config.partitions,
            vec![
                PartitionKey { start: 1950, end: 1999 },
                PartitionKey { start: 2000, end: 2030 }
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = MedsConfig::load(Some(Path::new("/nonexistent/meds.toml")));
        assert!(matches!(result, Err(ProcessingError::Settings(_))));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = MedsConfig {
            chunk_size: 0,
            ..MedsConfig::default()
        };
        assert!(matches!(config.check(), Err(ProcessingError::Validation(_))));
    }

    #[test]
    fn test_overlapping_partitions_rejected() {
        let config = MedsConfig {
            partitions: vec![
                PartitionKey { start: 1916, end: 2005 },
                PartitionKey { start: 2001, end: 2010 },
            ],
            ..MedsConfig::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_reversed_partition_rejected_at_load() -> Result<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "[[partitions]]\nstart = 2010\nend = 2001\n\n[[partitions]]\nstart = 1916\nend = 2000"
        )?;

        let result = MedsConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ProcessingError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let config = MedsConfig {
            compression: "brotli".to_string(),
            ..MedsConfig::default()
        };
        assert!(matches!(config.check(), Err(ProcessingError::Config(_))));
    }
}

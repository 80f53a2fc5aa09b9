use crate::error::{ProcessingError, Result};
use crate::models::{
    AppendSummary, DatasetAttributes, PartitionDataset, PartitionKey, PartitionState,
    ProfileGroup,
};
use crate::processors::IntegrityChecker;
use crate::utils::constants::*;
use crate::utils::filename::{parse_partition_filename, partition_filename, partition_state};
use crate::writers::schema::{append_batch, dataset_schema, dataset_to_batch};
use chrono::Local;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// What a flush did to one partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created { profiles: usize, observations: usize },
    Appended(AppendSummary),
    Unchanged,
}

impl WriteOutcome {
    pub fn written_profiles(&self) -> usize {
        match self {
            WriteOutcome::Created { profiles, .. } => *profiles,
            WriteOutcome::Appended(summary) => summary.appended_profiles,
            WriteOutcome::Unchanged => 0,
        }
    }
}

/// Creates and extends the per-partition datasets in a save directory.
pub struct DatasetWriter {
    save_dir: PathBuf,
    compression: Compression,
    row_group_size: usize,
    dataset_name: String,
    checker: IntegrityChecker,
}

impl DatasetWriter {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            checker: IntegrityChecker::new(),
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = name.into();
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.save_dir.join(partition_filename(key))
    }

    pub fn partition_state(&self, key: &PartitionKey) -> Result<PartitionState> {
        partition_state(&self.save_dir, key)
    }

    /// Write every drained partition, in key order.
    ///
    /// All partitions are staged before any is renamed into place, so a
    /// failure in one leaves every partition file as it was.
    pub fn flush_all(
        &self,
        pending: BTreeMap<PartitionKey, Vec<ProfileGroup>>,
        source_file: &str,
    ) -> Result<BTreeMap<PartitionKey, WriteOutcome>> {
        let mut outcomes = BTreeMap::new();
        let mut staged = Vec::with_capacity(pending.len());
        for (key, groups) in pending {
            match self.stage_partition(key, groups, source_file)? {
                Some(partition) => staged.push(partition),
                None => {
                    outcomes.insert(key, WriteOutcome::Unchanged);
                }
            }
        }

        for partition in staged {
            let (key, outcome) = partition.commit()?;
            outcomes.insert(key, outcome);
        }
        Ok(outcomes)
    }

    /// Create or extend one partition file with the pending groups.
    ///
    /// Nothing on disk changes unless the assembled dataset passes the
    /// consistency check.
    pub fn flush_partition(
        &self,
        key: PartitionKey,
        groups: Vec<ProfileGroup>,
        source_file: &str,
    ) -> Result<WriteOutcome> {
        match self.stage_partition(key, groups, source_file)? {
            Some(partition) => Ok(partition.commit()?.1),
            None => Ok(WriteOutcome::Unchanged),
        }
    }

    /// Assemble, verify and write one partition to a temporary file.
    /// `None` when the partition file would not change.
    fn stage_partition(
        &self,
        key: PartitionKey,
        groups: Vec<ProfileGroup>,
        source_file: &str,
    ) -> Result<Option<StagedPartition>> {
        if groups.is_empty() {
            debug!(partition = %key, "nothing pending, partition untouched");
            return Ok(None);
        }

        let (dataset, path, outcome) = match self.partition_state(&key)? {
            PartitionState::Absent => {
                let attributes =
                    DatasetAttributes::created(&self.dataset_name, source_file, Local::now());
                let dataset = PartitionDataset::from_groups(key, groups, attributes);
                let report = self.checker.verify(&dataset)?;
                let outcome = WriteOutcome::Created {
                    profiles: report.profiles,
                    observations: report.observations,
                };
                (dataset, self.partition_path(&key), outcome)
            }
            PartitionState::Existing(path) => {
                let mut dataset = self.read_dataset(&path)?;
                self.checker.verify(&dataset)?;

                let summary = dataset.append_groups(groups, source_file, Local::now())?;
                if summary.appended_profiles == 0 {
                    info!(
                        partition = %key,
                        skipped = summary.skipped_duplicates,
                        "No new profiles for {}",
                        path.display()
                    );
                    return Ok(None);
                }

                self.checker.verify(&dataset)?;
                (dataset, path, WriteOutcome::Appended(summary))
            }
        };

        let file = self.stage_dataset(&dataset, &path)?;
        debug!(partition = %key, "Staged {}", path.display());
        Ok(Some(StagedPartition {
            key,
            path,
            file,
            outcome,
            profiles: dataset.profiles.len(),
            observations: dataset.observations.len(),
        }))
    }

    fn writer_properties(&self, dataset: &PartitionDataset) -> Result<WriterProperties> {
        let attributes = &dataset.attributes;
        let source_files = serde_json::to_string(&attributes.source_files)
            .map_err(|e| ProcessingError::InvalidFormat(e.to_string()))?;

        let mut metadata = vec![
            key_value(ATTR_DATASET_NAME, &attributes.dataset_name),
            key_value(ATTR_CREATION_DATE, &attributes.creation_date),
            key_value(ATTR_SOURCE_FILES, &source_files),
            key_value(ATTR_PARTITION, &dataset.key.to_string()),
        ];
        if let Some(update_date) = &attributes.update_date {
            metadata.push(key_value(ATTR_UPDATE_DATE, update_date));
        }

        Ok(WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .set_key_value_metadata(Some(metadata))
            .build())
    }

    /// Write a full dataset to `path` through a temporary sibling file that
    /// is synced and then renamed over the target.
    pub fn write_dataset(&self, dataset: &PartitionDataset, path: &Path) -> Result<()> {
        let tmp = self.stage_dataset(dataset, path)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Write a full dataset into a synced temporary file next to `path`.
    /// The file is removed again if it is dropped without being persisted.
    fn stage_dataset(&self, dataset: &PartitionDataset, path: &Path) -> Result<NamedTempFile> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let schema = dataset_schema();
        let batch = dataset_to_batch(dataset, schema.clone())?;
        let props = self.writer_properties(dataset)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    /// Load a persisted partition back into memory.
    pub fn read_dataset(&self, path: &Path) -> Result<PartitionDataset> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let metadata: BTreeMap<String, String> = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(|kv| {
                kv.iter()
                    .filter_map(|entry| Some((entry.key.clone(), entry.value.clone()?)))
                    .collect()
            })
            .unwrap_or_default();

        let key = path
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(parse_partition_filename)
            .or_else(|| metadata.get(ATTR_PARTITION).and_then(|p| p.parse().ok()))
            .ok_or_else(|| {
                ProcessingError::InvalidFormat(format!(
                    "Cannot determine the partition of {}",
                    path.display()
                ))
            })?;

        let attributes = attributes_from_metadata(&metadata, path)?;
        let mut dataset = PartitionDataset::empty(key, attributes);

        for batch in builder.build()? {
            append_batch(&mut dataset, &batch?)?;
        }

        debug!(
            partition = %key,
            profiles = dataset.profiles.len(),
            observations = dataset.observations.len(),
            "Loaded {}",
            path.display()
        );
        Ok(dataset)
    }

    /// File-level statistics without decoding the data.
    pub fn get_file_info(&self, path: &Path) -> Result<DatasetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let file_metadata = metadata.file_metadata();
        let row_groups = metadata.num_row_groups();
        let total_profiles = file_metadata.num_rows();
        let file_size = std::fs::metadata(path)?.len();
        let compression = (0..row_groups)
            .flat_map(|i| metadata.row_group(i).columns().first().map(|c| c.compression()))
            .next()
            .unwrap_or(self.compression);

        Ok(DatasetFileInfo {
            total_profiles,
            row_groups,
            file_size,
            compression,
        })
    }
}

/// A partition written to a temporary file, waiting to replace its target.
struct StagedPartition {
    key: PartitionKey,
    path: PathBuf,
    file: NamedTempFile,
    outcome: WriteOutcome,
    profiles: usize,
    observations: usize,
}

impl StagedPartition {
    fn commit(self) -> Result<(PartitionKey, WriteOutcome)> {
        self.file.persist(&self.path).map_err(|e| e.error)?;

        match self.outcome {
            WriteOutcome::Appended(summary) => info!(
                partition = %self.key,
                appended = summary.appended_profiles,
                skipped = summary.skipped_duplicates,
                profiles = self.profiles,
                observations = self.observations,
                "Updated {}",
                self.path.display()
            ),
            _ => info!(
                partition = %self.key,
                profiles = self.profiles,
                observations = self.observations,
                "Created {}",
                self.path.display()
            ),
        }
        Ok((self.key, self.outcome))
    }
}

fn key_value(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(value.to_string()),
    }
}

fn attributes_from_metadata(
    metadata: &BTreeMap<String, String>,
    path: &Path,
) -> Result<DatasetAttributes> {
    let required = |key: &str| {
        metadata.get(key).cloned().ok_or_else(|| {
            ProcessingError::InvalidFormat(format!(
                "{} has no '{}' attribute",
                path.display(),
                key
            ))
        })
    };

    let source_files = match metadata.get(ATTR_SOURCE_FILES) {
        Some(json) => serde_json::from_str(json).map_err(|e| {
            ProcessingError::InvalidFormat(format!(
                "{} has malformed '{}': {}",
                path.display(),
                ATTR_SOURCE_FILES,
                e
            ))
        })?,
        None => Vec::new(),
    };

    Ok(DatasetAttributes {
        dataset_name: required(ATTR_DATASET_NAME)?,
        creation_date: required(ATTR_CREATION_DATE)?,
        update_date: metadata.get(ATTR_UPDATE_DATE).cloned(),
        source_files,
    })
}

#[derive(Debug)]
pub struct DatasetFileInfo {
    pub total_profiles: i64,
    pub row_groups: usize,
    pub file_size: u64,
    pub compression: Compression,
}

impl DatasetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Profiles: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}",
            self.total_profiles,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DepthPressureCode, MedsRow, ProfileKey};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn group(station: &str, year: i32, depths: &[f64]) -> ProfileGroup {
        let rows: Vec<MedsRow> = depths
            .iter()
            .map(|d| MedsRow {
                row: 1,
                data_type: "CD".to_string(),
                cr_number: "18HU19001".to_string(),
                stn_number: station.to_string(),
                source_id: "1".to_string(),
                obs_year: year,
                obs_month: 7,
                obs_day: 4,
                obs_time: 600,
                q_date_time: Some(1),
                longitude: -58.25,
                latitude: 62.5,
                q_pos: Some(1),
                d_p_code: DepthPressureCode::Depth,
                depth_press: *d,
                dp_flag: Some(1),
                temp: Some(2.5),
                q_temp: Some(1),
                psal: None,
                q_psal: None,
            })
            .collect();
        ProfileGroup::from_rows(ProfileKey::from_row(&rows[0]), &rows).unwrap()
    }

    fn key() -> PartitionKey {
        PartitionKey::new(1916, 2000).unwrap()
    }

    #[test]
    fn test_create_then_read_back() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path()).with_dataset_name("TEST");

        let outcome = writer.flush_partition(
            key(),
            vec![group("1", 1990, &[0.0, 10.0]), group("2", 1991, &[5.0])],
            "a.csv",
        )?;
        assert_eq!(
            outcome,
            WriteOutcome::Created {
                profiles: 2,
                observations: 3
            }
        );

        let path = dir.path().join("MEDS_1916_2000_raw.parquet");
        let dataset = writer.read_dataset(&path)?;
        assert_eq!(dataset.key, key());
        assert_eq!(dataset.parent_index, vec![0, 0, 1]);
        assert_eq!(dataset.attributes.dataset_name, "TEST");
        assert_eq!(dataset.attributes.source_files, vec!["a.csv"]);
        assert_eq!(dataset.attributes.update_date, None);
        assert_eq!(dataset.profiles[0].shallowest_depth, Some(10.0));
        assert_eq!(dataset.observations[2].depth, Some(5.0));
        assert_eq!(dataset.observations[2].psal, None);

        Ok(())
    }

    #[test]
    fn test_append_offsets_parent_index() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path());

        writer.flush_partition(key(), vec![group("1", 1990, &[1.0, 2.0])], "a.csv")?;
        let outcome = writer.flush_partition(
            key(),
            vec![group("2", 1995, &[3.0]), group("3", 1999, &[4.0, 5.0])],
            "b.csv",
        )?;
        assert_eq!(outcome.written_profiles(), 2);

        let dataset = writer.read_dataset(&writer.partition_path(&key()))?;
        assert_eq!(dataset.profiles.len(), 3);
        assert_eq!(dataset.parent_index, vec![0, 0, 1, 2, 2]);
        assert_eq!(dataset.attributes.source_files, vec!["a.csv", "b.csv"]);
        assert!(dataset.attributes.update_date.is_some());

        Ok(())
    }

    #[test]
    fn test_empty_batch_leaves_file_untouched() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path());
        writer.flush_partition(key(), vec![group("1", 1990, &[1.0])], "a.csv")?;

        let path = writer.partition_path(&key());
        let before = std::fs::read(&path)?;
        let outcome = writer.flush_partition(key(), Vec::new(), "b.csv")?;

        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn test_rerun_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path());
        writer.flush_partition(key(), vec![group("1", 1990, &[1.0])], "a.csv")?;

        let path = writer.partition_path(&key());
        let before = std::fs::read(&path)?;
        let outcome = writer.flush_partition(key(), vec![group("1", 1990, &[1.0])], "a.csv")?;

        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn test_inconsistent_groups_never_reach_disk() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path());
        writer.flush_partition(key(), vec![group("1", 1990, &[1.0])], "a.csv")?;

        let path = writer.partition_path(&key());
        let before = std::fs::read(&path)?;

        let mut broken = group("2", 1991, &[1.0, 2.0]);
        broken.profile.row_sizes.temp = 5;
        let result = writer.flush_partition(key(), vec![broken], "b.csv");

        assert!(matches!(result, Err(ProcessingError::Consistency { .. })));
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn test_failed_partition_blocks_every_commit() -> Result<()> {
        let dir = TempDir::new()?;
        let writer = DatasetWriter::new(dir.path());
        let recent = PartitionKey::new(2001, 2010)?;
        std::fs::write(writer.partition_path(&recent), b"not a parquet file")?;

        let mut pending = BTreeMap::new();
        pending.insert(key(), vec![group("1", 1995, &[1.0])]);
        pending.insert(recent, vec![group("2", 2005, &[2.0])]);

        assert!(writer.flush_all(pending, "a.csv").is_err());
        assert!(!writer.partition_path(&key()).exists());

        let mut names: Vec<String> = std::fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        assert_eq!(names, vec!["MEDS_2001_2010_raw.parquet"]);
        Ok(())
    }

    #[test]
    fn test_different_compressions() -> Result<()> {
        for compression in ["snappy", "gzip", "lz4", "zstd", "none"] {
            let dir = TempDir::new()?;
            let writer = DatasetWriter::new(dir.path()).with_compression(compression)?;
            let result = writer.flush_partition(key(), vec![group("1", 1990, &[1.0])], "a.csv");
            assert!(result.is_ok(), "Failed with compression: {}", compression);

            let info = writer.get_file_info(&writer.partition_path(&key()))?;
            assert_eq!(info.total_profiles, 1);
        }

        assert!(DatasetWriter::new(".").with_compression("brotli-9").is_err());
        Ok(())
    }
}

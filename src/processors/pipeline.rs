use crate::config::MedsConfig;
use crate::error::Result;
use crate::models::{PartitionKey, PartitionScheme};
use crate::processors::{PartitionAccumulator, PartitionTally, ProfileGrouper};
use crate::readers::ChunkedReader;
use crate::utils::progress::ProgressReporter;
use crate::writers::{DatasetWriter, WriteOutcome};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Counts for one input file.
#[derive(Debug, Clone, Default)]
pub struct FileSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub chunks: usize,
    pub profiles: usize,
    pub outcomes: BTreeMap<PartitionKey, WriteOutcome>,
}

/// Counts for a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
    pub routed: BTreeMap<PartitionKey, PartitionTally>,
}

impl RunSummary {
    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    pub fn written_profiles(&self) -> usize {
        self.files
            .iter()
            .flat_map(|f| f.outcomes.values())
            .map(WriteOutcome::written_profiles)
            .sum()
    }

    pub fn skipped_profiles(&self) -> usize {
        self.files
            .iter()
            .flat_map(|f| f.outcomes.values())
            .map(|outcome| match outcome {
                WriteOutcome::Appended(summary) => summary.skipped_duplicates,
                _ => 0,
            })
            .sum()
    }

    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Ingestion Summary ===\n");
        report.push_str(&format!("Files: {}\n", self.files.len()));
        report.push_str(&format!("Rows read: {}\n", self.total_rows()));
        report.push_str(&format!("Profiles written: {}\n", self.written_profiles()));
        let skipped = self.skipped_profiles();
        if skipped > 0 {
            report.push_str(&format!("Profiles already stored: {}\n", skipped));
        }

        if !self.routed.is_empty() {
            report.push_str("\nPartitions:\n");
            for (key, tally) in &self.routed {
                report.push_str(&format!(
                    "  {}: {} profiles, {} observations\n",
                    key, tally.profiles, tally.observations
                ));
            }
        }

        report
    }
}

/// Drives reader, grouper, accumulator and writer over a list of input files.
///
/// Files are processed strictly one after another; each file's profiles are
/// written before the next file is opened.
pub struct MedsPipeline {
    reader: ChunkedReader,
    grouper: ProfileGrouper,
    writer: DatasetWriter,
    scheme: PartitionScheme,
}

impl MedsPipeline {
    pub fn new(reader: ChunkedReader, writer: DatasetWriter, scheme: PartitionScheme) -> Self {
        Self {
            reader,
            grouper: ProfileGrouper::new(),
            writer,
            scheme,
        }
    }

    pub fn from_config(config: &MedsConfig) -> Result<Self> {
        config.check()?;

        let reader = ChunkedReader::new(config.chunk_size).with_workers(config.max_workers)?;
        let writer = DatasetWriter::new(&config.save_dir)
            .with_compression(&config.compression)?
            .with_row_group_size(config.row_group_size)
            .with_dataset_name(&config.dataset_name);

        Ok(Self::new(reader, writer, config.partition_scheme()?))
    }

    pub fn writer(&self) -> &DatasetWriter {
        &self.writer
    }

    /// Ingest every input file in order. The first error stops the run;
    /// partitions committed for earlier files stay on disk.
    pub fn run(&self, inputs: &[PathBuf], progress: Option<&ProgressReporter>) -> Result<RunSummary> {
        std::fs::create_dir_all(self.writer.save_dir())?;

        let mut accumulator = PartitionAccumulator::new(self.scheme.clone());
        let mut summary = RunSummary::default();

        for path in inputs {
            let file = self.process_file(path, &mut accumulator, progress)?;
            summary.files.push(file);
        }

        summary.routed = accumulator.routed().clone();
        Ok(summary)
    }

    /// Stream one file through the accumulator, then flush its partitions.
    pub fn process_file(
        &self,
        path: &Path,
        accumulator: &mut PartitionAccumulator,
        progress: Option<&ProgressReporter>,
    ) -> Result<FileSummary> {
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!("Processing {}", path.display());
        if let Some(p) = progress {
            p.set_message(&format!("Reading {}", source_file));
        }

        let mut file = FileSummary {
            path: path.to_path_buf(),
            ..FileSummary::default()
        };

        for chunk in self.reader.open(path)? {
            let chunk = chunk?;
            let rows = chunk.len();
            let groups = self.grouper.group_rows(chunk.rows)?;

            debug!(
                file = %source_file,
                first_row = chunk.first_row,
                rows,
                groups = groups.len(),
                "chunk grouped"
            );

            accumulator.add_groups(groups)?;
            file.rows += rows;
            file.chunks += 1;

            if let Some(p) = progress {
                p.increment(rows as u64);
            }
        }

        file.profiles = accumulator.pending_profiles();
        info!(
            file = %source_file,
            rows = file.rows,
            chunks = file.chunks,
            profiles = file.profiles,
            observations = accumulator.pending_observations(),
            "file read"
        );

        if let Some(p) = progress {
            p.set_message(&format!("Writing partitions for {}", source_file));
        }
        file.outcomes = self.writer.flush_all(accumulator.drain(), &source_file)?;

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "DATA_TYPE,CR_NUMBER,STN_NUMBER,SOURCE_ID,OBS_YEAR,OBS_MONTH,OBS_DAY,OBS_TIME,Q_DATE_TIME,LONGITUDE (+E),LATITUDE (+N),Q_POS,D_P_CODE,DEPTH_PRESS,DP_FLAG,TEMP,Q_TEMP,PSAL,Q_PSAL";

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.push('\n');
        std::fs::write(&path, body).unwrap();
        path
    }

    fn pipeline(save_dir: &Path, chunk_size: usize) -> MedsPipeline {
        let config = MedsConfig {
            save_dir: save_dir.to_path_buf(),
            chunk_size,
            max_workers: 2,
            ..MedsConfig::default()
        };
        MedsPipeline::from_config(&config).unwrap()
    }

    #[test]
    fn test_profile_split_across_chunks_is_stored_once() -> Result<()> {
        let dir = TempDir::new()?;
        let input = write_csv(
            dir.path(),
            "split.csv",
            &[
                "CD,C1,1,1,1995,5,2,1200,1,-60.0,70.0,1,D,0,1,1.0,1,30.0,1",
                "CD,C1,1,1,1995,5,2,1200,1,-60.0,70.0,1,D,10,1,0.5,1,30.5,1",
                "CD,C1,1,1,1995,5,2,1200,1,-60.0,70.0,1,D,20,1,0.1,1,31.0,1",
            ],
        );
        let out = dir.path().join("out");
        let pipeline = pipeline(&out, 2);

        let summary = pipeline.run(&[input], None)?;
        assert_eq!(summary.files[0].chunks, 2);
        assert_eq!(summary.files[0].profiles, 1);

        let key = PartitionKey::new(1916, 2000)?;
        let dataset = pipeline.writer().read_dataset(&pipeline.writer().partition_path(&key))?;
        assert_eq!(dataset.profiles.len(), 1);
        assert_eq!(dataset.profiles[0].row_sizes.depth, 3);
        assert_eq!(dataset.profiles[0].shallowest_depth, Some(10.0));
        assert_eq!(dataset.parent_index, vec![0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_unroutable_year_aborts_before_writing() -> Result<()> {
        let dir = TempDir::new()?;
        let input = write_csv(
            dir.path(),
            "old.csv",
            &["CD,C1,1,1,1905,5,2,1200,1,-60.0,70.0,1,D,5,1,1.0,1,30.0,1"],
        );
        let out = dir.path().join("out");

        let result = pipeline(&out, 10).run(&[input], None);
        assert!(result.is_err());
        assert!(crate::utils::discover_partitions(&out)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_report_lists_partitions() -> Result<()> {
        let dir = TempDir::new()?;
        let input = write_csv(
            dir.path(),
            "two.csv",
            &[
                "CD,C1,1,1,2000,5,2,1200,1,-60.0,70.0,1,D,5,1,1.0,1,30.0,1",
                "CD,C1,2,1,2001,5,2,1200,1,-60.0,70.0,1,P,5,1,1.0,1,30.0,1",
            ],
        );
        let summary = pipeline(&dir.path().join("out"), 10).run(&[input], None)?;
        let report = summary.report();

        assert!(report.contains("Profiles written: 2"));
        assert!(report.contains("1916_2000: 1 profiles, 1 observations"));
        assert!(report.contains("2001_2010: 1 profiles, 1 observations"));
        Ok(())
    }
}

use crate::error::Result;
use crate::models::{PartitionKey, PartitionState};
use crate::utils::constants::{DATASET_EXTENSION, DATASET_PREFIX, DATASET_SUFFIX};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name for a partition dataset: `MEDS_<start>_<end>_raw.parquet`
pub fn partition_filename(key: &PartitionKey) -> String {
    format!(
        "{}{}{}.{}",
        DATASET_PREFIX, key, DATASET_SUFFIX, DATASET_EXTENSION
    )
}

/// Recover the partition key from a dataset file name, `None` for anything else.
pub fn parse_partition_filename(file_name: &str) -> Option<PartitionKey> {
    file_name
        .strip_suffix(DATASET_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .and_then(|s| s.strip_prefix(DATASET_PREFIX))
        .and_then(|s| s.strip_suffix(DATASET_SUFFIX))
        .and_then(|s| s.parse().ok())
}

/// Scan a save directory for partition datasets. A missing directory holds none.
pub fn discover_partitions(save_dir: &Path) -> Result<BTreeMap<PartitionKey, PathBuf>> {
    let mut found = BTreeMap::new();
    if !save_dir.is_dir() {
        return Ok(found);
    }

    for entry in std::fs::read_dir(save_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(key) = path
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(parse_partition_filename)
        {
            found.insert(key, path);
        }
    }

    Ok(found)
}

/// Resolve whether a partition already exists in the save directory.
pub fn partition_state(save_dir: &Path, key: &PartitionKey) -> Result<PartitionState> {
    Ok(match discover_partitions(save_dir)?.remove(key) {
        Some(path) => PartitionState::Existing(path),
        None => PartitionState::Absent,
    })
}

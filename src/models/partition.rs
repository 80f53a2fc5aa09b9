use crate::error::{ProcessingError, Result};
use crate::utils::constants::DEFAULT_PARTITIONS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Closed year interval identifying one persisted dataset, rendered as `<start>_<end>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub start: i32,
    pub end: i32,
}

impl PartitionKey {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(ProcessingError::Config(format!(
                "Partition start {} is after its end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    fn overlaps(&self, other: &PartitionKey) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:04}", self.start, self.end)
    }
}

impl FromStr for PartitionKey {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s.split_once('_').ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("Partition key '{}' is not <start>_<end>", s))
        })?;

        let parse_year = |part: &str| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(ProcessingError::InvalidFormat(format!(
                    "Invalid year '{}' in partition key '{}'",
                    part, s
                )));
            }
            part.parse::<i32>().map_err(|_| {
                ProcessingError::InvalidFormat(format!(
                    "Invalid year '{}' in partition key '{}'",
                    part, s
                ))
            })
        };

        PartitionKey::new(parse_year(start)?, parse_year(end)?)
    }
}

/// Whether a partition already has a file on disk, resolved once before any array is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionState {
    Absent,
    Existing(PathBuf),
}

/// Validated, sorted set of non-overlapping partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionScheme {
    partitions: Vec<PartitionKey>,
}

impl PartitionScheme {
    pub fn new(mut partitions: Vec<PartitionKey>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(ProcessingError::Config(
                "At least one year partition must be configured".to_string(),
            ));
        }

        // deserialized keys bypass `PartitionKey::new`
        for key in &partitions {
            PartitionKey::new(key.start, key.end)?;
        }

        partitions.sort();
        for pair in partitions.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(ProcessingError::Config(format!(
                    "Partitions {} and {} overlap",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self { partitions })
    }

    pub fn partitions(&self) -> &[PartitionKey] {
        &self.partitions
    }

    /// Map an observation year to the partition whose closed interval holds it.
    pub fn route(&self, year: i32) -> Result<PartitionKey> {
        self.partitions
            .iter()
            .find(|p| p.contains(year))
            .copied()
            .ok_or(ProcessingError::PartitionRouting { year })
    }
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS
                .iter()
                .map(|&(start, end)| PartitionKey { start, end })
                .collect(),
        }
    }
}

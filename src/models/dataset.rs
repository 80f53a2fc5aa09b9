use crate::error::{ProcessingError, Result};
use crate::models::{Observation, PartitionKey, Profile, ProfileGroup, ProfileKey};
use crate::utils::constants::ATTRIBUTE_DATE_FORMAT;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Global attributes stored alongside a partition dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    pub dataset_name: String,
    pub creation_date: String,
    pub update_date: Option<String>,
    pub source_files: Vec<String>,
}

impl DatasetAttributes {
    pub fn created(dataset_name: &str, source_file: &str, now: DateTime<Local>) -> Self {
        Self {
            dataset_name: dataset_name.to_string(),
            creation_date: now.format(ATTRIBUTE_DATE_FORMAT).to_string(),
            update_date: None,
            source_files: vec![source_file.to_string()],
        }
    }

    fn record_update(&mut self, source_file: &str, now: DateTime<Local>) {
        self.update_date = Some(now.format(ATTRIBUTE_DATE_FORMAT).to_string());
        if !self.source_files.iter().any(|f| f == source_file) {
            self.source_files.push(source_file.to_string());
        }
    }
}

/// Outcome of appending a batch of groups to a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendSummary {
    pub appended_profiles: usize,
    pub appended_observations: usize,
    pub skipped_duplicates: usize,
}

/// Struct-of-records view of one persisted partition.
///
/// Profile `i` owns the next `profiles[i].row_sizes.block_len()` entries of
/// `observations`, and every one of those entries carries `parent_index == i`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDataset {
    pub key: PartitionKey,
    pub attributes: DatasetAttributes,
    pub profiles: Vec<Profile>,
    pub observations: Vec<Observation>,
    pub parent_index: Vec<i64>,
}

impl PartitionDataset {
    pub fn empty(key: PartitionKey, attributes: DatasetAttributes) -> Self {
        Self {
            key,
            attributes,
            profiles: Vec::new(),
            observations: Vec::new(),
            parent_index: Vec::new(),
        }
    }

    /// Build a fresh dataset from accumulated groups.
    pub fn from_groups(
        key: PartitionKey,
        groups: Vec<ProfileGroup>,
        attributes: DatasetAttributes,
    ) -> Self {
        let mut dataset = Self::empty(key, attributes);
        dataset.push_groups(groups, 0);
        dataset
    }

    /// Ordinal the next appended profile receives.
    pub fn next_parent_index(&self) -> i64 {
        self.parent_index.iter().max().map_or(0, |max| max + 1)
    }

    pub fn identity_keys(&self) -> Result<HashSet<ProfileKey>> {
        self.profiles.iter().map(Profile::identity_key).collect()
    }

    /// Concatenate new groups after the existing profiles and observations.
    ///
    /// Groups whose identity already exists in the dataset are skipped so that
    /// re-processing an input file leaves the partition unchanged. A stored
    /// identity arriving with different observations is a consistency error.
    pub fn append_groups(
        &mut self,
        groups: Vec<ProfileGroup>,
        source_file: &str,
        now: DateTime<Local>,
    ) -> Result<AppendSummary> {
        let offset = self.next_parent_index();
        if offset != self.profiles.len() as i64 {
            return Err(ProcessingError::consistency(
                self.key,
                format!(
                    "next parent index {} disagrees with {} stored profiles",
                    offset,
                    self.profiles.len()
                ),
            ));
        }

        let mut fresh = Vec::with_capacity(groups.len());
        let mut duplicates = 0;
        {
            let stored: HashMap<ProfileKey, &[Observation]> = self
                .blocks()
                .map(|(profile, block)| Ok((profile.identity_key()?, block)))
                .collect::<Result<_>>()?;

            for group in groups {
                match stored.get(&group.key) {
                    None => fresh.push(group),
                    Some(block) if *block == group.observations.as_slice() => {
                        tracing::warn!(
                            partition = %self.key,
                            profile = %group.key,
                            "profile already stored, skipping"
                        );
                        duplicates += 1;
                    }
                    Some(block) => {
                        return Err(ProcessingError::consistency(
                            self.key,
                            format!(
                                "profile {} is already stored with {} observations, {} differing ones arrived from {}",
                                group.key,
                                block.len(),
                                group.observations.len(),
                                source_file
                            ),
                        ));
                    }
                }
            }
        }

        let mut summary = AppendSummary {
            skipped_duplicates: duplicates,
            ..AppendSummary::default()
        };
        if fresh.is_empty() {
            return Ok(summary);
        }

        summary.appended_profiles = fresh.len();
        summary.appended_observations = fresh.iter().map(|g| g.observations.len()).sum();

        self.push_groups(fresh, offset);
        self.attributes.record_update(source_file, now);
        Ok(summary)
    }

    fn push_groups(&mut self, groups: Vec<ProfileGroup>, first_ordinal: i64) {
        for (ordinal, group) in (first_ordinal..).zip(groups) {
            self.parent_index
                .extend(std::iter::repeat(ordinal).take(group.observations.len()));
            self.observations.extend(group.observations);
            self.profiles.push(group.profile);
        }
    }

    /// Observation block owned by each profile, in profile order.
    pub fn blocks(&self) -> impl Iterator<Item = (&Profile, &[Observation])> {
        let mut start = 0;
        self.profiles.iter().map(move |profile| {
            let end = (start + profile.row_sizes.block_len()).min(self.observations.len());
            let block = &self.observations[start.min(end)..end];
            start = end;
            (profile, block)
        })
    }

    /// Timestamp range covered by the profiles.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let min = self.profiles.iter().map(|p| p.timestamp).min()?;
        let max = self.profiles.iter().map(|p| p.timestamp).max()?;
        Some((min, max))
    }
}

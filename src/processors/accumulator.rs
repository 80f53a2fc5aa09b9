use crate::error::Result;
use crate::models::{PartitionKey, PartitionScheme, ProfileGroup, ProfileKey};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct PendingPartition {
    groups: Vec<ProfileGroup>,
    positions: HashMap<ProfileKey, usize>,
    observations: usize,
}

/// Per-partition totals routed during the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionTally {
    pub profiles: usize,
    pub observations: usize,
}

/// Run-scoped collection of profiles awaiting a write, keyed by partition.
///
/// Everything routed between two drains stays in memory, so a single input
/// file's share of one partition must fit in RAM.
pub struct PartitionAccumulator {
    scheme: PartitionScheme,
    pending: BTreeMap<PartitionKey, PendingPartition>,
    routed: BTreeMap<PartitionKey, PartitionTally>,
}

impl PartitionAccumulator {
    pub fn new(scheme: PartitionScheme) -> Self {
        Self {
            scheme,
            pending: BTreeMap::new(),
            routed: BTreeMap::new(),
        }
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    /// Route each group by its observation year and queue it.
    ///
    /// A group whose identity is already pending (a cast split across chunks)
    /// is folded into the first occurrence.
    pub fn add_groups(&mut self, groups: Vec<ProfileGroup>) -> Result<()> {
        for group in groups {
            let partition = self.scheme.route(group.year())?;
            let pending = self.pending.entry(partition).or_default();
            let tally = self.routed.entry(partition).or_default();

            pending.observations += group.observations.len();
            tally.observations += group.observations.len();

            match pending.positions.get(&group.key) {
                Some(&position) => pending.groups[position].absorb(group)?,
                None => {
                    pending.positions.insert(group.key.clone(), pending.groups.len());
                    pending.groups.push(group);
                    tally.profiles += 1;
                }
            }
        }
        Ok(())
    }

    pub fn pending_profiles(&self) -> usize {
        self.pending.values().map(|p| p.groups.len()).sum()
    }

    pub fn pending_observations(&self) -> usize {
        self.pending.values().map(|p| p.observations).sum()
    }

    /// Hand every queued group to the writer, leaving the accumulator empty.
    pub fn drain(&mut self) -> BTreeMap<PartitionKey, Vec<ProfileGroup>> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, pending)| (key, pending.groups))
            .collect()
    }

    /// Totals routed to each partition since the run started.
    pub fn routed(&self) -> &BTreeMap<PartitionKey, PartitionTally> {
        &self.routed
    }
}

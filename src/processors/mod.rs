pub mod accumulator;
pub mod integrity_checker;
pub mod pipeline;
pub mod profile_grouper;

pub use accumulator::{PartitionAccumulator, PartitionTally};
pub use integrity_checker::{ConsistencyReport, IntegrityChecker};
pub use pipeline::{FileSummary, MedsPipeline, RunSummary};
pub use profile_grouper::ProfileGrouper;

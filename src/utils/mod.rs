pub mod constants;
pub mod filename;
pub mod progress;

pub use constants::*;
pub use filename::{discover_partitions, parse_partition_filename, partition_filename, partition_state};
pub use progress::ProgressReporter;

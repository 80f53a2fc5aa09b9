pub mod dataset;
pub mod observation;
pub mod partition;
pub mod profile;
pub mod row;

pub use dataset::{AppendSummary, DatasetAttributes, PartitionDataset};
pub use observation::{is_accepted_flag, Observation};
pub use partition::{PartitionKey, PartitionScheme, PartitionState};
pub use profile::{observation_time, vertical_extent, Profile, ProfileGroup, ProfileKey, RowSizes};
pub use row::{DepthPressureCode, MedsRow};

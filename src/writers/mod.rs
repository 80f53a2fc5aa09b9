pub mod dataset_writer;
pub mod schema;

pub use dataset_writer::{DatasetFileInfo, DatasetWriter, WriteOutcome};
pub use schema::{dataset_schema, OBSERVATION_VARIABLES, PROFILE_VARIABLES};

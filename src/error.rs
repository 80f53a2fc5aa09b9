use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Required column '{column}' missing from {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("Profile {profile} mixes depth/pressure codes {codes:?}")]
    MixedIndicatorCode { profile: String, codes: Vec<char> },

    #[error("Invalid D_P_CODE '{code}' at row {row}")]
    InvalidIndicatorCode { code: String, row: usize },

    #[error("Invalid observation time for profile {profile}: {message}")]
    TimeParse { profile: String, message: String },

    #[error("Year {year} does not fall in any configured partition")]
    PartitionRouting { year: i32 },

    #[error("Consistency violation in partition {partition}: {message}")]
    Consistency { partition: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    /// Errors caused by the shape of the input table rather than its values.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ProcessingError::MissingColumn { .. }
                | ProcessingError::MixedIndicatorCode { .. }
                | ProcessingError::InvalidIndicatorCode { .. }
        )
    }

    pub(crate) fn consistency(partition: impl ToString, message: impl Into<String>) -> Self {
        ProcessingError::Consistency {
            partition: partition.to_string(),
            message: message.into(),
        }
    }
}

/// Source table column names
pub const COL_DATA_TYPE: &str = "DATA_TYPE";
pub const COL_CR_NUMBER: &str = "CR_NUMBER";
pub const COL_STN_NUMBER: &str = "STN_NUMBER";
pub const COL_SOURCE_ID: &str = "SOURCE_ID";
pub const COL_OBS_YEAR: &str = "OBS_YEAR";
pub const COL_OBS_MONTH: &str = "OBS_MONTH";
pub const COL_OBS_DAY: &str = "OBS_DAY";
pub const COL_OBS_TIME: &str = "OBS_TIME";
pub const COL_Q_DATE_TIME: &str = "Q_DATE_TIME";
pub const COL_LONGITUDE: &str = "LONGITUDE (+E)";
pub const COL_LATITUDE: &str = "LATITUDE (+N)";
pub const COL_Q_POS: &str = "Q_POS";
pub const COL_D_P_CODE: &str = "D_P_CODE";
pub const COL_DEPTH_PRESS: &str = "DEPTH_PRESS";
pub const COL_DP_FLAG: &str = "DP_FLAG";
pub const COL_TEMP: &str = "TEMP";
pub const COL_Q_TEMP: &str = "Q_TEMP";
pub const COL_PSAL: &str = "PSAL";
pub const COL_Q_PSAL: &str = "Q_PSAL";

/// Output file naming
pub const DATASET_PREFIX: &str = "MEDS_";
pub const DATASET_SUFFIX: &str = "_raw";
pub const DATASET_EXTENSION: &str = "parquet";
pub const PLOTS_DIR: &str = "plots";
pub const PLOT_EXTENSION: &str = "svg";

/// Date formats
pub const DATESTR_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
pub const ATTRIBUTE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Processing defaults
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;
pub const DEFAULT_DATASET_NAME: &str = "MEDS_2021";
pub const DEFAULT_COMPRESSION: &str = "snappy";
pub const DEFAULT_PARTITIONS: [(i32, i32); 3] = [(1916, 2000), (2001, 2010), (2011, 2021)];

/// Quality flags retained by the clean plots
pub const ACCEPTED_FLAGS: [u8; 3] = [1, 5, 8];

/// Parquet key-value metadata keys
pub const ATTR_DATASET_NAME: &str = "dataset_name";
pub const ATTR_CREATION_DATE: &str = "creation_date";
pub const ATTR_UPDATE_DATE: &str = "update_date";
pub const ATTR_SOURCE_FILES: &str = "source_files";
pub const ATTR_PARTITION: &str = "partition";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

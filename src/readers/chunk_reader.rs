use crate::error::{ProcessingError, Result};
use crate::models::{DepthPressureCode, MedsRow};
use crate::utils::constants::*;
use csv::{ByteRecord, ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A bounded slice of the source table, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChunk {
    /// Data line number of `rows[0]`, 1-based, header excluded
    pub first_row: usize,
    pub rows: Vec<MedsRow>,
}

impl RecordChunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Streams a MEDS export in chunks of at most `chunk_size` rows.
pub struct ChunkedReader {
    chunk_size: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl ChunkedReader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pool: None,
        }
    }

    /// Parse the rows of each chunk on a dedicated pool of `workers` threads.
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;
        self.pool = Some(Arc::new(pool));
        Ok(self)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Open `path` and check its header. Rows are read lazily by the returned iterator.
    pub fn open(&self, path: &Path) -> Result<ChunkIterator> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(file);

        let columns = ColumnIndex::from_headers(reader.byte_headers()?, &path.display().to_string())?;

        Ok(ChunkIterator {
            reader,
            columns,
            chunk_size: self.chunk_size,
            pool: self.pool.clone(),
            next_row: 1,
            finished: false,
        })
    }
}

/// Lazy, finite, single-pass sequence of chunks over one file.
pub struct ChunkIterator {
    reader: csv::Reader<File>,
    columns: ColumnIndex,
    chunk_size: usize,
    pool: Option<Arc<ThreadPool>>,
    next_row: usize,
    finished: bool,
}

impl ChunkIterator {
    fn read_raw(&mut self) -> Result<Vec<ByteRecord>> {
        let mut records = Vec::with_capacity(self.chunk_size.min(64 * 1024));
        let mut record = ByteRecord::new();

        while records.len() < self.chunk_size {
            if !self.reader.read_byte_record(&mut record)? {
                self.finished = true;
                break;
            }
            records.push(record.clone());
        }

        Ok(records)
    }

    fn parse(&self, records: &[ByteRecord], first_row: usize) -> Result<Vec<MedsRow>> {
        let columns = &self.columns;
        let parse_all = || {
            records
                .par_iter()
                .enumerate()
                .map(|(i, record)| columns.parse_row(record, first_row + i))
                .collect::<Result<Vec<_>>>()
        };

        match &self.pool {
            Some(pool) => pool.install(parse_all),
            None => records
                .iter()
                .enumerate()
                .map(|(i, record)| columns.parse_row(record, first_row + i))
                .collect(),
        }
    }
}

impl Iterator for ChunkIterator {
    type Item = Result<RecordChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let records = match self.read_raw() {
            Ok(records) => records,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };
        if records.is_empty() {
            return None;
        }

        let first_row = self.next_row;
        self.next_row += records.len();

        match self.parse(&records, first_row) {
            Ok(rows) => Some(Ok(RecordChunk { first_row, rows })),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Positions of the required columns in the source header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    data_type: usize,
    cr_number: usize,
    stn_number: usize,
    source_id: usize,
    obs_year: usize,
    obs_month: usize,
    obs_day: usize,
    obs_time: usize,
    q_date_time: usize,
    longitude: usize,
    latitude: usize,
    q_pos: usize,
    d_p_code: usize,
    depth_press: usize,
    dp_flag: usize,
    temp: usize,
    q_temp: usize,
    psal: usize,
    q_psal: usize,
}

impl ColumnIndex {
    pub fn from_headers(headers: &ByteRecord, source_name: &str) -> Result<Self> {
        let names: Vec<Cow<'_, str>> = headers.iter().map(decode).collect();
        let find = |column: &str| {
            names
                .iter()
                .position(|name| name.trim() == column)
                .ok_or_else(|| ProcessingError::MissingColumn {
                    column: column.to_string(),
                    source_name: source_name.to_string(),
                })
        };

        Ok(Self {
            data_type: find(COL_DATA_TYPE)?,
            cr_number: find(COL_CR_NUMBER)?,
            stn_number: find(COL_STN_NUMBER)?,
            source_id: find(COL_SOURCE_ID)?,
            obs_year: find(COL_OBS_YEAR)?,
            obs_month: find(COL_OBS_MONTH)?,
            obs_day: find(COL_OBS_DAY)?,
            obs_time: find(COL_OBS_TIME)?,
            q_date_time: find(COL_Q_DATE_TIME)?,
            longitude: find(COL_LONGITUDE)?,
            latitude: find(COL_LATITUDE)?,
            q_pos: find(COL_Q_POS)?,
            d_p_code: find(COL_D_P_CODE)?,
            depth_press: find(COL_DEPTH_PRESS)?,
            dp_flag: find(COL_DP_FLAG)?,
            temp: find(COL_TEMP)?,
            q_temp: find(COL_Q_TEMP)?,
            psal: find(COL_PSAL)?,
            q_psal: find(COL_Q_PSAL)?,
        })
    }

    /// Convert one raw record into a typed row.
    pub fn parse_row(&self, record: &ByteRecord, row: usize) -> Result<MedsRow> {
        let fields = RowFields { record, row };

        Ok(MedsRow {
            row,
            data_type: fields.text(self.data_type),
            cr_number: fields.text(self.cr_number),
            stn_number: fields.text(self.stn_number),
            source_id: fields.text(self.source_id),
            obs_year: fields.integer(self.obs_year, COL_OBS_YEAR)?,
            obs_month: fields.integer(self.obs_month, COL_OBS_MONTH)?,
            obs_day: fields.integer(self.obs_day, COL_OBS_DAY)?,
            obs_time: fields.integer(self.obs_time, COL_OBS_TIME)?,
            q_date_time: fields.flag(self.q_date_time, COL_Q_DATE_TIME)?,
            longitude: fields.required_real(self.longitude, COL_LONGITUDE)?,
            latitude: fields.required_real(self.latitude, COL_LATITUDE)?,
            q_pos: fields.flag(self.q_pos, COL_Q_POS)?,
            d_p_code: DepthPressureCode::parse(&fields.text(self.d_p_code), row)?,
            depth_press: fields.required_real(self.depth_press, COL_DEPTH_PRESS)?,
            dp_flag: fields.flag(self.dp_flag, COL_DP_FLAG)?,
            temp: fields.real(self.temp, COL_TEMP)?,
            q_temp: fields.flag(self.q_temp, COL_Q_TEMP)?,
            psal: fields.real(self.psal, COL_PSAL)?,
            q_psal: fields.flag(self.q_psal, COL_Q_PSAL)?,
        })
    }
}

/// Older exports carry Latin-1 text; anything that is not UTF-8 is read as Windows-1252.
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

struct RowFields<'a> {
    record: &'a ByteRecord,
    row: usize,
}

impl RowFields<'_> {
    fn raw(&self, index: usize) -> Cow<'_, str> {
        self.record.get(index).map(decode).unwrap_or(Cow::Borrowed(""))
    }

    fn text(&self, index: usize) -> String {
        self.raw(index).trim().to_string()
    }

    fn invalid(&self, column: &str, value: &str) -> ProcessingError {
        ProcessingError::InvalidFormat(format!(
            "Invalid {} value '{}' at row {}",
            column, value, self.row
        ))
    }

    /// Integers may arrive as `930` or `930.0` when the exporter wrote floats.
    fn integer<T: TryFrom<i64>>(&self, index: usize, column: &str) -> Result<T> {
        let raw = self.raw(index);
        let value = raw.trim();
        let parsed = value.parse::<i64>().ok().or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        });

        parsed
            .and_then(|v| T::try_from(v).ok())
            .ok_or_else(|| self.invalid(column, value))
    }

    fn flag(&self, index: usize, column: &str) -> Result<Option<u8>> {
        if self.raw(index).trim().is_empty() {
            return Ok(None);
        }
        self.integer(index, column).map(Some)
    }

    fn real(&self, index: usize, column: &str) -> Result<Option<f64>> {
        let raw = self.raw(index);
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let parsed = value
            .parse::<f64>()
            .map_err(|_| self.invalid(column, value))?;
        Ok(Some(parsed).filter(|v| !v.is_nan()))
    }

    fn required_real(&self, index: usize, column: &str) -> Result<f64> {
        self.real(index, column)?
            .ok_or_else(|| self.invalid(column, self.raw(index).trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "DATA_TYPE,CR_NUMBER,STN_NUMBER,SOURCE_ID,OBS_YEAR,OBS_MONTH,OBS_DAY,OBS_TIME,Q_DATE_TIME,LONGITUDE (+E),LATITUDE (+N),Q_POS,D_P_CODE,DEPTH_PRESS,DP_FLAG,TEMP,Q_TEMP,PSAL,Q_PSAL";

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_parse_row() -> Result<()> {
        let file = write_csv(&["CD,18HU19001,12,1,1990,8,14,930,1,-64.5,72.25,1,D,5.0,1,-1.25,1,33.1,"]);

        let reader = ChunkedReader::new(10);
        let chunks: Vec<RecordChunk> = reader.open(file.path())?.collect::<Result<_>>()?;
        let row = &chunks[0].rows[0];

        assert_eq!(row.row, 1);
        assert_eq!(row.cr_number, "18HU19001");
        assert_eq!(row.obs_time, 930);
        assert_eq!(row.longitude, -64.5);
        assert_eq!(row.d_p_code, DepthPressureCode::Depth);
        assert_eq!(row.temp, Some(-1.25));
        assert_eq!(row.q_psal, None);
        Ok(())
    }

    #[test]
    fn test_chunks_cover_file_in_order() -> Result<()> {
        let lines: Vec<String> = (0..7)
            .map(|i| format!("CD,C1,{},1,1990,8,14,930,1,-64.5,72.25,1,D,{}.0,1,1.0,1,33.0,1", i, i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = write_csv(&refs);

        let reader = ChunkedReader::new(3).with_workers(2)?;
        let chunks: Vec<RecordChunk> = reader.open(file.path())?.collect::<Result<_>>()?;

        let sizes: Vec<usize> = chunks.iter().map(RecordChunk::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(chunks[1].first_row, 4);

        let depths: Vec<f64> = chunks
            .iter()
            .flat_map(|c| c.rows.iter().map(|r| r.depth_press))
            .collect();
        assert_eq!(depths, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "DATA_TYPE,CR_NUMBER").unwrap();
        writeln!(file, "CD,C1").unwrap();

        let err = ChunkedReader::new(10).open(file.path()).err().unwrap();
        assert!(err.is_schema_error());
        assert!(matches!(err, ProcessingError::MissingColumn { ref column, .. } if column == "STN_NUMBER"));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let err = ChunkedReader::new(10)
            .open(Path::new("/definitely/not/here.csv"))
            .err()
            .unwrap();
        assert!(matches!(err, ProcessingError::Io(_)));
    }

    #[test]
    fn test_float_encoded_integers_and_bad_values() -> Result<()> {
        let file = write_csv(&["CD,C1,1,1,1990.0,8,14,930.0,1.0,-64.5,72.25,1,P,10,,,,,"]);
        let chunks: Vec<RecordChunk> = ChunkedReader::new(10).open(file.path())?.collect::<Result<_>>()?;
        let row = &chunks[0].rows[0];
        assert_eq!(row.obs_year, 1990);
        assert_eq!(row.obs_time, 930);
        assert_eq!(row.q_date_time, Some(1));
        assert_eq!(row.d_p_code, DepthPressureCode::Pressure);
        assert_eq!(row.temp, None);

        let file = write_csv(&["CD,C1,1,1,1990,8,14,930,1,-64.5,72.25,1,X,10,1,1.0,1,33.0,1"]);
        let result: Result<Vec<RecordChunk>> = ChunkedReader::new(10).open(file.path())?.collect();
        assert!(matches!(result, Err(ProcessingError::InvalidIndicatorCode { row: 1, .. })));
        Ok(())
    }

    #[test]
    fn test_latin1_text_decoded() {
        let mut record = ByteRecord::new();
        record.push_field(b"CRUIS\xc9");
        assert_eq!(decode(record.get(0).unwrap()), "CRUISÉ");
    }
}

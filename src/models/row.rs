use crate::error::{ProcessingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which physical quantity the `DEPTH_PRESS` column holds for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthPressureCode {
    Depth,
    Pressure,
}

impl DepthPressureCode {
    pub fn parse(code: &str, row: usize) -> Result<Self> {
        match code.trim() {
            "D" | "d" => Ok(DepthPressureCode::Depth),
            "P" | "p" => Ok(DepthPressureCode::Pressure),
            other => Err(ProcessingError::InvalidIndicatorCode {
                code: other.to_string(),
                row,
            }),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            DepthPressureCode::Depth => 'D',
            DepthPressureCode::Pressure => 'P',
        }
    }
}

impl fmt::Display for DepthPressureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One measurement line of a MEDS profile export, typed but not yet grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedsRow {
    /// 1-based data line number in the source file
    pub row: usize,
    pub data_type: String,
    pub cr_number: String,
    pub stn_number: String,
    pub source_id: String,
    pub obs_year: i32,
    pub obs_month: u32,
    pub obs_day: u32,
    /// HHMM packed as an integer, e.g. 930 for 09:30
    pub obs_time: u32,
    pub q_date_time: Option<u8>,
    pub longitude: f64,
    pub latitude: f64,
    pub q_pos: Option<u8>,
    pub d_p_code: DepthPressureCode,
    pub depth_press: f64,
    pub dp_flag: Option<u8>,
    pub temp: Option<f64>,
    pub q_temp: Option<u8>,
    pub psal: Option<f64>,
    pub q_psal: Option<u8>,
}

use crate::error::{ProcessingError, Result};
use crate::models::{DepthPressureCode, MedsRow, Observation};
use crate::utils::constants::DATESTR_FORMAT;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identity of a profile. Rows sharing every component belong to the same cast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileKey {
    pub data_type: String,
    pub cr_number: String,
    pub stn_number: String,
    pub source_id: String,
    pub obs_year: i32,
    pub obs_month: u32,
    pub obs_day: u32,
    pub obs_time: u32,
    pub q_date_time: Option<u8>,
    longitude_bits: u64,
    latitude_bits: u64,
    pub q_pos: Option<u8>,
}

impl ProfileKey {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_type: String,
        cr_number: String,
        stn_number: String,
        source_id: String,
        (obs_year, obs_month, obs_day, obs_time): (i32, u32, u32, u32),
        q_date_time: Option<u8>,
        longitude: f64,
        latitude: f64,
        q_pos: Option<u8>,
    ) -> Self {
        Self {
            data_type,
            cr_number,
            stn_number,
            source_id,
            obs_year,
            obs_month,
            obs_day,
            obs_time,
            q_date_time,
            longitude_bits: normalize_zero(longitude).to_bits(),
            latitude_bits: normalize_zero(latitude).to_bits(),
            q_pos,
        }
    }

    pub fn from_row(row: &MedsRow) -> Self {
        Self::new(
            row.data_type.clone(),
            row.cr_number.clone(),
            row.stn_number.clone(),
            row.source_id.clone(),
            (row.obs_year, row.obs_month, row.obs_day, row.obs_time),
            row.q_date_time,
            row.longitude,
            row.latitude,
            row.q_pos,
        )
    }

    pub fn longitude(&self) -> f64 {
        f64::from_bits(self.longitude_bits)
    }

    pub fn latitude(&self) -> f64 {
        f64::from_bits(self.latitude_bits)
    }
}

fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{} {:04}-{:02}-{:02} {:04} ({}, {})",
            self.data_type,
            self.cr_number,
            self.stn_number,
            self.source_id,
            self.obs_year,
            self.obs_month,
            self.obs_day,
            self.obs_time,
            self.latitude(),
            self.longitude()
        )
    }
}

/// Number of observation rows a profile owns in each measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSizes {
    pub depth: u32,
    pub press: u32,
    pub temp: u32,
    pub psal: u32,
}

impl RowSizes {
    pub fn for_block(code: DepthPressureCode, rows: u32) -> Self {
        match code {
            DepthPressureCode::Depth => Self {
                depth: rows,
                press: 0,
                temp: rows,
                psal: rows,
            },
            DepthPressureCode::Pressure => Self {
                depth: 0,
                press: rows,
                temp: rows,
                psal: rows,
            },
        }
    }

    /// Length of the profile's contiguous block in every observation array.
    pub fn block_len(&self) -> usize {
        self.temp as usize
    }
}

/// Profile-level summary of one cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub orig_cruise_id: String,
    pub instrument_type: String,
    pub station_no: String,
    pub source_id: String,
    pub lat: f64,
    pub lon: f64,
    pub lonlat_flag: Option<u8>,
    /// Seconds since the Unix epoch, UTC
    pub timestamp: i64,
    pub datestr: String,
    pub datestr_flag: Option<u8>,
    pub shallowest_depth: Option<f64>,
    pub deepest_depth: f64,
    pub row_sizes: RowSizes,
}

impl Profile {
    /// Rebuild the identity key from persisted fields.
    pub fn identity_key(&self) -> Result<ProfileKey> {
        let time = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| {
                ProcessingError::InvalidFormat(format!(
                    "Timestamp {} is out of range",
                    self.timestamp
                ))
            })?
            .naive_utc();

        Ok(ProfileKey::new(
            self.instrument_type.clone(),
            self.orig_cruise_id.clone(),
            self.station_no.clone(),
            self.source_id.clone(),
            (
                time.year(),
                time.month(),
                time.day(),
                time.hour() * 100 + time.minute(),
            ),
            self.datestr_flag,
            self.lon,
            self.lat,
            self.lonlat_flag,
        ))
    }
}

/// Build the observation time from MEDS date fields. `obs_time` packs HHMM.
pub fn observation_time(year: i32, month: u32, day: u32, obs_time: u32) -> std::result::Result<NaiveDateTime, String> {
    let hour = obs_time / 100;
    let minute = obs_time % 100;

    if hour > 23 {
        return Err(format!("hour {} out of range in OBS_TIME {}", hour, obs_time));
    }
    if minute > 59 {
        return Err(format!(
            "minute {} out of range in OBS_TIME {}",
            minute, obs_time
        ));
    }

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("{:04}-{:02}-{:02} is not a calendar date", year, month, day))?
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| format!("invalid time {:02}:{:02}", hour, minute))
}

/// Shallowest and deepest vertical coordinate of a block.
///
/// Zero is a surface sentinel and is skipped for the shallowest value, but only
/// when the block has more than one row; a lone row is taken as-is.
pub fn vertical_extent(values: &[f64]) -> (Option<f64>, f64) {
    let deepest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let shallowest = if values.len() > 1 {
        values.iter().copied().filter(|v| *v != 0.0).reduce(f64::min)
    } else {
        values.first().copied()
    };
    (shallowest, deepest)
}

/// A profile together with its observation block, before it is assigned an ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileGroup {
    pub key: ProfileKey,
    pub code: DepthPressureCode,
    pub profile: Profile,
    pub observations: Vec<Observation>,
}

impl ProfileGroup {
    /// Build a group from rows that share `key`. Rows must be non-empty.
    pub fn from_rows(key: ProfileKey, rows: &[MedsRow]) -> Result<Self> {
        let first = rows.first().ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("Profile {} has no rows", key))
        })?;

        let code = uniform_code(&key, rows.iter().map(|r| r.d_p_code))?;

        let time = observation_time(key.obs_year, key.obs_month, key.obs_day, key.obs_time)
            .map_err(|message| ProcessingError::TimeParse {
                profile: key.to_string(),
                message,
            })?;

        let profile = Profile {
            orig_cruise_id: first.cr_number.clone(),
            instrument_type: first.data_type.clone(),
            station_no: first.stn_number.clone(),
            source_id: first.source_id.clone(),
            lat: first.latitude,
            lon: first.longitude,
            lonlat_flag: first.q_pos,
            timestamp: time.and_utc().timestamp(),
            datestr: time.format(DATESTR_FORMAT).to_string(),
            datestr_flag: first.q_date_time,
            shallowest_depth: None,
            deepest_depth: f64::NAN,
            row_sizes: RowSizes::default(),
        };

        let mut group = Self {
            key,
            code,
            profile,
            observations: rows.iter().map(Observation::from_row).collect(),
        };
        group.refresh_summary();
        Ok(group)
    }

    pub fn year(&self) -> i32 {
        self.key.obs_year
    }

    /// Fold a later fragment of the same cast into this group.
    pub fn absorb(&mut self, other: ProfileGroup) -> Result<()> {
        if other.key != self.key {
            return Err(ProcessingError::InvalidFormat(format!(
                "Cannot merge profile {} into {}",
                other.key, self.key
            )));
        }
        if other.code != self.code {
            return Err(ProcessingError::MixedIndicatorCode {
                profile: self.key.to_string(),
                codes: vec![self.code.as_char(), other.code.as_char()],
            });
        }

        self.observations.extend(other.observations);
        self.refresh_summary();
        Ok(())
    }

    fn refresh_summary(&mut self) {
        let values: Vec<f64> = self
            .observations
            .iter()
            .filter_map(Observation::vertical)
            .collect();
        let (shallowest, deepest) = vertical_extent(&values);

        if shallowest.is_none() {
            tracing::warn!(
                profile = %self.key,
                rows = values.len(),
                "every DEPTH_PRESS value is the zero sentinel, shallowest depth left empty"
            );
        }

        self.profile.shallowest_depth = shallowest;
        self.profile.deepest_depth = deepest;
        self.profile.row_sizes = RowSizes::for_block(self.code, self.observations.len() as u32);
    }
}

/// Decide once per group that every row carries the same indicator code.
fn uniform_code(
    key: &ProfileKey,
    codes: impl Iterator<Item = DepthPressureCode>,
) -> Result<DepthPressureCode> {
    let mut seen: Vec<DepthPressureCode> = Vec::new();
    for code in codes {
        if !seen.contains(&code) {
            seen.push(code);
        }
    }

    match seen.as_slice() {
        [code] => Ok(*code),
        _ => Err(ProcessingError::MixedIndicatorCode {
            profile: key.to_string(),
            codes: seen.iter().map(DepthPressureCode::as_char).collect(),
        }),
    }
}

use crate::error::{ProcessingError, Result};
use crate::models::{is_accepted_flag, Observation, PartitionDataset};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct GeographicBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Coverage and range of one observation variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableStats {
    pub name: &'static str,
    pub present: usize,
    pub accepted: usize,
    pub range: Option<(f64, f64)>,
}

impl VariableStats {
    fn collect(
        name: &'static str,
        observations: &[Observation],
        value: fn(&Observation) -> Option<f64>,
        flag: fn(&Observation) -> Option<u8>,
    ) -> Self {
        let mut stats = Self {
            name,
            present: 0,
            accepted: 0,
            range: None,
        };
        for obs in observations {
            let Some(v) = value(obs) else { continue };
            stats.present += 1;
            if is_accepted_flag(flag(obs)) {
                stats.accepted += 1;
            }
            stats.range = Some(match stats.range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        stats
    }

    pub fn accepted_percentage(&self) -> f64 {
        if self.present == 0 {
            return 0.0;
        }
        (self.accepted as f64 / self.present as f64) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatistics {
    pub profiles: usize,
    pub observations: usize,
    pub cruises: usize,
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    pub geographic_bounds: GeographicBounds,
    pub variables: Vec<VariableStats>,
}

pub struct DatasetAnalyzer;

impl DatasetAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, dataset: &PartitionDataset) -> Result<DatasetStatistics> {
        let first = dataset.profiles.first().ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("Partition {} holds no profiles", dataset.key))
        })?;

        let (start, end) = dataset.time_range().unwrap_or((first.timestamp, first.timestamp));
        let to_utc = |ts: i64| {
            DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                ProcessingError::InvalidFormat(format!("Timestamp {} is out of range", ts))
            })
        };

        let mut bounds = GeographicBounds {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        let mut cruises = HashSet::new();
        for profile in &dataset.profiles {
            cruises.insert(profile.orig_cruise_id.as_str());
            bounds.min_lat = bounds.min_lat.min(profile.lat);
            bounds.max_lat = bounds.max_lat.max(profile.lat);
            bounds.min_lon = bounds.min_lon.min(profile.lon);
            bounds.max_lon = bounds.max_lon.max(profile.lon);
        }

        let obs = &dataset.observations;
        let variables = vec![
            VariableStats::collect("depth", obs, |o| o.depth, |o| o.depth_flag),
            VariableStats::collect("press", obs, |o| o.press, |o| o.press_flag),
            VariableStats::collect("temp", obs, |o| o.temp, |o| o.temp_flag),
            VariableStats::collect("psal", obs, |o| o.psal, |o| o.psal_flag),
        ];

        Ok(DatasetStatistics {
            profiles: dataset.profiles.len(),
            observations: obs.len(),
            cruises: cruises.len(),
            time_range: (to_utc(start)?, to_utc(end)?),
            geographic_bounds: bounds,
            variables,
        })
    }
}

impl Default for DatasetAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStatistics {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Profiles: {} from {} cruises\n\
            Observations: {}\n\
            Time Range: {} to {}\n\
            Coverage: {:.2}N to {:.2}N, {:.2}E to {:.2}E\n",
            self.profiles,
            self.cruises,
            self.observations,
            self.time_range.0.format("%Y-%m-%d %H:%M"),
            self.time_range.1.format("%Y-%m-%d %H:%M"),
            self.geographic_bounds.min_lat,
            self.geographic_bounds.max_lat,
            self.geographic_bounds.min_lon,
            self.geographic_bounds.max_lon,
        );

        summary.push_str("\nVariables (accepted = flag 1, 5 or 8):\n");
        for var in &self.variables {
            let range = match var.range {
                Some((lo, hi)) => format!("{:.2} to {:.2}", lo, hi),
                None => "no values".to_string(),
            };
            summary.push_str(&format!(
                "- {:<6} {:>10} present, {:>5.1}% accepted, {}\n",
                var.name,
                var.present,
                var.accepted_percentage(),
                range
            ));
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DatasetAttributes, DepthPressureCode, MedsRow, PartitionKey, ProfileGroup, ProfileKey,
    };
    use chrono::Local;

    fn group(cruise: &str, lat: f64, temps: &[(f64, u8)]) -> ProfileGroup {
        let rows: Vec<MedsRow> = temps
            .iter()
            .enumerate()
            .map(|(i, &(temp, flag))| MedsRow {
                row: i + 1,
                data_type: "CD".to_string(),
                cr_number: cruise.to_string(),
                stn_number: "1".to_string(),
                source_id: "1".to_string(),
                obs_year: 2003,
                obs_month: 2,
                obs_day: 11,
                obs_time: 30,
                q_date_time: Some(1),
                longitude: -55.0,
                latitude: lat,
                q_pos: Some(1),
                d_p_code: DepthPressureCode::Pressure,
                depth_press: (i + 1) as f64,
                dp_flag: Some(1),
                temp: Some(temp),
                q_temp: Some(flag),
                psal: None,
                q_psal: None,
            })
            .collect();
        ProfileGroup::from_rows(ProfileKey::from_row(&rows[0]), &rows).unwrap()
    }

    #[test]
    fn test_statistics() {
        let dataset = PartitionDataset::from_groups(
            PartitionKey::new(2001, 2010).unwrap(),
            vec![
                group("A", 60.0, &[(1.0, 1), (2.0, 4)]),
                group("B", 65.5, &[(-1.5, 5)]),
            ],
            DatasetAttributes::created("MEDS_2021", "a.csv", Local::now()),
        );

        let stats = DatasetAnalyzer::new().analyze(&dataset).unwrap();
        assert_eq!(stats.profiles, 2);
        assert_eq!(stats.observations, 3);
        assert_eq!(stats.cruises, 2);
        assert_eq!(stats.geographic_bounds.min_lat, 60.0);
        assert_eq!(stats.geographic_bounds.max_lat, 65.5);

        let temp = &stats.variables[2];
        assert_eq!(temp.present, 3);
        assert_eq!(temp.accepted, 2);
        assert_eq!(temp.range, Some((-1.5, 2.0)));
        assert_eq!(stats.variables[0].present, 0);
        assert_eq!(stats.variables[1].present, 3);

        let summary = stats.summary();
        assert!(summary.contains("Profiles: 2 from 2 cruises"));
        assert!(summary.contains("2003-02-11 00:30"));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let dataset = PartitionDataset::empty(
            PartitionKey::new(2001, 2010).unwrap(),
            DatasetAttributes::created("MEDS_2021", "a.csv", Local::now()),
        );
        assert!(DatasetAnalyzer::new().analyze(&dataset).is_err());
    }
}

use crate::error::{ProcessingError, Result};
use crate::models::PartitionDataset;
use std::collections::HashSet;

/// Counts gathered while verifying a partition's alignment invariants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    pub profiles: usize,
    pub observations: usize,
    pub depth_observations: usize,
    pub press_observations: usize,
    pub depth_profiles: usize,
    pub press_profiles: usize,
}

/// Verifies that the profile-indexed and observation-indexed arrays of a
/// partition still line up.
pub struct IntegrityChecker;

impl IntegrityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check every linkage invariant and return counts, or the first violation.
    pub fn verify(&self, dataset: &PartitionDataset) -> Result<ConsistencyReport> {
        let fail = |message: String| ProcessingError::consistency(dataset.key, message);
        let observations = dataset.observations.len();

        if dataset.parent_index.len() != observations {
            return Err(fail(format!(
                "parent index has {} entries for {} observations",
                dataset.parent_index.len(),
                observations
            )));
        }

        let mut report = ConsistencyReport {
            profiles: dataset.profiles.len(),
            observations,
            ..ConsistencyReport::default()
        };

        let mut sums = [0usize; 4];
        for (ordinal, profile) in dataset.profiles.iter().enumerate() {
            let sizes = profile.row_sizes;
            if sizes.temp != sizes.psal || sizes.depth + sizes.press != sizes.temp {
                return Err(fail(format!(
                    "profile {} has mismatched row sizes {:?}",
                    ordinal, sizes
                )));
            }
            if sizes.depth > 0 && sizes.press > 0 {
                return Err(fail(format!(
                    "profile {} claims both depth and pressure rows",
                    ordinal
                )));
            }
            if sizes.depth > 0 {
                report.depth_profiles += 1;
            } else if sizes.press > 0 {
                report.press_profiles += 1;
            }
            sums[0] += sizes.depth as usize;
            sums[1] += sizes.press as usize;
            sums[2] += sizes.temp as usize;
            sums[3] += sizes.psal as usize;
        }

        if sums[2] != observations || sums[3] != observations {
            return Err(fail(format!(
                "row sizes sum to temp={} psal={} but {} observations are stored",
                sums[2], sums[3], observations
            )));
        }

        report.depth_observations = dataset.observations.iter().filter(|o| o.depth.is_some()).count();
        report.press_observations = dataset.observations.iter().filter(|o| o.press.is_some()).count();
        if report.depth_observations != sums[0] || report.press_observations != sums[1] {
            return Err(fail(format!(
                "depth/press row sizes ({}, {}) disagree with stored values ({}, {})",
                sums[0], sums[1], report.depth_observations, report.press_observations
            )));
        }

        let mut position = 0;
        for ((ordinal, profile), (_, block)) in dataset.profiles.iter().enumerate().zip(dataset.blocks()) {
            let parents = &dataset.parent_index[position..position + block.len()];
            if let Some(bad) = parents.iter().find(|&&p| p != ordinal as i64) {
                return Err(fail(format!(
                    "observation at {} points to profile {} inside the block of profile {}",
                    position, bad, ordinal
                )));
            }
            let routed_wrong = match (profile.row_sizes.depth > 0, profile.row_sizes.press > 0) {
                (true, _) => block.iter().any(|o| o.depth.is_none() || o.press.is_some()),
                (_, true) => block.iter().any(|o| o.press.is_none() || o.depth.is_some()),
                _ => !block.is_empty(),
            };
            if routed_wrong {
                return Err(fail(format!(
                    "profile {} has observations in the wrong vertical channel",
                    ordinal
                )));
            }
            position += block.len();
        }

        let mut seen = HashSet::with_capacity(dataset.profiles.len());
        for (ordinal, profile) in dataset.profiles.iter().enumerate() {
            if !seen.insert(profile.identity_key()?) {
                return Err(fail(format!(
                    "profile {} repeats an identity already stored",
                    ordinal
                )));
            }
        }

        Ok(report)
    }

    pub fn generate_summary(&self, report: &ConsistencyReport) -> String {
        let mut summary = String::new();

        summary.push_str("=== Consistency Report ===\n");
        summary.push_str(&format!("Profiles: {}\n", report.profiles));
        summary.push_str(&format!("Observations: {}\n", report.observations));
        summary.push_str(&format!(
            "Depth-indexed: {} profiles, {} observations\n",
            report.depth_profiles, report.depth_observations
        ));
        summary.push_str(&format!(
            "Pressure-indexed: {} profiles, {} observations\n",
            report.press_profiles, report.press_observations
        ));

        summary
    }
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DatasetAttributes, DepthPressureCode, MedsRow, PartitionKey, ProfileGroup, ProfileKey,
    };
    use chrono::Local;

    fn group(station: &str, code: DepthPressureCode, depths: &[f64]) -> ProfileGroup {
        let rows: Vec<MedsRow> = depths
            .iter()
            .map(|d| MedsRow {
                row: 1,
                data_type: "BO".to_string(),
                cr_number: "C9".to_string(),
                stn_number: station.to_string(),
                source_id: "2".to_string(),
                obs_year: 2012,
                obs_month: 9,
                obs_day: 30,
                obs_time: 2359,
                q_date_time: Some(1),
                longitude: -80.0,
                latitude: 75.0,
                q_pos: Some(1),
                d_p_code: code,
                depth_press: *d,
                dp_flag: Some(1),
                temp: None,
                q_temp: None,
                psal: Some(30.0),
                q_psal: Some(4),
            })
            .collect();
        ProfileGroup::from_rows(ProfileKey::from_row(&rows[0]), &rows).unwrap()
    }

    fn dataset() -> PartitionDataset {
        PartitionDataset::from_groups(
            PartitionKey::new(2011, 2021).unwrap(),
            vec![
                group("1", DepthPressureCode::Depth, &[1.0, 2.0, 3.0]),
                group("2", DepthPressureCode::Pressure, &[5.0]),
            ],
            DatasetAttributes::created("MEDS_2021", "x.csv", Local::now()),
        )
    }

    #[test]
    fn test_consistent_dataset_passes() {
        let report = IntegrityChecker::new().verify(&dataset()).unwrap();

        assert_eq!(report.profiles, 2);
        assert_eq!(report.observations, 4);
        assert_eq!(report.depth_observations, 3);
        assert_eq!(report.press_observations, 1);
        assert_eq!(report.depth_profiles, 1);
        assert_eq!(report.press_profiles, 1);
    }

    #[test]
    fn test_row_size_mismatch_detected() {
        let mut data = dataset();
        data.profiles[0].row_sizes.temp = 2;

        let err = IntegrityChecker::new().verify(&data).unwrap_err();
        assert!(matches!(err, ProcessingError::Consistency { .. }));
    }

    #[test]
    fn test_misattributed_parent_index_detected() {
        let mut data = dataset();
        data.parent_index[2] = 1;

        assert!(IntegrityChecker::new().verify(&data).is_err());
    }

    #[test]
    fn test_truncated_observations_detected() {
        let mut data = dataset();
        data.observations.pop();
        data.parent_index.pop();

        assert!(IntegrityChecker::new().verify(&data).is_err());
    }

    #[test]
    fn test_duplicate_identity_detected() {
        let mut data = dataset();
        let copy = group("1", DepthPressureCode::Depth, &[9.0]);
        data.parent_index.push(2);
        data.observations.extend(copy.observations);
        data.profiles.push(copy.profile);

        let err = IntegrityChecker::new().verify(&data).unwrap_err();
        assert!(err.to_string().contains("repeats an identity"));
    }

    #[test]
    fn test_summary_mentions_counts() {
        let checker = IntegrityChecker::new();
        let report = checker.verify(&dataset()).unwrap();
        let summary = checker.generate_summary(&report);

        assert!(summary.contains("Profiles: 2"));
        assert!(summary.contains("Observations: 4"));
    }
}

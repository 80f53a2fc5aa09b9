use crate::models::{DepthPressureCode, MedsRow};
use crate::utils::constants::ACCEPTED_FLAGS;
use serde::{Deserialize, Serialize};

/// One depth- or pressure-indexed measurement belonging to a profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub depth: Option<f64>,
    pub press: Option<f64>,
    pub temp: Option<f64>,
    pub psal: Option<f64>,
    pub depth_flag: Option<u8>,
    pub press_flag: Option<u8>,
    pub temp_flag: Option<u8>,
    pub psal_flag: Option<u8>,
}

impl Observation {
    /// Route `DEPTH_PRESS` and `DP_FLAG` to the channel named by the row's code;
    /// the other channel stays null.
    pub fn from_row(row: &MedsRow) -> Self {
        let (depth, depth_flag, press, press_flag) = match row.d_p_code {
            DepthPressureCode::Depth => (Some(row.depth_press), row.dp_flag, None, None),
            DepthPressureCode::Pressure => (None, None, Some(row.depth_press), row.dp_flag),
        };

        Self {
            depth,
            press,
            temp: row.temp,
            psal: row.psal,
            depth_flag,
            press_flag,
            temp_flag: row.q_temp,
            psal_flag: row.q_psal,
        }
    }

    /// The vertical coordinate, whichever channel holds it.
    pub fn vertical(&self) -> Option<f64> {
        self.depth.or(self.press)
    }
}

/// Whether a quality flag marks a sample as accepted for QA plots.
pub fn is_accepted_flag(flag: Option<u8>) -> bool {
    flag.is_some_and(|f| ACCEPTED_FLAGS.contains(&f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_flags() {
        assert!(is_accepted_flag(Some(1)));
        assert!(is_accepted_flag(Some(5)));
        assert!(is_accepted_flag(Some(8)));
        assert!(!is_accepted_flag(Some(0)));
        assert!(!is_accepted_flag(Some(4)));
        assert!(!is_accepted_flag(None));
    }
}

use crate::error::Result;
use crate::models::{MedsRow, ProfileGroup, ProfileKey};
use std::collections::HashMap;

/// Clusters the rows of one chunk into profiles by identity key.
pub struct ProfileGrouper;

impl ProfileGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Group rows by identity key, keeping groups in order of first appearance.
    ///
    /// Rows of a group need not be adjacent. Any group that fails to build
    /// (mixed depth/pressure codes, impossible observation time) fails the whole chunk.
    pub fn group_rows(&self, rows: Vec<MedsRow>) -> Result<Vec<ProfileGroup>> {
        let mut order: Vec<(ProfileKey, Vec<MedsRow>)> = Vec::new();
        let mut positions: HashMap<ProfileKey, usize> = HashMap::new();

        for row in rows {
            let key = ProfileKey::from_row(&row);
            match positions.get(&key) {
                Some(&position) => order[position].1.push(row),
                None => {
                    positions.insert(key.clone(), order.len());
                    order.push((key, vec![row]));
                }
            }
        }

        order
            .into_iter()
            .map(|(key, rows)| ProfileGroup::from_rows(key, &rows))
            .collect()
    }
}

impl Default for ProfileGrouper {
    fn default() -> Self {
        Self::new()
    }
}

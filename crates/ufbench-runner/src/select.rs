use crate::error::{HarnessError, Result};
use crate::index::IndexRecord;
use serde::Serialize;
use std::collections::BTreeSet;

pub const DEFAULT_ID_MIN: u32 = 1;
pub const DEFAULT_ID_MAX: u32 = 2757;

/// Which index records are admitted for testing.
///
/// The structural predicate (square, real, symmetric) is fixed: it is the input
/// class the library under test supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionCriteria {
    pub id_min: u32,
    pub id_max: u32,
    /// When non-empty, narrows the range; never widens it.
    pub id_set: BTreeSet<u32>,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            id_min: DEFAULT_ID_MIN,
            id_max: DEFAULT_ID_MAX,
            id_set: BTreeSet::new(),
        }
    }
}

impl SelectionCriteria {
    pub fn new(id_min: u32, id_max: u32, ids: impl IntoIterator<Item = u32>) -> Result<Self> {
        if id_min > id_max {
            return Err(HarnessError::Config(format!(
                "minimum id {} is greater than maximum id {}",
                id_min, id_max
            )));
        }
        Ok(Self {
            id_min,
            id_max,
            id_set: ids.into_iter().collect(),
        })
    }

    pub fn in_range(&self, id: u32) -> bool {
        id >= self.id_min && id <= self.id_max
    }

    pub fn in_id_set(&self, id: u32) -> bool {
        self.id_set.is_empty() || self.id_set.contains(&id)
    }

    pub fn admits(&self, record: &IndexRecord) -> bool {
        self.in_range(record.id)
            && self.in_id_set(record.id)
            && record.is_square()
            && record.is_real()
            && record.is_symmetric()
    }
}

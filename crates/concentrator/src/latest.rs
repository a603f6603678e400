//! Most recent sample per identity

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use contracts::{Sample, SampleKey};

#[derive(Debug, Default)]
pub(crate) struct LatestValues {
    values: RwLock<HashMap<SampleKey, Sample>>,
}

impl LatestValues {
    /// Keeps `sample` unless a newer one for the same identity is stored.
    pub fn update(&self, sample: &Sample) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values
            .entry(sample.key.clone())
            .and_modify(|current| {
                if current.timestamp <= sample.timestamp {
                    *current = sample.clone();
                }
            })
            .or_insert_with(|| sample.clone());
    }

    pub fn get(&self, key: &str) -> Option<Sample> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<SampleKey, Sample> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

//! Record storage and aggregation.
use super::{Record, RecordValue};
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them.
///
/// Scalars stored more than once under a key are summarized with
/// `{key}_min`, `{key}_max`, `{key}_mean` and `{key}_median`; a scalar stored
/// once is passed through. For other value types the latest value is kept.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::INFINITY, f32::min))
}

fn max(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::NEG_INFINITY, f32::max))
}

fn mean(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().sum::<f32>() / vs.len() as f32)
}

fn median(mut vs: Vec<f32>) -> RecordValue {
    vs.sort_by(|x, y| x.total_cmp(y));
    RecordValue::Scalar(vs[vs.len() / 2])
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn get_keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            for k in record.keys() {
                keys.insert(k.clone());
            }
        }
        keys
    }

    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|record| record.get(key))
    }

    fn scalar(&self, key: &str) -> Record {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();

        if vs.len() == 1 {
            Record::from_scalar(key, vs[0])
        } else {
            Record::from_slice(&[
                (format!("{}_min", key), min(&vs)),
                (format!("{}_max", key), max(&vs)),
                (format!("{}_mean", key), mean(&vs)),
                (format!("{}_median", key), median(vs)),
            ])
        }
    }

    /// Aggregates all stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.get_keys().iter() {
            match self.latest(key) {
                Some(RecordValue::Scalar(..)) => record.merge_inplace(self.scalar(key)),
                Some(value) => record.insert(key.clone(), value.clone()),
                None => {}
            }
        }

        self.data = vec![];

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [1f32, 4.0, 2.0] {
            storage.store(Record::from_scalar("loss", v));
        }
        storage.store(Record::from_scalar("eval_return", 10.0));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss_min").unwrap(), 1.0);
        assert_eq!(record.get_scalar("loss_max").unwrap(), 4.0);
        assert!((record.get_scalar("loss_mean").unwrap() - 7.0 / 3.0).abs() < 1e-6);
        assert_eq!(record.get_scalar("loss_median").unwrap(), 2.0);
        assert_eq!(record.get_scalar("eval_return").unwrap(), 10.0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_aggregate_keeps_latest_string() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_slice(&[("tag", RecordValue::String("a".into()))]));
        storage.store(Record::from_slice(&[("tag", RecordValue::String("b".into()))]));

        let record = storage.aggregate();
        assert_eq!(record.get_string("tag").unwrap(), "b");
    }
}

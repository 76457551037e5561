//! In-batch deduplication by natural key.

use std::collections::HashMap;

use crate::types::{NaturalKey, Record};

/// A batch with at most one record per natural key.
///
/// Records keep the position of the key's first occurrence; the record stored there is the last
/// one submitted for that key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduped {
    records: Vec<Record>,
    /// Records dropped because a later record had the same key.
    pub collapsed: usize,
}

impl Deduped {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Collapse `records` to one record per key (projected through `key_idxs`), last write wins.
pub fn dedupe(key_idxs: &[usize], records: impl IntoIterator<Item = Record>) -> Deduped {
    let mut slot_of: HashMap<NaturalKey, usize> = HashMap::new();
    let mut out = Deduped::default();

    for record in records {
        let key = record.project(key_idxs);
        match slot_of.get(&key) {
            Some(&slot) => {
                out.records[slot] = record;
                out.collapsed += 1;
            }
            None => {
                slot_of.insert(key, out.records.len());
                out.records.push(record);
            }
        }
    }
    out
}

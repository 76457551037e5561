//! Upsert reconciliation of a batch against a [`Store`].

use serde::{Deserialize, Serialize};

use crate::dedupe::dedupe;
use crate::entity::EntityDescriptor;
use crate::error::{IngestError, IngestResult};
use crate::store::{Store, UpsertBatch, UpsertReport};
use crate::types::Record;

/// Result of one successful reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Distinct keys applied (inserted + updated + unchanged). Replaying the same batch reports
    /// the same number.
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Input records dropped by in-batch deduplication.
    pub collapsed: usize,
}

impl ReconcileOutcome {
    fn new(report: UpsertReport, collapsed: usize) -> Self {
        Self {
            processed: report.processed(),
            inserted: report.inserted,
            updated: report.updated,
            unchanged: report.unchanged,
            collapsed,
        }
    }
}

/// Merge `records` into `store` under `descriptor`'s upsert policy.
///
/// - an empty batch fails with [`IngestError::EmptyBatch`] before the store is touched
/// - records sharing a natural key are collapsed, last one wins
/// - the surviving records go to the store in a single [`Store::upsert_batch`] call; a store error
///   fails the whole batch and is returned as [`IngestError::Storage`]
///
/// Holds no state between calls and takes no locks; concurrent callers are serialized by the
/// store.
pub fn reconcile<S>(store: &S, descriptor: &EntityDescriptor, records: Vec<Record>) -> IngestResult<ReconcileOutcome>
where
    S: Store + ?Sized,
{
    if records.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    let policy = descriptor.resolve()?;
    let expected = descriptor.schema.len();
    if let Some(bad) = records.iter().position(|r| r.len() != expected) {
        return Err(IngestError::schema_mismatch(format!(
            "record {} of {} batch has {} values, expected {expected}",
            bad + 1,
            descriptor.table,
            records[bad].len()
        )));
    }

    let deduped = dedupe(&policy.conflict, records);
    let collapsed = deduped.collapsed;
    let records = deduped.into_records();

    let report = store.upsert_batch(&UpsertBatch {
        descriptor,
        conflict: &policy.conflict,
        update: &policy.update,
        records: &records,
    })?;
    Ok(ReconcileOutcome::new(report, collapsed))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::reconcile;
    use crate::entity::{Entity, EntityDescriptor};
    use crate::error::IngestError;
    use crate::model::DailySaleSku;
    use crate::store::{Filter, Store, StoreError, StoreResult, StoredRecord, UpsertBatch, UpsertReport};
    use crate::types::Record;

    /// Records what reaches the store and fails every upsert.
    #[derive(Default)]
    struct SpyStore {
        batches: Mutex<Vec<Vec<Record>>>,
    }

    impl Store for SpyStore {
        fn upsert_batch(&self, batch: &UpsertBatch<'_>) -> StoreResult<UpsertReport> {
            self.batches.lock().unwrap().push(batch.records.to_vec());
            Err(StoreError::Unavailable {
                message: "connection reset".to_string(),
            })
        }

        fn find(&self, _: &EntityDescriptor, _: &Filter) -> StoreResult<Vec<StoredRecord>> {
            Ok(Vec::new())
        }

        fn delete_by_id(&self, _: &EntityDescriptor, _: u64) -> StoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_batch_never_reaches_the_store() {
        let spy = SpyStore::default();
        let err = reconcile(&spy, DailySaleSku::descriptor(), Vec::new()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyBatch));
        assert!(spy.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn store_sees_one_deduplicated_batch_and_its_error_propagates() {
        let spy = SpyStore::default();
        let records = vec![
            DailySaleSku::new("2024-01-01", "X1", 1).to_record(),
            DailySaleSku::new("2024-01-01", "Y2", 2).to_record(),
            DailySaleSku::new("2024-01-01", "X1", 3).to_record(),
        ];
        let err = reconcile(&spy, DailySaleSku::descriptor(), records).unwrap_err();
        assert!(matches!(err, IngestError::Storage(StoreError::Unavailable { .. })));

        let batches = spy.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                DailySaleSku::new("2024-01-01", "X1", 3).to_record(),
                DailySaleSku::new("2024-01-01", "Y2", 2).to_record(),
            ]
        );
    }

    #[test]
    fn wrong_arity_is_a_schema_mismatch() {
        let spy = SpyStore::default();
        let err = reconcile(&spy, DailySaleSku::descriptor(), vec![Record::new(Vec::new())]).unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { .. }));
        assert!(spy.batches.lock().unwrap().is_empty());
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::entity::{Entity, EntityDescriptor};
use crate::model::{DailySaleSku, Product};
use crate::types::{NaturalKey, Record, Schema, Value};

use super::{Filter, Store, StoreError, StoreResult, StoredRecord, UpsertBatch, UpsertReport};

/// In-process [`Store`] with declared unique indexes, surrogate ids, and storage-maintained
/// timestamps.
///
/// A single mutex serializes batches, which plays the role a database's row locks play for the
/// `ON CONFLICT` primitive. Each applied record leaves an undo entry; if a later record of the
/// batch fails, the entries are replayed in reverse so a failing batch leaves no trace.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    upsert_calls: AtomicUsize,
}

#[derive(Debug)]
struct UniqueIndex {
    name: String,
    columns: Vec<usize>,
    entries: HashMap<NaturalKey, u64>,
}

/// How to revert one applied record.
#[derive(Debug)]
enum Undo {
    Inserted { id: u64 },
    Updated {
        id: u64,
        previous: Record,
        updated_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct Table {
    name: String,
    schema: Schema,
    uniques: Vec<UniqueIndex>,
    rows: BTreeMap<u64, StoredRecord>,
    next_id: u64,
}

impl MemoryStore {
    /// An empty store with no tables.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// A store with the `products` and `daily_sales_sku` tables created.
    pub fn open_catalog() -> StoreResult<Self> {
        let store = Self::new();
        store.create_table(Product::descriptor(), &[])?;
        store.create_table(DailySaleSku::descriptor(), &[])?;
        Ok(store)
    }

    /// Create `descriptor.table` if missing.
    ///
    /// The table gets a unique index on the descriptor's conflict columns plus one index per entry
    /// of `extra_unique`. Re-creating an existing table with the same schema is a no-op apart from
    /// adding indexes it does not have yet.
    pub fn create_table(&self, descriptor: &EntityDescriptor, extra_unique: &[&[&str]]) -> StoreResult<()> {
        let mut column_sets: Vec<Vec<String>> = vec![descriptor.policy.conflict_columns().to_vec()];
        for cols in extra_unique {
            column_sets.push(cols.iter().map(|c| c.to_string()).collect());
        }

        let mut tables = self.lock()?;
        let table = tables
            .entry(descriptor.table.clone())
            .or_insert_with(|| Table::new(&descriptor.table, descriptor.schema.clone()));
        if table.schema != descriptor.schema {
            return Err(StoreError::ShapeMismatch {
                table: descriptor.table.clone(),
                message: "table already exists with a different schema".to_string(),
            });
        }
        for cols in column_sets {
            table.add_unique(&cols)?;
        }
        Ok(())
    }

    /// Number of `upsert_batch` calls received, successful or not.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored in `table` (zero for unknown tables).
    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .map(|t| t.get(table).map_or(0, |t| t.rows.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Table>>> {
        self.tables.lock().map_err(|_| StoreError::Unavailable {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables: Vec<String> = self
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MemoryStore")
            .field("tables", &tables)
            .field("upsert_calls", &self.upsert_calls())
            .finish()
    }
}

impl Store for MemoryStore {
    fn upsert_batch(&self, batch: &UpsertBatch<'_>) -> StoreResult<UpsertReport> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let table_name = &batch.descriptor.table;
        let mut tables = self.lock()?;
        let table = tables.get_mut(table_name).ok_or_else(|| StoreError::UnknownEntity {
            table: table_name.clone(),
        })?;
        table.check_schema(&batch.descriptor.schema)?;
        let arbiter = table.arbiter_for(batch.conflict)?;
        table.check_update_columns(batch.conflict, batch.update)?;
        for record in batch.records {
            table.check_record(record, batch.conflict)?;
        }

        let now = Utc::now();
        let next_id = table.next_id;
        let mut undo = Vec::with_capacity(batch.records.len());
        let mut report = UpsertReport::default();
        for record in batch.records {
            if let Err(e) = table.apply(arbiter, batch.update, record, now, &mut report, &mut undo) {
                table.rollback(undo, next_id);
                return Err(e);
            }
        }
        Ok(report)
    }

    fn find(&self, descriptor: &EntityDescriptor, filter: &Filter) -> StoreResult<Vec<StoredRecord>> {
        let tables = self.lock()?;
        let table = tables.get(&descriptor.table).ok_or_else(|| StoreError::UnknownEntity {
            table: descriptor.table.clone(),
        })?;

        let preds: Vec<(usize, &Value)> = match filter {
            Filter::All => Vec::new(),
            Filter::Eq(pairs) => pairs
                .iter()
                .map(|(column, value)| {
                    table
                        .schema
                        .index_of(column)
                        .map(|idx| (idx, value))
                        .ok_or_else(|| StoreError::UnknownColumn {
                            table: table.name.clone(),
                            column: column.clone(),
                        })
                })
                .collect::<StoreResult<_>>()?,
        };

        Ok(table
            .rows
            .values()
            .filter(|row| preds.iter().all(|(idx, v)| row.record.get(*idx) == Some(*v)))
            .cloned()
            .collect())
    }

    fn delete_by_id(&self, descriptor: &EntityDescriptor, id: u64) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let table = tables.get_mut(&descriptor.table).ok_or_else(|| StoreError::UnknownEntity {
            table: descriptor.table.clone(),
        })?;
        let row = table.rows.remove(&id).ok_or_else(|| StoreError::NotFound {
            table: table.name.clone(),
            id,
        })?;
        table.unindex(&row.record, id);
        Ok(())
    }
}

impl Table {
    fn new(name: &str, schema: Schema) -> Self {
        Self {
            name: name.to_string(),
            schema,
            uniques: Vec::new(),
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn add_unique(&mut self, columns: &[String]) -> StoreResult<()> {
        let idxs = columns
            .iter()
            .map(|c| {
                self.schema.index_of(c).ok_or_else(|| StoreError::UnknownColumn {
                    table: self.name.clone(),
                    column: c.clone(),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        if self.uniques.iter().any(|u| same_columns(&u.columns, &idxs)) {
            return Ok(());
        }

        let name = format!("uk_{}", columns.join("_"));
        let mut entries = HashMap::with_capacity(self.rows.len());
        for (id, row) in &self.rows {
            if entries.insert(row.record.project(&idxs), *id).is_some() {
                return Err(StoreError::ConstraintViolation {
                    table: self.name.clone(),
                    constraint: name,
                    message: "existing rows are not unique".to_string(),
                });
            }
        }
        self.uniques.push(UniqueIndex {
            name,
            columns: idxs,
            entries,
        });
        Ok(())
    }

    fn check_schema(&self, schema: &Schema) -> StoreResult<()> {
        if &self.schema != schema {
            return Err(StoreError::ShapeMismatch {
                table: self.name.clone(),
                message: "batch schema differs from table schema".to_string(),
            });
        }
        Ok(())
    }

    /// Position of the unique index whose column set equals `conflict`.
    fn arbiter_for(&self, conflict: &[usize]) -> StoreResult<usize> {
        self.uniques
            .iter()
            .position(|u| same_columns(&u.columns, conflict))
            .ok_or_else(|| StoreError::MissingUniqueConstraint {
                table: self.name.clone(),
                columns: conflict
                    .iter()
                    .filter_map(|&i| self.schema.fields.get(i).map(|f| f.name.clone()))
                    .collect(),
            })
    }

    fn check_record(&self, record: &Record, conflict: &[usize]) -> StoreResult<()> {
        let mismatch = |message: String| StoreError::ShapeMismatch {
            table: self.name.clone(),
            message,
        };
        if record.len() != self.schema.len() {
            return Err(mismatch(format!(
                "record has {} values, table has {} columns",
                record.len(),
                self.schema.len()
            )));
        }
        for (field, value) in self.schema.fields.iter().zip(&record.values) {
            if !value.fits(field.data_type) {
                return Err(mismatch(format!(
                    "column '{}' expects {:?}, got {value:?}",
                    field.name, field.data_type
                )));
            }
        }
        if conflict.iter().any(|&i| record.values[i] == Value::Null) {
            return Err(mismatch("null value in conflict column".to_string()));
        }
        Ok(())
    }

    /// Update positions must name non-key columns of the table.
    fn check_update_columns(&self, conflict: &[usize], update: &[usize]) -> StoreResult<()> {
        let invalid = |message: String| StoreError::InvalidPolicy {
            table: self.name.clone(),
            message,
        };
        for &i in update {
            if i >= self.schema.len() {
                return Err(invalid(format!(
                    "update position {i} is outside the {} table columns",
                    self.schema.len()
                )));
            }
            if conflict.contains(&i) {
                return Err(invalid(format!(
                    "update column '{}' is part of the conflict key",
                    self.schema.fields[i].name
                )));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        arbiter: usize,
        update: &[usize],
        record: &Record,
        now: DateTime<Utc>,
        report: &mut UpsertReport,
        undo: &mut Vec<Undo>,
    ) -> StoreResult<()> {
        let key = record.project(&self.uniques[arbiter].columns);
        let existing = self.uniques[arbiter].entries.get(&key).copied();

        match existing {
            Some(id) => {
                let (current, updated_at) = match self.rows.get(&id) {
                    Some(row) => (row.record.clone(), row.updated_at),
                    None => {
                        return Err(StoreError::Unavailable {
                            message: format!("index {} points at missing row {id}", self.uniques[arbiter].name),
                        });
                    }
                };
                let mut merged = current.clone();
                for &i in update {
                    merged.values[i] = record.values[i].clone();
                }
                if merged == current {
                    report.unchanged += 1;
                    return Ok(());
                }

                self.check_unique(&merged, Some(id))?;
                for idx in &mut self.uniques {
                    let old_key = current.project(&idx.columns);
                    let new_key = merged.project(&idx.columns);
                    if old_key != new_key {
                        idx.entries.remove(&old_key);
                        idx.entries.insert(new_key, id);
                    }
                }
                if let Some(row) = self.rows.get_mut(&id) {
                    row.record = merged;
                    row.updated_at = now;
                }
                undo.push(Undo::Updated {
                    id,
                    previous: current,
                    updated_at,
                });
                report.updated += 1;
            }
            None => {
                self.check_unique(record, None)?;
                let id = self.next_id;
                self.next_id += 1;
                for idx in &mut self.uniques {
                    idx.entries.insert(record.project(&idx.columns), id);
                }
                self.rows.insert(
                    id,
                    StoredRecord {
                        id,
                        record: record.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                undo.push(Undo::Inserted { id });
                report.inserted += 1;
            }
        }
        Ok(())
    }

    /// Revert `undo` newest first and restore the id sequence.
    fn rollback(&mut self, undo: Vec<Undo>, next_id: u64) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Inserted { id } => {
                    if let Some(row) = self.rows.remove(&id) {
                        self.unindex(&row.record, id);
                    }
                }
                Undo::Updated {
                    id,
                    previous,
                    updated_at,
                } => {
                    let Some(row) = self.rows.get_mut(&id) else {
                        continue;
                    };
                    let applied = std::mem::replace(&mut row.record, previous.clone());
                    row.updated_at = updated_at;
                    self.unindex(&applied, id);
                    for idx in &mut self.uniques {
                        idx.entries.insert(previous.project(&idx.columns), id);
                    }
                }
            }
        }
        self.next_id = next_id;
    }

    /// Drop the index entries of `record` that still point at `id`.
    fn unindex(&mut self, record: &Record, id: u64) {
        for idx in &mut self.uniques {
            let key = record.project(&idx.columns);
            if idx.entries.get(&key) == Some(&id) {
                idx.entries.remove(&key);
            }
        }
    }

    fn check_unique(&self, record: &Record, own_id: Option<u64>) -> StoreResult<()> {
        for idx in &self.uniques {
            if let Some(&other) = idx.entries.get(&record.project(&idx.columns)) {
                if Some(other) != own_id {
                    return Err(StoreError::ConstraintViolation {
                        table: self.name.clone(),
                        constraint: idx.name.clone(),
                        message: format!("duplicate key {:?}", record.project(&idx.columns)),
                    });
                }
            }
        }
        Ok(())
    }
}

fn same_columns(a: &[usize], b: &[usize]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::entity::{Entity, EntityDescriptor, UpsertPolicy};
    use crate::model::DailySaleSku;
    use crate::store::{Filter, Store, StoreError, UpsertBatch};
    use crate::types::{DataType, Field, Record, Schema, Value};

    fn sale(date: &str, sku: &str, n: i64) -> Record {
        DailySaleSku::new(date, sku, n).to_record()
    }

    fn upsert(store: &MemoryStore, d: &EntityDescriptor, records: &[Record]) -> Result<crate::store::UpsertReport, StoreError> {
        let p = d.resolve().unwrap();
        store.upsert_batch(&UpsertBatch {
            descriptor: d,
            conflict: &p.conflict,
            update: &p.update,
            records,
        })
    }

    #[test]
    fn insert_then_update_keeps_id_and_created_at() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();

        let first = upsert(&store, d, &[sale("2024-01-01", "ABC", 5)]).unwrap();
        assert_eq!(first.inserted, 1);
        let before = store.find(d, &Filter::All).unwrap();

        let second = upsert(&store, d, &[sale("2024-01-01", "ABC", 9)]).unwrap();
        assert_eq!(second.updated, 1);
        let after = store.find(d, &Filter::All).unwrap();

        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].created_at, before[0].created_at);
        assert_eq!(after[0].record.get(2), Some(&Value::Int64(9)));
        assert!(after[0].updated_at >= before[0].updated_at);
    }

    #[test]
    fn identical_replay_is_reported_unchanged() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();
        let batch = [sale("2024-01-01", "A", 1), sale("2024-01-01", "B", 2)];

        upsert(&store, d, &batch).unwrap();
        let before = store.find(d, &Filter::All).unwrap();
        let report = upsert(&store, d, &batch).unwrap();

        assert_eq!(report.unchanged, 2);
        assert_eq!((report.inserted, report.updated), (0, 0));
        assert_eq!(report.processed(), 2);
        assert_eq!(store.find(d, &Filter::All).unwrap(), before);
    }

    #[test]
    fn conflict_without_matching_unique_index_is_rejected() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();
        let err = store
            .upsert_batch(&UpsertBatch {
                descriptor: d,
                conflict: &[1],
                update: &[2],
                records: &[sale("2024-01-01", "A", 1)],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingUniqueConstraint { .. }));
    }

    #[test]
    fn bad_update_positions_are_rejected_and_the_store_stays_usable() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();
        upsert(&store, d, &[sale("2024-01-01", "A", 1)]).unwrap();

        for update in [&[7usize][..], &[1, 2][..]] {
            let err = store
                .upsert_batch(&UpsertBatch {
                    descriptor: d,
                    conflict: &[0, 1],
                    update,
                    records: &[sale("2024-01-01", "A", 2)],
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidPolicy { .. }), "update {update:?} gave {err:?}");
        }

        let rows = store.find(d, &Filter::All).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.get(2), Some(&Value::Int64(1)));
        assert_eq!(upsert(&store, d, &[sale("2024-01-01", "A", 3)]).unwrap().updated, 1);
    }

    #[test]
    fn secondary_constraint_violation_fails_whole_batch() {
        let schema = Schema::new(vec![
            Field::new("sku", DataType::Utf8),
            Field::new("bar_code", DataType::Utf8),
        ]);
        let d = EntityDescriptor::new("items", schema, UpsertPolicy::new(["sku"], ["bar_code"]));
        let store = MemoryStore::new();
        let bar_code: &[&str] = &["bar_code"];
        store.create_table(&d, &[bar_code]).unwrap();

        let row = |sku: &str, bar: &str| Record::new(vec![Value::text(sku), Value::text(bar)]);
        let err = upsert(&store, &d, &[row("A", "111"), row("B", "111")]).unwrap_err();

        assert!(matches!(err, StoreError::ConstraintViolation { ref constraint, .. } if constraint == "uk_bar_code"));
        assert_eq!(store.row_count("items"), 0);
    }

    #[test]
    fn failed_batch_reverts_updates_and_their_index_entries() {
        let schema = Schema::new(vec![
            Field::new("sku", DataType::Utf8),
            Field::new("bar_code", DataType::Utf8),
        ]);
        let d = EntityDescriptor::new("items", schema, UpsertPolicy::new(["sku"], ["bar_code"]));
        let store = MemoryStore::new();
        let bar_code: &[&str] = &["bar_code"];
        store.create_table(&d, &[bar_code]).unwrap();

        let row = |sku: &str, bar: &str| Record::new(vec![Value::text(sku), Value::text(bar)]);
        upsert(&store, &d, &[row("A", "111"), row("B", "222")]).unwrap();
        let before = store.find(&d, &Filter::All).unwrap();

        // A moves to 333, then C clashes with B on 222.
        let err = upsert(&store, &d, &[row("A", "333"), row("C", "222")]).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
        assert_eq!(store.find(&d, &Filter::All).unwrap(), before);

        // 333 is free again and 111 is still taken by A.
        let report = upsert(&store, &d, &[row("C", "333")]).unwrap();
        assert_eq!(report.inserted, 1);
        let err = upsert(&store, &d, &[row("D", "111")]).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));

        // The id sequence continues from the last committed insert.
        let ids: Vec<u64> = store.find(&d, &Filter::All).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn find_filters_and_delete_frees_the_key() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();
        upsert(
            &store,
            d,
            &[sale("2024-01-01", "A", 1), sale("2024-01-02", "A", 2), sale("2024-01-01", "B", 3)],
        )
        .unwrap();

        let day1 = store.find(d, &Filter::eq("sales_date", Value::text("2024-01-01"))).unwrap();
        assert_eq!(day1.len(), 2);
        let one = store
            .find(d, &Filter::eq("sales_date", Value::text("2024-01-01")).and("sku", Value::text("B")))
            .unwrap();
        assert_eq!(one.len(), 1);
        assert!(matches!(
            store.find(d, &Filter::eq("nope", Value::Null)),
            Err(StoreError::UnknownColumn { .. })
        ));

        store.delete_by_id(d, one[0].id).unwrap();
        assert!(matches!(store.delete_by_id(d, one[0].id), Err(StoreError::NotFound { .. })));
        let report = upsert(&store, d, &[sale("2024-01-01", "B", 4)]).unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn wrong_shape_is_rejected_before_anything_applies() {
        let store = MemoryStore::open_catalog().unwrap();
        let d = DailySaleSku::descriptor();
        let bad = Record::new(vec![Value::text("2024-01-01"), Value::text("A"), Value::text("x")]);
        let err = upsert(&store, d, &[sale("2024-01-01", "B", 1), bad]).unwrap_err();
        assert!(matches!(err, StoreError::ShapeMismatch { .. }));
        assert_eq!(store.row_count("daily_sales_sku"), 0);
    }
}

//! Store adapter seam.
//!
//! The reconciler talks to storage only through [`Store`]. A real deployment backs it with a
//! database whose `INSERT ... ON CONFLICT (<conflict columns>) DO UPDATE SET <update columns>`
//! statement provides the atomic upsert; [`MemoryStore`] is the in-process implementation used by
//! tests, benches, and embedders that do not need persistence.
//!
//! Contract for implementors:
//!
//! - each call is executed exactly once; there is no retry loop at this layer
//! - [`Store::upsert_batch`] is all-or-nothing: on `Err` no record of the batch is applied
//! - concurrent batches touching the same keys are serialized by the store, never by the caller
//! - `created_at`/`updated_at` are maintained here, not by the core

mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityDescriptor;
use crate::types::{Record, Value};

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connectivity loss or any other infrastructure failure.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// A uniqueness constraint other than the declared conflict key was violated.
    #[error("constraint '{constraint}' violated on {table}: {message}")]
    ConstraintViolation {
        table: String,
        constraint: String,
        message: String,
    },

    /// The conflict columns of an upsert do not match any unique constraint of the table.
    #[error("no unique constraint on {table} matches conflict columns {columns:?}")]
    MissingUniqueConstraint { table: String, columns: Vec<String> },

    #[error("unknown table '{table}'")]
    UnknownEntity { table: String },

    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },

    /// Record shape does not match the table.
    #[error("shape mismatch on {table}: {message}")]
    ShapeMismatch { table: String, message: String },

    #[error("{table} has no row with id {id}")]
    NotFound { table: String, id: u64 },

    #[error("invalid upsert policy for {table}: {message}")]
    InvalidPolicy { table: String, message: String },
}

/// One atomic upsert request.
///
/// `conflict` and `update` are field positions within `descriptor.schema`.
#[derive(Debug, Clone, Copy)]
pub struct UpsertBatch<'a> {
    pub descriptor: &'a EntityDescriptor,
    pub conflict: &'a [usize],
    pub update: &'a [usize],
    pub records: &'a [Record],
}

/// Per-batch outcome reported by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Keys that did not exist before the batch.
    pub inserted: usize,
    /// Existing keys whose update columns changed.
    pub updated: usize,
    /// Existing keys whose update columns already held the incoming values.
    pub unchanged: usize,
}

impl UpsertReport {
    /// Every key the batch applied, changed or not. Stable across replays of the same batch.
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Row selection for [`Store::find`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    /// Every `(column, value)` pair must match.
    Eq(Vec<(String, Value)>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::Eq(vec![(column.into(), value)])
    }

    pub fn and(self, column: impl Into<String>, value: Value) -> Self {
        let mut pairs = match self {
            Self::All => Vec::new(),
            Self::Eq(pairs) => pairs,
        };
        pairs.push((column.into(), value));
        Self::Eq(pairs)
    }
}

/// A record as persisted, with its surrogate id and storage-maintained timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub record: Record,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Keyed storage used by the reconciler.
pub trait Store: Send + Sync {
    /// Insert every record; for records whose conflict key already exists, overwrite only the
    /// update columns.
    fn upsert_batch(&self, batch: &UpsertBatch<'_>) -> StoreResult<UpsertReport>;

    /// Rows of `descriptor.table` matching `filter`, ordered by id.
    fn find(&self, descriptor: &EntityDescriptor, filter: &Filter) -> StoreResult<Vec<StoredRecord>>;

    /// Delete one row by surrogate id.
    fn delete_by_id(&self, descriptor: &EntityDescriptor, id: u64) -> StoreResult<()>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn upsert_batch(&self, batch: &UpsertBatch<'_>) -> StoreResult<UpsertReport> {
        (**self).upsert_batch(batch)
    }

    fn find(&self, descriptor: &EntityDescriptor, filter: &Filter) -> StoreResult<Vec<StoredRecord>> {
        (**self).find(descriptor, filter)
    }

    fn delete_by_id(&self, descriptor: &EntityDescriptor, id: u64) -> StoreResult<()> {
        (**self).delete_by_id(descriptor, id)
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn upsert_batch(&self, batch: &UpsertBatch<'_>) -> StoreResult<UpsertReport> {
        (**self).upsert_batch(batch)
    }

    fn find(&self, descriptor: &EntityDescriptor, filter: &Filter) -> StoreResult<Vec<StoredRecord>> {
        (**self).find(descriptor, filter)
    }

    fn delete_by_id(&self, descriptor: &EntityDescriptor, id: u64) -> StoreResult<()> {
        (**self).delete_by_id(descriptor, id)
    }
}

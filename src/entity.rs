//! Entity descriptors and per-entity upsert policies.
//!
//! An [`EntityDescriptor`] names the table, the stored [`Schema`], and the [`UpsertPolicy`]: which
//! fields form the natural key ("conflict columns") and which fields an incoming record overwrites
//! when its key already exists ("update columns"). The reconciler only ever reads the policy, so a
//! new entity type declares its own policy without touching reconciler code.

use crate::error::IngestResult;
use crate::store::{StoreError, StoreResult};
use crate::types::{Record, Schema};

/// Conflict/update column sets for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPolicy {
    conflict_columns: Vec<String>,
    update_columns: Vec<String>,
}

impl UpsertPolicy {
    /// Overwrite only `update` on conflict.
    ///
    /// An empty `update` list turns the upsert into insert-if-missing.
    pub fn new<C, U>(conflict: C, update: U) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        Self {
            conflict_columns: conflict.into_iter().map(Into::into).collect(),
            update_columns: update.into_iter().map(Into::into).collect(),
        }
    }

    /// Overwrite every non-key field of `schema` on conflict.
    pub fn full_overwrite<C>(schema: &Schema, conflict: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let conflict_columns: Vec<String> = conflict.into_iter().map(Into::into).collect();
        let update_columns = schema
            .field_names()
            .filter(|name| !conflict_columns.iter().any(|c| c == name))
            .map(str::to_string)
            .collect();
        Self {
            conflict_columns,
            update_columns,
        }
    }

    pub fn conflict_columns(&self) -> &[String] {
        &self.conflict_columns
    }

    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }
}

/// Policy resolved to field positions within a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub conflict: Vec<usize>,
    pub update: Vec<usize>,
}

/// Table name, stored shape, and upsert policy of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub table: String,
    pub schema: Schema,
    pub policy: UpsertPolicy,
}

impl EntityDescriptor {
    pub fn new(table: impl Into<String>, schema: Schema, policy: UpsertPolicy) -> Self {
        Self {
            table: table.into(),
            schema,
            policy,
        }
    }

    /// Check the policy against the schema and resolve column names to positions.
    ///
    /// The conflict set must be non-empty, every name must exist in the schema, no name may repeat,
    /// and no conflict column may also be an update column.
    pub fn resolve(&self) -> StoreResult<ResolvedPolicy> {
        let invalid = |message: String| StoreError::InvalidPolicy {
            table: self.table.clone(),
            message,
        };

        if self.policy.conflict_columns.is_empty() {
            return Err(invalid("conflict column set is empty".to_string()));
        }

        let mut seen: Vec<String> = Vec::new();
        let mut lookup = |name: &str| -> StoreResult<usize> {
            if seen.iter().any(|s| s == name) {
                return Err(invalid(format!("column '{name}' listed more than once")));
            }
            seen.push(name.to_string());
            self.schema
                .index_of(name)
                .ok_or_else(|| invalid(format!("unknown column '{name}'")))
        };

        let conflict = self
            .policy
            .conflict_columns
            .iter()
            .map(|c| lookup(c.as_str()))
            .collect::<StoreResult<Vec<_>>>()?;
        let update = self
            .policy
            .update_columns
            .iter()
            .map(|c| lookup(c.as_str()))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(ResolvedPolicy { conflict, update })
    }
}

/// A typed entity with a static descriptor and a positional record form.
pub trait Entity: Sized {
    fn descriptor() -> &'static EntityDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> IngestResult<Self>;
}

//! Catalog entities: [`Product`] (natural key `sku`) and [`DailySaleSku`] (natural key
//! `(sales_date, sku)`), plus [`Stored`], the shape a record takes once the store has assigned a
//! surrogate id and timestamps.

mod daily_sale_sku;
mod product;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::IngestResult;
use crate::store::StoredRecord;

pub use daily_sale_sku::DailySaleSku;
pub use product::Product;

/// A typed entity as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: u64,
    #[serde(flatten)]
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: Entity> Stored<T> {
    pub fn from_stored(stored: &StoredRecord) -> IngestResult<Self> {
        Ok(Self {
            id: stored.id,
            value: T::from_record(&stored.record)?,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}

pub(crate) fn check_arity(table: &str, expected: usize, record: &crate::types::Record) -> IngestResult<()> {
    if record.len() != expected {
        return Err(crate::error::IngestError::schema_mismatch(format!(
            "{table} record has {} values, schema has {expected} fields",
            record.len()
        )));
    }
    Ok(())
}

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityDescriptor, UpsertPolicy};
use crate::error::IngestResult;
use crate::types::{DataType, Field, Record, Schema, Value};

use super::check_arity;

/// One reported sales count for a SKU on a day, unique on `(sales_date, sku)`.
///
/// Only `sales_number` is overwritten on conflict; everything else the store keeps
/// (including the creation timestamp) stays as first written.
///
/// Absent JSON fields deserialize to their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySaleSku {
    pub sales_date: String,
    pub sku: String,
    pub sales_number: i64,
}

static DAILY_SALE_SKU: Lazy<EntityDescriptor> = Lazy::new(|| {
    let schema = Schema::new(vec![
        Field::new("sales_date", DataType::Utf8),
        Field::new("sku", DataType::Utf8),
        Field::new("sales_number", DataType::Int64),
    ]);
    EntityDescriptor::new(
        "daily_sales_sku",
        schema,
        UpsertPolicy::new(["sales_date", "sku"], ["sales_number"]),
    )
});

impl DailySaleSku {
    pub fn new(sales_date: impl Into<String>, sku: impl Into<String>, sales_number: i64) -> Self {
        Self {
            sales_date: sales_date.into(),
            sku: sku.into(),
            sales_number,
        }
    }
}

impl Entity for DailySaleSku {
    fn descriptor() -> &'static EntityDescriptor {
        &DAILY_SALE_SKU
    }

    fn to_record(&self) -> Record {
        Record::new(vec![
            Value::text(&self.sales_date),
            Value::text(&self.sku),
            Value::Int64(self.sales_number),
        ])
    }

    fn from_record(record: &Record) -> IngestResult<Self> {
        check_arity("daily_sales_sku", DAILY_SALE_SKU.schema.len(), record)?;
        Ok(Self {
            sales_date: record.text_at(0),
            sku: record.text_at(1),
            sales_number: record.int_at(2),
        })
    }
}

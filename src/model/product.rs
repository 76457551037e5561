use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityDescriptor, UpsertPolicy};
use crate::error::IngestResult;
use crate::types::{DataType, Field, Record, Schema, Value};

use super::check_arity;

/// A catalog product, unique on `sku`.
///
/// On conflict every other field of the incoming product replaces the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub shop_id: i64,
    pub shop_code: String,
    pub spu: String,
    pub skc: String,
    pub sku: String,
    pub skc_code: String,
    pub sku_code: String,
    pub color_cn: String,
    pub color_en: String,
    pub size: String,
    pub image_url: String,
    pub bar_code: String,
}

static PRODUCT: Lazy<EntityDescriptor> = Lazy::new(|| {
    let schema = Schema::new(vec![
        Field::new("shop_id", DataType::Int64),
        Field::new("shop_code", DataType::Utf8),
        Field::new("spu", DataType::Utf8),
        Field::new("skc", DataType::Utf8),
        Field::new("sku", DataType::Utf8),
        Field::new("skc_code", DataType::Utf8),
        Field::new("sku_code", DataType::Utf8),
        Field::new("color_cn", DataType::Utf8),
        Field::new("color_en", DataType::Utf8),
        Field::new("size", DataType::Utf8),
        Field::new("image_url", DataType::Utf8),
        Field::new("bar_code", DataType::Utf8),
    ]);
    let policy = UpsertPolicy::full_overwrite(&schema, ["sku"]);
    EntityDescriptor::new("products", schema, policy)
});

impl Entity for Product {
    fn descriptor() -> &'static EntityDescriptor {
        &PRODUCT
    }

    fn to_record(&self) -> Record {
        Record::new(vec![
            Value::Int64(self.shop_id),
            Value::text(&self.shop_code),
            Value::text(&self.spu),
            Value::text(&self.skc),
            Value::text(&self.sku),
            Value::text(&self.skc_code),
            Value::text(&self.sku_code),
            Value::text(&self.color_cn),
            Value::text(&self.color_en),
            Value::text(&self.size),
            Value::text(&self.image_url),
            Value::text(&self.bar_code),
        ])
    }

    fn from_record(record: &Record) -> IngestResult<Self> {
        check_arity("products", PRODUCT.schema.len(), record)?;
        Ok(Self {
            shop_id: record.int_at(0),
            shop_code: record.text_at(1),
            spu: record.text_at(2),
            skc: record.text_at(3),
            sku: record.text_at(4),
            skc_code: record.text_at(5),
            sku_code: record.text_at(6),
            color_cn: record.text_at(7),
            color_en: record.text_at(8),
            size: record.text_at(9),
            image_url: record.text_at(10),
            bar_code: record.text_at(11),
        })
    }
}

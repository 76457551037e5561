use std::sync::Arc;
use std::thread;
use std::time::Duration;

use catalog_reconcile::entity::Entity;
use catalog_reconcile::model::{DailySaleSku, Product};
use catalog_reconcile::response::IngestResponse;
use catalog_reconcile::store::{MemoryStore, StoreError};
use catalog_reconcile::{IngestError, Ingestor};
use rayon::prelude::*;

fn catalog() -> Ingestor<MemoryStore> {
    Ingestor::new(MemoryStore::open_catalog().unwrap())
}

fn product(sku: &str, color_cn: &str, size: &str) -> Product {
    Product {
        shop_id: 1,
        shop_code: "SH01".to_string(),
        spu: "SPU1".to_string(),
        skc: "SKC1".to_string(),
        sku: sku.to_string(),
        color_cn: color_cn.to_string(),
        size: size.to_string(),
        bar_code: format!("BC-{sku}"),
        ..Default::default()
    }
}

#[test]
fn replaying_a_batch_changes_nothing() {
    let ingestor = catalog();
    let batch = vec![
        DailySaleSku::new("2024-01-01", "A", 1),
        DailySaleSku::new("2024-01-01", "B", 2),
    ];

    let first = ingestor.ingest_daily_sales(&batch).unwrap();
    let before = ingestor.find_daily_sales("2024-01-01").unwrap();
    let second = ingestor.ingest_daily_sales(&batch).unwrap();
    let after = ingestor.find_daily_sales("2024-01-01").unwrap();

    assert_eq!(first.reconciled.inserted, 2);
    assert_eq!(second.reconciled.inserted, 0);
    assert_eq!(second.reconciled.updated, 0);
    assert_eq!(second.reconciled.unchanged, 2);
    assert_eq!(first.processed(), second.processed());
    assert_eq!(before, after);
}

#[test]
fn natural_keys_stay_unique_across_batches() {
    let ingestor = catalog();
    for n in 0..5 {
        ingestor
            .ingest_daily_sales(&[
                DailySaleSku::new("2024-01-01", "A", n),
                DailySaleSku::new("2024-01-02", "A", n),
            ])
            .unwrap();
    }
    assert_eq!(ingestor.store().row_count("daily_sales_sku"), 2);
    assert_eq!(ingestor.find_daily_sales("2024-01-01").unwrap()[0].value.sales_number, 4);
}

#[test]
fn partial_field_upsert_keeps_id_and_created_at() {
    let ingestor = catalog();
    ingestor
        .ingest_daily_sales(&[DailySaleSku::new("2024-01-01", "A", 5)])
        .unwrap();
    let before = ingestor.find_daily_sales("2024-01-01").unwrap().remove(0);

    thread::sleep(Duration::from_millis(5));
    let out = ingestor
        .ingest_daily_sales(&[DailySaleSku::new("2024-01-01", "A", 8)])
        .unwrap();
    let after = ingestor.find_daily_sales("2024-01-01").unwrap().remove(0);

    assert_eq!(out.reconciled.updated, 1);
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
    assert_eq!(after.value.sales_number, 8);
}

#[test]
fn full_field_upsert_overwrites_every_non_key_field() {
    let ingestor = catalog();
    ingestor.ingest_products(&[product("SKU-1", "红", "S")]).unwrap();
    let before = ingestor.list_products().unwrap().remove(0);

    ingestor.ingest_products(&[product("SKU-1", "蓝", "M")]).unwrap();
    let products = ingestor.list_products().unwrap();

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, before.id);
    assert_eq!(products[0].created_at, before.created_at);
    assert_eq!(products[0].value.color_cn, "蓝");
    assert_eq!(products[0].value.size, "M");
}

#[test]
fn empty_batch_never_calls_the_store() {
    let ingestor = catalog();

    let err = ingestor.ingest_products(&[]).unwrap_err();
    assert!(matches!(err, IngestError::EmptyBatch));
    let err = ingestor.ingest_daily_sales(&[]).unwrap_err();
    assert!(matches!(err, IngestError::EmptyBatch));

    assert_eq!(ingestor.store().upsert_calls(), 0);
}

#[test]
fn in_batch_collision_is_collapsed_before_the_store() {
    let ingestor = catalog();
    let out = ingestor
        .ingest_products(&[
            product("SKU-1", "红", "S"),
            product("SKU-2", "绿", "S"),
            product("SKU-1", "蓝", "M"),
        ])
        .unwrap();

    assert_eq!(out.processed(), 2);
    assert_eq!(out.reconciled.collapsed, 1);
    assert_eq!(ingestor.store().upsert_calls(), 1);

    let products = ingestor.list_products().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].value.sku, "SKU-1");
    assert_eq!(products[0].value.color_cn, "蓝");
}

#[test]
fn concurrent_batches_on_the_same_keys_leave_one_row_per_key() {
    let ingestor = Ingestor::new(Arc::new(MemoryStore::open_catalog().unwrap()));

    (0..16i64).into_par_iter().for_each(|n| {
        ingestor
            .ingest_daily_sales(&[
                DailySaleSku::new("2024-01-01", "A", n),
                DailySaleSku::new("2024-01-01", "B", n),
            ])
            .unwrap();
    });

    assert_eq!(ingestor.store().upsert_calls(), 16);
    assert_eq!(ingestor.store().row_count("daily_sales_sku"), 2);
    let day = ingestor.find_daily_sales("2024-01-01").unwrap();
    assert_eq!(day.len(), 2);
    assert!(day.iter().all(|s| (0..16).contains(&s.value.sales_number)));
}

#[test]
fn delete_product_frees_the_key() {
    let ingestor = catalog();
    ingestor.ingest_products(&[product("SKU-1", "红", "S")]).unwrap();
    let id = ingestor.list_products().unwrap()[0].id;

    ingestor.delete_product(id).unwrap();
    assert!(ingestor.list_products().unwrap().is_empty());

    let err = ingestor.delete_product(id).unwrap_err();
    assert!(matches!(err, IngestError::Storage(StoreError::NotFound { .. })));
    assert_eq!(IngestResponse::deleted(&Err(err)).status, 404);

    ingestor.ingest_products(&[product("SKU-1", "蓝", "M")]).unwrap();
    let products = ingestor.list_products().unwrap();
    assert_eq!(products.len(), 1);
    assert_ne!(products[0].id, id);
}

#[test]
fn secondary_unique_violation_fails_the_whole_batch() {
    let store = MemoryStore::new();
    let bar_code: &[&str] = &["bar_code"];
    store.create_table(Product::descriptor(), &[bar_code]).unwrap();
    let ingestor = Ingestor::new(store);

    let mut clash = product("SKU-2", "绿", "S");
    clash.bar_code = "BC-SKU-1".to_string();
    let err = ingestor
        .ingest_products(&[product("SKU-1", "红", "S"), clash])
        .unwrap_err();

    assert!(matches!(err, IngestError::Storage(StoreError::ConstraintViolation { .. })));
    assert_eq!(ingestor.store().row_count("products"), 0);
    assert_eq!(IngestResponse::products(&Err(err)).status, 500);
}

#[test]
fn unknown_table_surfaces_as_storage_error() {
    let ingestor = Ingestor::new(MemoryStore::new());
    let err = ingestor
        .ingest_daily_sales(&[DailySaleSku::new("2024-01-01", "A", 1)])
        .unwrap_err();
    assert!(matches!(err, IngestError::Storage(StoreError::UnknownEntity { .. })));
}

#[test]
fn success_envelopes_match_the_endpoints() {
    let ingestor = catalog();
    let sales = ingestor.ingest_daily_sales_json(r#"[{"sales_date":"2024-01-01","sku":"A","sales_number":1}]"#);
    let resp = IngestResponse::daily_sales(&sales);
    assert_eq!(resp.status, 201);
    assert_eq!(resp.message, "Successfully saved or updated sales data.");
    assert_eq!(resp.records_processed, Some(1));

    let products = ingestor.ingest_products(&[product("SKU-1", "红", "S"), product("SKU-2", "蓝", "M")]);
    let resp = IngestResponse::products(&products);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.message, "Successfully processed 2 products.");
}

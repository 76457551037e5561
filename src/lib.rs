//! `catalog-reconcile` merges batches of product and daily-sales data into a keyed catalog store
//! with idempotent insert-or-update ("upsert") semantics.
//!
//! Records are identified by natural business keys rather than by the store's surrogate id:
//!
//! - [`model::Product`] is unique on `sku`; on conflict every other field is overwritten
//! - [`model::DailySaleSku`] is unique on `(sales_date, sku)`; on conflict only `sales_number` is
//!   overwritten and the rest of the stored row (creation timestamp included) is kept
//!
//! ## Pipeline
//!
//! ```text
//! raw rows ──► normalize ──► dedupe ──► reconcile ──► Store::upsert_batch
//!              (per row)     (last       (one atomic
//!                            wins)        call)
//! ```
//!
//! - [`normalize`]: text cells → typed [`types::Record`] through a versioned
//!   [`normalize::SheetLayout`]; bad rows become [`normalize::RowRejection`]s, not errors
//! - [`dedupe`]: collapses records with the same natural key, keeping the last
//! - [`reconcile`]: rejects empty batches, then hands one batch to the store under the entity's
//!   [`entity::UpsertPolicy`]
//! - [`store`]: the [`store::Store`] seam plus [`store::MemoryStore`]
//!
//! ## Ingestion boundaries
//!
//! - **JSON**: an array of `{sales_date, sku, sales_number}` objects
//! - **Spreadsheets**: CSV (`.csv`) and, with the `excel` feature (on by default), workbooks
//!   (`.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`). The first row of each sheet is a header.
//!
//! ## Quick example
//!
//! ```rust
//! use catalog_reconcile::store::MemoryStore;
//! use catalog_reconcile::Ingestor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::new(MemoryStore::open_catalog()?);
//!
//! let body = r#"[
//!     {"sales_date": "2024-01-01", "sku": "ABC", "sales_number": 5},
//!     {"sales_date": "2024-01-01", "sku": "ABC", "sales_number": 9}
//! ]"#;
//! let out = ingestor.ingest_daily_sales_json(body)?;
//! assert_eq!(out.processed(), 1);
//!
//! let day = ingestor.find_daily_sales("2024-01-01")?;
//! assert_eq!(day[0].value.sales_number, 9);
//! # Ok(())
//! # }
//! ```
//!
//! ## Product uploads
//!
//! ```no_run
//! use catalog_reconcile::store::MemoryStore;
//! use catalog_reconcile::Ingestor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::new(MemoryStore::open_catalog()?);
//! let bytes = std::fs::read("products.xlsx")?;
//! let out = ingestor.ingest_product_upload("products.xlsx", &bytes)?;
//! for skipped in &out.rejected {
//!     eprintln!("{skipped}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: JSON/CSV/Excel readers, options, observers
//! - [`model`]: catalog entities
//! - [`entity`]: entity descriptors and upsert policies
//! - [`response`]: `{success, message, records_processed}` envelope for transport layers
//! - [`error`]: error types

pub mod dedupe;
pub mod entity;
pub mod error;
pub mod ingestion;
pub mod ingestor;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod response;
pub mod store;
pub mod types;

pub use error::{IngestError, IngestResult};
pub use ingestor::{BatchOutcome, Ingestor};

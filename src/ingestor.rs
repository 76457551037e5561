//! Batch entry points: bind or normalize input, reconcile it, report to the observer.

use std::fmt;
use std::path::Path;

use crate::entity::{Entity, EntityDescriptor};
use crate::error::{IngestError, IngestResult};
use crate::ingestion::json::parse_daily_sales_from_str;
use crate::ingestion::unified::{read_sheet_rows_from_bytes, read_sheet_rows_from_path};
use crate::ingestion::{
    IngestOptions, IngestionContext, IngestionFormat, IngestionSeverity, IngestionStats, SheetFormat, SheetRows,
};
use crate::model::{DailySaleSku, Product, Stored};
use crate::normalize::{Normalized, RowRejection};
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::store::{Filter, Store};
use crate::types::{Record, Value};

/// Outcome of one accepted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub reconciled: ReconcileOutcome,
    /// Spreadsheet rows skipped by the normalizer. Always empty on the JSON path.
    pub rejected: Vec<RowRejection>,
}

impl BatchOutcome {
    /// Distinct keys applied to the store.
    pub fn processed(&self) -> usize {
        self.reconciled.processed
    }
}

/// Ingestion front door bound to an explicitly constructed store handle.
///
/// The ingestor owns no mutable state; share it across threads (e.g. behind an `Arc`) when `S` is
/// shareable. Concurrent batches for the same keys are serialized by the store.
pub struct Ingestor<S> {
    store: S,
    options: IngestOptions,
}

impl<S> fmt::Debug for Ingestor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor").field("options", &self.options).finish_non_exhaustive()
    }
}

impl<S: Store> Ingestor<S> {
    /// Create an ingestor with default options.
    pub fn new(store: S) -> Self {
        Self::with_options(store, IngestOptions::default())
    }

    pub fn with_options(store: S, options: IngestOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest a JSON daily sales report (array of `{sales_date, sku, sales_number}`).
    ///
    /// Binding failures surface as [`IngestError::Validation`]; an empty array as
    /// [`IngestError::EmptyBatch`]. Neither reaches the store.
    pub fn ingest_daily_sales_json(&self, body: &str) -> IngestResult<BatchOutcome> {
        let ctx = context("json", IngestionFormat::Json, DailySaleSku::descriptor());
        let result = parse_daily_sales_from_str(body).and_then(|sales| self.reconcile_entities(&sales));
        self.finish(&ctx, result)
    }

    /// Ingest already-typed daily sales records.
    pub fn ingest_daily_sales(&self, sales: &[DailySaleSku]) -> IngestResult<BatchOutcome> {
        let ctx = context("records", IngestionFormat::Records, DailySaleSku::descriptor());
        let result = self.reconcile_entities(sales);
        self.finish(&ctx, result)
    }

    /// Ingest already-typed products.
    pub fn ingest_products(&self, products: &[Product]) -> IngestResult<BatchOutcome> {
        let ctx = context("records", IngestionFormat::Records, Product::descriptor());
        let result = self.reconcile_entities(products);
        self.finish(&ctx, result)
    }

    /// Ingest an uploaded product sheet held in memory.
    ///
    /// The format comes from [`IngestOptions::sheet_format`] or, if unset, from `file_name`'s
    /// extension.
    pub fn ingest_product_upload(&self, file_name: &str, bytes: &[u8]) -> IngestResult<BatchOutcome> {
        let format = match self.sheet_format_for(Path::new(file_name)) {
            Ok(f) => f,
            Err(e) => {
                let ctx = context(file_name, IngestionFormat::Excel, Product::descriptor());
                return self.finish(&ctx, Err(e));
            }
        };
        let ctx = context(file_name, ingestion_format(format), Product::descriptor());
        let result = read_sheet_rows_from_bytes(bytes, format, &self.options.sheet_selection)
            .and_then(|sheets| self.reconcile_product_sheets(&ctx, sheets));
        self.finish(&ctx, result)
    }

    /// Ingest a product sheet from disk.
    pub fn ingest_product_sheet_from_path(&self, path: impl AsRef<Path>) -> IngestResult<BatchOutcome> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let format = match self.sheet_format_for(path) {
            Ok(f) => f,
            Err(e) => {
                let ctx = context(&source, IngestionFormat::Excel, Product::descriptor());
                return self.finish(&ctx, Err(e));
            }
        };
        let ctx = context(&source, ingestion_format(format), Product::descriptor());
        let result = read_sheet_rows_from_path(path, format, &self.options.sheet_selection)
            .and_then(|sheets| self.reconcile_product_sheets(&ctx, sheets));
        self.finish(&ctx, result)
    }

    /// Ingest product rows produced by any sheet reader.
    ///
    /// The first [`IngestOptions::header_rows`] rows of each sheet are skipped. Rows that fail
    /// normalization are skipped and reported; if none survive the batch fails with
    /// [`IngestError::NoValidRows`].
    pub fn ingest_product_rows(&self, source: &str, sheets: Vec<SheetRows>) -> IngestResult<BatchOutcome> {
        let ctx = context(source, IngestionFormat::Records, Product::descriptor());
        let result = self.reconcile_product_sheets(&ctx, sheets);
        self.finish(&ctx, result)
    }

    /// Every stored product, ordered by id.
    pub fn list_products(&self) -> IngestResult<Vec<Stored<Product>>> {
        self.find_typed(&Filter::All)
    }

    /// Delete a product by surrogate id.
    pub fn delete_product(&self, id: u64) -> IngestResult<()> {
        self.store.delete_by_id(Product::descriptor(), id)?;
        Ok(())
    }

    /// Stored sales rows for one day, ordered by id.
    pub fn find_daily_sales(&self, sales_date: &str) -> IngestResult<Vec<Stored<DailySaleSku>>> {
        self.find_typed(&Filter::eq("sales_date", Value::text(sales_date)))
    }

    fn find_typed<T: Entity>(&self, filter: &Filter) -> IngestResult<Vec<Stored<T>>> {
        self.store
            .find(T::descriptor(), filter)?
            .iter()
            .map(Stored::<T>::from_stored)
            .collect()
    }

    fn sheet_format_for(&self, path: &Path) -> IngestResult<SheetFormat> {
        match self.options.sheet_format {
            Some(f) => Ok(f),
            None => SheetFormat::infer(path),
        }
    }

    fn reconcile_entities<T: Entity>(&self, items: &[T]) -> IngestResult<BatchOutcome> {
        let records: Vec<Record> = items.iter().map(T::to_record).collect();
        let reconciled = reconcile(&self.store, T::descriptor(), records)?;
        Ok(BatchOutcome {
            reconciled,
            rejected: Vec::new(),
        })
    }

    fn reconcile_product_sheets(&self, ctx: &IngestionContext, sheets: Vec<SheetRows>) -> IngestResult<BatchOutcome> {
        let normalizer = self.options.product_layout.bind(Product::descriptor())?;

        let mut all = Normalized::default();
        for sheet in sheets {
            let mut part = normalizer.normalize_rows(
                &sheet.name,
                sheet.rows,
                self.options.header_rows,
                self.options.numeric_fallback,
            );
            all.records.append(&mut part.records);
            all.rejected.append(&mut part.rejected);
        }

        if let Some(obs) = self.options.observer.as_ref() {
            for r in &all.rejected {
                obs.on_row_rejected(ctx, r);
            }
        }
        if all.records.is_empty() {
            return Err(IngestError::NoValidRows {
                rejected: all.rejected.len(),
            });
        }

        let reconciled = reconcile(&self.store, Product::descriptor(), all.records)?;
        Ok(BatchOutcome {
            reconciled,
            rejected: all.rejected,
        })
    }

    fn finish(&self, ctx: &IngestionContext, result: IngestResult<BatchOutcome>) -> IngestResult<BatchOutcome> {
        if let Some(obs) = self.options.observer.as_ref() {
            match &result {
                Ok(out) => obs.on_success(
                    ctx,
                    IngestionStats {
                        processed: out.reconciled.processed,
                        inserted: out.reconciled.inserted,
                        updated: out.reconciled.updated,
                        collapsed: out.reconciled.collapsed,
                        rejected: out.rejected.len(),
                    },
                ),
                Err(e) => {
                    let sev = IngestionSeverity::for_error(e);
                    obs.on_failure(ctx, sev, e);
                    if sev >= self.options.alert_at_or_above {
                        obs.on_alert(ctx, sev, e);
                    }
                }
            }
        }
        result
    }
}

fn context(source: &str, format: IngestionFormat, descriptor: &EntityDescriptor) -> IngestionContext {
    IngestionContext {
        source: source.to_string(),
        format,
        table: descriptor.table.clone(),
    }
}

fn ingestion_format(format: SheetFormat) -> IngestionFormat {
    match format {
        SheetFormat::Csv => IngestionFormat::Csv,
        SheetFormat::Excel => IngestionFormat::Excel,
    }
}

//! Ingestion boundaries and their plumbing.
//!
//! Most callers should go through [`crate::Ingestor`], which wires these pieces to the normalizer
//! and the reconciler. Format-specific readers are also available under:
//! - [`json`]: daily sales reports
//! - [`csv`]: CSV sheet rows
//! - `excel`: workbook sheet rows (feature `excel`)

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod observability;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionFormat, IngestionObserver, IngestionSeverity,
    IngestionStats, StdErrObserver,
};
pub use unified::{
    read_sheet_rows_from_bytes, read_sheet_rows_from_path, IngestOptions, SheetFormat, SheetRows, SheetSelection,
};

//! Sheet format detection and unified sheet reading.
//!
//! Uploads arrive either as a path or as raw bytes. If [`IngestOptions::sheet_format`] is `None`,
//! the format is inferred from the file extension (for paths) or the uploaded file name (for
//! bytes).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{IngestError, IngestResult};
use crate::normalize::{NumericFallback, SheetLayout};

use super::csv;
use super::observability::{IngestionObserver, IngestionSeverity};

/// Supported spreadsheet upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// Comma-separated values.
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl SheetFormat {
    /// Parse a sheet format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Infer the format from a path or file name.
    pub fn infer(path: &Path) -> IngestResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                IngestError::validation(format!(
                    "cannot infer sheet format: no extension ({})",
                    path.display()
                ))
            })?;
        Self::from_extension(ext).ok_or_else(|| {
            IngestError::validation(format!(
                "unsupported sheet format '{ext}' ({})",
                path.display()
            ))
        })
    }
}

/// How to choose sheet(s) when reading a workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SheetSelection {
    /// Read the first sheet (default).
    #[default]
    First,
    /// Read a single named sheet.
    Sheet(String),
    /// Read every sheet in workbook order.
    AllSheets,
    /// Read only the listed sheets, in order.
    Sheets(Vec<String>),
}

/// All rows of one sheet as raw text cells, header row included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRows {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Options controlling ingestion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestOptions {
    /// If `None`, infer the upload format from its extension.
    pub sheet_format: Option<SheetFormat>,
    /// Workbook sheets to read. Ignored for CSV.
    pub sheet_selection: SheetSelection,
    /// Leading rows of each sheet to skip before data.
    pub header_rows: usize,
    /// Treatment of numeric cells that do not parse.
    pub numeric_fallback: NumericFallback,
    /// Positional layout of product upload sheets.
    pub product_layout: SheetLayout,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestOptions")
            .field("sheet_format", &self.sheet_format)
            .field("sheet_selection", &self.sheet_selection)
            .field("header_rows", &self.header_rows)
            .field("numeric_fallback", &self.numeric_fallback)
            .field("product_layout", &format!("{} v{}", self.product_layout.name, self.product_layout.version))
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            sheet_format: None,
            sheet_selection: SheetSelection::default(),
            header_rows: 1,
            numeric_fallback: NumericFallback::default(),
            product_layout: SheetLayout::product_v1(),
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Read the sheet(s) of an upload on disk.
pub fn read_sheet_rows_from_path(
    path: impl AsRef<Path>,
    format: SheetFormat,
    selection: &SheetSelection,
) -> IngestResult<Vec<SheetRows>> {
    let path = path.as_ref();
    match format {
        SheetFormat::Csv => Ok(vec![csv::read_csv_rows_from_path(path)?]),
        SheetFormat::Excel => read_excel_dispatch(ExcelSource::Path(path), selection),
    }
}

/// Read the sheet(s) of an upload held in memory.
pub fn read_sheet_rows_from_bytes(
    bytes: &[u8],
    format: SheetFormat,
    selection: &SheetSelection,
) -> IngestResult<Vec<SheetRows>> {
    match format {
        SheetFormat::Csv => Ok(vec![csv::read_csv_rows_from_reader("csv", bytes)?]),
        SheetFormat::Excel => read_excel_dispatch(ExcelSource::Bytes(bytes), selection),
    }
}

enum ExcelSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

fn read_excel_dispatch(source: ExcelSource<'_>, selection: &SheetSelection) -> IngestResult<Vec<SheetRows>> {
    // Avoid unused warnings when the feature is off.
    let _ = (&source, selection);

    #[cfg(feature = "excel")]
    {
        use super::excel;

        match source {
            ExcelSource::Path(p) => excel::read_excel_rows_from_path(p, selection),
            ExcelSource::Bytes(b) => excel::read_excel_rows_from_bytes(b, selection),
        }
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(IngestError::validation(
            "excel ingestion not enabled (enable cargo feature 'excel')",
        ))
    }
}

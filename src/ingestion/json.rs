//! JSON boundary for daily sales reports.
//!
//! Accepted input is a JSON array of objects:
//!
//! ```json
//! [{"sales_date": "2024-01-01", "sku": "ABC", "sales_number": 5}]
//! ```
//!
//! Records are bound straight into [`DailySaleSku`]; there is no positional normalization on this
//! path. Absent fields bind to their zero value (empty string, `0`). A body that is not an array of
//! such objects, or a field of the wrong JSON type, rejects the whole request.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{IngestError, IngestResult};
use crate::model::DailySaleSku;

/// Parse a daily sales report from a file.
pub fn parse_daily_sales_from_path(path: impl AsRef<Path>) -> IngestResult<Vec<DailySaleSku>> {
    let text = fs::read_to_string(path)?;
    parse_daily_sales_from_str(&text)
}

/// Parse a daily sales report from any reader (e.g. a request body).
pub fn parse_daily_sales_from_reader(mut reader: impl Read) -> IngestResult<Vec<DailySaleSku>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_daily_sales_from_str(&text)
}

/// Parse a daily sales report from an in-memory string.
///
/// An empty array parses successfully; rejecting it is the reconciler's job so that the caller
/// sees [`IngestError::EmptyBatch`] rather than a binding error.
pub fn parse_daily_sales_from_str(input: &str) -> IngestResult<Vec<DailySaleSku>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IngestError::validation("request body is empty"));
    }

    serde_json::from_str(trimmed).map_err(|e| IngestError::validation(e.to_string()))
}

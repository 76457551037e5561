//! Structured outcome envelope for transport layers.
//!
//! Every batch result maps to `{success, message, records_processed?}` plus an HTTP status hint,
//! so a thin HTTP (or queue) adapter can forward it without inspecting error variants.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::ingestor::BatchOutcome;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    /// Human-readable skip diagnostics for spreadsheet rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rows: Vec<String>,
    #[serde(skip)]
    pub status: u16,
}

impl IngestResponse {
    /// Envelope for the daily sales JSON endpoint (`201 Created` on success).
    pub fn daily_sales(result: &IngestResult<BatchOutcome>) -> Self {
        match result {
            Ok(out) => Self::ok(201, "Successfully saved or updated sales data.".to_string(), out),
            Err(e) => Self::from_error(e),
        }
    }

    /// Envelope for the product upload endpoint (`200 OK` on success).
    pub fn products(result: &IngestResult<BatchOutcome>) -> Self {
        match result {
            Ok(out) => Self::ok(200, format!("Successfully processed {} products.", out.processed()), out),
            Err(e) => Self::from_error(e),
        }
    }

    /// Envelope for the product delete endpoint.
    pub fn deleted(result: &IngestResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                message: "Product deleted.".to_string(),
                records_processed: Some(1),
                skipped_rows: Vec::new(),
                status: 200,
            },
            Err(e) => Self::from_error(e),
        }
    }

    pub fn from_error(err: &IngestError) -> Self {
        let message = match err {
            IngestError::EmptyBatch => "Received an empty batch.".to_string(),
            IngestError::Storage(e) => format!("Failed to save or update data: {e}"),
            other => other.to_string(),
        };
        Self {
            success: false,
            message,
            records_processed: None,
            skipped_rows: Vec::new(),
            status: status_for(err),
        }
    }

    fn ok(status: u16, message: String, out: &BatchOutcome) -> Self {
        Self {
            success: true,
            message,
            records_processed: Some(out.processed()),
            skipped_rows: out.rejected.iter().map(ToString::to_string).collect(),
            status,
        }
    }
}

fn status_for(err: &IngestError) -> u16 {
    match err {
        IngestError::Storage(StoreError::NotFound { .. }) => 404,
        e if e.is_client_error() => 400,
        _ => 500,
    }
}

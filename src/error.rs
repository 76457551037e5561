use thiserror::Error;

use crate::store::StoreError;

/// Convenience result type for ingestion and reconciliation.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by the ingestion entry points and the reconciler.
///
/// Row-level defects on the spreadsheet path are not errors; they are collected as
/// [`crate::normalize::RowRejection`] diagnostics and the batch continues.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Workbook could not be opened or read (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV upload could not be read.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The request body has the wrong shape (JSON binding failure, blank key field, ...).
    ///
    /// The batch is not attempted.
    #[error("invalid request data: {message}")]
    Validation { message: String },

    /// Input or configuration does not line up with the entity schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A batch with zero records was submitted. No storage call is issued.
    #[error("received an empty batch")]
    EmptyBatch,

    /// Every data row of an upload was rejected by the normalizer.
    #[error("no valid rows found ({rejected} rejected)")]
    NoValidRows { rejected: usize },

    /// The store failed the batch. Nothing from the batch was applied.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl IngestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// True for failures caused by the submitted input rather than by infrastructure.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::EmptyBatch | Self::NoValidRows { .. } | Self::Csv(_) => true,
            #[cfg(feature = "excel")]
            Self::Excel(_) => true,
            Self::Storage(StoreError::NotFound { .. }) => true,
            Self::Io(_) | Self::SchemaMismatch { .. } | Self::Storage(_) => false,
        }
    }
}

//! Processing Error Types
//!
//! The error taxonomy for file processing. Fatal conditions are variants of
//! [`ProcessingError`]; per-row conditions that leave the run alive are
//! [`Warning`] values collected on the `ProcessingResult`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate processing of a file (or, for configuration
/// errors at startup, the whole process).
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Configuration document failed to load or parse
    #[error("configuration error in {file}: {message}")]
    Config { file: String, message: String },

    /// A supplier configuration failed validation at load time
    #[error("invalid configuration for supplier '{supplier}', column {column}, action {action}: {message}")]
    Validation {
        supplier: String,
        column: String,
        action: usize,
        message: String,
    },

    /// The input file could not be read
    #[error("file error for {}: {cause}", path.display())]
    File { path: PathBuf, cause: String },

    /// No supplier's detection patterns matched the file name
    #[error("no supplier configuration matches file {}", path.display())]
    SupplierNotDetected { path: PathBuf },

    /// The offer for this supplier/file pair already exists; nothing was written
    #[error("offer '{offer_name}' already exists for supplier '{supplier}'")]
    DuplicateOffer { supplier: String, offer_name: String },

    /// The store transaction failed and was rolled back
    #[error("transaction failed: {cause}")]
    Transaction { cause: String },

    /// Processing was canceled; the transaction was rolled back
    #[error("processing was canceled")]
    Canceled,

    /// The request itself was invalid (relative path, unknown extension, ...)
    #[error("{message}")]
    Argument { message: String },
}

impl ProcessingError {
    /// Short tag used in CLI output and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            ProcessingError::Config { .. } => "ConfigError",
            ProcessingError::Validation { .. } => "ValidationError",
            ProcessingError::File { .. } => "FileError",
            ProcessingError::SupplierNotDetected { .. } => "SupplierNotDetected",
            ProcessingError::DuplicateOffer { .. } => "DuplicateOffer",
            ProcessingError::Transaction { .. } => "TransactionError",
            ProcessingError::Canceled => "Canceled",
            ProcessingError::Argument { .. } => "ArgumentError",
        }
    }
}

/// Per-row conditions reported on the processing result.
///
/// Warnings never abort a run: a failed action skips that action, a dropped
/// row skips that row, and everything after continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An action raised an error at execution time (for example a pattern
    /// that no longer compiles after a hot reload). The action is skipped.
    ActionFailed {
        row: usize,
        column: String,
        op: String,
        cause: String,
    },

    /// The row produced no usable product and was excluded from the upsert.
    RowDropped { row: usize, reason: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ActionFailed {
                row,
                column,
                op,
                cause,
            } => write!(f, "row {row}, column {column}: {op} failed: {cause}"),
            Warning::RowDropped { row, reason } => write!(f, "row {row} dropped: {reason}"),
        }
    }
}

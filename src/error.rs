use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures surfaced by the ingestion engine.
///
/// Structural problems (bad path, unreadable file, missing spreadsheet support)
/// are returned to the caller. Sidecar and per-column failures are constructed
/// so they can be logged, but the loader absorbs them and keeps going.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No dataset path was provided")]
    PathEmpty,

    #[error("Dataset file {0:?} does not exist")]
    FileNotFound(PathBuf),

    #[error("Reading {format} files is not available in this build: {hint}")]
    UnsupportedFormatDependencyMissing { format: String, hint: String },

    #[error("Could not read {path:?} after {attempts} attempt(s): {last_error}")]
    AllReadAttemptsFailed {
        path: PathBuf,
        attempts: usize,
        last_error: String,
    },

    #[error("Schema sidecar {path:?} is unreadable: {reason}")]
    SchemaReadCorrupt { path: PathBuf, reason: String },

    #[error("Schema sidecar {path:?} could not be written: {reason}")]
    SchemaWriteFailed { path: PathBuf, reason: String },

    #[error("Column '{column}' could not be coerced to {target}: {reason}")]
    ColumnCoercionFailed {
        column: String,
        target: String,
        reason: String,
    },

    #[error("Column '{0}' does not exist in the dataset")]
    ColumnNotFound(String),

    #[error("Column '{0}' already exists in the dataset")]
    DuplicateColumn(String),

    #[error("Column names cannot be blank (renaming '{0}')")]
    BlankColumnName(String),

    #[error("'{0}' is not a usable date format")]
    InvalidDateFormat(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

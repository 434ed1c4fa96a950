//! Error types for sheetlabel-table

use thiserror::Error;

/// Result type alias using [`TableError`]
pub type TableResult<T> = std::result::Result<T, TableError>;

/// Errors that can occur while building or writing a table
#[derive(Debug, Error)]
pub enum TableError {
    /// IO error while writing the spreadsheet
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A schema needs at least one column
    #[error("Schema has no columns")]
    EmptySchema,

    /// Two columns share a name
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A row does not fit the declared schema
    #[error("Row {row} does not match schema: {reason}")]
    SchemaMismatch { row: usize, reason: String },

    /// More rows than a worksheet can hold (header included)
    #[error("Too many rows: {0} (max: {1})")]
    TooManyRows(usize, u32),

    /// More columns than a worksheet can hold
    #[error("Too many columns: {0} (max: {1})")]
    TooManyColumns(usize, u16),

    /// Invalid sheet name
    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),
}

//! # sheetlabel-table
//!
//! In-memory record sets and the spreadsheet writer that persists them.
//!
//! - [`Table`] holds rows under a [`Schema`] declared up front; rows that do
//!   not match it are rejected when appended.
//! - [`SpreadsheetBuilder`] is the seam the orchestrator writes through;
//!   [`XlsxTableWriter`] is the XLSX implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sheetlabel_table::{Column, Schema, SpreadsheetBuilder, Table, Value, XlsxTableWriter};
//! use std::path::Path;
//!
//! let schema = Schema::new(vec![Column::integer("ID"), Column::text("Name")]).unwrap();
//! let mut table = Table::new("People", schema);
//! table.push_row([Value::from(1), Value::from("Ada")]).unwrap();
//!
//! XlsxTableWriter::default()
//!     .write_table(&table, "Data", Path::new("people.xlsx"))
//!     .unwrap();
//! ```

pub mod address;
pub mod error;
pub mod table;
pub mod writer;

pub use address::{CellAddress, CellRange};
pub use error::{TableError, TableResult};
pub use table::{Column, ColumnKind, Schema, Table, Value};
pub use writer::{SpreadsheetBuilder, XlsxTableWriter};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

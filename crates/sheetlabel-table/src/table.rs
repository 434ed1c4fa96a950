//! Tabular record sets with a declared column schema

use std::fmt;

use crate::error::{TableError, TableResult};
use crate::{MAX_COLS, MAX_ROWS};

/// Type of the values a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Whole numbers, written as numeric cells
    Integer,
    /// Free text, written as inline strings
    Text,
}

impl ColumnKind {
    /// Short name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    /// Create an integer column
    pub fn integer<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Integer,
        }
    }

    /// Create a text column
    pub fn text<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Text,
        }
    }
}

/// Ordered set of columns, fixed before any row is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Create a schema from its columns.
    ///
    /// Fails if there are no columns, if two columns share a name, or if the
    /// column count exceeds the worksheet limit.
    pub fn new(columns: Vec<Column>) -> TableResult<Self> {
        if columns.is_empty() {
            return Err(TableError::EmptySchema);
        }
        if columns.len() > MAX_COLS as usize {
            return Err(TableError::TooManyColumns(columns.len(), MAX_COLS));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; a schema has at least one column
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    /// Column kind this value belongs to
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Integer(_) => ColumnKind::Integer,
            Value::Text(_) => ColumnKind::Text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// An in-memory table: a name, a schema and rows that match it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table
    pub fn new<S: Into<String>>(name: S, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
        }
    }

    /// Append a row. The values must match the schema in count and kind.
    pub fn push_row<I, V>(&mut self, values: I) -> TableResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let row_index = self.rows.len();
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();

        if values.len() != self.schema.len() {
            return Err(TableError::SchemaMismatch {
                row: row_index,
                reason: format!(
                    "expected {} values, got {}",
                    self.schema.len(),
                    values.len()
                ),
            });
        }

        for (column, value) in self.schema.columns().iter().zip(&values) {
            if column.kind != value.kind() {
                return Err(TableError::SchemaMismatch {
                    row: row_index,
                    reason: format!(
                        "column '{}' expects {}, got {}",
                        column.name,
                        column.kind.type_name(),
                        value.kind().type_name()
                    ),
                });
            }
        }

        // One row is reserved for the header
        if row_index + 2 > MAX_ROWS as usize {
            return Err(TableError::TooManyRows(row_index + 1, MAX_ROWS - 1));
        }

        self.rows.push(values);
        Ok(())
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Number of data rows (header excluded)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no rows were appended
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        let schema = Schema::new(vec![
            Column::integer("ID"),
            Column::text("Name"),
            Column::text("Department"),
        ])
        .unwrap();
        Table::new("People", schema)
    }

    #[test]
    fn test_push_matching_rows() {
        let mut table = people();
        table
            .push_row([Value::from(1), "A".into(), "IT".into()])
            .unwrap();
        table
            .push_row([Value::from(2), "B".into(), "Finance".into()])
            .unwrap();

        assert_eq!(table.len(), 2);
        let first: Vec<String> = table.rows().next().unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(first, vec!["1", "A", "IT"]);
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let mut table = people();
        let err = table.push_row([Value::from(1), "A".into()]).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { row: 0, .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let mut table = people();
        let err = table
            .push_row([Value::from("one"), "A".into(), "IT".into()])
            .unwrap_err();
        match err {
            TableError::SchemaMismatch { reason, .. } => {
                assert!(reason.contains("'ID' expects integer, got text"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_validation() {
        assert!(matches!(Schema::new(vec![]), Err(TableError::EmptySchema)));
        assert!(matches!(
            Schema::new(vec![Column::text("A"), Column::integer("A")]),
            Err(TableError::DuplicateColumn(name)) if name == "A"
        ));
    }
}

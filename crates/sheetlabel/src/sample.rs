//! Built-in employee record set

use sheetlabel_table::{Column, Schema, Table, TableResult, Value};

/// `ID`, `Name`, `Department`
pub fn employee_schema() -> TableResult<Schema> {
    Schema::new(vec![
        Column::integer("ID"),
        Column::text("Name"),
        Column::text("Department"),
    ])
}

/// Employee table from `(id, name, department)` rows
pub fn employees_from<'a, I>(rows: I) -> TableResult<Table>
where
    I: IntoIterator<Item = (i64, &'a str, &'a str)>,
{
    let mut table = Table::new("Employees", employee_schema()?);
    for (id, name, department) in rows {
        table.push_row([Value::from(id), Value::from(name), Value::from(department)])?;
    }
    Ok(table)
}

/// The sample employees written by `run`
pub fn employees() -> TableResult<Table> {
    employees_from([
        (1, "Juan Pérez", "IT"),
        (2, "Ana López", "Finanzas"),
        (3, "Carlos Ruiz", "Recursos Humanos"),
    ])
}

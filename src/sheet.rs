// src/sheet.rs

use crate::error::StoreError;
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Number, Value};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// One table row keyed by column name. Missing cells read back as `Null`.
pub type Row = Map<String, Value>;

/// An in-memory copy of one worksheet: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Load the first worksheet of the xlsx file at `path`.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|e| StoreError::from_io(e, path))?;
        Self::from_xlsx_bytes(bytes)
    }

    pub fn from_xlsx_bytes(bytes: Vec<u8>) -> Result<Self, StoreError> {
        let mut workbook = Xlsx::new(Cursor::new(bytes))?;
        let Some(range) = workbook.worksheet_range_at(0) else {
            return Ok(Self::default());
        };
        let range = range?;

        let mut rows_iter = range.rows();
        let columns: Vec<String> = match rows_iter.next() {
            Some(header) => header.iter().map(|c| c.to_string()).collect(),
            None => return Ok(Self::default()),
        };

        let rows = rows_iter
            .map(|cells| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| (col.clone(), cells.get(i).map(cell_value).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Add any of `required` not already present, null-filling existing rows.
    /// Returns the names that were added.
    pub fn ensure_columns(&mut self, required: &[&str]) -> Vec<String> {
        let missing: Vec<String> = required
            .iter()
            .filter(|c| !self.columns.iter().any(|have| have == *c))
            .map(|c| c.to_string())
            .collect();

        for col in &missing {
            self.columns.push(col.clone());
            for row in &mut self.rows {
                row.insert(col.clone(), Value::Null);
            }
        }
        missing
    }

    /// Rows whose `column` equals `value`, with the same column set.
    pub fn filter_eq(&self, column: &str, value: &str) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.get(column).and_then(Value::as_str) == Some(value))
                .cloned()
                .collect(),
        }
    }

    /// Rewrite `path` with this table as its only sheet.
    pub fn write(&self, path: &Path, sheet_name: &str) -> Result<(), StoreError> {
        let bytes = workbook_bytes(&[(sheet_name, self)])?;
        fs::write(path, bytes).map_err(|e| StoreError::from_io(e, path))
    }
}

/// Serialize one or more tables into a single in-memory xlsx document.
pub fn workbook_bytes(sheets: &[(&str, &Table)]) -> Result<Vec<u8>, StoreError> {
    let mut workbook = Workbook::new();

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;

        for (col, header) in table.columns.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }

        for (r, row) in table.rows.iter().enumerate() {
            let r = r as u32 + 1;
            for (col, header) in table.columns.iter().enumerate() {
                let col = col as u16;
                match row.get(header) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(s)) => {
                        worksheet.write_string(r, col, s)?;
                    }
                    Some(Value::Number(n)) => {
                        if let Some(v) = n.as_f64() {
                            worksheet.write_number(r, col, v)?;
                        }
                    }
                    Some(Value::Bool(b)) => {
                        worksheet.write_boolean(r, col, *b)?;
                    }
                    Some(other) => {
                        worksheet.write_string(r, col, other.to_string())?;
                    }
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Number((*i).into()),
        // xlsx stores every number as a double; give whole numbers back as integers
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Number((*f as i64).into()),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Table {
        let mut table = Table::with_columns(&["id", "name", "amount"]);
        for (id, name, amount) in [("a", json!("Bolt"), json!(2.5)), ("b", Value::Null, json!("7.00"))] {
            let mut row = Row::new();
            row.insert("id".into(), json!(id));
            row.insert("name".into(), name);
            row.insert("amount".into(), amount);
            table.rows.push(row);
        }
        table
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.xlsx");

        let table = sample();
        table.write(&path, "Data").unwrap();

        assert_eq!(Table::read(&path).unwrap(), table);
    }

    #[test]
    fn test_header_only_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");

        let table = Table::with_columns(&["id", "name"]);
        table.write(&path, "Data").unwrap();

        let back = Table::read(&path).unwrap();
        assert_eq!(back.columns, vec!["id", "name"]);
        assert!(back.rows.is_empty());
    }

    #[test]
    fn test_ensure_columns_null_fills() {
        let mut table = sample();
        let added = table.ensure_columns(&["id", "created_at"]);

        assert_eq!(added, vec!["created_at"]);
        assert_eq!(table.columns.last().map(String::as_str), Some("created_at"));
        assert!(table.rows.iter().all(|r| r["created_at"].is_null()));
        assert!(table.ensure_columns(&["created_at"]).is_empty());
    }

    #[test]
    fn test_whole_floats_read_as_integers() {
        assert_eq!(cell_value(&Data::Float(10.0)), json!(10));
        assert_eq!(cell_value(&Data::Float(2.5)), json!(2.5));
        assert_eq!(cell_value(&Data::Empty), Value::Null);
    }

    #[test]
    fn test_filter_eq() {
        let filtered = sample().filter_eq("id", "b");
        assert_eq!(filtered.rows.len(), 1);
        assert_eq!(filtered.columns.len(), 3);
        assert!(sample().filter_eq("id", "zzz").rows.is_empty());
    }
}

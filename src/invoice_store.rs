// src/invoice_store.rs

use crate::error::StoreError;
use crate::invoice::{Amount, InvoiceRecord};
use crate::sheet::{Row, Table, workbook_bytes};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;
use uuid::Uuid;

pub const HEADER_COLUMNS: [&str; 9] = [
    "invoice_id",
    "invoice_number",
    "invoice_date",
    "customer_name",
    "customer_address",
    "subtotal",
    "tax",
    "total_amount",
    "created_at",
];

pub const DETAIL_COLUMNS: [&str; 7] = [
    "invoice_id",
    "invoice_number",
    "product_name",
    "quantity",
    "unit_price",
    "line_total",
    "created_at",
];

const HEADER_FILE: &str = "sales_order_header.xlsx";
const DETAIL_FILE: &str = "sales_order_detail.xlsx";
const HEADER_SHEET: &str = "SalesOrderHeader";
const DETAIL_SHEET: &str = "SalesOrderDetail";

/// A stored header row, copied out of the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceHeader {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub subtotal: Option<Amount>,
    pub tax: Option<Amount>,
    pub total_amount: Option<Amount>,
    pub created_at: Option<String>,
}

impl InvoiceHeader {
    fn from_row(row: &Row) -> Self {
        Self {
            invoice_id: text(row, "invoice_id").unwrap_or_default(),
            invoice_number: text(row, "invoice_number"),
            invoice_date: text(row, "invoice_date"),
            customer_name: text(row, "customer_name"),
            customer_address: text(row, "customer_address"),
            subtotal: amount(row, "subtotal"),
            tax: amount(row, "tax"),
            total_amount: amount(row, "total_amount"),
            created_at: text(row, "created_at"),
        }
    }
}

/// A single-invoice spreadsheet ready for download.
#[derive(Debug)]
pub struct InvoiceExport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Header and line-item tables kept as two xlsx files under one directory.
///
/// Every save rewrites the whole table file; nothing is cached between calls.
pub struct InvoiceStore {
    data_dir: PathBuf,
}

impl InvoiceStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn header_path(&self) -> PathBuf {
        self.data_dir.join(HEADER_FILE)
    }

    fn detail_path(&self) -> PathBuf {
        self.data_dir.join(DETAIL_FILE)
    }

    /// Create missing tables and add any missing columns to existing ones.
    /// Idempotent.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|e| StoreError::from_io(e, &self.data_dir))?;
        ensure_table(&self.header_path(), HEADER_SHEET, &HEADER_COLUMNS)?;
        ensure_table(&self.detail_path(), DETAIL_SHEET, &DETAIL_COLUMNS)?;
        Ok(())
    }

    /// Append one header row and one row per line item. Returns the new invoice id.
    ///
    /// Not atomic: if the detail write fails the header row stays behind.
    pub fn save(&self, record: &InvoiceRecord) -> Result<String, StoreError> {
        self.initialize()?;

        let invoice_id = Uuid::new_v4().to_string();
        let created_at = local_now().format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))?;
        let invoice_number = record
            .invoice_number
            .clone()
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let header_row = row_from(&[
            ("invoice_id", Value::String(invoice_id.clone())),
            ("invoice_number", Value::String(invoice_number.clone())),
            ("invoice_date", opt_text(&record.invoice_date)),
            ("customer_name", opt_text(&record.customer_name)),
            ("customer_address", opt_text(&record.customer_address)),
            ("subtotal", opt_amount(&record.subtotal)),
            ("tax", opt_amount(&record.tax)),
            ("total_amount", opt_amount(&record.total_amount)),
            ("created_at", Value::String(created_at.clone())),
        ]);
        append_rows(&self.header_path(), HEADER_SHEET, vec![header_row])?;

        let detail_rows: Vec<Row> = record
            .line_items
            .iter()
            .map(|item| {
                row_from(&[
                    ("invoice_id", Value::String(invoice_id.clone())),
                    ("invoice_number", Value::String(invoice_number.clone())),
                    ("product_name", opt_text(&item.product_name)),
                    ("quantity", opt_amount(&item.quantity)),
                    ("unit_price", opt_amount(&item.unit_price)),
                    ("line_total", opt_amount(&item.line_total)),
                    ("created_at", Value::String(created_at.clone())),
                ])
            })
            .collect();
        let line_items = detail_rows.len();
        if !detail_rows.is_empty() {
            append_rows(&self.detail_path(), DETAIL_SHEET, detail_rows)?;
        }

        info!(invoice_id = %invoice_id, invoice_number = %invoice_number, line_items, "Invoice saved");
        Ok(invoice_id)
    }

    /// Every stored header, oldest first.
    pub fn list_all(&self) -> Result<Vec<InvoiceHeader>, StoreError> {
        self.initialize()?;
        let table = Table::read(&self.header_path())?;
        Ok(table.rows.iter().map(InvoiceHeader::from_row).collect())
    }

    /// Build a two-sheet workbook for one invoice, or `None` if the id is unknown.
    pub fn export_one(&self, invoice_id: &str) -> Result<Option<InvoiceExport>, StoreError> {
        self.initialize()?;

        let header = Table::read(&self.header_path())?.filter_eq("invoice_id", invoice_id);
        let Some(first) = header.rows.first() else {
            info!(invoice_id = %invoice_id, "Invoice not found for export");
            return Ok(None);
        };
        let details = Table::read(&self.detail_path())?.filter_eq("invoice_id", invoice_id);

        let invoice_number = text(first, "invoice_number").unwrap_or_else(|| "UNKNOWN".into());
        let stamp = local_now().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let filename = format!("invoice_{}_{stamp}.xlsx", sanitize(&invoice_number));

        let bytes = workbook_bytes(&[("Header", &header), ("Line Items", &details)])?;
        info!(invoice_id = %invoice_id, line_items = details.rows.len(), filename = %filename, "Invoice exported");
        Ok(Some(InvoiceExport { filename, bytes }))
    }
}

fn ensure_table(path: &Path, sheet: &str, columns: &[&str]) -> Result<(), StoreError> {
    if !path.exists() {
        Table::with_columns(columns).write(path, sheet)?;
        info!(path = %path.display(), "Created table");
        return Ok(());
    }

    let mut table = Table::read(path)?;
    let added = table.ensure_columns(columns);
    if !added.is_empty() {
        table.write(path, sheet)?;
        info!(path = %path.display(), added = ?added, "Migrated table: added columns");
    }
    Ok(())
}

/// Read-modify-write: load the full table, append, rewrite the file.
fn append_rows(path: &Path, sheet: &str, rows: Vec<Row>) -> Result<(), StoreError> {
    let mut table = Table::read(path)?;
    table.rows.extend(rows);
    table.write(path, sheet)
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn row_from(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn opt_text(v: &Option<String>) -> Value {
    v.clone().map(Value::String).unwrap_or(Value::Null)
}

fn opt_amount(v: &Option<Amount>) -> Value {
    v.as_ref().map(Amount::to_value).unwrap_or(Value::Null)
}

fn text(row: &Row, col: &str) -> Option<String> {
    match row.get(col)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn amount(row: &Row, col: &str) -> Option<Amount> {
    row.get(col).and_then(Amount::from_value)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{LineItem, mock_record};
    use calamine::{Reader, Xlsx};
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, InvoiceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = InvoiceStore::new(dir.path().join("data"));
        (dir, store)
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_dir, store) = store();
        store.initialize().unwrap();
        store.initialize().unwrap();

        let header = Table::read(&store.header_path()).unwrap();
        assert_eq!(header.columns, HEADER_COLUMNS);
        assert!(header.rows.is_empty());
        assert_eq!(Table::read(&store.detail_path()).unwrap().columns, DETAIL_COLUMNS);
    }

    #[test]
    fn test_save_then_list() {
        let (_dir, store) = store();
        let record = mock_record();

        let first = store.save(&record).unwrap();
        let second = store.save(&record).unwrap();
        assert_ne!(first, second);

        let headers = store.list_all().unwrap();
        assert_eq!(headers.len(), 2);

        let saved = &headers[0];
        assert_eq!(saved.invoice_id, first);
        assert_eq!(saved.invoice_number, record.invoice_number);
        assert_eq!(saved.invoice_date, record.invoice_date);
        assert_eq!(saved.customer_name, record.customer_name);
        assert_eq!(saved.customer_address, record.customer_address);
        // whole numbers come back as integers, so compare numerically
        let num = |a: &Option<Amount>| a.as_ref().and_then(Amount::as_f64);
        assert_eq!(num(&saved.subtotal), num(&record.subtotal));
        assert_eq!(num(&saved.tax), num(&record.tax));
        assert_eq!(num(&saved.total_amount), num(&record.total_amount));
        assert_eq!(num(&saved.total_amount), Some(1100.0));
        assert!(saved.created_at.is_some());
        assert_eq!(headers[1].invoice_id, second);

        let details = Table::read(&store.detail_path()).unwrap();
        assert_eq!(details.rows.len(), 2);
    }

    #[test]
    fn test_nulls_listed_as_null() {
        let (_dir, store) = store();
        let record = InvoiceRecord {
            invoice_number: Some("N-1".into()),
            total_amount: Some(Amount::text("500.00")),
            ..Default::default()
        };
        store.save(&record).unwrap();

        let headers = store.list_all().unwrap();
        let json = serde_json::to_value(&headers[0]).unwrap();
        assert_eq!(json["customer_name"], Value::Null);
        assert_eq!(json["subtotal"], Value::Null);
        assert_eq!(json["total_amount"], "500.00");
    }

    #[test]
    fn test_structured_tax_saved_as_json_text() {
        let (_dir, store) = store();
        let record = InvoiceRecord {
            invoice_number: Some("GST-77".into()),
            tax: Some(Amount::Other(serde_json::json!({"cgst": 9, "sgst": 9}))),
            ..Default::default()
        };
        store.save(&record).unwrap();

        let saved = &store.list_all().unwrap()[0];
        assert_eq!(saved.tax, Some(Amount::text(r#"{"cgst":9,"sgst":9}"#)));
    }

    #[test]
    fn test_missing_invoice_number_is_unknown() {
        let (_dir, store) = store();
        store.save(&InvoiceRecord::default()).unwrap();
        assert_eq!(
            store.list_all().unwrap()[0].invoice_number.as_deref(),
            Some("UNKNOWN")
        );
    }

    #[test]
    fn test_zero_items_export() {
        let (_dir, store) = store();
        let record = InvoiceRecord {
            invoice_number: Some("EMPTY-1".into()),
            ..Default::default()
        };
        let id = store.save(&record).unwrap();
        assert!(Table::read(&store.detail_path()).unwrap().rows.is_empty());

        let export = store.export_one(&id).unwrap().expect("invoice should exist");
        assert!(export.filename.starts_with("invoice_EMPTY-1_"));
        assert!(export.filename.ends_with(".xlsx"));

        let mut workbook = Xlsx::new(std::io::Cursor::new(export.bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Header", "Line Items"]);

        let items = workbook.worksheet_range("Line Items").unwrap();
        assert_eq!(items.rows().count(), 1);
        let header = workbook.worksheet_range("Header").unwrap();
        assert_eq!(header.rows().count(), 2);
    }

    #[test]
    fn test_export_only_matching_rows() {
        let (_dir, store) = store();
        let mut record = mock_record();
        record.line_items.push(LineItem {
            product_name: Some("Support".into()),
            ..Default::default()
        });
        let id = store.save(&record).unwrap();
        store.save(&mock_record()).unwrap();

        let export = store.export_one(&id).unwrap().unwrap();
        let mut workbook = Xlsx::new(std::io::Cursor::new(export.bytes)).unwrap();
        let items = workbook.worksheet_range("Line Items").unwrap();
        // header row + 2 items of this invoice only
        assert_eq!(items.rows().count(), 3);
    }

    #[test]
    fn test_export_unknown_id() {
        let (_dir, store) = store();
        store.save(&mock_record()).unwrap();
        assert!(store.export_one("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_migration_adds_missing_column() {
        let (_dir, store) = store();
        fs::create_dir_all(&store.data_dir).unwrap();

        let legacy_cols: Vec<&str> = HEADER_COLUMNS
            .iter()
            .copied()
            .filter(|c| *c != "customer_address")
            .collect();
        let mut legacy = Table::with_columns(&legacy_cols);
        legacy.rows.push(row_from(&[
            ("invoice_id", Value::String("old-1".into())),
            ("invoice_number", Value::String("LEG-1".into())),
            ("created_at", Value::String("2024-01-01 09:00:00".into())),
        ]));
        legacy.write(&store.header_path(), HEADER_SHEET).unwrap();

        store.initialize().unwrap();

        let migrated = Table::read(&store.header_path()).unwrap();
        assert_eq!(migrated.rows.len(), 1);
        assert!(migrated.columns.iter().any(|c| c == "customer_address"));
        assert_eq!(migrated.rows[0]["customer_address"], Value::Null);
        assert_eq!(migrated.rows[0]["invoice_number"], "LEG-1");

        let headers = store.list_all().unwrap();
        assert_eq!(headers[0].invoice_id, "old-1");
        assert_eq!(headers[0].customer_address, None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize("2024/INV:7"), "2024_INV_7");
    }
}

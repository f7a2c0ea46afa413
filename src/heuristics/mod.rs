// src/heuristics/mod.rs

mod generic;

use crate::invoice::InvoiceRecord;

/// Extract a structured invoice from raw text using fixed regex rules.
///
/// Unmatched fields fall back to placeholders and exactly one line item
/// is synthesized from the matched total.
pub fn extract_invoice(text: &str) -> InvoiceRecord {
    generic::extract(text)
}

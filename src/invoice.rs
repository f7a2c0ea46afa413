// src/invoice.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

/// A numeric field as it arrived: models and users send either JSON
/// numbers or strings like `"500.00"`, and both are kept verbatim.
/// Anything else (a tax breakdown object, a list) lands in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(Number),
    Text(String),
    Other(Value),
}

impl Amount {
    pub fn text(s: impl Into<String>) -> Self {
        Amount::Text(s.into())
    }

    pub fn number(v: f64) -> Self {
        Number::from_f64(v)
            .map(Amount::Number)
            .unwrap_or_else(|| Amount::Text(v.to_string()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Amount::Number(n) => Value::Number(n.clone()),
            Amount::Text(s) => Value::String(s.clone()),
            Amount::Other(v) => v.clone(),
        }
    }

    /// Inverse of `to_value`; only null is dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(Amount::Number(n.clone())),
            Value::String(s) => Some(Amount::Text(s.clone())),
            other => Some(Amount::Other(other.clone())),
        }
    }

    /// Numeric reading of the amount, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Amount::Number(n) => n.as_f64(),
            Amount::Text(s) => s.trim().parse().ok(),
            Amount::Other(_) => None,
        }
    }
}

/// A single invoice line item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<Amount>,
    #[serde(default)]
    pub unit_price: Option<Amount>,
    #[serde(default)]
    pub line_total: Option<Amount>,
}

/// Header fields plus ordered line items, as produced by extraction and
/// accepted by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub subtotal: Option<Amount>,
    #[serde(default)]
    pub tax: Option<Amount>,
    #[serde(default)]
    pub total_amount: Option<Amount>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub line_items: Vec<LineItem>,
}

impl InvoiceRecord {
    /// How many header fields were filled (out of the scalar ones).
    pub fn coverage(&self) -> (usize, usize) {
        let total = 7;
        let filled = [
            self.invoice_number.is_some(),
            self.invoice_date.is_some(),
            self.customer_name.is_some(),
            self.customer_address.is_some(),
            self.subtotal.is_some(),
            self.tax.is_some(),
            self.total_amount.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }
}

/// Fixed placeholder returned whenever real extraction is unavailable.
pub fn mock_record() -> InvoiceRecord {
    InvoiceRecord {
        invoice_number: Some("INV-MOCK-001".to_string()),
        invoice_date: Some("2024-12-16".to_string()),
        customer_name: Some("John Doe Enterprises".to_string()),
        customer_address: Some("123 Mock Street, AI City, 90210".to_string()),
        subtotal: Some(Amount::number(1000.0)),
        tax: Some(Amount::number(100.0)),
        total_amount: Some(Amount::number(1100.0)),
        line_items: vec![LineItem {
            product_name: Some("AI Consultation Service".to_string()),
            quantity: Some(Amount::Number(10.into())),
            unit_price: Some(Amount::number(100.0)),
            line_total: Some(Amount::number(1000.0)),
        }],
    }
}

/// Accept any JSON for text fields; non-strings keep their JSON text.
/// Null stays `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// `"line_items"` may be null, a single object or a list. Entries that are
/// not objects are skipped.
fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) if !map.is_empty() => vec![Value::Object(map)],
        _ => Vec::new(),
    };
    Ok(entries
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_missing_fields_are_null() {
        let record: InvoiceRecord = serde_json::from_str(r#"{"invoice_number": "A-1"}"#).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("A-1"));
        assert_eq!(record.total_amount, None);
        assert!(record.line_items.is_empty());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["customer_name"], Value::Null);
    }

    #[test]
    fn test_amounts_keep_their_shape() {
        let record: InvoiceRecord = serde_json::from_str(
            r#"{
                "invoice_number": 4471,
                "total_amount": "500.00",
                "tax": 12.5,
                "line_items": [{"product_name": "Bolt", "quantity": 3}]
            }"#,
        )
        .unwrap();

        assert_eq!(record.invoice_number.as_deref(), Some("4471"));
        assert_eq!(record.total_amount, Some(Amount::text("500.00")));
        assert_eq!(record.tax, Some(Amount::number(12.5)));
        assert_eq!(record.line_items[0].quantity, Some(Amount::Number(3.into())));
    }

    #[test]
    fn test_null_line_items() {
        let record: InvoiceRecord = serde_json::from_str(r#"{"line_items": null}"#).unwrap();
        assert!(record.line_items.is_empty());
    }

    #[test]
    fn test_structured_fields_are_kept() {
        let record: InvoiceRecord = serde_json::from_str(
            r#"{
                "invoice_number": "GST-77",
                "customer_address": {"city": "Pune", "pin": 411001},
                "tax": {"cgst": 9, "sgst": 9},
                "total_amount": 118,
                "line_items": {}
            }"#,
        )
        .unwrap();

        assert_eq!(record.tax, Some(Amount::Other(json!({"cgst": 9, "sgst": 9}))));
        assert_eq!(record.total_amount.as_ref().and_then(Amount::as_f64), Some(118.0));
        assert_eq!(
            record.customer_address.as_deref(),
            Some(r#"{"city":"Pune","pin":411001}"#)
        );
        assert!(record.line_items.is_empty());
    }

    #[test]
    fn test_odd_line_items_shapes() {
        let single: InvoiceRecord =
            serde_json::from_str(r#"{"line_items": {"product_name": "Nut", "quantity": 2}}"#).unwrap();
        assert_eq!(single.line_items.len(), 1);
        assert_eq!(single.line_items[0].product_name.as_deref(), Some("Nut"));

        let mixed: InvoiceRecord =
            serde_json::from_str(r#"{"line_items": ["junk", 4, {"line_total": [1, 2]}]}"#).unwrap();
        assert_eq!(mixed.line_items.len(), 1);
        assert_eq!(mixed.line_items[0].line_total, Some(Amount::Other(json!([1, 2]))));
    }

    #[test]
    fn test_amount_as_f64() {
        assert_eq!(Amount::Number(1000.into()).as_f64(), Some(1000.0));
        assert_eq!(Amount::text(" 500.00 ").as_f64(), Some(500.0));
        assert_eq!(Amount::text("n/a").as_f64(), None);
        assert_eq!(Amount::Other(json!({"a": 1})).as_f64(), None);
    }

    #[test]
    fn test_mock_record_is_complete() {
        let mock = mock_record();
        assert_eq!(mock.coverage(), (7, 7));
        assert_eq!(mock.line_items.len(), 1);
        assert_eq!(mock, mock_record());
    }
}

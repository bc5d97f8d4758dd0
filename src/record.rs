// Financial record - the one row shape the importer produces
//
// Serialized field names match the `financial_records` table columns, so a
// Vec<FinancialRecord> is the request body of a batch insert as-is.

use crate::error::RowError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Table the importer writes to unless told otherwise
pub const DEFAULT_TABLE: &str = "financial_records";

/// Column order used by the local mirror and diagnostics
pub const COLUMNS: [&str; 6] = [
    "record_date",
    "type",
    "amount",
    "description",
    "category",
    "is_receivable",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    /// Calendar date, passed through as written in the source
    pub record_date: String,

    /// Free-form label such as "income" or "expense"
    #[serde(rename = "type")]
    pub record_type: String,

    pub amount: f64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: String,

    /// Never read from source files; the importer always starts at false
    #[serde(default)]
    pub is_receivable: bool,
}

impl FinancialRecord {
    /// Build a record from already-validated fields
    pub fn new(record_date: String, record_type: String, amount: f64) -> Self {
        FinancialRecord {
            record_date,
            record_type,
            amount,
            description: String::new(),
            category: String::new(),
            is_receivable: false,
        }
    }

    /// Builder pattern: add description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder pattern: add category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// True when `record_date` is a plain `YYYY-MM-DD` date
    pub fn has_iso_date(&self) -> bool {
        NaiveDate::parse_from_str(self.record_date.trim(), "%Y-%m-%d").is_ok()
    }
}

/// Parse an amount column.
///
/// Surrounding whitespace is tolerated; anything that is not a finite number
/// (including "NaN" and "inf") is rejected.
pub fn parse_amount(raw: &str, line: u64) -> Result<f64, RowError> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RowError::InvalidAmount {
            line,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_table_column_names() {
        let record = FinancialRecord::new("2024-01-01".to_string(), "income".to_string(), 1000.5)
            .with_description("sale")
            .with_category("product");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "record_date": "2024-01-01",
                "type": "income",
                "amount": 1000.5,
                "description": "sale",
                "category": "product",
                "is_receivable": false,
            })
        );

        let object = json.as_object().unwrap();
        assert_eq!(object.len(), COLUMNS.len());
        for column in COLUMNS {
            assert!(object.contains_key(column), "missing column {}", column);
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = FinancialRecord::new("2024-01-02".to_string(), "expense".to_string(), 200.0);
        assert_eq!(record.description, "");
        assert_eq!(record.category, "");
        assert!(!record.is_receivable);
    }

    #[test]
    fn test_parse_amount_accepts_decimals_and_whitespace() {
        assert_eq!(parse_amount("1000.50", 2).unwrap(), 1000.5);
        assert_eq!(parse_amount(" 200 ", 3).unwrap(), 200.0);
        assert_eq!(parse_amount("-45.99", 4).unwrap(), -45.99);
    }

    #[test]
    fn test_parse_amount_rejects_non_numeric() {
        for bad in ["", "abc", "1,000", "NaN", "inf", "12abc"] {
            match parse_amount(bad, 9) {
                Err(RowError::InvalidAmount { line, value }) => {
                    assert_eq!(line, 9);
                    assert_eq!(value, bad);
                }
                other => panic!("expected InvalidAmount for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_iso_date_check() {
        let iso = FinancialRecord::new("2024-03-31".to_string(), "income".to_string(), 1.0);
        let us = FinancialRecord::new("03/31/2024".to_string(), "income".to_string(), 1.0);
        let impossible = FinancialRecord::new("2024-02-30".to_string(), "income".to_string(), 1.0);

        assert!(iso.has_iso_date());
        assert!(!us.has_iso_date());
        assert!(!impossible.has_iso_date());
    }
}

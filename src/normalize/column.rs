// src/normalize/column.rs

use serde_json::Value;
use tracing::{trace, warn};

use super::amount::normalize_amount_json;
use super::date::normalize_date_json;
use super::Normalized;
use crate::ledger::{RawValue, Record, AMOUNT_COLUMNS};

/// Normalize one extracted cell of column `column` (lower-case name).
///
/// Native temporal values are formatted directly, decimals become floats and
/// nulls stay null. Remaining values go through the date rewrite, and the
/// amount columns additionally through the amount parser.
pub fn normalize_temporal_column(column: &str, value: RawValue) -> Normalized {
    match value {
        RawValue::Date(_) | RawValue::DateTime(_) | RawValue::Time(_) | RawValue::Decimal(_) => {
            Normalized::Converted(value.into_json())
        }
        RawValue::Null => Normalized::Unchanged(Value::Null),
        other => {
            let dated = normalize_date_json(other.into_json());
            if AMOUNT_COLUMNS.contains(&column) {
                dated.then(normalize_amount_json)
            } else {
                dated
            }
        }
    }
}

/// Materialize one warehouse row into a record. Degraded cells are logged and
/// kept as their raw text.
pub fn normalize_row(columns: &[String], row: Vec<RawValue>) -> Record {
    let mut record = Record::new();
    for (column, value) in columns.iter().zip(row) {
        let normalized = normalize_temporal_column(column, value);
        if normalized.is_degraded() {
            warn!(column = %column, value = %normalized.value(), "value kept unparsed");
        } else {
            trace!(column = %column, ?normalized, "normalized");
        }
        record.insert(column.clone(), normalized.into_value());
    }
    record
}

// src/normalize/amount.rs

use serde_json::Value;

use super::Normalized;
use crate::ledger::{float_to_json, RawValue};

/// Convert a Brazilian-formatted amount ("1.234,56") into a JSON number.
///
/// Strings without a comma are only trimmed; `"1.000"` is not read as a
/// thousands-grouped integer. A comma string that still does not parse comes
/// back trimmed and tagged `Degraded`.
pub fn normalize_amount(value: RawValue) -> Normalized {
    match value {
        RawValue::Null => Normalized::Unchanged(Value::Null),
        RawValue::Decimal(_) => Normalized::Converted(value.into_json()),
        RawValue::Int(_) | RawValue::Float(_) => Normalized::Unchanged(value.into_json()),
        RawValue::Text(s) => normalize_amount_str(&s),
        other => Normalized::Unchanged(other.into_json()),
    }
}

/// Same as [`normalize_amount`] for a JSON value already in a record.
pub fn normalize_amount_json(value: Value) -> Normalized {
    match value {
        Value::String(s) => normalize_amount_str(&s),
        other => Normalized::Unchanged(other),
    }
}

fn normalize_amount_str(raw: &str) -> Normalized {
    let trimmed = raw.trim();
    if !trimmed.contains(',') {
        return Normalized::Unchanged(Value::String(trimmed.to_string()));
    }

    let candidate = trimmed.replace('.', "").replace(',', ".");
    match candidate.parse::<f64>() {
        Ok(f) if f.is_finite() => Normalized::Converted(whole_or_float(f)),
        _ => Normalized::Degraded(Value::String(trimmed.to_string())),
    }
}

fn whole_or_float(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        float_to_json(f)
    }
}

// src/normalize/date.rs

use serde_json::Value;

use super::Normalized;
use crate::ledger::RawValue;

/// Rewrite a `DD/MM/YYYY` string as `YYYY-MM-DD`, zero-padding day and month.
/// Anything that is not three all-digit `/` segments comes back unchanged.
pub fn normalize_date(value: RawValue) -> Normalized {
    match value {
        RawValue::Text(s) => normalize_date_json(Value::String(s)),
        other => Normalized::Unchanged(other.into_json()),
    }
}

/// Same as [`normalize_date`] for a JSON value already in a record.
pub fn normalize_date_json(value: Value) -> Normalized {
    let converted = match &value {
        Value::String(s) if s.contains('/') => brazilian_to_iso(s),
        _ => None,
    };
    match converted {
        Some(iso) => Normalized::Converted(Value::String(iso)),
        None => Normalized::Unchanged(value),
    }
}

fn brazilian_to_iso(s: &str) -> Option<String> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let (day, month, year) = (parts[0], parts[1], parts[2]);
    Some(format!("{}-{:0>2}-{:0>2}", year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(s: &str) -> Value {
        normalize_date(RawValue::from(s)).into_value()
    }

    #[test]
    fn pads_day_and_month() {
        assert_eq!(date("5/1/2026"), json!("2026-01-05"));
        assert_eq!(date("31/12/2025"), json!("2025-12-31"));
        assert_eq!(
            normalize_date(RawValue::from("05/01/2026")),
            Normalized::Converted(json!("2026-01-05"))
        );
    }

    #[test]
    fn malformed_inputs_are_unchanged() {
        for s in ["5/1", "1/2/3/4", "aa/01/2026", "N/ MES", "5//2026", "no slash"] {
            assert_eq!(
                normalize_date(RawValue::from(s)),
                Normalized::Unchanged(json!(s)),
                "input {:?}",
                s
            );
        }
    }

    #[test]
    fn non_strings_are_unchanged() {
        assert_eq!(normalize_date(RawValue::Int(5)).into_value(), json!(5));
        assert_eq!(normalize_date(RawValue::Null).into_value(), Value::Null);
        let d = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(
            normalize_date(RawValue::Date(d)).into_value(),
            json!("2026-01-05")
        );
    }
}

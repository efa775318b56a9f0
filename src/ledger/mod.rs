// src/ledger/mod.rs

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

pub mod key;

pub use key::assign_keys;

/// One normalized ledger record, keyed by lower-case column name.
pub type Record = Map<String, Value>;

pub const COMPANY_COLUMN: &str = "codcoligada";
pub const INTEGRATION_KEY_COLUMN: &str = "integrachave_tratada";
pub const PARTIDA_COLUMN: &str = "idpartida";
pub const AMOUNT_COLUMN: &str = "valor";
pub const KEY_COLUMN: &str = "chave_id";

/// Columns that carry Brazilian-formatted amounts at the source.
pub const AMOUNT_COLUMNS: &[&str] = &[AMOUNT_COLUMN, "cc"];

/// A scalar as the warehouse hands it over, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl RawValue {
    /// Plain JSON rendering with no locale handling.
    pub fn into_json(self) -> Value {
        match self {
            RawValue::Null => Value::Null,
            RawValue::Bool(b) => Value::Bool(b),
            RawValue::Int(i) => Value::from(i),
            RawValue::Float(f) => float_to_json(f),
            RawValue::Decimal(d) => d.to_f64().map(float_to_json).unwrap_or(Value::Null),
            RawValue::Text(s) => Value::String(s),
            RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            RawValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%d").to_string()),
            RawValue::Time(t) => Value::String(t.format("%H:%M:%S").to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

/// NaN and infinities have no JSON form and become null.
pub fn float_to_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Render a JSON scalar the way it appears inside a composite key.
pub fn key_fragment(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

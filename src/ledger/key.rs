// src/ledger/key.rs

use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

use super::{
    key_fragment, Record, AMOUNT_COLUMN, COMPANY_COLUMN, INTEGRATION_KEY_COLUMN, KEY_COLUMN,
    PARTIDA_COLUMN,
};

/// Integration key with the partida id substituted when it is null or blank.
pub fn integration_key(record: &Record) -> String {
    let raw = key_fragment(record.get(INTEGRATION_KEY_COLUMN));
    if raw.is_empty() {
        key_fragment(record.get(PARTIDA_COLUMN))
    } else {
        raw
    }
}

/// Sort records into key order and stamp every one with its composite
/// `company-integration-sequence` key.
///
/// Partitions are (company id, integration key); inside a partition rows are
/// ordered by partida ascending then amount descending, and the sequence
/// restarts at 1 for every partition. The sort is stable, so rows that tie on
/// every component keep their extraction order.
pub fn assign_keys(records: Vec<Record>) -> Vec<Record> {
    let mut keyed: Vec<(String, String, Record)> = records
        .into_iter()
        .map(|r| {
            let company = key_fragment(r.get(COMPANY_COLUMN));
            let integration = integration_key(&r);
            (company, integration, r)
        })
        .collect();

    keyed.sort_by(|(ca, ia, ra), (cb, ib, rb)| {
        compare_ids(ca, cb)
            .then_with(|| compare_ids(ia, ib))
            .then_with(|| {
                compare_ids(
                    &key_fragment(ra.get(PARTIDA_COLUMN)),
                    &key_fragment(rb.get(PARTIDA_COLUMN)),
                )
            })
            .then_with(|| compare_amount_desc(ra.get(AMOUNT_COLUMN), rb.get(AMOUNT_COLUMN)))
    });

    let mut out = Vec::with_capacity(keyed.len());
    let mut partitions = 0usize;
    let mut prev: Option<(String, String)> = None;
    let mut seq = 0u64;

    for (company, integration, mut record) in keyed {
        let same = prev
            .as_ref()
            .map_or(false, |(c, i)| *c == company && *i == integration);
        if same {
            seq += 1;
        } else {
            seq = 1;
            partitions += 1;
        }

        let key = format!("{}-{}-{}", company, integration, seq);
        record.insert(
            INTEGRATION_KEY_COLUMN.to_string(),
            Value::String(integration.clone()),
        );
        record.insert(KEY_COLUMN.to_string(), Value::String(key));
        out.push(record);
        prev = Some((company, integration));
    }

    debug!(records = out.len(), partitions, "assigned composite keys");
    out
}

/// Numeric ids compare as numbers, everything else lexically; numbers first.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare_amount_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.and_then(Value::as_f64);
    let b = b.and_then(Value::as_f64);
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(company: i64, integ: Value, partida: i64, amount: Value) -> Record {
        json!({
            "codcoligada": company,
            "integrachave_tratada": integ,
            "idpartida": partida,
            "valor": amount,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn keys(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r["chave_id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn sequence_resets_per_partition() {
        let rows = vec![
            row(1, json!("A"), 10, json!(5)),
            row(1, json!("A"), 11, json!(5)),
            row(1, json!("B"), 12, json!(5)),
            row(2, json!("A"), 13, json!(5)),
        ];
        let out = assign_keys(rows);
        assert_eq!(keys(&out), vec!["1-A-1", "1-A-2", "1-B-1", "2-A-1"]);
    }

    #[test]
    fn partida_ascending_then_amount_descending() {
        let rows = vec![
            row(1, json!("X"), 20, json!(1.5)),
            row(1, json!("X"), 10, json!(-3)),
            row(1, json!("X"), 10, json!(100)),
        ];
        let out = assign_keys(rows);
        let amounts: Vec<f64> = out.iter().map(|r| r["valor"].as_f64().unwrap()).collect();
        assert_eq!(amounts, vec![100.0, -3.0, 1.5]);
        assert_eq!(keys(&out), vec!["1-X-1", "1-X-2", "1-X-3"]);
    }

    #[test]
    fn blank_integration_key_falls_back_to_partida() {
        let rows = vec![
            row(3, json!(""), 77, json!(1)),
            row(3, Value::Null, 78, json!(1)),
        ];
        let out = assign_keys(rows);
        assert_eq!(keys(&out), vec!["3-77-1", "3-78-1"]);
        assert_eq!(out[0]["integrachave_tratada"], json!("77"));
    }

    #[test]
    fn unparsed_amounts_sort_last() {
        let rows = vec![
            row(1, json!("K"), 1, json!("1,2x")),
            row(1, json!("K"), 1, json!(2)),
        ];
        let out = assign_keys(rows);
        assert_eq!(out[0]["valor"], json!(2));
        assert_eq!(out[1]["valor"], json!("1,2x"));
    }

    #[test]
    fn keys_are_unique() {
        let rows: Vec<Record> = (0..50)
            .map(|i| row(i % 3, json!(format!("I{}", i % 4)), i, json!(i)))
            .collect();
        let out = assign_keys(rows);
        let mut seen = std::collections::HashSet::new();
        for k in keys(&out) {
            assert!(seen.insert(k.to_string()), "duplicate key {}", k);
        }
    }
}

// src/warehouse/mod.rs

use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::ledger::RawValue;

pub mod csv_export;

pub use csv_export::CsvExport;

/// Columns the ledger query selects, lower-cased, in select order.
pub const LEDGER_COLUMNS: &[&str] = &[
    "chave",
    "codlote",
    "cia",
    "filial",
    "integraaplicacao",
    "idpartida",
    "ticket",
    "fornecedor_padrao",
    "anomes",
    "valor",
    "complemento",
    "recorrente",
    "conta",
    "tag1",
    "tag2",
    "tag3",
    "tag4",
    "tag_orc",
    "original",
    "r_o",
    "cc",
    "codcoligada",
    "codfilial",
    "usuario",
    "conta_original",
    "tag1_original",
    "tag4_original",
    "tagorc_original",
    "integrachave_tratada",
    "status_lanc_financeiro",
    "anomes_original",
];

/// Columns without which rows cannot be keyed.
pub const REQUIRED_COLUMNS: &[&str] = &["codcoligada", "idpartida", "valor"];

/// Tabular result of one ledger extraction.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Lower-case column names.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that can run the ledger query and hand back raw rows.
pub trait LedgerSource {
    fn fetch(&mut self, query: &LedgerQuery) -> Result<RowSet>;
}

/// Parameters of the ledger extraction.
///
/// Row order is part of the contract: the composite key's sequence number
/// depends on it, so any source must present rows in (or be re-keyed from)
/// the order this query defines.
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    pub date_floor: NaiveDate,
    pub excluded_tag: String,
}

impl LedgerQuery {
    pub fn new(date_floor: NaiveDate, excluded_tag: impl Into<String>) -> Self {
        Self {
            date_floor,
            excluded_tag: excluded_tag.into(),
        }
    }

    /// The warehouse SQL that produces the export.
    pub fn sql(&self) -> String {
        let integ = "CASE WHEN F.INTEGRACHAVE_TRATADA = '' OR F.INTEGRACHAVE_TRATADA IS NULL \
                     THEN F.IDPARTIDA ELSE F.INTEGRACHAVE_TRATADA END";
        let partition = format!("CONCAT(CAST(F.CODCOLIGADA AS VARCHAR), '-', {integ})");
        format!(
            r#"SELECT
    CONCAT(F.IDLANCAMENTO, F.IDPARTIDA) AS CHAVE,
    F.CODLOTE, FIL.CIA, FIL.FILIAL, F.INTEGRAAPLICACAO, F.IDPARTIDA,
    F.FLUIG AS TICKET,
    CASE
        WHEN F.CODIGOFORNECEDOR = '' AND (F.COMPLEMENTO LIKE '%N/ MES%' OR F.COMPLEMENTO LIKE '%N/ MÊS%' OR F.COMPLEMENTO LIKE '%N/MÊS%') THEN F.COMPLEMENTO
        WHEN F.CODIGOFORNECEDOR = '' AND (F.COMPLEMENTO LIKE 'EV____ -%' OR F.COMPLEMENTO LIKE 'EN____ -%') THEN F.COMPLEMENTO
        WHEN F.CODIGOFORNECEDOR = '' THEN F.FORNECEDOR_TRATADO
        WHEN FORN_TAG.[Fornecedor Novo] IS NOT NULL THEN FORN_TAG.[Fornecedor Novo]
        ELSE F.NOMEFORNECEDOR
    END AS FORNECEDOR_PADRAO,
    FORMAT(F.DATA, 'yyyyMM') AS ANOMES,
    F.VALOR, F.COMPLEMENTO, 'Sim' AS RECORRENTE, F.CONTA,
    T.Tag1 AS TAG1, T.Tag2 AS TAG2, T.Tag3 AS TAG3, T.TAG4 AS TAG4, T.TagOrc AS TAG_ORC,
    'Original' AS ORIGINAL, 'Real' AS R_O, F.CC, F.CODCOLIGADA, F.CODFILIAL, F.USUARIO,
    F.CONTA AS CONTA_ORIGINAL, T.Tag1 AS TAG1_ORIGINAL, T.TAG4 AS TAG4_ORIGINAL,
    T.TagOrc AS TAGORC_ORIGINAL,
    {integ} AS INTEGRACHAVE_TRATADA,
    F.[STATUS LANC. FINANCEIRO] AS STATUS_LANC_FINANCEIRO,
    FORMAT(F.DATA, 'yyyyMM') AS ANOMES_ORIGINAL
FROM DRE F
LEFT JOIN Filial FIL ON FIL.CODCOLIGADA = F.CODCOLIGADA AND FIL.CODFILIAL = F.CODFILIAL
LEFT JOIN Tags T ON T.CODCONTA = F.CONTA
LEFT JOIN Fornecedor_Tags FORN_TAG ON TRIM(FORN_TAG.[Fornecedor Original]) = TRIM(F.NOMEFORNECEDOR)
WHERE F.DATA >= '{floor}' AND F.DATA <= GETDATE()
  AND T.Tag1 <> '{excluded}'
ORDER BY {partition} ASC, F.IDPARTIDA ASC, F.VALOR DESC"#,
            integ = integ,
            floor = self.date_floor.format("%Y-%m-%d"),
            excluded = self.excluded_tag.replace('\'', "''"),
            partition = partition,
        )
    }

    /// Apply the query's filters to a row that was extracted elsewhere.
    /// Rows missing the period or tag columns are admitted.
    pub fn admits(&self, set_columns: &[String], row: &[RawValue]) -> bool {
        self.admits_on(set_columns, row, Local::now().date_naive())
    }

    fn admits_on(&self, set_columns: &[String], row: &[RawValue], today: NaiveDate) -> bool {
        let cell = |name: &str| {
            set_columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| row.get(i))
        };

        if let Some(RawValue::Text(tag)) = cell("tag1") {
            if tag.trim() == self.excluded_tag {
                return false;
            }
        }

        let period = match cell("anomes") {
            Some(RawValue::Text(s)) => s.trim().parse::<u32>().ok(),
            Some(RawValue::Int(i)) => u32::try_from(*i).ok(),
            _ => None,
        };
        match period {
            Some(p) => {
                let floor = yyyymm(self.date_floor);
                let ceiling = yyyymm(today);
                p >= floor && p <= ceiling
            }
            None => true,
        }
    }
}

fn yyyymm(d: NaiveDate) -> u32 {
    use chrono::Datelike;
    d.year() as u32 * 100 + d.month()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["tag1".into(), "anomes".into(), "valor".into()]
    }

    fn query() -> LedgerQuery {
        LedgerQuery::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), "N/A")
    }

    #[test]
    fn sql_carries_parameters_and_ordering() {
        let sql = query().sql();
        assert!(sql.contains("F.DATA >= '2026-01-01'"));
        assert!(sql.contains("T.Tag1 <> 'N/A'"));
        assert!(sql.contains("F.IDPARTIDA ASC, F.VALOR DESC"));
    }

    #[test]
    fn excluded_tag_is_filtered() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let q = query();
        let row = vec![RawValue::from("N/A"), RawValue::from("202602"), RawValue::Null];
        assert!(!q.admits_on(&cols(), &row, today));
        let row = vec![RawValue::from("RECEITA"), RawValue::from("202602"), RawValue::Null];
        assert!(q.admits_on(&cols(), &row, today));
    }

    #[test]
    fn period_window() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let q = query();
        let at = |p: &str| vec![RawValue::from("X"), RawValue::from(p), RawValue::Null];
        assert!(!q.admits_on(&cols(), &at("202512"), today));
        assert!(q.admits_on(&cols(), &at("202601"), today));
        assert!(q.admits_on(&cols(), &at("202603"), today));
        assert!(!q.admits_on(&cols(), &at("202604"), today));
        assert!(q.admits_on(&cols(), &[RawValue::Null, RawValue::Null, RawValue::Null], today));
    }
}

// src/warehouse/csv_export.rs

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};
use tracing::{debug, info, warn};

use super::{LedgerQuery, LedgerSource, RowSet, LEDGER_COLUMNS, REQUIRED_COLUMNS};
use crate::ledger::RawValue;

/// A headered CSV file produced by running [`LedgerQuery::sql`] in the
/// warehouse. Every non-empty cell is text; empty cells are null.
pub struct CsvExport {
    path: PathBuf,
    delimiter: u8,
}

impl CsvExport {
    /// Fails when the export is missing, which aborts the run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            bail!("warehouse export not found at {}", path.display());
        }
        Ok(Self {
            path,
            delimiter: b',',
        })
    }

    /// Exports saved from Brazilian-locale tools use `;` because `,` is the
    /// decimal mark.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn read_from<R: Read>(&self, reader: R, query: &LedgerQuery) -> Result<RowSet> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .with_context(|| format!("reading header of {}", self.path.display()))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !columns.iter().any(|h| h == c))
            .collect();
        if !missing.is_empty() {
            bail!(
                "export {} lacks required columns {:?}",
                self.path.display(),
                missing
            );
        }
        let absent = LEDGER_COLUMNS
            .iter()
            .filter(|c| !columns.iter().any(|h| h == *c))
            .count();
        if absent > 0 {
            warn!(absent, "export is missing some ledger query columns");
        }

        let mut rows = Vec::new();
        let mut filtered = 0usize;
        let mut overlong = 0usize;
        for (idx, result) in rdr.records().enumerate() {
            let record = result.with_context(|| {
                format!("CSV parse error in {} at record {}", self.path.display(), idx)
            })?;
            if record.len() > columns.len() {
                overlong += 1;
                warn!(
                    record = idx,
                    cells = record.len(),
                    columns = columns.len(),
                    "extra cells past the header dropped"
                );
            }
            let mut row: Vec<RawValue> = record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        RawValue::Null
                    } else {
                        RawValue::Text(cell.to_string())
                    }
                })
                .collect();
            row.resize(columns.len(), RawValue::Null);

            if query.admits(&columns, &row) {
                rows.push(row);
            } else {
                filtered += 1;
            }
        }

        debug!(filtered, "rows outside the query window");
        if overlong > 0 {
            warn!(overlong, "rows wider than the header were truncated");
        }
        Ok(RowSet { columns, rows })
    }
}

impl LedgerSource for CsvExport {
    fn fetch(&mut self, query: &LedgerQuery) -> Result<RowSet> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening export {}", self.path.display()))?;
        let set = self.read_from(BufReader::new(file), query)?;
        info!(
            rows = set.len(),
            columns = set.columns.len(),
            path = %self.path.display(),
            "read warehouse export"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Local, NaiveDate};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn this_month() -> String {
        let today = Local::now().date_naive();
        format!("{:04}{:02}", today.year(), today.month())
    }

    fn query() -> LedgerQuery {
        LedgerQuery::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), "N/A")
    }

    fn export(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_rows_and_nulls() {
        let m = this_month();
        let f = export(&format!(
            "CODCOLIGADA,IDPARTIDA,VALOR,TAG1,ANOMES,TICKET\n1,10,\"1.234,56\",RECEITA,{m},\n1,11,\"-5,00\",N/A,{m},T-9\n"
        ));
        let mut src = CsvExport::open(f.path()).unwrap();
        let set = src.fetch(&query()).unwrap();

        assert_eq!(set.columns[0], "codcoligada");
        assert_eq!(set.len(), 1, "N/A row is filtered");
        assert_eq!(set.rows[0][2], RawValue::from("1.234,56"));
        assert_eq!(set.rows[0][5], RawValue::Null);
    }

    #[test]
    fn semicolon_exports() {
        let f = export("codcoligada;idpartida;valor\n2;5;10,5\n");
        let mut src = CsvExport::open(f.path()).unwrap().with_delimiter(b';');
        let set = src.fetch(&query()).unwrap();
        assert_eq!(set.rows, vec![vec![
            RawValue::from("2"),
            RawValue::from("5"),
            RawValue::from("10,5"),
        ]]);
    }

    #[test]
    fn missing_key_columns_are_fatal() {
        let f = export("codcoligada,valor\n1,2\n");
        let mut src = CsvExport::open(f.path()).unwrap();
        let err = src.fetch(&query()).unwrap_err();
        assert!(err.to_string().contains("idpartida"));
    }

    #[test]
    fn missing_export_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CsvExport::open(dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn wide_rows_are_cut_to_the_header() {
        let f = export("codcoligada;idpartida;valor\n2;5;10,5;stray;9\n3;6;1,0\n");
        let mut src = CsvExport::open(f.path()).unwrap().with_delimiter(b';');
        let set = src.fetch(&query()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.rows.iter().all(|r| r.len() == set.columns.len()));
        assert_eq!(set.rows[0][2], RawValue::from("10,5"));
    }
}

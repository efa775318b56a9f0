// src/pipeline.rs

use anyhow::{Context, Result};
use std::{collections::HashSet, time::Instant};
use tracing::{info, instrument, warn};

use crate::backend::{BackendClient, RpcInsert, TableUpsert};
use crate::config::{Config, WriteMode};
use crate::ledger::{assign_keys, Record};
use crate::normalize::normalize_row;
use crate::upload::{BulkInsert, UploadReport, Uploader};
use crate::validate::{validate, RowCount, Verdict};
use crate::warehouse::{LedgerQuery, LedgerSource};

/// Destination side of a run: bulk inserts, keyed upserts for retries, row
/// counts and, for the replace mode, a full wipe.
pub trait Destination: RowCount {
    type Insert<'a>: BulkInsert
    where
        Self: 'a;
    type Upsert<'a>: BulkInsert
    where
        Self: 'a;

    fn bulk_insert(&self) -> Self::Insert<'_>;
    fn upsert(&self) -> Self::Upsert<'_>;
    /// Natural keys already stored.
    fn stored_keys(&self) -> Result<HashSet<String>>;
    fn wipe(&self) -> Result<()>;
}

impl Destination for BackendClient {
    type Insert<'a> = RpcInsert<'a>;
    type Upsert<'a> = TableUpsert<'a>;

    fn bulk_insert(&self) -> Self::Insert<'_> {
        self.rpc_insert()
    }

    fn upsert(&self) -> Self::Upsert<'_> {
        self.table_upsert()
    }

    fn stored_keys(&self) -> Result<HashSet<String>> {
        Ok(self.existing_keys()?)
    }

    fn wipe(&self) -> Result<()> {
        Ok(self.delete_all()?)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub extracted: usize,
    pub report: UploadReport,
    pub verdict: Verdict,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.verdict.is_complete()
    }
}

/// One parameterized sync: extract, normalize, key, upload, verify.
pub struct Pipeline<'c> {
    config: &'c Config,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }

    pub fn query(&self) -> LedgerQuery {
        LedgerQuery::new(
            self.config.source.date_floor,
            self.config.source.excluded_tag.clone(),
        )
    }

    /// Pull raw rows from `source` and turn them into keyed records.
    #[instrument(level = "info", skip_all)]
    pub fn extract(&self, source: &mut impl LedgerSource) -> Result<Vec<Record>> {
        let start = Instant::now();
        let set = source
            .fetch(&self.query())
            .context("extracting ledger rows")?;
        let columns = set.columns;
        let records: Vec<Record> = set
            .rows
            .into_iter()
            .map(|row| normalize_row(&columns, row))
            .collect();
        let records = assign_keys(records);
        info!(records = records.len(), elapsed = ?start.elapsed(), "extracted");
        Ok(records)
    }

    /// Upload already-extracted records and verify the backend count.
    pub fn load(&self, records: &[Record], dest: &impl Destination) -> Result<RunSummary> {
        if self.config.upload.write_mode == WriteMode::Replace {
            warn!("replace mode: emptying destination table before upload");
            dest.wipe().context("emptying destination table")?;
        }

        let insert = dest.bulk_insert();
        let report = Uploader::new(&insert, self.config.upload.chunk_size)?
            .with_error_dir(&self.config.upload.error_dir)
            .upload(records);

        let verdict = validate(dest, records.len() as u64, report.inserted as u64);
        Ok(RunSummary {
            extracted: records.len(),
            report,
            verdict,
        })
    }

    /// Full run. Only extraction and wipe errors abort; chunk failures end
    /// up in the summary.
    pub fn run(
        &self,
        source: &mut impl LedgerSource,
        dest: &impl Destination,
    ) -> Result<RunSummary> {
        let records = self.extract(source)?;
        let summary = self.load(&records, dest)?;
        info!(
            extracted = summary.extracted,
            inserted = summary.report.inserted,
            errors = summary.report.errors,
            success = summary.success(),
            "run finished"
        );
        Ok(summary)
    }
}

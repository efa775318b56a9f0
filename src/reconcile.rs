// src/reconcile.rs

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, instrument};

use crate::ledger::{Record, KEY_COLUMN};
use crate::pipeline::Destination;
use crate::upload::{BatchError, UploadReport, Uploader};
use crate::validate::{validate, Verdict};

/// Which rows a retry pass re-sends.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Rows whose key the destination does not store yet.
    MissingKeys,
    /// Rows of the failed batches recorded by an earlier full run.
    FailedBatches(Vec<BatchError>),
}

#[derive(Debug, Clone)]
pub struct RetrySummary {
    pub extracted: usize,
    pub resent: usize,
    pub report: UploadReport,
    pub verdict: Verdict,
}

impl RetrySummary {
    pub fn success(&self) -> bool {
        self.verdict.is_complete()
    }
}

/// Upsert the selected subset of `records` and recount the destination.
///
/// A retry pass writes no error artifact. Its batch numbers index the subset,
/// and the artifact format numbers batches of the full extraction, so the
/// artifact of the original run stays the one to replay.
#[instrument(level = "info", skip_all, fields(records = records.len(), chunk_size = chunk_size))]
pub fn retry(
    records: &[Record],
    selection: &Selection,
    chunk_size: usize,
    dest: &impl Destination,
) -> Result<RetrySummary> {
    let subset = match selection {
        Selection::MissingKeys => {
            let stored = dest
                .stored_keys()
                .context("listing keys already in destination")?;
            missing_records(records, &stored)
        }
        Selection::FailedBatches(failures) => {
            records_for_failed_batches(records, chunk_size, failures)
        }
    };

    let report = if subset.is_empty() {
        info!("nothing to re-send");
        UploadReport::default()
    } else {
        let upsert = dest.upsert();
        Uploader::new(&upsert, chunk_size)?.upload(&subset)
    };

    // rows outside the subset are taken as already present
    let expected = records.len() as u64;
    let present = expected.saturating_sub(subset.len() as u64) + report.inserted as u64;
    let verdict = validate(dest, expected, present);

    Ok(RetrySummary {
        extracted: records.len(),
        resent: subset.len(),
        report,
        verdict,
    })
}

/// Records whose natural key the backend does not have yet, in extraction
/// order. A key repeated in `records` is returned once. Records without a
/// key are skipped.
pub fn missing_records(records: &[Record], existing: &HashSet<String>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let missing: Vec<Record> = records
        .iter()
        .filter(|r| {
            r.get(KEY_COLUMN)
                .and_then(|v| v.as_str())
                .map_or(false, |k| !existing.contains(k) && seen.insert(k.to_string()))
        })
        .cloned()
        .collect();
    info!(
        extracted = records.len(),
        present = existing.len(),
        missing = missing.len(),
        "diffed extraction against backend keys"
    );
    missing
}

/// Records that belonged to the failed batches of an earlier run. Only
/// meaningful when `records` comes from the same extraction order and
/// `chunk_size` matches that run.
pub fn records_for_failed_batches(
    records: &[Record],
    chunk_size: usize,
    failures: &[BatchError],
) -> Vec<Record> {
    if chunk_size == 0 {
        return Vec::new();
    }
    let wanted: BTreeSet<usize> = failures.iter().map(|f| f.batch).collect();
    let mut out = Vec::new();
    for batch in wanted {
        let start = (batch.saturating_sub(1)).saturating_mul(chunk_size);
        if batch == 0 || start >= records.len() {
            debug!(batch, "failed batch is outside the current extraction");
            continue;
        }
        let end = (start + chunk_size).min(records.len());
        out.extend_from_slice(&records[start..end]);
    }
    info!(
        batches = failures.len(),
        records = out.len(),
        "selected records of failed batches"
    );
    out
}

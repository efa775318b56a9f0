// src/upload/mod.rs

use anyhow::{bail, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

use crate::ledger::Record;

pub mod artifact;

/// Longest error text kept per failed batch.
pub const MESSAGE_LIMIT: usize = 200;

/// Result of submitting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// 2xx from the backend.
    Accepted,
    /// Non-2xx status with the response body.
    Rejected { status: u16, body: String },
    /// Timeout, reset or any other failure before a status arrived.
    Transport(String),
}

/// A remote operation that takes a slice of records in one call.
pub trait BulkInsert {
    fn insert_batch(&self, rows: &[Record]) -> ChunkOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionMarker {
    #[serde(rename = "EXCEPTION")]
    Exception,
}

/// HTTP code of a rejected batch, or `"EXCEPTION"` for a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchStatus {
    Http(u16),
    Exception(ExceptionMarker),
}

/// One entry of the error artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// 1-based batch index.
    pub batch: usize,
    pub status: BatchStatus,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub inserted: usize,
    pub errors: usize,
    pub batches: usize,
    pub failures: Vec<BatchError>,
    pub artifact: Option<PathBuf>,
}

impl UploadReport {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Sends records to a [`BulkInsert`] endpoint in fixed-size chunks, one call
/// at a time. A failed chunk is recorded and the loop moves on.
pub struct Uploader<'a, E: BulkInsert> {
    endpoint: &'a E,
    chunk_size: usize,
    error_dir: Option<PathBuf>,
}

impl<'a, E: BulkInsert> Uploader<'a, E> {
    pub fn new(endpoint: &'a E, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        Ok(Self {
            endpoint,
            chunk_size,
            error_dir: None,
        })
    }

    /// Where the error artifact is written when a chunk fails. Without it
    /// failures are only logged.
    pub fn with_error_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.error_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[instrument(level = "info", skip_all, fields(records = records.len(), chunk_size = self.chunk_size))]
    pub fn upload(&self, records: &[Record]) -> UploadReport {
        let total = records.len();
        let batches = total.div_ceil(self.chunk_size);
        let mut report = UploadReport {
            batches,
            ..Default::default()
        };
        info!(batches, "starting upload");

        for (i, chunk) in records.chunks(self.chunk_size).enumerate() {
            let batch = i + 1;
            match self.endpoint.insert_batch(chunk) {
                ChunkOutcome::Accepted => {
                    report.inserted += chunk.len();
                    info!(
                        batch,
                        batches,
                        size = chunk.len(),
                        pct = percent(report.inserted + report.errors, total),
                        inserted = report.inserted,
                        errors = report.errors,
                        "batch accepted"
                    );
                }
                ChunkOutcome::Rejected { status, body } => {
                    report.errors += chunk.len();
                    let message = if body.is_empty() {
                        "no message".to_string()
                    } else {
                        truncate(&body, MESSAGE_LIMIT)
                    };
                    warn!(
                        batch,
                        batches,
                        status,
                        pct = percent(report.inserted + report.errors, total),
                        message = %truncate(&message, 100),
                        "batch rejected"
                    );
                    report.failures.push(BatchError {
                        batch,
                        status: BatchStatus::Http(status),
                        message,
                    });
                }
                ChunkOutcome::Transport(msg) => {
                    report.errors += chunk.len();
                    let message = truncate(&msg, MESSAGE_LIMIT);
                    warn!(
                        batch,
                        batches,
                        pct = percent(report.inserted + report.errors, total),
                        message = %truncate(&message, 100),
                        "batch transport failure"
                    );
                    report.failures.push(BatchError {
                        batch,
                        status: BatchStatus::Exception(ExceptionMarker::Exception),
                        message,
                    });
                }
            }
        }

        info!(
            inserted = report.inserted,
            errors = report.errors,
            "upload finished"
        );

        if !report.failures.is_empty() {
            if let Some(dir) = &self.error_dir {
                match artifact::write(dir, &report.failures, Local::now()) {
                    Ok(path) => {
                        info!(path = %path.display(), failed = report.failures.len(), "wrote error artifact");
                        report.artifact = Some(path);
                    }
                    Err(e) => error!(error = %e, "could not write error artifact"),
                }
            }
        }

        report
    }
}

/// Share of records processed, rounded to one decimal.
fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 * 1000.0 / total as f64).round() / 10.0
}

/// First `limit` characters of `s`.
pub fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::tempdir;

    /// Records every chunk it sees and fails the batches it is told to.
    struct ScriptedEndpoint {
        seen: RefCell<Vec<Vec<Record>>>,
        reject: Vec<usize>,
        drop: Vec<usize>,
    }

    impl ScriptedEndpoint {
        fn new(reject: Vec<usize>, drop: Vec<usize>) -> Self {
            Self {
                seen: RefCell::new(Vec::new()),
                reject,
                drop,
            }
        }
    }

    impl BulkInsert for ScriptedEndpoint {
        fn insert_batch(&self, rows: &[Record]) -> ChunkOutcome {
            let mut seen = self.seen.borrow_mut();
            seen.push(rows.to_vec());
            let batch = seen.len();
            if self.reject.contains(&batch) {
                ChunkOutcome::Rejected {
                    status: 500,
                    body: "x".repeat(300),
                }
            } else if self.drop.contains(&batch) {
                ChunkOutcome::Transport("operation timed out".to_string())
            } else {
                ChunkOutcome::Accepted
            }
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({ "n": i }).as_object().unwrap().clone())
            .collect()
    }

    fn artifacts(dir: &Path) -> Vec<PathBuf> {
        glob::glob(&format!("{}/errors_*.json", dir.display()))
            .unwrap()
            .filter_map(Result::ok)
            .collect()
    }

    #[test]
    fn chunks_preserve_order_and_sizes() {
        let ep = ScriptedEndpoint::new(vec![], vec![]);
        let recs = records(1050);
        let report = Uploader::new(&ep, 500).unwrap().upload(&recs);

        let seen = ep.seen.borrow();
        let sizes: Vec<usize> = seen.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![500, 500, 50]);
        let flat: Vec<Record> = seen.iter().flatten().cloned().collect();
        assert_eq!(flat, recs);
        assert_eq!(report.batches, 3);
    }

    #[test]
    fn all_accepted_writes_no_artifact() {
        let dir = tempdir().unwrap();
        let ep = ScriptedEndpoint::new(vec![], vec![]);
        let report = Uploader::new(&ep, 7)
            .unwrap()
            .with_error_dir(dir.path())
            .upload(&records(20));
        assert_eq!(report.inserted, 20);
        assert_eq!(report.errors, 0);
        assert!(report.is_clean());
        assert!(report.artifact.is_none());
        assert!(artifacts(dir.path()).is_empty());
    }

    #[test]
    fn second_batch_fails() {
        let dir = tempdir().unwrap();
        let ep = ScriptedEndpoint::new(vec![2], vec![]);
        let report = Uploader::new(&ep, 500)
            .unwrap()
            .with_error_dir(dir.path())
            .upload(&records(1050));

        assert_eq!(report.inserted, 550);
        assert_eq!(report.errors, 500);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].batch, 2);
        assert_eq!(report.failures[0].status, BatchStatus::Http(500));
        assert_eq!(report.failures[0].message.chars().count(), MESSAGE_LIMIT);

        let files = artifacts(dir.path());
        assert_eq!(files.len(), 1);
        let entries = artifact::read(&files[0]).unwrap();
        assert_eq!(entries, report.failures);
    }

    #[test]
    fn transport_failures_are_exceptions() {
        let ep = ScriptedEndpoint::new(vec![], vec![1, 3]);
        let report = Uploader::new(&ep, 2).unwrap().upload(&records(5));
        assert_eq!(report.inserted, 2);
        assert_eq!(report.errors, 3);
        let statuses: Vec<BatchStatus> = report.failures.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![BatchStatus::Exception(ExceptionMarker::Exception); 2]
        );
        assert!(report.artifact.is_none(), "no error dir configured");
    }

    #[test]
    fn counts_always_add_up() {
        for (n, size, reject) in [(0, 3, vec![]), (1, 1, vec![1]), (10, 3, vec![2, 4]), (9, 9, vec![])] {
            let ep = ScriptedEndpoint::new(reject, vec![]);
            let report = Uploader::new(&ep, size).unwrap().upload(&records(n));
            assert_eq!(report.inserted + report.errors, n);
            assert_eq!(report.batches, n.div_ceil(size));
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let ep = ScriptedEndpoint::new(vec![], vec![]);
        assert!(Uploader::new(&ep, 0).is_err());
    }

    #[test]
    fn status_serializes_like_the_artifact_format() {
        let e = BatchError {
            batch: 4,
            status: BatchStatus::Exception(ExceptionMarker::Exception),
            message: "timeout".into(),
        };
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({ "batch": 4, "status": "EXCEPTION", "message": "timeout" })
        );
        let h: BatchStatus = serde_json::from_value(json!(413)).unwrap();
        assert_eq!(h, BatchStatus::Http(413));
    }
}

// src/validate.rs

use anyhow::Result;
use tracing::{error, info, warn};

use crate::backend::BackendClient;

/// Anything that can report the destination table's exact row count.
pub trait RowCount {
    fn count_rows(&self) -> Result<u64>;
}

impl RowCount for BackendClient {
    fn count_rows(&self) -> Result<u64> {
        Ok(self.row_count()?)
    }
}

/// How the backend's row count compares to what the run extracted and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Backend holds exactly the extracted count.
    Complete { count: u64 },
    /// Backend holds exactly what was accepted; the rest is missing.
    Partial { count: u64, shortfall: u64 },
    /// No tracked number explains the backend count.
    Divergent {
        expected: u64,
        inserted: u64,
        backend: u64,
    },
    /// The count itself could not be obtained.
    Unverified { reason: String },
}

impl Verdict {
    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Complete { .. })
    }
}

/// Pure comparison of the three counts.
pub fn classify(expected: u64, inserted: u64, backend: u64) -> Verdict {
    if backend == expected {
        Verdict::Complete { count: backend }
    } else if backend == inserted {
        Verdict::Partial {
            count: backend,
            shortfall: expected.saturating_sub(inserted),
        }
    } else {
        Verdict::Divergent {
            expected,
            inserted,
            backend,
        }
    }
}

/// Ask the backend for its row count and classify it.
pub fn validate(backend: &impl RowCount, expected: u64, inserted: u64) -> Verdict {
    let verdict = match backend.count_rows() {
        Ok(count) => classify(expected, inserted, count),
        Err(e) => Verdict::Unverified {
            reason: format!("{:#}", e),
        },
    };

    match &verdict {
        Verdict::Complete { count } => info!(count, "all rows present in backend"),
        Verdict::Partial { count, shortfall } => {
            warn!(count, shortfall, "partial sync; rows missing from backend")
        }
        Verdict::Divergent {
            expected,
            inserted,
            backend,
        } => error!(
            expected,
            inserted, backend, "row counts diverge; manual reconciliation needed"
        ),
        Verdict::Unverified { reason } => error!(%reason, "could not count backend rows"),
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedCount(Option<u64>);

    impl RowCount for FixedCount {
        fn count_rows(&self) -> Result<u64> {
            self.0.ok_or_else(|| anyhow!("connection refused"))
        }
    }

    #[test]
    fn complete() {
        assert_eq!(
            validate(&FixedCount(Some(1050)), 1050, 1050),
            Verdict::Complete { count: 1050 }
        );
    }

    #[test]
    fn partial_reports_shortfall() {
        assert_eq!(
            validate(&FixedCount(Some(550)), 1050, 550),
            Verdict::Partial {
                count: 550,
                shortfall: 500
            }
        );
    }

    #[test]
    fn divergence_keeps_all_counts() {
        assert_eq!(
            classify(1050, 550, 700),
            Verdict::Divergent {
                expected: 1050,
                inserted: 550,
                backend: 700
            }
        );
    }

    #[test]
    fn expected_wins_when_both_match() {
        assert!(classify(10, 10, 10).is_complete());
    }

    #[test]
    fn count_failure_is_unverified() {
        let v = validate(&FixedCount(None), 5, 5);
        assert!(matches!(v, Verdict::Unverified { ref reason } if reason.contains("refused")));
        assert!(!v.is_complete());
    }
}

// src/backend/content_range.rs

use super::BackendError;

/// Total from a `content-range` header: `0-0/1050` → 1050, `*/0` → 0.
pub fn parse_content_range(header: &str) -> Result<u64, BackendError> {
    let bad = || BackendError::ContentRange(header.to_string());
    let (_, total) = header.trim().rsplit_once('/').ok_or_else(bad)?;
    total.trim().parse::<u64>().map_err(|_| bad())
}

// src/upload/artifact.rs

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use glob::glob;
use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use super::BatchError;

/// Write `errors_<yyyymmdd_HHMMSS>.json` into `dir` and return its path.
pub fn write<Tz>(dir: &Path, failures: &[BatchError], at: DateTime<Tz>) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("errors_{}.json", at.format("%Y%m%d_%H%M%S")));
    let json = serde_json::to_string_pretty(failures).context("serializing error artifact")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read(path: &Path) -> Result<Vec<BatchError>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Newest artifact in `dir`. The timestamped names sort chronologically.
pub fn latest(dir: &Path) -> Result<Option<PathBuf>> {
    let pattern = format!("{}/errors_*.json", dir.display());
    let mut found: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad glob pattern {}", pattern))?
        .filter_map(Result::ok)
        .collect();
    found.sort();
    Ok(found.pop())
}

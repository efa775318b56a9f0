// src/config.rs

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};
use url::Url;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "LEDGERSYNC_CONFIG";

/// How the destination table is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Insert-or-update by natural key; never empties the table.
    #[default]
    Upsert,
    /// Wipe the table, then insert everything.
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// REST root, e.g. `https://<project>.supabase.co/rest/v1`.
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub insert_function: String,
    pub conflict_key: String,
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: "dre_fabric".to_string(),
            insert_function: "insert_batch".to_string(),
            conflict_key: "chave_id".to_string(),
            timeout_secs: 180,
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub error_dir: PathBuf,
    pub write_mode: WriteMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            // best observed success rate against the bulk RPC
            chunk_size: 500,
            error_dir: PathBuf::from("."),
            write_mode: WriteMode::Upsert,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub export_path: PathBuf,
    /// Field separator of the export; `;` for Brazilian-locale spreadsheets.
    pub delimiter: char,
    pub date_floor: NaiveDate,
    pub excluded_tag: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            export_path: PathBuf::from("exports/ledger.csv"),
            delimiter: ',',
            date_floor: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default(),
            excluded_tag: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Re-submit the failed batches of the latest error artifact instead of
    /// diffing keys against the backend.
    pub from_artifact: bool,
}

/// Every run parameter, built once at startup and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub upload: UploadConfig,
    pub source: SourceConfig,
    pub reconcile: ReconcileConfig,
}

impl Config {
    /// File named by `LEDGERSYNC_CONFIG` (if any), then `LEDGERSYNC_*`
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
        Self::load_with(path.as_deref(), |k| std::env::var(k).ok())
    }

    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(lookup)?;
        cfg.validate()?;
        info!(
            table = %cfg.backend.table,
            chunk_size = cfg.upload.chunk_size,
            write_mode = ?cfg.upload.write_mode,
            export = %cfg.source.export_path.display(),
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(path = %path.display(), "read config file");
        Ok(cfg)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("LEDGERSYNC_BACKEND_URL") {
            self.backend.url = v;
        }
        if let Some(v) = lookup("LEDGERSYNC_API_KEY") {
            self.backend.api_key = v;
        }
        if let Some(v) = lookup("LEDGERSYNC_TABLE") {
            self.backend.table = v;
        }
        if let Some(v) = lookup("LEDGERSYNC_INSERT_FUNCTION") {
            self.backend.insert_function = v;
        }
        if let Some(v) = lookup("LEDGERSYNC_TIMEOUT_SECS") {
            self.backend.timeout_secs = v
                .parse()
                .with_context(|| format!("LEDGERSYNC_TIMEOUT_SECS={:?}", v))?;
        }
        if let Some(v) = lookup("LEDGERSYNC_CHUNK_SIZE") {
            self.upload.chunk_size = v
                .parse()
                .with_context(|| format!("LEDGERSYNC_CHUNK_SIZE={:?}", v))?;
        }
        if let Some(v) = lookup("LEDGERSYNC_ERROR_DIR") {
            self.upload.error_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LEDGERSYNC_WRITE_MODE") {
            self.upload.write_mode = match v.to_ascii_lowercase().as_str() {
                "upsert" => WriteMode::Upsert,
                "replace" => WriteMode::Replace,
                other => bail!("LEDGERSYNC_WRITE_MODE must be upsert or replace, got {:?}", other),
            };
        }
        if let Some(v) = lookup("LEDGERSYNC_EXPORT_PATH") {
            self.source.export_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LEDGERSYNC_DATE_FLOOR") {
            self.source.date_floor = NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("LEDGERSYNC_DATE_FLOOR={:?}", v))?;
        }
        if let Some(v) = lookup("LEDGERSYNC_RECONCILE_FROM_ARTIFACT") {
            self.reconcile.from_artifact = matches!(v.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.upload.chunk_size == 0 {
            bail!("upload.chunk_size must be positive");
        }
        if !self.source.delimiter.is_ascii() {
            bail!("source.delimiter must be a single ASCII character");
        }
        if self.backend.page_size == 0 {
            bail!("backend.page_size must be positive");
        }
        if self.backend.api_key.trim().is_empty() {
            bail!("backend.api_key is empty (set LEDGERSYNC_API_KEY)");
        }
        self.backend_url()?;
        Ok(())
    }

    /// Base URL with a trailing slash so relative joins stay under it.
    pub fn backend_url(&self) -> Result<Url> {
        let mut raw = self.backend.url.trim().to_string();
        if raw.is_empty() {
            bail!("backend.url is empty (set LEDGERSYNC_BACKEND_URL)");
        }
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("parsing backend url {:?}", raw))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }
}

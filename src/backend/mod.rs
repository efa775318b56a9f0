// src/backend/mod.rs

use anyhow::{Context, Result};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    StatusCode,
};
use serde_json::{json, Value};
use std::{collections::HashSet, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::ledger::Record;
use crate::upload::{BulkInsert, ChunkOutcome};

pub mod content_range;

pub use content_range::parse_content_range;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed content-range header {0:?}")]
    ContentRange(String),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Blocking client for the backend's REST surface.
pub struct BackendClient {
    http: Client,
    base: Url,
    table: String,
    conflict_key: String,
    insert_function: String,
    page_size: usize,
}

impl BackendClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let base = cfg.backend_url()?;
        Self::with_base(
            base,
            &cfg.backend.api_key,
            cfg.timeout(),
            &cfg.backend.table,
            &cfg.backend.conflict_key,
            &cfg.backend.insert_function,
            cfg.backend.page_size,
        )
    }

    pub fn with_base(
        base: Url,
        api_key: &str,
        timeout: Duration,
        table: &str,
        conflict_key: &str,
        insert_function: &str,
        page_size: usize,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("api key is not a valid header value")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("api key is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base,
            table: table.to_string(),
            conflict_key: conflict_key.to_string(),
            insert_function: insert_function.to_string(),
            page_size: page_size.max(1),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn table_url(&self) -> Result<Url, BackendError> {
        Ok(self.base.join(&self.table)?)
    }

    /// The bulk-insert RPC, `POST <base>/rpc/<function>` with `{"dados": [...]}`.
    pub fn rpc_insert(&self) -> RpcInsert<'_> {
        RpcInsert { client: self }
    }

    /// Direct table upsert on the natural key, used for re-submissions.
    pub fn table_upsert(&self) -> TableUpsert<'_> {
        TableUpsert { client: self }
    }

    /// Remove every row of the table. Only used by the `replace` write mode.
    #[instrument(level = "info", skip(self), fields(table = %self.table))]
    pub fn delete_all(&self) -> Result<(), BackendError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("id", "gt.0");
        let resp = self
            .http
            .delete(url)
            .header("Prefer", "return=minimal")
            .send()?;
        let resp = check_status(resp)?;
        info!(status = resp.status().as_u16(), "table emptied");
        Ok(())
    }

    /// Exact row count taken from the `content-range` header.
    #[instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub fn row_count(&self) -> Result<u64, BackendError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("limit", "1");
        let resp = self.http.get(url).header("Prefer", "count=exact").send()?;
        let resp = check_status(resp)?;
        let header = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let count = parse_content_range(&header)?;
        debug!(count, "backend row count");
        Ok(count)
    }

    /// Every non-null natural key currently stored, fetched page by page.
    #[instrument(level = "info", skip(self), fields(table = %self.table))]
    pub fn existing_keys(&self) -> Result<HashSet<String>, BackendError> {
        let key = self.conflict_key.as_str();
        let mut keys = HashSet::new();
        let mut offset = 0usize;
        loop {
            let mut url = self.table_url()?;
            url.query_pairs_mut()
                .append_pair("select", key)
                .append_pair(key, "not.is.null")
                .append_pair("order", key)
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("offset", &offset.to_string());
            let resp = check_status(self.http.get(url).send()?)?;
            let page: Vec<Value> = resp.json()?;
            let n = page.len();
            keys.extend(
                page.into_iter()
                    .filter_map(|row| row.get(key).and_then(Value::as_str).map(str::to_string)),
            );
            debug!(offset, page = n, total = keys.len(), "fetched key page");
            if n < self.page_size {
                break;
            }
            offset += n;
        }
        info!(keys = keys.len(), "loaded backend keys");
        Ok(keys)
    }

    fn send_rows(&self, req: RequestBuilder) -> ChunkOutcome {
        match req.send() {
            Ok(resp) if resp.status().is_success() => ChunkOutcome::Accepted,
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().unwrap_or_default();
                ChunkOutcome::Rejected { status, body }
            }
            Err(e) => ChunkOutcome::Transport(e.to_string()),
        }
    }
}

fn check_status(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() || status == StatusCode::PARTIAL_CONTENT {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    warn!(status = status.as_u16(), "backend request failed");
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

pub struct RpcInsert<'a> {
    client: &'a BackendClient,
}

impl BulkInsert for RpcInsert<'_> {
    fn insert_batch(&self, rows: &[Record]) -> ChunkOutcome {
        let url = match self
            .client
            .base
            .join(&format!("rpc/{}", self.client.insert_function))
        {
            Ok(u) => u,
            Err(e) => return ChunkOutcome::Transport(e.to_string()),
        };
        let body = json!({ "dados": rows });
        self.client.send_rows(self.client.http.post(url).json(&body))
    }
}

pub struct TableUpsert<'a> {
    client: &'a BackendClient,
}

impl BulkInsert for TableUpsert<'_> {
    fn insert_batch(&self, rows: &[Record]) -> ChunkOutcome {
        let mut url = match self.client.table_url() {
            Ok(u) => u,
            Err(e) => return ChunkOutcome::Transport(e.to_string()),
        };
        url.query_pairs_mut()
            .append_pair("on_conflict", &self.client.conflict_key);
        let req = self
            .client
            .http
            .post(url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.client.send_rows(req)
    }
}

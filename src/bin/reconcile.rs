//! Retry pass: re-extract, find the rows the backend is missing and upsert
//! only those.

use anyhow::{Context, Result};
use ledgersync::{
    backend::BackendClient,
    reconcile::{retry, Selection},
    upload::artifact,
    warehouse::CsvExport,
    Config, Pipeline,
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<ExitCode> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();
    info!("reconcile startup");

    let cfg = Config::load().context("loading configuration")?;
    let delimiter = u8::try_from(cfg.source.delimiter).context("source.delimiter")?;
    let mut source = CsvExport::open(&cfg.source.export_path)?.with_delimiter(delimiter);
    let backend = BackendClient::new(&cfg)?;

    let records = Pipeline::new(&cfg).extract(&mut source)?;

    // ─── choose the subset to re-send ────────────────────────────────
    let selection = if cfg.reconcile.from_artifact {
        match artifact::latest(&cfg.upload.error_dir)? {
            Some(path) => {
                info!(path = %path.display(), "re-sending failed batches from artifact");
                Selection::FailedBatches(artifact::read(&path)?)
            }
            None => {
                warn!(dir = %cfg.upload.error_dir.display(), "no error artifact found");
                Selection::FailedBatches(Vec::new())
            }
        }
    } else {
        Selection::MissingKeys
    };

    let summary = retry(&records, &selection, cfg.upload.chunk_size, &backend)?;
    info!(
        resent = summary.resent,
        inserted = summary.report.inserted,
        errors = summary.report.errors,
        "re-submission finished"
    );

    if summary.success() {
        info!("backend reconciled");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(verdict = ?summary.verdict, "backend still out of sync");
        Ok(ExitCode::FAILURE)
    }
}

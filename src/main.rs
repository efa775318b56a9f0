use anyhow::{Context, Result};
use ledgersync::{backend::BackendClient, warehouse::CsvExport, Config, Pipeline};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::load().context("loading configuration")?;

    // ─── 3) open source and backend (fatal on failure) ───────────────
    let delimiter = u8::try_from(cfg.source.delimiter).context("source.delimiter")?;
    let mut source = CsvExport::open(&cfg.source.export_path)?.with_delimiter(delimiter);
    let backend = BackendClient::new(&cfg)?;

    // ─── 4) extract → normalize → key → upload → validate ────────────
    let summary = Pipeline::new(&cfg).run(&mut source, &backend)?;

    // ─── 5) summary ──────────────────────────────────────────────────
    info!(
        extracted = summary.extracted,
        inserted = summary.report.inserted,
        errors = summary.report.errors,
        verdict = ?summary.verdict,
        "result"
    );
    if let Some(path) = &summary.report.artifact {
        warn!(path = %path.display(), "failed batches saved; run `reconcile` to retry");
    }

    if summary.success() {
        info!("sync complete");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("sync incomplete");
        Ok(ExitCode::FAILURE)
    }
}

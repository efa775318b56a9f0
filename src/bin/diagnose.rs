//! Read-only report: extraction size, backend count and the key gap between
//! them. The warehouse query behind the export is logged at debug level.

use anyhow::{Context, Result};
use ledgersync::{
    backend::BackendClient, reconcile::missing_records, warehouse::CsvExport, Config, Pipeline,
};
use std::collections::HashSet;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    let cfg = Config::load().context("loading configuration")?;
    let pipeline = Pipeline::new(&cfg);
    debug!(sql = %pipeline.query().sql(), "ledger query");

    let delimiter = u8::try_from(cfg.source.delimiter).context("source.delimiter")?;
    let mut source = CsvExport::open(&cfg.source.export_path)?.with_delimiter(delimiter);
    let backend = BackendClient::new(&cfg)?;

    let records = pipeline.extract(&mut source)?;
    let backend_count = backend.row_count().context("counting backend rows")?;
    let existing = backend.existing_keys().context("listing backend keys")?;
    let missing = missing_records(&records, &existing);

    let extracted_keys: HashSet<&str> = records
        .iter()
        .filter_map(|r| r.get("chave_id").and_then(|v| v.as_str()))
        .collect();
    let orphaned = existing
        .iter()
        .filter(|k| !extracted_keys.contains(k.as_str()))
        .count();

    println!("\n{: <30} {:>12}", "Source", "Rows");
    println!("{:-<43}", "");
    println!("{: <30} {:>12}", "export", records.len());
    println!("{: <30} {:>12}", format!("backend ({})", backend.table()), backend_count);
    println!("{: <30} {:>12}", "keys missing from backend", missing.len());
    println!("{: <30} {:>12}", "backend keys not in export", orphaned);

    for r in missing.iter().take(10) {
        println!(
            "  missing {}",
            r.get("chave_id").and_then(|v| v.as_str()).unwrap_or("?")
        );
    }

    info!(
        extracted = records.len(),
        backend = backend_count,
        missing = missing.len(),
        orphaned,
        "diagnosis done"
    );
    Ok(())
}

// ABOUTME: Write command: split a mysqldump stream into a directory tree
// ABOUTME: Runs the streaming writer on a blocking thread with progress output

use crate::limits::Limits;
use crate::progress::Progress;
use crate::tree::{self, WriteSummary};
use crate::utils;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Write a dump stream into a directory tree
///
/// Reads the dump from `input` (stdin when `None` or `-`) and materializes it
/// under `output`. Databases and tables are filtered through `limits`.
///
/// # Errors
///
/// Returns an error if the input cannot be opened, the dump is malformed, or
/// the tree cannot be written. A failed run leaves partial output behind; run
/// again into a clean directory.
pub async fn write(
    input: Option<PathBuf>,
    output: PathBuf,
    limits: Limits,
    quiet: bool,
) -> Result<WriteSummary> {
    tracing::info!(
        "Writing dump from {} to {}",
        describe_input(input.as_deref()),
        output.display()
    );
    if !limits.is_empty() {
        tracing::info!("Limits are active; excluded entities will be skipped");
    }

    let summary = tokio::task::spawn_blocking(move || -> Result<WriteSummary> {
        let reader = utils::open_dump_input(input.as_deref())?;
        let progress = Progress::new(quiet);
        let summary = tree::write(reader, &output, &limits, |entity| progress.report(entity));
        progress.finish();
        summary
    })
    .await
    .context("Write task panicked")??;

    tracing::info!(
        "✓ Wrote {} database(s), {} table(s), {} row(s) from {} statement(s)",
        summary.databases,
        summary.tables,
        summary.rows,
        summary.statements
    );

    Ok(summary)
}

fn describe_input(input: Option<&std::path::Path>) -> String {
    match input {
        Some(path) if path != std::path::Path::new("-") => path.display().to_string(),
        _ => "stdin".to_string(),
    }
}

// ABOUTME: Read command: serialize a directory tree back into a mysqldump stream
// ABOUTME: Output is suitable for piping into the mysql client

use crate::limits::Limits;
use crate::progress::Progress;
use crate::tree::{self, ReadOptions, ReadSummary};
use crate::utils;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Read a directory tree and write it out as a dump stream
///
/// The dump goes to `output` (stdout when `None` or `-`). Progress and logs
/// go to stderr so stdout stays a clean SQL stream.
///
/// # Errors
///
/// Returns an error if `input` is not a directory, the tree is unreadable,
/// or the output cannot be written.
pub async fn read(
    input: PathBuf,
    output: Option<PathBuf>,
    limits: Limits,
    options: ReadOptions,
    quiet: bool,
) -> Result<ReadSummary> {
    if !input.is_dir() {
        bail!(
            "Input '{}' is not a directory. Expected a tree created by the write command",
            input.display()
        );
    }

    tracing::info!(
        "Reading tree {} (extended inserts: {}, drop database: {})",
        input.display(),
        if options.skip_extended_insert {
            "off".to_string()
        } else {
            format!("up to {} bytes", options.max_extended_insert)
        },
        options.add_drop_database
    );

    let summary = tokio::task::spawn_blocking(move || -> Result<ReadSummary> {
        let mut out = utils::open_dump_output(output.as_deref())?;
        let progress = Progress::new(quiet);
        let summary = tree::read(&input, &limits, &options, &mut out, |entity| {
            progress.report(entity)
        });
        progress.finish();
        summary
    })
    .await
    .context("Read task panicked")??;

    tracing::info!(
        "✓ Read {} database(s), {} table(s), {} row(s) into {} INSERT statement(s)",
        summary.databases,
        summary.tables,
        summary.rows,
        summary.inserts
    );

    Ok(summary)
}

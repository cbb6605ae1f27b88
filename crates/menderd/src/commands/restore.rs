use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use mender_config::{MenderConfig, backup_dir};
use mender_fix::{FileSnapshotStore, RollbackReport};

/// Restores a persisted transaction and reports each file. Returns whether
/// every file was restored.
pub fn run_restore(
    workspace: &Path,
    config: &MenderConfig,
    transaction_id: &str,
    out: &mut dyn Write,
) -> Result<bool> {
    let store = FileSnapshotStore::new(backup_dir(workspace, &config.fix));
    let report = store
        .restore_persisted(transaction_id)
        .with_context(|| format!("failed to restore transaction {transaction_id}"))?;
    write_report(&report, out).context("failed to write restore report")?;
    Ok(report.is_complete())
}

fn write_report(report: &RollbackReport, out: &mut dyn Write) -> std::io::Result<()> {
    for file in &report.restored {
        writeln!(out, "restored\t{file}")?;
    }
    for failure in &report.failed {
        writeln!(out, "failed\t{}\t{}", failure.file_path, failure.error)?;
    }
    writeln!(
        out,
        "restored={} failed={}",
        report.restored.len(),
        report.failed.len()
    )
}

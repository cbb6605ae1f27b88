use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mender_config::{MenderConfig, backup_dir};
use mender_fix::{FileSnapshotStore, PersistedTransaction};

use crate::cli::OutputFormat;

pub fn run_backups(
    workspace: &Path,
    config: &MenderConfig,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let store = FileSnapshotStore::new(backup_dir(workspace, &config.fix));
    let transactions = store.list_persisted().with_context(|| {
        format!(
            "failed to list backups under {}",
            store.backup_dir().display()
        )
    })?;
    write_backups(&transactions, format, out).context("failed to write backup list")
}

pub fn write_backups(
    transactions: &[PersistedTransaction],
    format: OutputFormat,
    out: &mut dyn Write,
) -> io::Result<()> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *out, transactions)?;
        return writeln!(out);
    }

    writeln!(out, "transaction_id\ttimestamp\tfiles")?;
    for transaction in transactions {
        let files: Vec<&str> = transaction
            .entries
            .iter()
            .map(|entry| entry.file_path.as_str())
            .collect();
        writeln!(
            out,
            "{}\t{}\t{}",
            transaction.transaction_id,
            transaction.timestamp.to_rfc3339(),
            files.join(",")
        )?;
    }
    Ok(())
}

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use mender_config::MenderConfig;
use mender_fix::TransactionCoordinator;

pub fn run_providers(workspace: &Path, config: &MenderConfig, out: &mut dyn Write) -> Result<()> {
    let coordinator = TransactionCoordinator::from_config(workspace, config);
    write_providers(&coordinator, out).context("failed to write provider list")
}

fn write_providers(coordinator: &TransactionCoordinator, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "provider\tissue_types")?;
    for provider in coordinator.providers().providers() {
        writeln!(
            out,
            "{}\t{}",
            provider.name(),
            provider.supported_types().join(",")
        )?;
    }
    Ok(())
}

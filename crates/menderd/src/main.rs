use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use mender_config::{config_path, ensure_workspace_config, load_workspace_config, validate_config};
use menderd::cli::{Cli, Commands, parse_cli};
use menderd::commands::{backups, fix, providers, restore};
use menderd::logging::init_logging;
use tracing::debug;

fn main() -> ExitCode {
    let cli = parse_cli();
    init_logging(cli.log_format);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;
    debug!(
        workspace = %workspace.display(),
        log_format = cli.log_format.as_str(),
        "starting menderd"
    );

    if let Commands::Init = cli.command {
        ensure_workspace_config(&workspace).context("failed to write workspace config")?;
        println!("config: {}", config_path(&workspace).display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_workspace_config(&workspace).context("failed to load workspace config")?;
    for warning in validate_config(&config) {
        eprintln!(
            "mender config warning [{}]: {}",
            warning.code, warning.message
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let code = match &cli.command {
        Commands::Fix(args) => {
            let outcome = fix::run_fix(&workspace, &config, args, &mut out)?;
            ExitCode::from(outcome.exit_code())
        }
        Commands::Backups(args) => {
            backups::run_backups(&workspace, &config, args.output, &mut out)?;
            ExitCode::SUCCESS
        }
        Commands::Restore(args) => {
            if restore::run_restore(&workspace, &config, &args.transaction_id, &mut out)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Commands::Providers => {
            providers::run_providers(&workspace, &config, &mut out)?;
            ExitCode::SUCCESS
        }
        Commands::Init => ExitCode::SUCCESS,
    };
    out.flush().context("failed to flush stdout")?;
    Ok(code)
}

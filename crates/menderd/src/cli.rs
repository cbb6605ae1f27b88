use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mender_config::FixConfig;
use mender_core::RiskLevel;
use mender_fix::FixOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct FixArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "JSON file with an array of issues (or an object with an \"issues\" array)"
    )]
    pub issues: PathBuf,

    #[arg(long, help = "Compute and report fixes without writing any file")]
    pub dry_run: bool,

    #[arg(long, help = "Ask for confirmation before each fix")]
    pub interactive: bool,

    #[arg(
        long = "category",
        value_delimiter = ',',
        value_name = "PROVIDER",
        help = "Only apply fixes from these providers (repeatable or comma-separated)"
    )]
    pub categories: Vec<String>,

    #[arg(
        long,
        value_parser = parse_risk_level,
        help = "Highest risk level to apply: low, medium, or high"
    )]
    pub max_risk: Option<RiskLevel>,

    #[arg(long, help = "Lowest confidence to apply, between 0.0 and 1.0")]
    pub min_confidence: Option<f32>,

    #[arg(long, help = "Do not back up files before writing")]
    pub no_backup: bool,

    #[arg(long, help = "Skip provider validation after each write")]
    pub no_validate: bool,

    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,
}

impl FixArgs {
    /// Config file values with command-line flags layered on top.
    pub fn options(&self, config: &FixConfig) -> FixOptions {
        let mut options = FixOptions::from(config);
        options.dry_run |= self.dry_run;
        options.interactive |= self.interactive;
        if !self.categories.is_empty() {
            options.categories = self.categories.clone();
        }
        if let Some(max_risk) = self.max_risk {
            options.max_risk = max_risk;
        }
        if let Some(min_confidence) = self.min_confidence {
            options.min_confidence = min_confidence;
        }
        if self.no_backup {
            options.create_backup = false;
        }
        if self.no_validate {
            options.validate_after_fix = false;
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RestoreArgs {
    #[arg(help = "Transaction id whose backups should be restored")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BackupsArgs {
    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Generate and apply fixes for a list of issues
    Fix(FixArgs),
    /// List persisted backup transactions
    Backups(BackupsArgs),
    /// Restore files from a persisted backup transaction
    Restore(RestoreArgs),
    /// List fix providers and the issue types they handle
    Providers,
    /// Write the default .mender/config.toml if it does not exist
    Init,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Transactional source auto-fixer")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root that issue paths are relative to"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

fn parse_risk_level(value: &str) -> Result<RiskLevel, String> {
    value.parse()
}

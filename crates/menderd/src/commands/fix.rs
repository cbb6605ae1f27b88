use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mender_config::MenderConfig;
use mender_core::{Fix, Issue};
use mender_fix::{FixConfirmer, FixError, FixResult, TransactionCoordinator};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::{FixArgs, OutputFormat};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IssueFile {
    List(Vec<Issue>),
    Wrapped { issues: Vec<Issue> },
}

pub fn load_issues(path: &Path) -> Result<Vec<Issue>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read issues file {}", path.display()))?;
    let parsed: IssueFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse issues file {}", path.display()))?;
    let issues = match parsed {
        IssueFile::List(issues) | IssueFile::Wrapped { issues } => issues,
    };
    Ok(issues
        .into_iter()
        .map(|mut issue| {
            issue.file_path = mender_core::normalize_path(&issue.file_path);
            issue
        })
        .collect())
}

/// How a `fix` run ended, mapped onto the process exit code.
#[derive(Debug)]
pub enum FixOutcome {
    Completed(FixResult),
    Aborted(FixError),
}

impl FixOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed(result) if result.success => 0,
            Self::Completed(_) => 1,
            Self::Aborted(_) => 2,
        }
    }
}

pub fn run_fix(
    workspace: &Path,
    config: &MenderConfig,
    args: &FixArgs,
    out: &mut dyn Write,
) -> Result<FixOutcome> {
    let issues = load_issues(&args.issues)?;
    let options = args.options(&config.fix);

    let mut coordinator = TransactionCoordinator::from_config(workspace, config);
    if options.interactive {
        coordinator = coordinator.with_confirmer(StdinConfirmer);
    }

    let fixes = coordinator.generate_fixes(&issues, &options);
    info!(issues = issues.len(), fixes = fixes.len(), "fixes ready to apply");

    let outcome = match coordinator.apply_fixes(fixes, &options) {
        Ok(result) => FixOutcome::Completed(result),
        Err(err) => FixOutcome::Aborted(err),
    };
    write_outcome(&outcome, options.dry_run, args.output, out)
        .context("failed to write fix report")?;
    Ok(outcome)
}

#[derive(Serialize)]
struct AbortReport<'a> {
    success: bool,
    transaction_id: &'a str,
    error: String,
}

pub fn write_outcome(
    outcome: &FixOutcome,
    dry_run: bool,
    format: OutputFormat,
    out: &mut dyn Write,
) -> io::Result<()> {
    match (format, outcome) {
        (OutputFormat::Json, FixOutcome::Completed(result)) => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)
        }
        (OutputFormat::Json, FixOutcome::Aborted(err)) => {
            let report = AbortReport {
                success: false,
                transaction_id: err.transaction_id(),
                error: error_chain(err),
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)
        }
        (OutputFormat::Table, FixOutcome::Completed(result)) => {
            write_result_table(result, dry_run, out)
        }
        (OutputFormat::Table, FixOutcome::Aborted(err)) => {
            writeln!(out, "ABORTED\t{}\t{}", err.transaction_id(), error_chain(err))
        }
    }
}

fn write_result_table(result: &FixResult, dry_run: bool, out: &mut dyn Write) -> io::Result<()> {
    let applied_label = if dry_run { "would-apply" } else { "applied" };
    for fix in &result.applied_fixes {
        write_fix_line(out, applied_label, fix, None)?;
    }
    for fix in &result.failed_fixes {
        let message = result
            .errors
            .iter()
            .find(|failure| failure.fix_id == fix.id)
            .map(|failure| failure.message.as_str());
        write_fix_line(out, "failed", fix, message)?;
    }
    for fix in &result.skipped_fixes {
        write_fix_line(out, "skipped", fix, None)?;
    }

    let summary = &result.summary;
    writeln!(
        out,
        "transaction={} total={} successful={} failed={} skipped={} rolled_back={} dry_run={}",
        result.transaction_id,
        summary.total,
        summary.successful,
        summary.failed,
        summary.skipped,
        summary.rolled_back,
        dry_run
    )
}

fn write_fix_line(
    out: &mut dyn Write,
    status: &str,
    fix: &Fix,
    message: Option<&str>,
) -> io::Result<()> {
    let files = fix.touched_files().join(",");
    write!(
        out,
        "{status}\t{}\t{}\trisk={}\tconfidence={:.2}\t{files}\t{}",
        fix.id,
        fix.provider,
        fix.risk.as_str(),
        fix.confidence,
        single_line(&fix.description)
    )?;
    match message {
        Some(message) => writeln!(out, "\t{}", single_line(message)),
        None => writeln!(out),
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

fn error_chain(err: &FixError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/// Prompts on stderr and reads a y/N answer from stdin for each fix.
struct StdinConfirmer;

impl FixConfirmer for StdinConfirmer {
    fn confirm(&mut self, fix: &Fix) -> bool {
        let mut stderr = io::stderr().lock();
        let prompted = write!(
            stderr,
            "apply {} [{} risk={} confidence={:.2}] {}? [y/N] ",
            fix.id,
            fix.provider,
            fix.risk.as_str(),
            fix.confidence,
            single_line(&fix.description)
        )
        .and_then(|()| stderr.flush());
        if prompted.is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

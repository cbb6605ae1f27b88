use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mender_core::{FileChange, Fix, is_workspace_relative};
use tracing::debug;

use crate::error::ApplyError;

/// Text access to workspace files.
pub trait SourceFiles: Send {
    fn read(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// [`SourceFiles`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFiles;

impl SourceFiles for DiskFiles {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        fs::write(path, content)
    }
}

/// Line-count changes already made during one batch, per file, in the line
/// numbers of the content the fixes were generated from.
///
/// Lets the applier tell where a change's `start_line` sits now, after
/// earlier fixes inserted or removed lines above it.
#[derive(Debug, Default)]
pub struct LineShifts {
    shifts: HashMap<String, Vec<(usize, isize)>>,
    rewritten: Vec<String>,
}

impl LineShifts {
    /// Current position of `line`, or `None` once the file was replaced
    /// wholesale and line numbers no longer mean anything.
    pub fn current_line(&self, file_path: &str, line: usize) -> Option<usize> {
        if self.rewritten.iter().any(|path| path == file_path) {
            return None;
        }
        let delta: isize = self
            .shifts
            .get(file_path)
            .map(|shifts| {
                shifts
                    .iter()
                    .filter(|(after, _)| *after < line)
                    .map(|(_, delta)| delta)
                    .sum()
            })
            .unwrap_or(0);
        Some(line.saturating_add_signed(delta))
    }

    fn record(&mut self, change: &FileChange) {
        if change.is_whole_file() {
            self.rewritten.push(change.file_path.clone());
            return;
        }
        let Some(end_line) = change.end_line.or(change.start_line) else {
            return;
        };
        let delta = newlines(&change.modified) as isize - newlines(&change.original) as isize;
        if delta != 0 {
            self.shifts
                .entry(change.file_path.clone())
                .or_default()
                .push((end_line, delta));
        }
    }

    fn expected_line(&self, change: &FileChange) -> Option<usize> {
        change
            .start_line
            .and_then(|line| self.current_line(&change.file_path, line))
    }
}

/// Applies fix changes to live files, re-reading each file before every change
/// and refusing to write when the expected original text is gone or has
/// moved to a different line.
pub struct FixApplier {
    workspace_root: PathBuf,
    files: Box<dyn SourceFiles>,
}

impl FixApplier {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            files: Box::new(DiskFiles),
        }
    }

    pub fn with_files(mut self, files: impl SourceFiles + 'static) -> Self {
        self.files = Box::new(files);
        self
    }

    /// Joins a workspace-relative path onto the root. Absolute paths and
    /// paths that climb out with `..` are rejected.
    pub fn resolve(&self, file_path: &str) -> Result<PathBuf, ApplyError> {
        if !is_workspace_relative(file_path) {
            return Err(ApplyError::OutsideWorkspace {
                path: file_path.to_owned(),
            });
        }
        Ok(self.workspace_root.join(file_path))
    }

    /// Changes are applied in order; a failing change aborts the fix but does
    /// not undo changes that were already written.
    pub fn apply(&self, fix: &Fix, shifts: &mut LineShifts) -> Result<(), ApplyError> {
        for change in &fix.changes {
            let path = self.resolve(&change.file_path)?;
            let current = self.read_text(&path, &change.file_path)?;
            let updated = substitute(&current, change, shifts.expected_line(change))?;
            self.files
                .write(&path, &updated)
                .map_err(|source| ApplyError::Write {
                    path: change.file_path.clone(),
                    source,
                })?;
            shifts.record(change);
            debug!(fix_id = %fix.id, file = %change.file_path, "applied change");
        }
        Ok(())
    }

    /// Dry-run counterpart of [`FixApplier::apply`]: writes land in `overlay`
    /// instead of on disk, so later fixes in the batch observe earlier ones.
    pub fn simulate(
        &self,
        fix: &Fix,
        overlay: &mut HashMap<PathBuf, String>,
        shifts: &mut LineShifts,
    ) -> Result<(), ApplyError> {
        for change in &fix.changes {
            let path = self.resolve(&change.file_path)?;
            let current = match overlay.get(&path) {
                Some(content) => content.clone(),
                None => self.read_text(&path, &change.file_path)?,
            };
            let updated = substitute(&current, change, shifts.expected_line(change))?;
            overlay.insert(path, updated);
            shifts.record(change);
        }
        Ok(())
    }

    fn read_text(&self, path: &Path, file_path: &str) -> Result<String, ApplyError> {
        self.files.read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ApplyError::MissingFile {
                path: file_path.to_owned(),
            },
            io::ErrorKind::InvalidData => ApplyError::NotText {
                path: file_path.to_owned(),
            },
            _ => ApplyError::Read {
                path: file_path.to_owned(),
                source,
            },
        })
    }
}

impl std::fmt::Debug for FixApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixApplier")
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

/// Replaces the first occurrence of `change.original`, or the whole content
/// when `original` is empty. With `expected_line`, that first occurrence must
/// start on that line; otherwise the change is stale.
pub fn substitute(
    current: &str,
    change: &FileChange,
    expected_line: Option<usize>,
) -> Result<String, ApplyError> {
    if change.is_whole_file() {
        return Ok(change.modified.clone());
    }

    let stale = || ApplyError::StaleContent {
        path: change.file_path.clone(),
    };
    let offset = current.find(change.original.as_str()).ok_or_else(stale)?;
    if let Some(line) = expected_line
        && newlines(&current[..offset]) + 1 != line
    {
        return Err(stale());
    }

    let mut updated = String::with_capacity(current.len() + change.modified.len());
    updated.push_str(&current[..offset]);
    updated.push_str(&change.modified);
    updated.push_str(&current[offset + change.original.len()..]);
    Ok(updated)
}

fn newlines(text: &str) -> usize {
    text.matches('\n').count()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use mender_core::{Issue, RiskLevel, Severity};
    use tempfile::tempdir;

    use super::*;

    fn fix_with(changes: Vec<FileChange>) -> Fix {
        let issue = Issue::new("i1", "test", Severity::Low, "a.ts");
        Fix::new("test", &issue, "test fix", changes, 0.9, RiskLevel::Low)
    }

    fn apply_once(applier: &FixApplier, fix: &Fix) -> Result<(), ApplyError> {
        applier.apply(fix, &mut LineShifts::default())
    }

    #[test]
    fn substitute_replaces_only_first_occurrence() {
        let change = FileChange::replace("a.ts", "x", "y");
        assert_eq!(
            substitute("x x x", &change, None).expect("substitute"),
            "y x x"
        );
    }

    #[test]
    fn substitute_with_empty_original_replaces_whole_file() {
        let change = FileChange::whole_file("a.ts", "fresh\n");
        assert_eq!(
            substitute("anything", &change, Some(4)).expect("substitute"),
            "fresh\n"
        );
    }

    #[test]
    fn first_occurrence_on_another_line_is_stale() {
        let current = "    bar  \nmid\n    bar  \n";
        let change = FileChange::replace("a.py", "    bar  ", "    bar").with_lines(3, 3);

        let err = substitute(current, &change, Some(3)).expect_err("copy on line 1 shadows line 3");
        assert!(matches!(err, ApplyError::StaleContent { .. }));
        assert_eq!(
            substitute(current, &change, Some(1)).expect("first line matches"),
            "    bar\nmid\n    bar  \n"
        );
    }

    #[test]
    fn stale_original_is_rejected_without_writing() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.ts"), "let y = 2;\n").expect("write");

        let applier = FixApplier::new(temp.path());
        let err = apply_once(
            &applier,
            &fix_with(vec![FileChange::replace(
                "a.ts",
                "let x = 1;",
                "const x = 1;",
            )]),
        )
        .expect_err("stale change");

        assert!(matches!(err, ApplyError::StaleContent { .. }));
        assert!(!err.is_catastrophic());
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).expect("read"),
            "let y = 2;\n"
        );
    }

    #[test]
    fn later_changes_see_earlier_changes_in_the_same_fix() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.ts"), "alpha\n").expect("write");

        let applier = FixApplier::new(temp.path());
        apply_once(
            &applier,
            &fix_with(vec![
                FileChange::replace("a.ts", "alpha", "beta"),
                FileChange::replace("a.ts", "beta", "gamma"),
            ]),
        )
        .expect("apply");

        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).expect("read"),
            "gamma\n"
        );
    }

    #[test]
    fn failing_change_keeps_earlier_writes_of_the_same_fix() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.ts"), "alpha\n").expect("write");

        let applier = FixApplier::new(temp.path());
        let err = apply_once(
            &applier,
            &fix_with(vec![
                FileChange::replace("a.ts", "alpha", "beta"),
                FileChange::replace("a.ts", "alpha", "omega"),
            ]),
        )
        .expect_err("second change is stale");

        assert!(matches!(err, ApplyError::StaleContent { .. }));
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).expect("read"),
            "beta\n"
        );
    }

    #[test]
    fn inserted_lines_shift_later_anchors() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.rs"), "fn a() {}\nfn b() {}  \n").expect("write");

        let applier = FixApplier::new(temp.path());
        let mut shifts = LineShifts::default();
        let document = fix_with(vec![
            FileChange::replace("a.rs", "fn a() {}", "/// doc\nfn a() {}").with_lines(1, 1),
        ]);
        let trim = fix_with(vec![
            FileChange::replace("a.rs", "fn b() {}  ", "fn b() {}").with_lines(2, 2),
        ]);

        applier.apply(&document, &mut shifts).expect("insert doc line");
        assert_eq!(shifts.current_line("a.rs", 2), Some(3));
        applier.apply(&trim, &mut shifts).expect("shifted anchor still matches");

        assert_eq!(
            fs::read_to_string(temp.path().join("a.rs")).expect("read"),
            "/// doc\nfn a() {}\nfn b() {}\n"
        );
    }

    #[test]
    fn missing_files_and_directories_fail_only_their_fix() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("dir.ts")).expect("create dir");

        let applier = FixApplier::new(temp.path());
        let missing = apply_once(
            &applier,
            &fix_with(vec![FileChange::replace("gone.ts", "a", "b")]),
        )
        .expect_err("missing file");
        assert!(matches!(missing, ApplyError::MissingFile { .. }));
        assert!(!missing.is_catastrophic());

        let directory = apply_once(
            &applier,
            &fix_with(vec![FileChange::replace("dir.ts", "a", "b")]),
        )
        .expect_err("directory cannot be read as text");
        assert!(matches!(directory, ApplyError::Read { .. }));
        assert!(!directory.is_catastrophic());
    }

    #[test]
    fn paths_outside_the_workspace_are_refused() {
        let temp = tempdir().expect("tempdir");
        let applier = FixApplier::new(temp.path().join("ws"));
        fs::write(temp.path().join("outside.ts"), "a\n").expect("write");

        for path in ["../outside.ts", "/etc/hosts"] {
            let err = apply_once(&applier, &fix_with(vec![FileChange::replace(path, "a", "b")]))
                .expect_err("escaping path");
            assert!(matches!(err, ApplyError::OutsideWorkspace { .. }));
        }
        assert_eq!(
            fs::read_to_string(temp.path().join("outside.ts")).expect("read"),
            "a\n"
        );
    }

    #[test]
    fn simulate_tracks_content_without_touching_disk() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.ts"), "alpha\n").expect("write");

        let applier = FixApplier::new(temp.path());
        let mut overlay = HashMap::new();
        let mut shifts = LineShifts::default();
        let fix = fix_with(vec![FileChange::replace("a.ts", "alpha", "beta")]);

        applier
            .simulate(&fix, &mut overlay, &mut shifts)
            .expect("first simulation");
        let err = applier
            .simulate(&fix, &mut overlay, &mut shifts)
            .expect_err("second simulation sees consumed original");

        assert!(matches!(err, ApplyError::StaleContent { .. }));
        assert_eq!(
            overlay.get(&temp.path().join("a.ts")).map(String::as_str),
            Some("beta\n")
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("a.ts")).expect("read"),
            "alpha\n"
        );
    }
}

mod documentation;
mod formatting;
mod imports;
mod refactoring;

use std::ops::Range;

use mender_config::ProvidersConfig;
use mender_core::FileChange;
use mender_parse::line_bounds;

use crate::provider::FixProvider;

pub use documentation::DocumentationProvider;
pub use formatting::FormattingProvider;
pub use imports::ImportsProvider;
pub use refactoring::RefactoringProvider;

/// Built-in providers in registration order, minus the ones disabled in config.
pub fn default_providers(config: &ProvidersConfig) -> Vec<Box<dyn FixProvider>> {
    let all: Vec<Box<dyn FixProvider>> = vec![
        Box::new(FormattingProvider),
        Box::new(ImportsProvider::new()),
        Box::new(DocumentationProvider::new()),
        Box::new(RefactoringProvider::new()),
    ];
    all.into_iter()
        .filter(|provider| !config.is_disabled(provider.name()))
        .collect()
}

/// Turns a byte-range edit into a [`FileChange`] whose `original` is whole
/// lines and is the first occurrence of that text in `content`, so the applier's
/// first-occurrence substitution lands on the intended spot.
pub(crate) fn anchored_change(
    file_path: &str,
    content: &str,
    range: Range<usize>,
    replacement: &str,
) -> FileChange {
    let mut start = line_bounds(content, range.start).0;
    let mut end = if range.end > range.start && content[..range.end].ends_with('\n') {
        range.end
    } else {
        line_bounds(content, range.end).1
    };

    if start == end {
        if end < content.len() {
            end += 1;
        } else if start > 0 {
            start = previous_line_start(content, start);
        }
    }
    while start > 0 && content.find(&content[start..end]) != Some(start) {
        start = previous_line_start(content, start);
    }

    let modified = format!(
        "{}{}{}",
        &content[start..range.start],
        replacement,
        &content[range.end..end]
    );
    let last = start + content[start..end].trim_end_matches('\n').len();
    FileChange::replace(file_path, &content[start..end], modified)
        .with_lines(line_of(content, start), line_of(content, last))
}

/// 1-based line number of `offset`.
pub(crate) fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

/// Byte range of the 1-based `line`, excluding its newline.
pub(crate) fn line_range(content: &str, line: usize) -> Option<Range<usize>> {
    let row = line.checked_sub(1)?;
    let mut offset = 0;
    for _ in 0..row {
        offset += content[offset..].find('\n')? + 1;
    }
    let (start, end) = line_bounds(content, offset);
    Some(start..end)
}

/// Widens a node's byte range to whole lines, newline included, when nothing
/// but whitespace shares those lines with it.
pub(crate) fn deletion_range(content: &str, range: Range<usize>) -> Range<usize> {
    let (line_start, _) = line_bounds(content, range.start);
    let (_, line_end) = line_bounds(content, range.end);
    let before = &content[line_start..range.start];
    let after = &content[range.end..line_end];
    if !before.trim().is_empty() || !after.trim().is_empty() {
        return range;
    }
    let end = if line_end < content.len() {
        line_end + 1
    } else {
        line_end
    };
    line_start..end
}

pub(crate) fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn previous_line_start(content: &str, position: usize) -> usize {
    let (line_start, _) = line_bounds(content, position);
    if line_start < position || line_start == 0 {
        return line_start;
    }
    line_bounds(content, line_start - 1).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_to_the_whole_line() {
        let content = "let x = 1;  \n";
        let change = anchored_change("a.ts", content, 10..12, "");

        assert_eq!(change.original, "let x = 1;  ");
        assert_eq!(change.modified, "let x = 1;");
        assert_eq!(change.start_line, Some(1));
    }

    #[test]
    fn widens_until_the_anchor_is_the_first_occurrence() {
        let content = "import a;\nimport b;\nimport a;\n";
        let change = anchored_change("a.ts", content, 20..30, "");

        assert_eq!(change.original, "import b;\nimport a;\n");
        assert_eq!(change.modified, "import b;\n");
        assert_eq!(content.find(&change.original), Some(10));
    }

    #[test]
    fn empty_range_at_end_of_file_anchors_on_last_line() {
        let content = "fn a() {\n}";
        let change = anchored_change("a.rs", content, content.len()..content.len(), "\n");

        assert_eq!(change.original, "}");
        assert_eq!(change.modified, "}\n");
    }

    #[test]
    fn deletion_range_takes_whole_lines_only_when_alone() {
        let content = "use a;\nuse b; fn f() {}\n";
        assert_eq!(deletion_range(content, 0..6), 0..7);
        assert_eq!(deletion_range(content, 7..13), 7..13);
    }

    #[test]
    fn line_range_is_one_based() {
        let content = "one\ntwo\nthree";
        assert_eq!(line_range(content, 2), Some(4..7));
        assert_eq!(line_range(content, 3), Some(8..13));
        assert_eq!(line_range(content, 4), None);
        assert_eq!(line_range(content, 0), None);
    }
}

// ABOUTME: Word-highlighted diff bodies built as tagged spans
// Line diff finds hunks; a word diff inside each hunk marks inserted and deleted runs

use similar::{ChangeTag, TextDiff};

use crate::models::{DiffBody, SpanKind};

/// Lines of unchanged context kept around each hunk
pub const CONTEXT_LINES: usize = 3;

/// Diff body plus line statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordDiff {
    pub body: DiffBody,
    pub insertions: usize,
    pub deletions: usize,
}

impl WordDiff {
    pub fn lines_affected(&self) -> usize {
        self.insertions + self.deletions
    }
}

/// Compare two texts, emitting one `@@` header (Emphasis) per hunk followed
/// by the hunk's words tagged Plain/Delete/Insert.
pub fn word_diff(old: &str, new: &str) -> WordDiff {
    let lines = TextDiff::from_lines(old, new);

    let mut insertions = 0usize;
    let mut deletions = 0usize;
    for change in lines.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => insertions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let mut body = DiffBody::new();
    let old_lines = lines.old_slices();
    let new_lines = lines.new_slices();

    for group in lines.grouped_ops(CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        body.push(
            SpanKind::Emphasis,
            &format!(
                "@@ -{} +{} @@\n",
                hunk_range(old_range.start, old_range.len()),
                hunk_range(new_range.start, new_range.len())
            ),
        );

        let old_hunk: String = old_lines[old_range].concat();
        let new_hunk: String = new_lines[new_range].concat();
        let words = TextDiff::from_words(old_hunk.as_str(), new_hunk.as_str());

        for change in words.iter_all_changes() {
            let kind = match change.tag() {
                ChangeTag::Equal => SpanKind::Plain,
                ChangeTag::Delete => SpanKind::Delete,
                ChangeTag::Insert => SpanKind::Insert,
            };
            body.push(kind, change.value());
        }

        if !body.plain_text().ends_with('\n') {
            body.push(SpanKind::Plain, "\n");
        }
    }

    WordDiff {
        body,
        insertions,
        deletions,
    }
}

/// Whole-file "added" body for an untracked text file
pub fn added_file(path: &str, content: &str) -> WordDiff {
    let mut body = DiffBody::new();
    body.push(SpanKind::Emphasis, &format!("+++ {path}\n"));
    body.push(SpanKind::Insert, content);

    WordDiff {
        body,
        insertions: content.lines().count(),
        deletions: 0,
    }
}

/// Unified-diff style `start,len` (1-based start; empty ranges point at the preceding line)
fn hunk_range(start: usize, len: usize) -> String {
    let first = if len == 0 { start } else { start + 1 };
    format!("{first},{len}")
}

// ABOUTME: Change-set models - classified file changes and their tagged-span diff bodies

use serde::{Deserialize, Serialize};

/// Classification of a changed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Untracked file never added to the index
    New,
    /// Working tree differs from the index
    Modified,
    /// Index differs from the last commit
    Staged,
    /// Tracked file removed from the working tree
    Deleted,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Modified => "modified",
            ChangeKind::Staged => "staged",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// Highlight tag for a run of diff text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Plain,
    Insert,
    Delete,
    /// Headers and other meta lines
    Emphasis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSpan {
    pub kind: SpanKind,
    pub text: String,
}

impl DiffSpan {
    pub fn new(kind: SpanKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Diff body as an ordered run of tagged spans.
///
/// Adjacent spans of the same kind are always merged, so two bodies with the
/// same content compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBody {
    spans: Vec<DiffSpan>,
}

impl DiffBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: SpanKind, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => self.spans.push(DiffSpan::new(kind, text)),
        }
    }

    pub fn spans(&self) -> &[DiffSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Text without any highlight markers
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Opaque annotated rendering: `[-deleted-]` and `{+inserted+}` markers,
    /// plain and emphasis text verbatim.
    pub fn annotated(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span.kind {
                SpanKind::Plain | SpanKind::Emphasis => out.push_str(&span.text),
                SpanKind::Insert => {
                    out.push_str("{+");
                    out.push_str(&span.text);
                    out.push_str("+}");
                }
                SpanKind::Delete => {
                    out.push_str("[-");
                    out.push_str(&span.text);
                    out.push_str("-]");
                }
            }
        }
        out
    }
}

/// One changed file from a single analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub kind: ChangeKind,
    /// Inserted + deleted lines (whole file for new files, 0 for binaries)
    pub lines_affected: usize,
    pub diff: DiffBody,
    pub binary: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub new: usize,
    pub modified: usize,
    pub staged: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.new + self.modified + self.staged + self.deleted
    }
}

/// Aggregate of one analysis run.
///
/// Changes are ordered Staged group, then Modified group (working-tree
/// deletions included), then New group; each group is sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetSummary {
    counts: ChangeCounts,
    changes: Vec<FileChange>,
}

impl ChangeSetSummary {
    pub fn from_groups(
        mut staged: Vec<FileChange>,
        mut modified: Vec<FileChange>,
        mut new: Vec<FileChange>,
    ) -> Self {
        for group in [&mut staged, &mut modified, &mut new] {
            group.sort_by(|a, b| a.path.cmp(&b.path));
        }

        let mut counts = ChangeCounts::default();
        let changes: Vec<FileChange> = staged.into_iter().chain(modified).chain(new).collect();
        for change in &changes {
            match change.kind {
                ChangeKind::New => counts.new += 1,
                ChangeKind::Modified => counts.modified += 1,
                ChangeKind::Staged => counts.staged += 1,
                ChangeKind::Deleted => counts.deleted += 1,
            }
        }

        Self { counts, changes }
    }

    pub fn counts(&self) -> ChangeCounts {
        self.counts
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &FileChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}

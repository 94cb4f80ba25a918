// ABOUTME: Change-set analysis - classifies working tree, index and HEAD differences per file
// Produces word-highlighted diff bodies; binaries are flagged instead of diffed

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::{
    Delta, Diff, DiffDelta, DiffOptions, ErrorCode, FileMode, Oid, Repository, Status,
    StatusOptions, Tree,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::word_diff::{added_file, word_diff, WordDiff};
use crate::models::{ChangeKind, ChangeSetSummary, DiffBody, FileChange, RepositoryRef};

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

/// Which comparison a single-file diff uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSide {
    /// Working tree against the index (`git diff <path>`)
    WorkingTree,
    /// Index against HEAD (`git diff --cached <path>`)
    Index,
}

/// Where the "new" side of a delta is read from
#[derive(Debug, Clone, Copy)]
enum NewSide {
    Workdir,
    Object,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSetAnalyzer;

impl ChangeSetAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify every change in `repository`.
    ///
    /// The result is ordered Staged, Modified (with deletions), New. A clean
    /// repository yields an empty summary.
    pub fn analyze(&self, repository: &RepositoryRef) -> Result<ChangeSetSummary, AnalyzerError> {
        let repo = open(repository)?;
        let root = repository.root();

        let new = collect_untracked(&repo, root)?;

        let workdir_diff = repo.diff_index_to_workdir(None, Some(&mut diff_options(None)))?;
        let modified = collect_deltas(&repo, root, &workdir_diff, NewSide::Workdir, |status| {
            match status {
                Delta::Modified | Delta::Typechange | Delta::Renamed | Delta::Copied => {
                    Some(ChangeKind::Modified)
                }
                Delta::Deleted => Some(ChangeKind::Deleted),
                _ => None,
            }
        })?;

        let head = head_tree(&repo)?;
        let staged_diff =
            repo.diff_tree_to_index(head.as_ref(), None, Some(&mut diff_options(None)))?;
        let staged = collect_deltas(&repo, root, &staged_diff, NewSide::Object, |status| {
            match status {
                Delta::Unmodified | Delta::Ignored | Delta::Untracked => None,
                _ => Some(ChangeKind::Staged),
            }
        })?;

        let summary = ChangeSetSummary::from_groups(staged, modified, new);
        let counts = summary.counts();
        info!(
            repo = %repository.name(),
            staged = counts.staged,
            modified = counts.modified,
            deleted = counts.deleted,
            new = counts.new,
            "Analyzed change set"
        );
        Ok(summary)
    }

    /// `analyze` on the blocking pool, for async callers
    pub async fn analyze_on_worker(
        &self,
        repository: RepositoryRef,
    ) -> Result<ChangeSetSummary, AnalyzerError> {
        let analyzer = *self;
        tokio::task::spawn_blocking(move || analyzer.analyze(&repository))
            .await
            .map_err(|e| AnalyzerError::Worker(e.to_string()))?
    }

    /// Diff of a single tracked file; `None` when it has no changes on that side
    pub fn file_diff(
        &self,
        repository: &RepositoryRef,
        path: &str,
        side: DiffSide,
    ) -> Result<Option<FileChange>, AnalyzerError> {
        let repo = open(repository)?;
        let root = repository.root();

        let changes = match side {
            DiffSide::WorkingTree => {
                let mut opts = diff_options(Some(path));
                let diff = repo.diff_index_to_workdir(None, Some(&mut opts))?;
                collect_deltas(&repo, root, &diff, NewSide::Workdir, |status| match status {
                    Delta::Deleted => Some(ChangeKind::Deleted),
                    Delta::Unmodified | Delta::Ignored | Delta::Untracked => None,
                    _ => Some(ChangeKind::Modified),
                })?
            }
            DiffSide::Index => {
                let head = head_tree(&repo)?;
                let mut opts = diff_options(Some(path));
                let diff = repo.diff_tree_to_index(head.as_ref(), None, Some(&mut opts))?;
                collect_deltas(&repo, root, &diff, NewSide::Object, |status| match status {
                    Delta::Unmodified | Delta::Ignored | Delta::Untracked => None,
                    _ => Some(ChangeKind::Staged),
                })?
            }
        };

        Ok(changes.into_iter().find(|change| change.path == path))
    }
}

fn open(repository: &RepositoryRef) -> Result<Repository, AnalyzerError> {
    if !repository.is_intact() {
        return Err(AnalyzerError::NotARepository(repository.root().to_path_buf()));
    }

    Repository::open(repository.root()).map_err(|e| {
        warn!(path = %repository.root().display(), error = %e, "Failed to open repository");
        if e.code() == ErrorCode::NotFound {
            AnalyzerError::NotARepository(repository.root().to_path_buf())
        } else {
            AnalyzerError::Git(e)
        }
    })
}

fn diff_options(pathspec: Option<&str>) -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.include_untracked(false).ignore_submodules(true);
    if let Some(path) = pathspec {
        opts.pathspec(path).disable_pathspec_match(true);
    }
    opts
}

/// HEAD's tree, or `None` before the first commit
fn head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, AnalyzerError> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_tree()?)),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            debug!("Repository has no commits yet");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn collect_untracked(repo: &Repository, root: &Path) -> Result<Vec<FileChange>, AnalyzerError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut changes = Vec::new();

    for entry in statuses.iter() {
        if !entry.status().contains(Status::WT_NEW) {
            continue;
        }
        let Some(path) = entry.path() else {
            warn!("Skipping untracked file with a non UTF-8 path");
            continue;
        };

        let content = match read_workdir(root, path) {
            WorkdirRead::Content(content) => content,
            WorkdirRead::Missing => continue,
            WorkdirRead::Unreadable => {
                changes.push(binary_change(path, ChangeKind::New));
                continue;
            }
        };

        let change = match as_text(&content) {
            Some(text) => {
                let diff = added_file(path, text);
                FileChange {
                    path: path.to_string(),
                    kind: ChangeKind::New,
                    lines_affected: diff.lines_affected(),
                    diff: diff.body,
                    binary: false,
                }
            }
            None => binary_change(path, ChangeKind::New),
        };
        changes.push(change);
    }

    Ok(changes)
}

fn collect_deltas<F>(
    repo: &Repository,
    root: &Path,
    diff: &Diff<'_>,
    new_side: NewSide,
    classify: F,
) -> Result<Vec<FileChange>, AnalyzerError>
where
    F: Fn(Delta) -> Option<ChangeKind>,
{
    let mut changes = Vec::new();

    for delta in diff.deltas() {
        let Some(kind) = classify(delta.status()) else {
            continue;
        };
        let Some(path) = delta_path(&delta) else {
            warn!("Skipping change with a non UTF-8 path");
            continue;
        };

        changes.push(change_from_delta(repo, root, &delta, &path, kind, new_side)?);
    }

    Ok(changes)
}

fn change_from_delta(
    repo: &Repository,
    root: &Path,
    delta: &DiffDelta<'_>,
    path: &str,
    kind: ChangeKind,
    new_side: NewSide,
) -> Result<FileChange, AnalyzerError> {
    let is_gitlink = |mode: FileMode| mode == FileMode::Commit;
    if is_gitlink(delta.old_file().mode()) || is_gitlink(delta.new_file().mode()) {
        return Ok(binary_change(path, kind));
    }

    let old = object_content(repo, delta.old_file().id())?.unwrap_or_default();
    let new = if delta.status() == Delta::Deleted {
        Vec::new()
    } else {
        match new_side {
            NewSide::Workdir => match read_workdir(root, path) {
                WorkdirRead::Content(content) => content,
                WorkdirRead::Missing => Vec::new(),
                WorkdirRead::Unreadable => return Ok(binary_change(path, kind)),
            },
            NewSide::Object => object_content(repo, delta.new_file().id())?.unwrap_or_default(),
        }
    };

    let (Some(old_text), Some(new_text)) = (as_text(&old), as_text(&new)) else {
        return Ok(binary_change(path, kind));
    };

    let diff: WordDiff = word_diff(old_text, new_text);
    Ok(FileChange {
        path: path.to_string(),
        kind,
        lines_affected: diff.lines_affected(),
        diff: diff.body,
        binary: false,
    })
}

fn delta_path(delta: &DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .and_then(Path::to_str)
        .map(|p| p.replace('\\', "/"))
}

fn object_content(repo: &Repository, id: Oid) -> Result<Option<Vec<u8>>, AnalyzerError> {
    if id.is_zero() {
        return Ok(None);
    }
    let blob = repo.find_blob(id)?;
    Ok(Some(blob.content().to_vec()))
}

/// Outcome of reading one working tree entry
#[derive(Debug, PartialEq, Eq)]
enum WorkdirRead {
    Content(Vec<u8>),
    /// Vanished since it was listed
    Missing,
    /// Present but its bytes cannot be read; reported as binary
    Unreadable,
}

/// Working tree bytes for `path`, never following symlinks.
///
/// A symlink reads as its target path, which is what git stores for it.
fn read_workdir(root: &Path, path: &str) -> WorkdirRead {
    let full_path = root.join(path);
    let metadata = match fs::symlink_metadata(&full_path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path, "File disappeared during analysis");
            return WorkdirRead::Missing;
        }
        Err(e) => {
            warn!(path = %full_path.display(), error = %e, "Failed to stat file");
            return WorkdirRead::Unreadable;
        }
    };

    let read = if metadata.file_type().is_symlink() {
        fs::read_link(&full_path).map(|target| link_target_bytes(&target))
    } else {
        fs::read(&full_path)
    };

    match read {
        Ok(content) => WorkdirRead::Content(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path, "File disappeared during analysis");
            WorkdirRead::Missing
        }
        Err(e) => {
            warn!(path = %full_path.display(), error = %e, "Failed to read file");
            WorkdirRead::Unreadable
        }
    }
}

#[cfg(unix)]
fn link_target_bytes(target: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    target.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn link_target_bytes(target: &Path) -> Vec<u8> {
    target.to_string_lossy().replace('\\', "/").into_bytes()
}

/// Text when the bytes are UTF-8 without NUL bytes
fn as_text(content: &[u8]) -> Option<&str> {
    if content.contains(&0) {
        return None;
    }
    std::str::from_utf8(content).ok()
}

fn binary_change(path: &str, kind: ChangeKind) -> FileChange {
    debug!(path = %path, kind = kind.label(), "Binary change, diff omitted");
    FileChange {
        path: path.to_string(),
        kind,
        lines_affected: 0,
        diff: DiffBody::new(),
        binary: true,
    }
}

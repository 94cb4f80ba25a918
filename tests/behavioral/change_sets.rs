// ABOUTME: Behavioral tests for change-set analysis on real repositories
// Verifies classification, counts, ordering and diff bodies

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;

use commit_canvas::git::{ChangeSetAnalyzer, DiffSide};
use commit_canvas::models::{ChangeKind, SpanKind};

use super::fixtures::TestRepo;

/// A freshly initialized repository has nothing to report
#[test]
fn test_empty_repository_has_no_changes() -> Result<()> {
    let repo = TestRepo::empty()?;

    let summary = ChangeSetAnalyzer::new().analyze(&repo.repository_ref()?)?;

    assert!(summary.is_empty());
    assert_eq!(summary.counts().total(), 0);
    Ok(())
}

/// An untracked text file is reported as New with its whole content inserted
#[test]
fn test_untracked_file_is_new() -> Result<()> {
    let repo = TestRepo::empty()?;
    fs::write(repo.path().join("readme.txt"), "hello\nworld\n")?;

    let summary = ChangeSetAnalyzer::new().analyze(&repo.repository_ref()?)?;

    assert_eq!(summary.counts().new, 1);
    assert_eq!(summary.counts().total(), 1);
    let change = &summary.changes()[0];
    assert_eq!(change.path, "readme.txt");
    assert_eq!(change.kind, ChangeKind::New);
    assert!(!change.binary);
    assert_eq!(change.lines_affected, 2);
    assert!(change
        .diff
        .spans()
        .iter()
        .any(|span| span.kind == SpanKind::Insert && span.text.contains("hello")));
    Ok(())
}

/// Symlinks are reported by their target path and never followed, even
/// when they point at a directory or at nothing
#[cfg(unix)]
#[test]
fn test_untracked_symlinks_do_not_fail_analysis() -> Result<()> {
    use std::os::unix::fs::symlink;

    let repo = TestRepo::new()?;
    let outside = tempfile::TempDir::new()?;
    fs::write(outside.path().join("secret.txt"), "not part of the repo\n")?;
    symlink(outside.path(), repo.path().join("linked-dir"))?;
    symlink("no/such/file.txt", repo.path().join("dangling"))?;
    fs::write(repo.path().join("plain.txt"), "plain\n")?;

    let summary = ChangeSetAnalyzer::new().analyze(&repo.repository_ref()?)?;

    assert_eq!(summary.counts().new, 3);
    let dangling = summary
        .changes()
        .iter()
        .find(|c| c.path == "dangling")
        .ok_or_else(|| anyhow::anyhow!("dangling symlink not reported"))?;
    assert_eq!(dangling.kind, ChangeKind::New);
    assert!(!dangling.binary);
    assert!(dangling.diff.annotated().contains("no/such/file.txt"));

    let linked = summary
        .changes()
        .iter()
        .find(|c| c.path == "linked-dir")
        .ok_or_else(|| anyhow::anyhow!("directory symlink not reported"))?;
    assert!(!linked.diff.annotated().contains("not part of the repo"));
    Ok(())
}

/// Groups come out Staged, then Modified with deletions, then New
#[test]
fn test_changes_are_grouped_in_order() -> Result<()> {
    let repo = TestRepo::new()?;
    repo.add_commit("gone.txt", "remove me\n", "Add file to delete")?;

    fs::write(repo.path().join("untracked.txt"), "fresh\n")?;
    fs::write(repo.path().join("README.md"), "# Test Repo\nedited\n")?;
    fs::remove_file(repo.path().join("gone.txt"))?;
    repo.stage("staged.txt", "staged content\n")?;

    let summary = ChangeSetAnalyzer::new().analyze(&repo.repository_ref()?)?;
    let kinds: Vec<(ChangeKind, &str)> = summary
        .changes()
        .iter()
        .map(|c| (c.kind, c.path.as_str()))
        .collect();

    assert_eq!(
        kinds,
        vec![
            (ChangeKind::Staged, "staged.txt"),
            (ChangeKind::Modified, "README.md"),
            (ChangeKind::Deleted, "gone.txt"),
            (ChangeKind::New, "untracked.txt"),
        ]
    );

    let counts = summary.counts();
    assert_eq!(counts.staged, 1);
    assert_eq!(counts.modified, 1);
    assert_eq!(counts.deleted, 1);
    assert_eq!(counts.new, 1);
    Ok(())
}

/// Binary files are classified without a textual diff
#[test]
fn test_binary_untracked_file() -> Result<()> {
    let repo = TestRepo::new()?;
    fs::write(repo.path().join("blob.bin"), [0u8, 159, 146, 150, 0, 1])?;

    let summary = ChangeSetAnalyzer::new().analyze(&repo.repository_ref()?)?;
    let change = summary
        .of_kind(ChangeKind::New)
        .next()
        .expect("new file reported");

    assert!(change.binary);
    assert_eq!(change.lines_affected, 0);
    Ok(())
}

/// A modified line yields a word-level diff with one insertion and one deletion
#[test]
fn test_modified_file_word_diff() -> Result<()> {
    let repo = TestRepo::new()?;
    repo.add_commit("poem.txt", "roses are red\nviolets are blue\n", "Add poem")?;
    fs::write(repo.path().join("poem.txt"), "roses are red\nviolets are purple\n")?;
    let repo_ref = repo.repository_ref()?;

    let change = ChangeSetAnalyzer::new()
        .file_diff(&repo_ref, "poem.txt", DiffSide::WorkingTree)?
        .expect("working tree change");

    assert_eq!(change.kind, ChangeKind::Modified);
    assert_eq!(change.lines_affected, 2);
    let spans = change.diff.spans();
    assert!(spans
        .iter()
        .any(|s| s.kind == SpanKind::Delete && s.text.contains("blue")));
    assert!(spans
        .iter()
        .any(|s| s.kind == SpanKind::Insert && s.text.contains("purple")));

    // Nothing staged for this file
    assert!(ChangeSetAnalyzer::new()
        .file_diff(&repo_ref, "poem.txt", DiffSide::Index)?
        .is_none());
    Ok(())
}

/// Analysis on the blocking pool matches the synchronous result
#[tokio::test]
async fn test_analyze_on_worker_matches_sync() -> Result<()> {
    let repo = TestRepo::new()?;
    fs::write(repo.path().join("README.md"), "changed\n")?;
    let repo_ref = repo.repository_ref()?;

    let analyzer = ChangeSetAnalyzer::new();
    let sync = analyzer.analyze(&repo_ref)?;
    let background = analyzer.analyze_on_worker(repo_ref).await?;

    assert_eq!(sync, background);
    Ok(())
}

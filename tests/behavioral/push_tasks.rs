// ABOUTME: Behavioral tests for push tasks against a local bare remote
// Covers the commit-then-push flow used by the CLI

use anyhow::Result;
use std::fs;
use std::time::Duration;

use commit_canvas::config::TaskConfig;
use commit_canvas::git::{commit_all, current_branch, ChangeSetAnalyzer};
use commit_canvas::tasks::{
    GitInvocation, PushOptions, PushTask, TaskFailure, TaskKind, TaskRegistry, TaskState,
};

use super::fixtures::{BareRemote, TestRepo};

/// Pushing a committed branch updates the remote ref
#[tokio::test]
async fn test_push_updates_remote_branch() -> Result<()> {
    let repo = TestRepo::new()?;
    let remote = BareRemote::new()?;
    repo.add_remote("origin", &remote.path)?;
    let branch = repo.current_branch()?;

    let registry = TaskRegistry::get_or_initialize(&TaskConfig::default());
    let handle = PushTask::new(
        &repo.repository_ref()?,
        &branch,
        PushOptions::default(),
        GitInvocation::default(),
    )
    .start(&registry);

    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;
    assert!(result.success, "push failed: {}", result.message);

    let info = registry.get(handle)?;
    assert_eq!(info.kind, TaskKind::Push);
    assert_eq!(info.state, TaskState::Succeeded);
    assert!(remote.branch_head(&branch).is_some());
    Ok(())
}

/// Working-tree edits committed with commit_all reach the remote
#[tokio::test]
async fn test_commit_all_then_push() -> Result<()> {
    let repo = TestRepo::new()?;
    let remote = BareRemote::new()?;
    repo.add_remote("origin", &remote.path)?;
    let repo_ref = repo.repository_ref()?;

    fs::write(repo.path().join("README.md"), "# Test Repo\nupdated\n")?;
    fs::write(repo.path().join("notes.txt"), "new file\n")?;
    assert_eq!(ChangeSetAnalyzer::new().analyze(&repo_ref)?.counts().total(), 2);

    let commit = commit_all(&repo_ref, "Update readme and add notes")?;
    assert!(ChangeSetAnalyzer::new().analyze(&repo_ref)?.is_empty());

    let branch = current_branch(&repo_ref)?.expect("branch checked out");
    let registry = TaskRegistry::get_or_initialize(&TaskConfig::default());
    let handle = PushTask::new(&repo_ref, &branch, PushOptions::default(), GitInvocation::default())
        .start(&registry);
    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;

    assert!(result.success, "push failed: {}", result.message);
    assert_eq!(remote.branch_head(&branch), Some(commit));
    Ok(())
}

/// Without an origin remote git refuses and the task fails
#[tokio::test]
async fn test_push_without_remote_fails() -> Result<()> {
    let repo = TestRepo::new()?;
    let branch = repo.current_branch()?;

    let registry = TaskRegistry::get_or_initialize(&TaskConfig::default());
    let handle = PushTask::new(
        &repo.repository_ref()?,
        &branch,
        PushOptions::default(),
        GitInvocation::default(),
    )
    .start(&registry);

    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;
    assert!(!result.success);
    assert!(matches!(result.failure, Some(TaskFailure::ExitStatus { .. })));
    assert_eq!(registry.state(handle)?, TaskState::Failed);
    Ok(())
}

/// Deleting a remote branch removes it from the remote
#[tokio::test]
async fn test_push_delete_removes_remote_branch() -> Result<()> {
    let repo = TestRepo::new()?;
    let remote = BareRemote::new()?;
    repo.add_remote("origin", &remote.path)?;
    let repo_ref = repo.repository_ref()?;
    repo.create_branch("feature")?;
    let branch = "feature";

    let registry = TaskRegistry::get_or_initialize(&TaskConfig::default());
    let created = PushTask::new(&repo_ref, branch, PushOptions::default(), GitInvocation::default())
        .start(&registry);
    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(created)).await??;
    assert!(result.success, "push failed: {}", result.message);
    assert!(remote.branch_head(branch).is_some());

    let options = PushOptions {
        force: false,
        delete_remote: true,
    };
    assert!(options.is_destructive());
    let deleted = PushTask::new(&repo_ref, branch, options, GitInvocation::default())
        .start(&registry);
    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(deleted)).await??;

    assert!(result.success, "delete failed: {}", result.message);
    assert_eq!(result.message, "Deleted remote branch feature");
    assert!(remote.branch_head(branch).is_none());
    Ok(())
}

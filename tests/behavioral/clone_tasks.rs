// ABOUTME: Behavioral tests for clone tasks run through the process-wide registry
// Clones come from local fixture repositories so no network is needed

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;
use tempfile::TempDir;

use commit_canvas::config::TaskConfig;
use commit_canvas::models::Credential;
use commit_canvas::tasks::{
    CloneOptions, CloneTask, GitInvocation, TaskEvent, TaskFailure, TaskRegistry, TaskState,
};

use super::fixtures::{stub_git, wait_until_gone, RecordingServer, TestRepo};

fn registry() -> std::sync::Arc<TaskRegistry> {
    TaskRegistry::get_or_initialize(&TaskConfig::default())
}

fn file_url(repo: &TestRepo) -> String {
    format!("file://{}", repo.path().display())
}

/// A clone of a reachable repository succeeds and leaves a checkout behind
#[tokio::test]
async fn test_clone_local_repository_succeeds() -> Result<()> {
    let source = TestRepo::new()?;
    let target = TempDir::new()?;
    let destination = target.path().join("copy");

    let registry = registry();
    let handle = CloneTask::new(
        file_url(&source),
        &destination,
        CloneOptions::default(),
        GitInvocation::default(),
    )
    .start(&registry);

    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;

    assert!(result.success, "clone failed: {}", result.message);
    assert_eq!(result.message, "Clone completed successfully");
    assert!(destination.join(".git").is_dir());
    assert!(destination.join("README.md").is_file());

    // Terminal tasks stay queryable
    let info = registry.get(handle)?;
    assert_eq!(info.state, TaskState::Succeeded);
    assert_eq!(info.result, Some(result));

    Ok(())
}

/// Parsed transfer progress arrives before the result, which is the last event
#[tokio::test]
async fn test_clone_events_end_with_result() -> Result<()> {
    let source = TestRepo::new()?;
    source.add_commit("lib.rs", "pub fn answer() -> u32 { 42 }\n", "Add lib")?;
    let target = TempDir::new()?;

    let registry = registry();
    let handle = CloneTask::new(
        file_url(&source),
        target.path().join("copy"),
        CloneOptions { depth: 0, branch: None },
        GitInvocation::default(),
    )
    .start(&registry);
    let mut subscription = registry.subscribe(handle)?;

    let mut finished = 0;
    let mut after_finish = 0;
    let mut phases = Vec::new();
    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(60), subscription.next()).await?
    {
        match event {
            TaskEvent::Finished(result) => {
                assert!(result.success, "clone failed: {}", result.message);
                finished += 1;
            }
            TaskEvent::Progress(_) if finished > 0 => after_finish += 1,
            TaskEvent::Progress(progress) => {
                if let Some(phase) = progress.phase {
                    assert!(progress.percent.is_some_and(|p| p <= 100));
                    phases.push(phase);
                }
            }
        }
    }

    assert_eq!(finished, 1);
    assert_eq!(after_finish, 0);
    // git --progress output from the real transfer was parsed
    assert!(
        phases.iter().any(|phase| phase == "Receiving objects"),
        "no parsed transfer progress, saw phases {phases:?}"
    );
    Ok(())
}

/// A missing source repository fails with git's own explanation
#[tokio::test]
async fn test_clone_missing_source_fails() -> Result<()> {
    let target = TempDir::new()?;
    let missing = target.path().join("does-not-exist");

    let registry = registry();
    let handle = CloneTask::new(
        format!("file://{}", missing.display()),
        target.path().join("copy"),
        CloneOptions::default(),
        GitInvocation::default(),
    )
    .start(&registry);

    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;

    assert!(!result.success);
    assert!(matches!(result.failure, Some(TaskFailure::ExitStatus { .. })));
    assert!(result.message.starts_with("Clone failed:"), "{}", result.message);
    assert_eq!(registry.state(handle)?, TaskState::Failed);
    Ok(())
}

/// A git binary that cannot be found fails the task instead of the caller
#[tokio::test]
async fn test_clone_with_missing_git_binary_reports_spawn_failure() -> Result<()> {
    let target = TempDir::new()?;
    let invocation = GitInvocation::default()
        .with_git_binary(target.path().join("no-such-git"));

    let registry = registry();
    let handle = CloneTask::new(
        "https://example.invalid/repo.git",
        target.path().join("copy"),
        CloneOptions::default(),
        invocation,
    )
    .start(&registry);

    let result = tokio::time::timeout(Duration::from_secs(30), registry.wait(handle)).await??;

    assert!(matches!(result.failure, Some(TaskFailure::Spawn(_))));
    assert!(!target.path().join("copy").exists());
    Ok(())
}

/// Cancelling a running clone terminates git and everything it started
#[tokio::test]
async fn test_clone_cancellation_terminates_process_tree() -> Result<()> {
    let scratch = TempDir::new()?;
    let (fake_git, pids) = stub_git(scratch.path())?;

    let registry = registry();
    let handle = CloneTask::new(
        "https://example.invalid/slow.git",
        scratch.path().join("copy"),
        CloneOptions::default(),
        GitInvocation::default().with_git_binary(fake_git),
    )
    .start(&registry);

    // Wait until git and its helper are actually running
    let (git_pid, child_pid) = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(found) = pids.read() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    assert_eq!(registry.state(handle)?, TaskState::Running);

    registry.cancel(handle)?;
    let result = tokio::time::timeout(Duration::from_secs(10), registry.wait(handle)).await??;

    assert!(result.is_cancelled());
    assert!(!result.success);
    assert_eq!(registry.state(handle)?, TaskState::Cancelled);

    assert!(
        wait_until_gone(git_pid, Duration::from_secs(5)).await,
        "git process {git_pid} survived cancellation"
    );
    assert!(
        wait_until_gone(child_pid, Duration::from_secs(5)).await,
        "helper process {child_pid} survived cancellation"
    );

    // Cancelling again is a no-op
    registry.cancel(handle)?;
    assert_eq!(registry.state(handle)?, TaskState::Cancelled);
    Ok(())
}

/// Stored credentials are only offered to their own host
#[tokio::test]
async fn test_clone_from_foreign_host_sends_no_credentials() -> Result<()> {
    let server = RecordingServer::start()?;
    let target = TempDir::new()?;
    let invocation = GitInvocation::default()
        .with_credential(Credential::new("octocat", "ghp_SECRET123"));

    let registry = registry();
    let handle = CloneTask::new(
        server.url("evil/repo.git"),
        target.path().join("copy"),
        CloneOptions::default(),
        invocation,
    )
    .start(&registry);
    let result = tokio::time::timeout(Duration::from_secs(60), registry.wait(handle)).await??;

    assert!(!result.success);
    let requests = server.recorded();
    assert!(!requests.is_empty(), "git never contacted the server");
    for request in requests {
        let lowered = request.to_ascii_lowercase();
        assert!(!lowered.contains("authorization:"), "credential leaked: {request}");
        assert!(!request.contains("ghp_SECRET123"));
    }
    Ok(())
}

/// Every registration gets a distinct handle
#[tokio::test]
async fn test_registry_handles_are_unique() -> Result<()> {
    let target = TempDir::new()?;
    let registry = registry();
    let invocation =
        GitInvocation::default().with_git_binary(target.path().join("no-such-git"));

    let mut handles = HashSet::new();
    for i in 0..16 {
        let handle = CloneTask::new(
            "https://example.invalid/repo.git",
            target.path().join(format!("copy-{i}")),
            CloneOptions::default(),
            invocation.clone(),
        )
        .start(&registry);
        assert!(handles.insert(handle), "duplicate handle {handle}");
    }

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(30), registry.wait(handle)).await??;
        registry.remove(handle)?;
        assert!(registry.get(handle).is_err());
    }
    Ok(())
}

// ABOUTME: Push task - `git push origin <branch> [--force] [--delete]` reporting a single result
// Destructive options must be confirmed by the caller before the task is built

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use super::registry::TaskRegistry;
use super::{
    GitInvocation, GitTask, StderrTail, TaskContext, TaskFailure, TaskHandle, TaskKind, TaskResult,
};
use crate::models::RepositoryRef;
use crate::process::CommandSpec;

pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub force: bool,
    pub delete_remote: bool,
}

impl PushOptions {
    /// Force-push or branch deletion
    pub fn is_destructive(self) -> bool {
        self.force || self.delete_remote
    }
}

#[derive(Debug, Clone)]
pub struct PushTask {
    repository: RepositoryRef,
    branch: String,
    options: PushOptions,
    invocation: GitInvocation,
}

impl PushTask {
    pub fn new(
        repository: &RepositoryRef,
        branch: impl Into<String>,
        options: PushOptions,
        invocation: GitInvocation,
    ) -> Self {
        Self {
            repository: repository.clone(),
            branch: branch.into(),
            options,
            invocation,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn options(&self) -> PushOptions {
        self.options
    }

    pub fn start(self, registry: &Arc<TaskRegistry>) -> TaskHandle {
        registry.register(Box::new(self))
    }

    pub(crate) fn command_spec(&self) -> CommandSpec {
        let mut args = vec![
            "push".to_string(),
            DEFAULT_REMOTE.to_string(),
            self.branch.clone(),
        ];
        if self.options.force {
            args.push("--force".to_string());
        }
        if self.options.delete_remote {
            args.push("--delete".to_string());
        }

        self.invocation
            .command(args)
            .current_dir(self.repository.root())
    }

    fn success_message(&self) -> String {
        if self.options.delete_remote {
            format!("Deleted remote branch {}", self.branch)
        } else if self.options.force {
            format!("Force-pushed {} to {DEFAULT_REMOTE}", self.branch)
        } else {
            format!("Pushed {} to {DEFAULT_REMOTE}", self.branch)
        }
    }
}

#[async_trait]
impl GitTask for PushTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Push
    }

    fn describe(&self) -> String {
        let mut description = format!("push {} ({})", self.branch, self.repository.name());
        if self.options.force {
            description.push_str(" --force");
        }
        if self.options.delete_remote {
            description.push_str(" --delete");
        }
        description
    }

    async fn run(self: Box<Self>, mut ctx: TaskContext) -> TaskResult {
        let started = Instant::now();
        let repo = self.repository.name().to_string();
        info!(
            repo = %repo,
            branch = %self.branch,
            force = self.options.force,
            delete = self.options.delete_remote,
            "Starting push"
        );

        let mut process = match self.invocation.runner().start(self.command_spec()).await {
            Ok(process) => process,
            Err(e) => {
                warn!(repo = %repo, error = %e, "Push process could not be started");
                return TaskResult::failed(
                    TaskFailure::Spawn(e.to_string()),
                    format!("Push failed: {e}"),
                );
            }
        };

        // Push output is collected for the failure message only
        let mut output = StderrTail::default();
        let exit = loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancelled() => None,
                line = process.next_line() => Some(line),
            };

            match next {
                None => break None,
                Some(Some(line)) => output.push(line.text),
                Some(None) => {
                    let exit = tokio::select! {
                        biased;
                        () = ctx.cancelled() => None,
                        exit = process.wait_exit_code() => Some(exit),
                    };
                    break exit;
                }
            }
        };

        match exit {
            None => {
                info!(repo = %repo, branch = %self.branch, "Push cancelled");
                if let Err(e) = process.cancel().await {
                    warn!(repo = %repo, error = %e, "Failed to terminate push process");
                }
                TaskResult::cancelled("Push cancelled")
            }
            Some(Ok(0)) => {
                info!(repo = %repo, branch = %self.branch, elapsed = ?started.elapsed(), "Push succeeded");
                TaskResult::succeeded(self.success_message())
            }
            Some(Ok(code)) => {
                let detail = output
                    .failure_detail()
                    .unwrap_or_else(|| format!("git exited with status {code}"));
                warn!(repo = %repo, branch = %self.branch, code = code, detail = %detail, "Push failed");
                TaskResult::failed(
                    TaskFailure::ExitStatus { code },
                    format!("Push failed: {detail}"),
                )
            }
            Some(Err(e)) => {
                warn!(repo = %repo, error = %e, "Lost track of push process");
                TaskResult::failed(TaskFailure::Io(e.to_string()), format!("Push failed: {e}"))
            }
        }
    }
}

// ABOUTME: Clone task - shallow `git clone --progress` with parsed progress and rate sampling
// Also derives clone destinations from URLs and clears pre-existing destinations

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::progress::{parse_progress_line, SpeedSampler};
use super::registry::TaskRegistry;
use super::{
    GitInvocation, GitTask, StderrTail, TaskContext, TaskError, TaskFailure, TaskHandle, TaskKind,
    TaskProgress, TaskResult,
};
use crate::config::TransportConfig;
use crate::process::{CommandSpec, OutputStream};

pub const CLONE_SUCCESS_MESSAGE: &str = "Clone completed successfully";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// History depth; 0 clones full history
    pub depth: u32,
    /// Branch to check out instead of the remote HEAD
    pub branch: Option<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            branch: None,
        }
    }
}

impl CloneOptions {
    pub fn from_transport(transport: &TransportConfig) -> Self {
        Self {
            depth: transport.clone_depth,
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Clones `url` into `destination`, which must not exist (see [`prepare_destination`])
#[derive(Debug, Clone)]
pub struct CloneTask {
    url: String,
    destination: PathBuf,
    options: CloneOptions,
    invocation: GitInvocation,
}

impl CloneTask {
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        options: CloneOptions,
        invocation: GitInvocation,
    ) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            options,
            invocation,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Register with the registry and start running
    pub fn start(self, registry: &Arc<TaskRegistry>) -> TaskHandle {
        registry.register(Box::new(self))
    }

    pub(crate) fn command_spec(&self) -> CommandSpec {
        let mut args = vec!["clone".to_string()];
        if self.options.depth > 0 {
            args.push("--depth".to_string());
            args.push(self.options.depth.to_string());
        }
        if let Some(branch) = &self.options.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        args.push("--progress".to_string());
        args.push("--".to_string());
        args.push(self.url.clone());
        args.push(self.destination.display().to_string());

        self.invocation.command(args)
    }
}

#[async_trait]
impl GitTask for CloneTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Clone
    }

    fn describe(&self) -> String {
        format!(
            "clone {} -> {}",
            redact_url(&self.url),
            self.destination.display()
        )
    }

    async fn run(self: Box<Self>, mut ctx: TaskContext) -> TaskResult {
        let started = Instant::now();
        let url = redact_url(&self.url);
        info!(url = %url, destination = %self.destination.display(), depth = self.options.depth, "Starting clone");

        let mut process = match self.invocation.runner().start(self.command_spec()).await {
            Ok(process) => process,
            Err(e) => {
                warn!(url = %url, error = %e, "Clone process could not be started");
                return TaskResult::failed(
                    TaskFailure::Spawn(e.to_string()),
                    format!("Clone failed: {e}"),
                );
            }
        };

        let mut sampler = SpeedSampler::new(self.invocation.sample_interval(), started);
        let mut stderr = StderrTail::default();
        let mut status = String::new();
        let mut phase = None;
        let mut percent = None;

        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancelled() => None,
                line = process.next_line() => Some(line),
            };

            let Some(line) = next else {
                return cancel_clone(&mut process, &url).await;
            };
            let Some(line) = line else {
                break;
            };

            if line.stream == OutputStream::Stderr {
                stderr.push(line.text.clone());
            }

            let parsed = parse_progress_line(&line.text);
            let rate = sampler.sample(Instant::now(), process.bytes_read());

            if let Some(parsed) = &parsed {
                status.clone_from(&line.text);
                phase = Some(parsed.phase.clone());
                percent = Some(parsed.percent);
            }

            if parsed.is_some() || rate.is_some() {
                ctx.report(TaskProgress {
                    status: if status.is_empty() {
                        line.text.clone()
                    } else {
                        status.clone()
                    },
                    phase: phase.clone(),
                    percent,
                    bytes_per_sec: sampler.current_rate(),
                    bytes_read: process.bytes_read(),
                    elapsed: started.elapsed(),
                });
            }
        }

        let exit = tokio::select! {
            biased;
            () = ctx.cancelled() => None,
            exit = process.wait_exit_code() => Some(exit),
        };

        match exit {
            None => cancel_clone(&mut process, &url).await,
            Some(Ok(0)) => {
                info!(url = %url, destination = %self.destination.display(), elapsed = ?started.elapsed(), "Clone succeeded");
                TaskResult::succeeded(CLONE_SUCCESS_MESSAGE)
            }
            Some(Ok(code)) => {
                let detail = stderr
                    .failure_detail()
                    .unwrap_or_else(|| format!("git exited with status {code}"));
                warn!(url = %url, code = code, detail = %detail, "Clone failed");
                TaskResult::failed(
                    TaskFailure::ExitStatus { code },
                    format!("Clone failed: {detail}"),
                )
            }
            Some(Err(e)) => {
                warn!(url = %url, error = %e, "Lost track of clone process");
                TaskResult::failed(TaskFailure::Io(e.to_string()), format!("Clone failed: {e}"))
            }
        }
    }
}

async fn cancel_clone(process: &mut crate::process::ProcessHandle, url: &str) -> TaskResult {
    info!(url = %url, pid = process.pid(), "Clone cancelled");
    if let Err(e) = process.cancel().await {
        warn!(url = %url, error = %e, "Failed to terminate clone process");
    }
    TaskResult::cancelled("Clone cancelled")
}

/// Destination for cloning `url` under `parent`: the last path segment
/// with a trailing `.git` removed.
pub fn clone_destination(parent: &Path, url: &str) -> Option<PathBuf> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // scp-like `git@host:owner/repo.git` and plain paths
        Err(_) => url.to_string(),
    };

    let segment = path
        .trim_end_matches(&['/', '\\'][..])
        .rsplit(&['/', '\\', ':'][..])
        .next()?;
    let name = segment.strip_suffix(".git").unwrap_or(segment);

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    Some(parent.join(name))
}

/// Remove a pre-existing destination so a clone can proceed.
///
/// Read-only entries are made writable and removal is retried once before
/// giving up with `TaskError::Cleanup`.
pub fn prepare_destination(path: &Path) -> Result<(), TaskError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TaskError::Cleanup {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let remove = || {
        if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    };

    match remove() {
        Ok(()) => {
            debug!(path = %path.display(), "Removed existing destination");
            Ok(())
        }
        Err(first) => {
            debug!(path = %path.display(), error = %first, "Removal failed, clearing read-only bits and retrying");
            make_writable(path);
            if let Some(parent) = path.parent() {
                set_writable(parent);
            }
            remove().map_err(|source| {
                warn!(path = %path.display(), error = %source, "Failed to remove existing destination");
                TaskError::Cleanup {
                    path: path.to_path_buf(),
                    source,
                }
            })
        }
    }
}

fn make_writable(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    if metadata.file_type().is_symlink() {
        return;
    }

    set_writable(path);

    if metadata.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable(&entry.path());
            }
        }
    }
}

fn set_writable(path: &Path) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    let mut permissions = metadata.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o700);
    }

    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);

    if let Err(e) = fs::set_permissions(path, permissions) {
        debug!(path = %path.display(), error = %e, "Could not clear read-only bit");
    }
}

/// URL with any embedded userinfo removed, safe for logs
pub(crate) fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

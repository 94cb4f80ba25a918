// ABOUTME: Asynchronous git tasks (clone, push) with progress events and terminal results
// Tasks run on their own tokio worker and report through a per-task broadcast channel

pub mod clone;
pub mod progress;
pub mod push;
pub mod registry;

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::warn;
use uuid::Uuid;

use crate::config::{AppConfig, TransportConfig};
use crate::models::Credential;
use crate::process::{CommandSpec, ProcessRunner};

pub use clone::{clone_destination, prepare_destination, CloneOptions, CloneTask};
pub use progress::{format_rate, parse_progress_line, ProgressLine, SpeedSampler};
pub use push::{PushOptions, PushTask};
pub use registry::{SubscriptionGuard, TaskInfo, TaskRegistry, TaskSubscription};

/// Opaque identifier of one registered task. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(Uuid);

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Clone,
    Push,
}

/// `Pending → Running → {Succeeded, Failed, Cancelled}`; terminal states are absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Snapshot emitted while a task is active
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    /// Last status line reported by git
    pub status: String,
    pub phase: Option<String>,
    pub percent: Option<u8>,
    /// Sampled at most once per sample interval
    pub bytes_per_sec: Option<f64>,
    pub bytes_read: u64,
    pub elapsed: Duration,
}

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The git process could not be started
    Spawn(String),
    /// git exited with a non-zero code
    ExitStatus { code: i32 },
    /// Cancelled by the caller
    Cancelled,
    /// I/O failure while supervising the process
    Io(String),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(cause) => write!(f, "spawn error: {cause}"),
            Self::ExitStatus { code } => write!(f, "exit status {code}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Io(cause) => write!(f, "io error: {cause}"),
        }
    }
}

/// Terminal outcome; exactly one per task and always the last event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub success: bool,
    pub message: String,
    pub failure: Option<TaskFailure>,
}

impl TaskResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            failure: None,
        }
    }

    pub fn failed(failure: TaskFailure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(failure),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::failed(TaskFailure::Cancelled, message)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, Some(TaskFailure::Cancelled))
    }

    /// Terminal state this result moves the task into
    pub fn state(&self) -> TaskState {
        if self.success {
            TaskState::Succeeded
        } else if self.is_cancelled() {
            TaskState::Cancelled
        } else {
            TaskState::Failed
        }
    }
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress(TaskProgress),
    Finished(TaskResult),
}

#[derive(Error, Debug)]
pub enum TaskError {
    /// A pre-existing destination could not be removed
    #[error("Failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task registry is already initialized")]
    AlreadyInitialized,

    #[error("Task registry has not been initialized")]
    NotInitialized,

    #[error("Task not found: {0}")]
    NotFound(TaskHandle),

    #[error("Task {0} has not finished yet")]
    StillRunning(TaskHandle),
}

/// Worker-side view of a registered task: progress publishing and cancellation
pub struct TaskContext {
    events: broadcast::Sender<TaskEvent>,
    latest: Arc<Mutex<Option<TaskProgress>>>,
    cancel: watch::Receiver<bool>,
}

impl TaskContext {
    pub(crate) fn new(
        events: broadcast::Sender<TaskEvent>,
        latest: Arc<Mutex<Option<TaskProgress>>>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            events,
            latest,
            cancel,
        }
    }

    /// Context not attached to a registry, for driving a task directly.
    ///
    /// Returns the cancel trigger and an event receiver alongside it.
    pub fn detached(
        buffer: usize,
    ) -> (Self, watch::Sender<bool>, broadcast::Receiver<TaskEvent>) {
        let (events, rx) = broadcast::channel(buffer.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self::new(events, Arc::new(Mutex::new(None)), cancel_rx),
            cancel_tx,
            rx,
        )
    }

    /// Publish a progress snapshot to every subscriber
    pub fn report(&self, progress: TaskProgress) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(progress.clone());
        }
        // No subscribers is fine
        let _ = self.events.send(TaskEvent::Progress(progress));
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation is requested; never resolves otherwise
    pub async fn cancelled(&mut self) {
        loop {
            if *self.cancel.borrow_and_update() {
                return;
            }
            if self.cancel.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A unit of work the registry can drive to a terminal result
#[async_trait]
pub trait GitTask: Send + 'static {
    fn kind(&self) -> TaskKind;

    /// Short description for listings and logs (never contains secrets)
    fn describe(&self) -> String;

    /// Run to completion. Failures are reported in the result, never raised.
    async fn run(self: Box<Self>, ctx: TaskContext) -> TaskResult;
}

/// Environment shared by clone and push invocations
#[derive(Clone)]
pub struct GitInvocation {
    git_binary: PathBuf,
    transport: TransportConfig,
    credential: Option<Credential>,
    runner: ProcessRunner,
    sample_interval: Duration,
}

impl fmt::Debug for GitInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitInvocation")
            .field("git_binary", &self.git_binary)
            .field("transport", &self.transport)
            .field("authenticated", &self.credential.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for GitInvocation {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl GitInvocation {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            git_binary: config.tasks.resolve_git_binary(),
            transport: config.transport.clone(),
            credential: None,
            runner: ProcessRunner::from_config(&config.tasks),
            sample_interval: config.tasks.speed_sample_interval,
        }
    }

    /// Authenticate HTTP transport with this credential for these invocations only
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_git_binary(mut self, git_binary: impl Into<PathBuf>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Command with transport `-c` overrides followed by `args`.
    ///
    /// The credential travels in `GIT_CONFIG_*` environment variables so the
    /// token never shows up in the process list. The header is scoped to
    /// `https://<credential host>/`; any other URL gets no authorization.
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.transport.ssl_verify {
            warn!("TLS certificate verification is disabled for this git invocation");
        }

        let mut spec = CommandSpec::new(&self.git_binary)
            .args(self.transport.git_config_args())
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");

        if let Some(credential) = &self.credential {
            let basic = BASE64.encode(format!("{}:{}", credential.username, credential.token));
            spec = spec
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", credential_header_key(&credential.host))
                .env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {basic}"));
        }

        spec
    }
}

/// `http.<url>.extraHeader` key matching only HTTPS requests to `host`
fn credential_header_key(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    format!("http.https://{host}/.extraHeader")
}

/// Bounded tail of stderr lines used to build failure messages
#[derive(Debug, Default)]
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
}

impl StderrTail {
    const CAPACITY: usize = 32;

    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() == Self::CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// `fatal:`/`error:` lines when present, otherwise the last line
    pub(crate) fn failure_detail(&self) -> Option<String> {
        let diagnostics: Vec<&str> = self
            .lines
            .iter()
            .map(String::as_str)
            .filter(|line| line.starts_with("fatal:") || line.starts_with("error:"))
            .collect();

        if diagnostics.is_empty() {
            self.lines.back().cloned()
        } else {
            Some(diagnostics.join("\n"))
        }
    }

    #[cfg(test)]
    pub(crate) fn all(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

// ABOUTME: Process runner for external version-control binaries
//
// Spawns a child with piped stdout/stderr, pumps both pipes into a single line
// channel (splitting on '\n' and '\r' so in-place progress updates arrive as
// separate lines), counts raw bytes read, and terminates with SIGTERM then
// SIGKILL after a grace period. Each child leads its own process group and
// signals go to the whole group, so helpers it forked die with it. The child
// is always reaped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::TaskConfig;

/// Errors that can occur while running a child process
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Process spawn failed
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Spawn did not complete within the configured timeout
    #[error("Timed out after {timeout:?} spawning {program}")]
    SpawnTimeout { program: String, timeout: Duration },

    /// Invalid command
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Waiting for exit failed
    #[error("Failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    /// Termination failed
    #[error("Failed to terminate process: {0}")]
    Terminate(#[source] std::io::Error),
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Program, arguments, working directory and extra environment for one child
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// Empty lines (e.g. the `\n` of a `\r\n` pair) are dropped and trailing
/// whitespace is trimmed. Invalid UTF-8 is replaced lossily.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left once the stream ends
    pub fn finish(mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Spawns children with a spawn timeout and a termination grace period
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    spawn_timeout: Duration,
    cancel_grace: Duration,
    line_buffer: usize,
}

impl ProcessRunner {
    pub fn new(spawn_timeout: Duration, cancel_grace: Duration) -> Self {
        Self {
            spawn_timeout,
            cancel_grace,
            line_buffer: 256,
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            spawn_timeout: config.spawn_timeout,
            cancel_grace: config.cancel_grace,
            line_buffer: config.event_buffer.max(1),
        }
    }

    /// Spawn the child described by `spec`
    ///
    /// # Errors
    /// `Spawn` with the OS cause, or `SpawnTimeout` if the OS call stalls
    pub async fn start(&self, spec: CommandSpec) -> Result<ProcessHandle, ProcessError> {
        if spec.program.as_os_str().is_empty() {
            return Err(ProcessError::InvalidCommand(
                "Command cannot be empty".to_string(),
            ));
        }

        let program = spec.program_name();
        debug!(command = %program, args = ?spec.args, cwd = ?spec.cwd, "Spawning process");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let spawn = tokio::task::spawn_blocking(move || command.spawn());
        let mut child = match tokio::time::timeout(self.spawn_timeout, spawn).await {
            Ok(Ok(Ok(child))) => child,
            Ok(Ok(Err(source))) => {
                warn!(command = %program, error = %source, "Process spawn failed");
                return Err(ProcessError::Spawn { program, source });
            }
            Ok(Err(join_error)) => {
                error!(command = %program, error = %join_error, "Spawn worker panicked");
                return Err(ProcessError::Spawn {
                    program,
                    source: std::io::Error::new(std::io::ErrorKind::Other, join_error),
                });
            }
            Err(_) => {
                warn!(command = %program, timeout = ?self.spawn_timeout, "Process spawn timed out");
                return Err(ProcessError::SpawnTimeout {
                    program,
                    timeout: self.spawn_timeout,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        info!(pid = pid, command = %program, "Process spawned");

        let bytes_read = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::channel(self.line_buffer);
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(
                stdout,
                OutputStream::Stdout,
                tx.clone(),
                Arc::clone(&bytes_read),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(
                stderr,
                OutputStream::Stderr,
                tx,
                Arc::clone(&bytes_read),
            )));
        }

        Ok(ProcessHandle {
            child: Some(child),
            pid,
            program,
            lines: rx,
            bytes_read,
            readers,
            cancel_grace: self.cancel_grace,
            exit_code: None,
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default())
    }
}

/// Read a pipe to EOF, forwarding complete lines.
///
/// Keeps draining after the receiver goes away so the child never blocks on
/// a full pipe.
async fn pump_lines<R>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
    bytes_read: Arc<AtomicU64>,
) where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 8192];
    let mut receiver_alive = true;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                for text in splitter.feed(&buf[..n]) {
                    if receiver_alive && tx.send(OutputLine { stream, text }).await.is_err() {
                        receiver_alive = false;
                    }
                }
            }
            Err(e) => {
                warn!(?stream, error = %e, "Failed reading child output");
                break;
            }
        }
    }

    if let Some(text) = splitter.finish() {
        if receiver_alive {
            let _ = tx.send(OutputLine { stream, text }).await;
        }
    }
}

/// A running (or finished) child process
pub struct ProcessHandle {
    child: Option<Child>,
    pid: u32,
    program: String,
    lines: mpsc::Receiver<OutputLine>,
    bytes_read: Arc<AtomicU64>,
    readers: Vec<JoinHandle<()>>,
    cancel_grace: Duration,
    exit_code: Option<i32>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Total bytes read from stdout and stderr so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Next output line; `None` once both pipes have closed
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Lazy sequence of output lines ending when the child closes its pipes
    pub fn stream_lines(&mut self) -> impl Stream<Item = OutputLine> + '_ {
        async_stream::stream! {
            while let Some(line) = self.lines.recv().await {
                yield line;
            }
        }
    }

    /// Wait for exit and return the exit code.
    ///
    /// Signal deaths map to `128 + signal`, as shells report them.
    pub async fn wait_exit_code(&mut self) -> Result<i32, ProcessError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let Some(child) = self.child.as_mut() else {
            return Ok(self.exit_code.unwrap_or(-1));
        };

        let status = child.wait().await.map_err(ProcessError::Wait)?;
        let code = exit_code_of(status);
        debug!(pid = self.pid, code = code, "Process exited");

        self.finish_readers().await;
        self.child = None;
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Terminate the child and its process group: SIGTERM, wait
    /// `cancel_grace`, then SIGKILL.
    ///
    /// Returns the reaped exit code. A child that already exited is fine.
    pub async fn cancel(&mut self) -> Result<i32, ProcessError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(self.exit_code.unwrap_or(-1));
        };

        let pid = self.pid;
        info!(pid = pid, command = %self.program, "Terminating process group");

        #[cfg(unix)]
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        let status = match tokio::time::timeout(self.cancel_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = pid, "Process terminated gracefully");
                status
            }
            Ok(Err(e)) => {
                warn!(pid = pid, error = %e, "Error waiting for process");
                return Err(ProcessError::Wait(e));
            }
            Err(_) => {
                warn!(pid = pid, "Process did not terminate gracefully, sending SIGKILL");
                #[cfg(unix)]
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
                if let Err(e) = child.kill().await {
                    error!(pid = pid, error = %e, "Failed to kill process");
                    return Err(ProcessError::Terminate(e));
                }
                child.wait().await.map_err(ProcessError::Wait)?
            }
        };

        // Members that ignored SIGTERM outlive the leader
        #[cfg(unix)]
        signal_group(pid, nix::sys::signal::Signal::SIGKILL);

        let code = exit_code_of(status);
        self.child = None;
        self.exit_code = Some(code);
        self.lines.close();
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        Ok(code)
    }

    /// Whether the child has been reaped
    pub fn is_finished(&self) -> bool {
        self.child.is_none()
    }

    async fn finish_readers(&mut self) {
        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!(error = %e, "Output reader task failed");
            }
        }
    }
}

/// Send `signal` to the process group led by `pid`. A group that is already
/// gone (ESRCH) is not an error.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if raw <= 0 {
        return;
    }
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid = pid, ?signal, error = %e, "Failed to signal process group"),
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

// ABOUTME: Shared test fixtures and utilities for behavioral tests
//
// Provides:
// - TestRepo: Temporary git repository with an initial commit
// - BareRemote: Temporary bare repository usable as a push target
// - stub_git(): Executable standing in for git that never finishes
// - RecordingServer: HTTP endpoint that records request headers

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use commit_canvas::models::RepositoryRef;

fn git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").args(args).current_dir(cwd).output()?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Creates a temporary git repository with initial commit
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new temporary git repository with initial commit
    pub fn new() -> Result<Self> {
        let repo = Self::empty()?;
        repo.add_commit("README.md", "# Test Repo\n", "Initial commit")?;
        Ok(repo)
    }

    /// Initialized repository with identity configured and no commits
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().to_path_buf();

        git(&path, &["init"])?;
        git(&path, &["config", "user.email", "test@test.com"])?;
        git(&path, &["config", "user.name", "Test User"])?;

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository_ref(&self) -> Result<RepositoryRef> {
        RepositoryRef::discover(&self.path)
            .ok_or_else(|| anyhow::anyhow!("{} is not a repository", self.path.display()))
    }

    /// Add a file and commit it
    pub fn add_commit(&self, filename: &str, content: &str, message: &str) -> Result<()> {
        std::fs::write(self.path.join(filename), content)?;
        git(&self.path, &["add", filename])?;
        git(&self.path, &["commit", "-m", message])?;
        Ok(())
    }

    /// Stage a file without committing
    pub fn stage(&self, filename: &str, content: &str) -> Result<()> {
        std::fs::write(self.path.join(filename), content)?;
        git(&self.path, &["add", filename])?;
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String> {
        git(&self.path, &["branch", "--show-current"])
    }

    /// Create a branch at HEAD without checking it out
    pub fn create_branch(&self, name: &str) -> Result<()> {
        git(&self.path, &["branch", name])?;
        Ok(())
    }

    pub fn add_remote(&self, name: &str, url: &Path) -> Result<()> {
        git(&self.path, &["remote", "add", name, &url.display().to_string()])?;
        Ok(())
    }
}

/// Bare repository acting as a remote
pub struct BareRemote {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl BareRemote {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("remote.git");
        std::fs::create_dir_all(&path)?;
        git(&path, &["init", "--bare"])?;
        Ok(Self { dir, path })
    }

    /// Commit id the remote holds for `branch`, if any
    pub fn branch_head(&self, branch: &str) -> Option<String> {
        git(&self.path, &["rev-parse", "--verify", &format!("refs/heads/{branch}")]).ok()
    }
}

/// Pids written by [`stub_git`]
pub struct StubPids {
    pub git: PathBuf,
    pub child: PathBuf,
}

impl StubPids {
    /// Both pids once the script has started its child
    pub fn read(&self) -> Option<(i32, i32)> {
        let read = |path: &Path| -> Option<i32> {
            std::fs::read_to_string(path).ok()?.trim().parse().ok()
        };
        // The child pid is written first
        let git = read(&self.git)?;
        let child = read(&self.child)?;
        Some((git, child))
    }
}

/// Script standing in for git when a task must stay running: it starts a
/// background child of its own (as git does with its helpers), records both
/// pids and waits, never producing output.
pub fn stub_git(dir: &Path) -> Result<(PathBuf, StubPids)> {
    use std::os::unix::fs::PermissionsExt;

    let pids = StubPids {
        git: dir.join("git.pid"),
        child: dir.join("child.pid"),
    };
    let script = dir.join("slow-git");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nsleep 30 &\necho $! > '{}'\necho $$ > '{}'\nwait\n",
            pids.child.display(),
            pids.git.display()
        ),
    )?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
    Ok((script, pids))
}

/// Whether `pid` is a live process. Zombies count as gone: an orphan waiting
/// for init to reap it is no longer running.
pub fn process_alive(pid: i32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // State follows the parenthesized command name
        return match stat.rsplit_once(')') {
            Some((_, rest)) => !matches!(rest.trim_start().chars().next(), Some('Z' | 'X')),
            None => true,
        };
    }
    if Path::new("/proc/self").exists() {
        return false;
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Poll until `pid` is gone or `timeout` passes
pub async fn wait_until_gone(pid: i32, timeout: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    !process_alive(pid)
}

/// Plain HTTP server that answers every request with 404 and keeps the
/// request heads it saw
pub struct RecordingServer {
    pub port: u16,
    pub requests: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl RecordingServer {
    pub fn start() -> Result<Self> {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let requests = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = std::sync::Arc::clone(&requests);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(5)));

                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                if let Ok(mut seen) = seen.lock() {
                    seen.push(String::from_utf8_lossy(&head).into_owned());
                }
                let _ = stream.write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
            }
        });

        Ok(Self { port, requests })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}/{path}", self.port)
    }

    pub fn recorded(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_creation() -> Result<()> {
        let repo = TestRepo::new()?;
        assert!(repo.path().join(".git").exists());
        assert!(repo.path().join("README.md").exists());
        assert!(repo.repository_ref().is_ok());
        Ok(())
    }

    #[test]
    fn test_bare_remote_starts_without_branches() -> Result<()> {
        let remote = BareRemote::new()?;
        assert!(remote.branch_head("main").is_none());
        Ok(())
    }
}

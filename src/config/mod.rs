// ABOUTME: Configuration management for commit-canvas
// Handles transport tuning, task runtime limits, remote host settings, scanner and credential backends

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory under $HOME holding config, logs and the optional credential file
pub const APP_DIR: &str = ".commit-canvas";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Git transport parameters applied to clone/push invocations
    pub transport: TransportConfig,

    /// Task runner limits
    pub tasks: TaskConfig,

    /// Remote host API settings
    pub remote: RemoteConfig,

    /// Repository discovery settings
    pub scanner: ScannerConfig,

    /// Credential persistence backend
    pub credentials: CredentialConfig,
}

/// Transport tuning for unreliable networks and large repositories.
///
/// Applied per invocation via `git -c key=value`; the user's global git
/// config is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `http.sslVerify`. Disabling this is a security trade-off and is logged.
    pub ssl_verify: bool,

    /// `http.postBuffer` in bytes
    pub http_post_buffer: u64,

    /// `http.lowSpeedLimit` in bytes/sec
    pub low_speed_limit: u64,

    /// `http.lowSpeedTime` in seconds
    pub low_speed_time: u64,

    /// History depth for clones (0 = full history)
    pub clone_depth: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssl_verify: false,
            http_post_buffer: 524_288_000,
            low_speed_limit: 1000,
            low_speed_time: 300,
            clone_depth: 1,
        }
    }
}

impl TransportConfig {
    /// `-c key=value` pairs for the git command line
    pub fn git_config_args(&self) -> Vec<String> {
        let pairs = [
            ("http.sslVerify", self.ssl_verify.to_string()),
            ("http.postBuffer", self.http_post_buffer.to_string()),
            ("http.lowSpeedLimit", self.low_speed_limit.to_string()),
            ("http.lowSpeedTime", self.low_speed_time.to_string()),
        ];

        pairs
            .into_iter()
            .flat_map(|(key, value)| ["-c".to_string(), format!("{key}={value}")])
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Git binary name or path
    pub git_binary: String,

    /// Maximum time allowed for spawning a child process
    #[serde(with = "duration_secs")]
    pub spawn_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL on cancellation
    #[serde(with = "duration_secs")]
    pub cancel_grace: Duration,

    /// Minimum interval between transfer-rate samples
    #[serde(with = "duration_secs")]
    pub speed_sample_interval: Duration,

    /// Capacity of each task's event channel
    pub event_buffer: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            spawn_timeout: Duration::from_secs(10),
            cancel_grace: Duration::from_secs(2),
            speed_sample_interval: Duration::from_secs(1),
            event_buffer: 256,
        }
    }
}

impl TaskConfig {
    /// Resolve the git binary on PATH, falling back to the configured name
    pub fn resolve_git_binary(&self) -> PathBuf {
        match which::which(&self.git_binary) {
            Ok(path) => path,
            Err(e) => {
                debug!(binary = %self.git_binary, error = %e, "git binary not resolved on PATH");
                PathBuf::from(&self.git_binary)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Host the credentials belong to
    pub host: String,

    /// Base URL of the REST API
    pub api_base: String,

    /// Timeout for each API request
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Accepted personal-access-token prefixes
    pub accepted_token_prefixes: Vec<String>,

    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: crate::models::DEFAULT_HOST.to_string(),
            api_base: "https://api.github.com".to_string(),
            request_timeout: Duration::from_secs(10),
            accepted_token_prefixes: vec!["ghp_".to_string(), "github_pat_".to_string()],
            user_agent: concat!("commit-canvas/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum directory depth below the scan root
    pub max_depth: usize,

    /// Directory names never descended into
    pub exclude_dirs: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            exclude_dirs: vec!["node_modules".to_string(), "target".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// System keychain
    #[default]
    Keyring,
    /// Plaintext JSON file (0600). Kept for compatibility only.
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub backend: CredentialBackend,

    /// Location of the credential file when `backend = "file"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl CredentialConfig {
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| app_dir().join("credentials.json"))
    }
}

impl AppConfig {
    /// Load configuration from the first config file found
    ///
    /// Precedence: `./.commit-canvas/config.toml`, then `~/.commit-canvas/config.toml`.
    /// No file means defaults.
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save to the user config file
    pub fn save(&self) -> Result<()> {
        let config_dir = app_dir();
        fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(())
    }

    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(APP_DIR).join("config.toml"));
        }

        paths.push(app_dir().join("config.toml"));
        paths
    }
}

/// `~/.commit-canvas`, or a relative directory when $HOME is unknown
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

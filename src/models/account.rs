// ABOUTME: Account models - credentials, verified remote profiles and remote repositories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default remote host for credentials
pub const DEFAULT_HOST: &str = "github.com";

/// Username + personal access token for a single remote host.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub token: String,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            host: default_host(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Masked display of the token (for UI)
    pub fn masked_token(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        if self.token.chars().count() > 8 {
            format!("{prefix}••••••••")
        } else {
            "••••••••".to_string()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Verified identity returned by the credential verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProfile {
    /// Canonical login as reported by the remote
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub public_repos: u64,
    pub followers: u64,
    pub following: u64,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteProfile {
    /// Name to greet the user with; falls back to the login
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.login,
        }
    }
}

/// A repository owned by the verified account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub name: String,
    pub description: Option<String>,
    pub clone_url: String,
    pub html_url: String,
    pub language: Option<String>,
    pub stars: u64,
}

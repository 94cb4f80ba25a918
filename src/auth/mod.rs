// ABOUTME: Credential verification against the remote host's REST API

pub mod github;
pub mod verifier;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RemoteProfile, RemoteRepository};

pub use github::GitHubApi;
pub use verifier::{CredentialVerifier, VerificationError};

/// Outcome of a request that reached the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply<T> {
    Ok(T),
    /// Any non-success status, with the remote-supplied message
    Rejected { status: u16, message: String },
}

/// The request never produced an HTTP response (DNS, TLS, timeout, bad body)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            timed_out: error.is_timeout(),
            message: error.to_string(),
        }
    }
}

/// Read-only view of the remote host used by the verifier
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteHostApi: Send + Sync {
    /// Profile of the account owning `token`
    async fn fetch_authenticated_user(
        &self,
        token: &str,
    ) -> Result<ApiReply<RemoteProfile>, TransportError>;

    /// Public repositories of `username`
    async fn fetch_user_repositories(
        &self,
        username: &str,
        token: &str,
    ) -> Result<ApiReply<Vec<RemoteRepository>>, TransportError>;
}

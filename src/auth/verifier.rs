// ABOUTME: Credential verifier - token format pre-check, profile lookup and login matching
//
// Failures are split three ways so callers can give targeted guidance:
// bad input (InvalidTokenFormat, no network call), bad response
// (RemoteRejected, UsernameMismatch) and bad transport (Transport).

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::{ApiReply, GitHubApi, RemoteHostApi, TransportError};
use crate::config::RemoteConfig;
use crate::models::{Credential, RemoteProfile, RemoteRepository};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Token format not recognized; expected a token starting with {}", .expected.join(" or "))]
    InvalidTokenFormat { expected: Vec<String> },

    #[error("Token belongs to '{actual}', not '{requested}'")]
    UsernameMismatch { requested: String, actual: String },

    #[error("Remote host rejected the request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Could not reach the remote host: {0}")]
    Transport(#[from] TransportError),
}

pub struct CredentialVerifier {
    api: Arc<dyn RemoteHostApi>,
    accepted_prefixes: Vec<String>,
}

impl CredentialVerifier {
    pub fn new(api: Arc<dyn RemoteHostApi>, accepted_prefixes: Vec<String>) -> Self {
        Self {
            api,
            accepted_prefixes,
        }
    }

    /// Verifier backed by the GitHub REST API
    pub fn from_config(config: &RemoteConfig) -> Result<Self, TransportError> {
        let api = GitHubApi::new(config)?;
        Ok(Self::new(
            Arc::new(api),
            config.accepted_token_prefixes.clone(),
        ))
    }

    /// Whether `token` has one of the accepted personal-access-token prefixes
    pub fn is_accepted_format(&self, token: &str) -> bool {
        self.accepted_prefixes
            .iter()
            .any(|prefix| token.starts_with(prefix.as_str()) && token.len() > prefix.len())
    }

    /// Check that `token` is valid and belongs to `username` (case-insensitive)
    pub async fn verify(
        &self,
        username: &str,
        token: &str,
    ) -> Result<RemoteProfile, VerificationError> {
        self.check_format(token)?;

        info!(username = %username, "Verifying credentials");
        let profile = match self.api.fetch_authenticated_user(token).await {
            Ok(ApiReply::Ok(profile)) => profile,
            Ok(ApiReply::Rejected { status, message }) => {
                warn!(username = %username, status = status, "Credentials rejected");
                return Err(VerificationError::RemoteRejected { status, message });
            }
            Err(e) => {
                warn!(username = %username, error = %e, "Credential verification transport failure");
                return Err(e.into());
            }
        };

        if !same_login(username, &profile.login) {
            warn!(requested = %username, actual = %profile.login, "Token belongs to another account");
            return Err(VerificationError::UsernameMismatch {
                requested: username.to_string(),
                actual: profile.login,
            });
        }

        info!(login = %profile.login, "Credentials verified");
        Ok(profile)
    }

    pub async fn verify_credential(
        &self,
        credential: &Credential,
    ) -> Result<RemoteProfile, VerificationError> {
        self.verify(&credential.username, &credential.token).await
    }

    /// Repositories owned by the credential's user
    pub async fn list_repositories(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>, VerificationError> {
        self.check_format(&credential.token)?;

        match self
            .api
            .fetch_user_repositories(&credential.username, &credential.token)
            .await?
        {
            ApiReply::Ok(repos) => {
                info!(username = %credential.username, count = repos.len(), "Fetched repositories");
                Ok(repos)
            }
            ApiReply::Rejected { status, message } => {
                warn!(username = %credential.username, status = status, "Repository listing rejected");
                Err(VerificationError::RemoteRejected { status, message })
            }
        }
    }

    fn check_format(&self, token: &str) -> Result<(), VerificationError> {
        if self.is_accepted_format(token) {
            return Ok(());
        }

        warn!("Token does not match any accepted prefix");
        Err(VerificationError::InvalidTokenFormat {
            expected: self.accepted_prefixes.clone(),
        })
    }
}

fn same_login(requested: &str, canonical: &str) -> bool {
    requested.to_lowercase() == canonical.to_lowercase()
}

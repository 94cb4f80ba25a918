// ABOUTME: GitHub REST API client for profile and repository lookups

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ApiReply, RemoteHostApi, TransportError};
use crate::config::RemoteConfig;
use crate::models::{RemoteProfile, RemoteRepository};

const ACCEPT_V3: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone)]
pub struct GitHubApi {
    client: Client,
    api_base: String,
}

impl GitHubApi {
    pub fn new(config: &RemoteConfig) -> Result<Self, TransportError> {
        Self::with_base(&config.api_base, &config.user_agent, config.request_timeout)
    }

    pub fn with_base(
        api_base: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        // Validate early so every request can assume a well-formed base
        Url::parse(api_base)
            .map_err(|e| TransportError::new(format!("Invalid API base URL {api_base}: {e}")))?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(TransportError::from)?;

        Ok(Self {
            client,
            api_base: api_base.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| TransportError::new(format!("Invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::new("API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
    ) -> Result<ApiReply<T>, TransportError> {
        debug!(url = %url, "GitHub API request");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .header(ACCEPT, ACCEPT_V3)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "GitHub API request failed");
                TransportError::from(e)
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            let body = response.json::<T>().await.map_err(|e| {
                warn!(url = %url, error = %e, "Unreadable GitHub API response");
                TransportError::from(e)
            })?;
            return Ok(ApiReply::Ok(body));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        warn!(url = %url, status = status.as_u16(), message = %message, "GitHub API rejected request");
        Ok(ApiReply::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteHostApi for GitHubApi {
    async fn fetch_authenticated_user(
        &self,
        token: &str,
    ) -> Result<ApiReply<RemoteProfile>, TransportError> {
        let url = self.endpoint(&["user"])?;
        let reply = self.get_json::<GitHubUser>(url, token).await?;
        Ok(map_reply(reply, RemoteProfile::from))
    }

    async fn fetch_user_repositories(
        &self,
        username: &str,
        token: &str,
    ) -> Result<ApiReply<Vec<RemoteRepository>>, TransportError> {
        let mut url = self.endpoint(&["users", username, "repos"])?;
        url.query_pairs_mut()
            .append_pair("per_page", "100")
            .append_pair("sort", "updated");

        let reply = self.get_json::<Vec<GitHubRepo>>(url, token).await?;
        Ok(map_reply(reply, |repos| {
            repos.into_iter().map(RemoteRepository::from).collect()
        }))
    }
}

fn map_reply<T, U>(reply: ApiReply<T>, f: impl FnOnce(T) -> U) -> ApiReply<U> {
    match reply {
        ApiReply::Ok(value) => ApiReply::Ok(f(value)),
        ApiReply::Rejected { status, message } => ApiReply::Rejected { status, message },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    #[serde(default)]
    public_repos: u64,
    #[serde(default)]
    followers: u64,
    #[serde(default)]
    following: u64,
    location: Option<String>,
    blog: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl From<GitHubUser> for RemoteProfile {
    fn from(user: GitHubUser) -> Self {
        Self {
            login: user.login,
            name: non_empty(user.name),
            email: non_empty(user.email),
            avatar_url: non_empty(user.avatar_url),
            public_repos: user.public_repos,
            followers: user.followers,
            following: user.following,
            location: non_empty(user.location),
            blog: non_empty(user.blog),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    name: String,
    description: Option<String>,
    clone_url: String,
    html_url: String,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
}

impl From<GitHubRepo> for RemoteRepository {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            name: repo.name,
            description: non_empty(repo.description),
            clone_url: repo.clone_url,
            html_url: repo.html_url,
            language: repo.language,
            stars: repo.stargazers_count,
        }
    }
}

/// GitHub reports unset profile fields as either null or ""
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

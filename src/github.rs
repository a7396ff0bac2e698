//! GitHub REST access: wire models, endpoints, and the page source used by the collector.

use crate::config::{AppConfig, RepoId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Page size requested from every list endpoint. GitHub caps this at 100.
pub const PER_PAGE: u8 = 100;

/// Delay assumed for a secondary rate limit response without a `retry-after` header.
const DEFAULT_SECONDARY_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Closed,
}

/// Whether a pull request author is a person or an automation account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorClass {
    Human,
    Bot,
    /// Organizations, mannequins and anything else GitHub may report.
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    /// GitHub account type, e.g. "User" or "Bot".
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Author {
    pub fn author_class(&self) -> AuthorClass {
        match self.account_type.as_str() {
            "User" => AuthorClass::Human,
            "Bot" => AuthorClass::Bot,
            _ => AuthorClass::Other,
        }
    }
}

/// A pull request as returned by the list endpoint.
///
/// Only the fields the analyzer needs are typed; everything else GitHub sends is kept
/// in `extra` so the snapshot carries the full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: PullState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub user: Option<Author>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PullRequest {
    /// Closed with a merge timestamp.
    pub fn is_merged(&self) -> bool {
        self.state == PullState::Closed && self.merged_at.is_some()
    }

    pub fn author_class(&self) -> AuthorClass {
        self.user
            .as_ref()
            .map_or(AuthorClass::Other, Author::author_class)
    }
}

/// A conversation comment on the pull request's issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub user: Option<Author>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub user: Option<Author>,
    /// e.g. "APPROVED", "CHANGES_REQUESTED", "COMMENTED".
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An inline comment attached to a line of the diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    pub user: Option<Author>,
    pub created_at: DateTime<Utc>,
    pub pull_request_review_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A paginated list endpoint of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// All pull requests, newest first.
    Pulls,
    IssueComments(u64),
    Reviews(u64),
    ReviewComments(u64),
}

impl Endpoint {
    /// Path and query string for one page of this endpoint.
    pub fn path_and_query(&self, repo: &RepoId, page: u32, per_page: u8) -> String {
        let base = format!("/repos/{}/{}", repo.owner, repo.repo);
        match self {
            Endpoint::Pulls => format!(
                "{base}/pulls?state=all&sort=created&direction=desc&per_page={per_page}&page={page}"
            ),
            Endpoint::IssueComments(number) => {
                format!("{base}/issues/{number}/comments?per_page={per_page}&page={page}")
            }
            Endpoint::Reviews(number) => {
                format!("{base}/pulls/{number}/reviews?per_page={per_page}&page={page}")
            }
            Endpoint::ReviewComments(number) => format!(
                "{base}/pulls/{number}/comments?sort=created&direction=desc&per_page={per_page}&page={page}"
            ),
        }
    }
}

/// Failure of a single page request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("GitHub secondary rate limit triggered, retry after {}s", .retry_after.as_secs())]
    SecondaryRateLimit { retry_after: Duration },

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to GitHub failed: {0}")]
    Http(#[from] octocrab::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can serve raw pages of a list endpoint.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one 1-based page. The returned items are undecoded JSON objects.
    async fn fetch_page(
        &self,
        repo: &RepoId,
        endpoint: Endpoint,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<Value>, FetchError>;
}

/// The subset of response headers used to classify throttling.
#[derive(Debug, Default, Clone)]
pub struct RateLimitHeaders {
    pub retry_after: Option<String>,
    pub remaining: Option<String>,
    pub reset: Option<String>,
}

/// Maps a non-success response to a [`FetchError`].
pub fn classify_failure(
    status: u16,
    headers: &RateLimitHeaders,
    body: &str,
    now: DateTime<Utc>,
) -> FetchError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_string());

    let retry_after_header = headers
        .retry_after
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    if status == 403 || status == 429 {
        let lowered = message.to_lowercase();
        if lowered.contains("secondary rate") || lowered.contains("abuse") {
            return FetchError::SecondaryRateLimit {
                retry_after: retry_after_header.unwrap_or(DEFAULT_SECONDARY_RETRY_AFTER),
            };
        }

        let exhausted = headers.remaining.as_deref().map(str::trim) == Some("0");
        if status == 429 || exhausted {
            let until_reset = headers
                .reset
                .as_deref()
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(|reset| Duration::from_secs((reset - now.timestamp()).max(0) as u64));

            return FetchError::RateLimited {
                retry_after: retry_after_header
                    .or(until_reset)
                    .unwrap_or(Duration::ZERO),
            };
        }
    }

    FetchError::Api { status, message }
}

/// Authenticated GitHub session built from [`AppConfig`].
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        // Throttling is handled by `throttle::fetch_page`; octocrab must not resend.
        let mut builder = Octocrab::builder().add_retry_config(RetryConfig::None);
        if let Some(token) = &config.github_token {
            builder = builder.personal_token(token.clone());
        }

        Ok(Self {
            octocrab: builder.build()?,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PageSource for GitHubClient {
    async fn fetch_page(
        &self,
        repo: &RepoId,
        endpoint: Endpoint,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}{}",
            self.api_url,
            endpoint.path_and_query(repo, page, per_page)
        );
        tracing::debug!(%url, "GET");

        let response = self.octocrab._get(url).await?;
        let status = response.status().as_u16();
        let headers = {
            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            };
            RateLimitHeaders {
                retry_after: header("retry-after"),
                remaining: header("x-ratelimit-remaining"),
                reset: header("x-ratelimit-reset"),
            }
        };

        let body = self.octocrab.body_to_string(response).await?;

        if (200..300).contains(&status) {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(classify_failure(status, &headers, &body, Utc::now()))
        }
    }
}

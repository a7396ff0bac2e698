//! Application configuration and environment variable parsing.
//!
//! Settings are read from the environment (optionally seeded from a `.env` file).
//! Every field has a default, so running with an empty environment collects the last
//! thirty days of pull requests for `sourcegraph/sourcegraph` into `results.json`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "sourcegraph").
    pub owner: String,
    /// The name of the repository (e.g., "sourcegraph").
    pub repo: String,
}

impl RepoId {
    /// Parses an `owner/repo` pair, stripping whitespace and `..` segments.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 2 {
            return None;
        }

        let owner = parts[0].trim().replace("..", "");
        let repo = parts[1].trim().replace("..", "");
        if owner.is_empty() || repo.is_empty() {
            return None;
        }

        Some(Self { owner, repo })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings shared by every subcommand.
///
/// Loaded separately from [`AppConfig`] so analyzing a snapshot does not depend on
/// collector-only variables such as `GITHUB_REPO`.
#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl OutputConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repository to collect pull requests from.
    /// Expected format: "owner/repo".
    #[serde(
        default = "default_github_repo",
        deserialize_with = "deserialize_repo_id"
    )]
    pub github_repo: RepoId,

    /// Number of trailing calendar days of pull requests to keep.
    #[serde(default = "default_pr_fetch_days")]
    pub pr_fetch_days: i64,

    /// Where the collector writes the snapshot and the analyzer reads it.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Additional attempts made after a primary rate-limit response.
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    /// Optional hard limit on the number of pull request list pages to request.
    pub max_github_api_pages: Option<u32>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional GitHub Personal Access Token for higher rate limits.
    pub github_token: Option<String>,
}

fn default_github_repo() -> RepoId {
    RepoId {
        owner: "sourcegraph".to_string(),
        repo: "sourcegraph".to_string(),
    }
}

fn default_pr_fetch_days() -> i64 {
    30
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_rate_limit_retries() -> u32 {
    2
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            github_repo: default_github_repo(),
            pr_fetch_days: default_pr_fetch_days(),
            snapshot_path: default_snapshot_path(),
            github_api_url: default_github_api_url(),
            rate_limit_retries: default_rate_limit_retries(),
            max_github_api_pages: None,
            log_format: LogFormat::default(),
            github_token: None,
        }
    }
}

fn deserialize_repo_id<'de, D>(deserializer: D) -> Result<RepoId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    RepoId::parse(&s).ok_or_else(|| {
        serde::de::Error::custom(format!("expected \"owner/repo\", got \"{}\"", s))
    })
}

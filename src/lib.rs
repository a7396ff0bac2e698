pub mod collector;
pub mod config;
pub mod github;
pub mod metrics;
pub mod snapshot;
pub mod throttle;

use anyhow::Context;
use chrono::Utc;
use collector::{Collector, RecencyWindow};
use config::AppConfig;
use github::{GitHubClient, PageSource};
use metrics::MergeSummary;
use std::path::Path;
use throttle::ThrottlePolicy;

/// Outcome of a successful collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Pull requests written to the snapshot.
    pub pull_requests: usize,
    /// Pull requests whose enrichment was cut short by a secondary rate limit.
    pub incomplete: usize,
}

/// Collects pull requests with a client built from `config` and writes the snapshot.
pub async fn run_collect(config: &AppConfig) -> anyhow::Result<CollectReport> {
    let client = GitHubClient::new(config).context("Failed to build GitHub client")?;
    collect_into_snapshot(&client, config).await
}

/// Collects pull requests from `source` and writes them to the configured snapshot.
///
/// Nothing is written unless every fetch succeeded.
pub async fn collect_into_snapshot<S: PageSource + ?Sized>(
    source: &S,
    config: &AppConfig,
) -> anyhow::Result<CollectReport> {
    let collector = Collector::new(
        source,
        &config.github_repo,
        RecencyWindow::new(config.pr_fetch_days),
    )
    .with_policy(ThrottlePolicy {
        max_retries: config.rate_limit_retries,
    })
    .with_max_pages(config.max_github_api_pages);

    let prs = collector
        .collect(Utc::now())
        .await
        .with_context(|| format!("Failed to collect pull requests for {}", config.github_repo))?;

    snapshot::write(&config.snapshot_path, &prs)?;

    Ok(CollectReport {
        pull_requests: prs.len(),
        incomplete: prs.iter().filter(|pr| !pr.is_complete()).count(),
    })
}

/// Loads the snapshot at `snapshot_path` and summarizes it.
pub fn run_analyze(snapshot_path: &Path) -> anyhow::Result<MergeSummary> {
    let prs = snapshot::read(snapshot_path)?;

    let incomplete = prs.iter().filter(|pr| !pr.is_complete()).count();
    if incomplete > 0 {
        tracing::warn!(
            incomplete,
            "Snapshot contains partially enriched pull requests"
        );
    }

    Ok(MergeSummary::from_pull_requests(prs.iter().map(|pr| &pr.pull)))
}

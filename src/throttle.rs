//! Rate-limit handling around a [`PageSource`].
//!
//! Primary rate limits are retried a bounded number of times after the delay GitHub
//! suggests. Secondary (abuse) limits are never retried: the request is abandoned and
//! the caller decides what a missing page means.

use crate::config::RepoId;
use crate::github::{Endpoint, FetchError, PageSource};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Additional attempts after the first rate-limited response.
    pub max_retries: u32,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// Result of a throttled page request.
#[derive(Debug)]
pub enum PageOutcome {
    Fetched(Vec<Value>),
    /// The request hit a secondary rate limit and was dropped.
    Abandoned,
}

/// Fetches one page, applying `policy` to rate-limit responses.
///
/// Errors other than rate limits are returned immediately, as is the rate-limit error
/// that follows the last permitted retry.
pub async fn fetch_page<S: PageSource + ?Sized>(
    source: &S,
    policy: ThrottlePolicy,
    repo: &RepoId,
    endpoint: Endpoint,
    page: u32,
    per_page: u8,
) -> Result<PageOutcome, FetchError> {
    let mut retries = 0;

    loop {
        match source.fetch_page(repo, endpoint, page, per_page).await {
            Ok(items) => return Ok(PageOutcome::Fetched(items)),
            Err(FetchError::RateLimited { retry_after }) if retries < policy.max_retries => {
                retries += 1;
                tracing::warn!(
                    ?endpoint,
                    page,
                    retry = retries,
                    retry_after_secs = retry_after.as_secs(),
                    "Request quota exhausted, retrying after {} seconds",
                    retry_after.as_secs()
                );
                tokio::time::sleep(retry_after).await;
            }
            Err(FetchError::SecondaryRateLimit { retry_after }) => {
                tracing::warn!(
                    ?endpoint,
                    page,
                    retry_after_secs = retry_after.as_secs(),
                    "Secondary rate limit detected, abandoning request"
                );
                return Ok(PageOutcome::Abandoned);
            }
            Err(e) => return Err(e),
        }
    }
}

//! Collection of recent pull requests and their review activity.
//!
//! The collector walks the pull request list newest first and stops at the first page
//! that reaches past the recency window. Each retained pull request is then enriched
//! with its issue comments, reviews and review comments, one sub-resource after another.

use crate::config::RepoId;
use crate::github::{
    Endpoint, FetchError, IssueComment, PageSource, PullRequest, Review, ReviewComment, PER_PAGE,
};
use crate::throttle::{self, PageOutcome, ThrottlePolicy};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Trailing number of calendar days within which pull requests are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    pub days: i64,
}

impl RecencyWindow {
    pub fn new(days: i64) -> Self {
        Self { days }
    }

    /// Calendar days (UTC) between creation and `now` are at most `days`.
    pub fn contains(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now.date_naive() - created_at.date_naive()).num_days() <= self.days
    }
}

/// A sub-resource collected during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    Comments,
    Reviews,
    ReviewComments,
}

/// A pull request together with its review activity.
///
/// The sub-resource fields stay `None` until [`Collector::enrich`] fills them. A
/// sub-resource listed in `incomplete` was cut short by a secondary rate limit and
/// holds only the pages fetched before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPullRequest {
    #[serde(flatten)]
    pub pull: PullRequest,

    #[serde(rename = "_comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<IssueComment>>,

    #[serde(rename = "_reviews", default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,

    #[serde(
        rename = "_reviewComments",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub review_comments: Option<Vec<ReviewComment>>,

    #[serde(rename = "_incomplete", default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete: Vec<SubResource>,
}

impl EnrichedPullRequest {
    pub fn new(pull: PullRequest) -> Self {
        Self {
            pull,
            comments: None,
            reviews: None,
            review_comments: None,
            incomplete: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }
}

/// Items of a paginated collection, and whether every page was retrieved.
#[derive(Debug)]
struct Collected<T> {
    items: Vec<T>,
    complete: bool,
}

/// Walks the GitHub API for one repository.
pub struct Collector<'a, S: PageSource + ?Sized> {
    source: &'a S,
    repo: &'a RepoId,
    window: RecencyWindow,
    policy: ThrottlePolicy,
    max_pages: Option<u32>,
}

impl<'a, S: PageSource + ?Sized> Collector<'a, S> {
    pub fn new(source: &'a S, repo: &'a RepoId, window: RecencyWindow) -> Self {
        Self {
            source,
            repo,
            window,
            policy: ThrottlePolicy::default(),
            max_pages: None,
        }
    }

    pub fn with_policy(mut self, policy: ThrottlePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Caps the number of pull request list pages requested.
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Lists and enriches every pull request created inside the window.
    pub async fn collect(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EnrichedPullRequest>, FetchError> {
        let prs = self.list_recent_pull_requests(now).await?;
        self.enrich(prs).await
    }

    /// Lists pull requests created inside the window, newest first.
    pub async fn list_recent_pull_requests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PullRequest>, FetchError> {
        tracing::info!(repo = %self.repo, days = self.window.days, "Getting PRs...");

        let mut prs = Vec::new();
        let mut page_num = 1;

        loop {
            if self.max_pages.is_some_and(|max| page_num > max) {
                tracing::warn!(
                    "Hit max_github_api_pages ({}) for repo {} before reaching cutoff date. Data may be incomplete.",
                    page_num - 1,
                    self.repo
                );
                break;
            }

            let page: Vec<PullRequest> = match self.fetch_page(Endpoint::Pulls, page_num).await? {
                Some(page) => page,
                None => {
                    tracing::warn!(repo = %self.repo, page = page_num, "Pull request listing cut short");
                    break;
                }
            };
            tracing::debug!(page = page_num, count = page.len(), "Fetched pull request page");

            let Some(oldest) = page.last() else {
                break;
            };

            let is_last_page = page.len() < PER_PAGE as usize;

            if self.window.contains(oldest.created_at, now) {
                prs.extend(page);
            } else {
                prs.extend(
                    page.into_iter()
                        .filter(|pr| self.window.contains(pr.created_at, now)),
                );
                break;
            }

            if is_last_page {
                break;
            }
            page_num += 1;
        }

        tracing::info!(repo = %self.repo, count = prs.len(), "Collected pull requests");
        Ok(prs)
    }

    /// Attaches comments, reviews and review comments to each pull request.
    ///
    /// All three sub-resources of a pull request are fetched before moving to the next.
    pub async fn enrich(
        &self,
        prs: Vec<PullRequest>,
    ) -> Result<Vec<EnrichedPullRequest>, FetchError> {
        tracing::info!(count = prs.len(), "Getting comments, reviews and review comments...");

        let mut enriched = Vec::with_capacity(prs.len());
        for pr in prs {
            let number = pr.number;
            let mut item = EnrichedPullRequest::new(pr);

            let comments = self
                .fetch_all::<IssueComment>(Endpoint::IssueComments(number))
                .await?;
            if !comments.complete {
                item.incomplete.push(SubResource::Comments);
            }
            item.comments = Some(comments.items);

            let reviews = self.fetch_all::<Review>(Endpoint::Reviews(number)).await?;
            if !reviews.complete {
                item.incomplete.push(SubResource::Reviews);
            }
            item.reviews = Some(reviews.items);

            let review_comments = self
                .fetch_all::<ReviewComment>(Endpoint::ReviewComments(number))
                .await?;
            if !review_comments.complete {
                item.incomplete.push(SubResource::ReviewComments);
            }
            item.review_comments = Some(review_comments.items);

            if !item.is_complete() {
                tracing::warn!(number, incomplete = ?item.incomplete, "Pull request partially enriched");
            }
            tracing::debug!(number, "Enriched pull request");
            enriched.push(item);
        }

        Ok(enriched)
    }

    /// Fetches every page of a sub-resource.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
    ) -> Result<Collected<T>, FetchError> {
        let mut items = Vec::new();
        let mut page_num = 1;

        loop {
            let Some(page) = self.fetch_page::<T>(endpoint, page_num).await? else {
                return Ok(Collected {
                    items,
                    complete: false,
                });
            };

            let is_last_page = page.len() < PER_PAGE as usize;
            items.extend(page);

            if is_last_page {
                return Ok(Collected {
                    items,
                    complete: true,
                });
            }
            page_num += 1;
        }
    }

    /// Fetches and decodes one page; `None` when the request was abandoned.
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        page: u32,
    ) -> Result<Option<Vec<T>>, FetchError> {
        match throttle::fetch_page(self.source, self.policy, self.repo, endpoint, page, PER_PAGE)
            .await?
        {
            PageOutcome::Fetched(raw) => {
                let items = raw
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<T>, _>>()?;
                Ok(Some(items))
            }
            PageOutcome::Abandoned => Ok(None),
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use prstats::collector::{Collector, RecencyWindow, SubResource};
use prstats::config::{AppConfig, RepoId};
use prstats::github::{Endpoint, FetchError, PageSource};
use prstats::{collect_into_snapshot, run_analyze, snapshot};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// In-memory GitHub serving scripted pages and recording every request.
#[derive(Default)]
struct FakeGitHub {
    pages: HashMap<Endpoint, Vec<Vec<Value>>>,
    failures: Mutex<HashMap<(Endpoint, u32), VecDeque<FetchError>>>,
    requests: Mutex<Vec<(Endpoint, u32)>>,
}

impl FakeGitHub {
    fn with_pages(mut self, endpoint: Endpoint, pages: Vec<Vec<Value>>) -> Self {
        self.pages.insert(endpoint, pages);
        self
    }

    fn failing(self, endpoint: Endpoint, page: u32, error: FetchError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry((endpoint, page))
            .or_default()
            .push_back(error);
        self
    }

    fn requested(&self, endpoint: Endpoint) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, page)| *page)
            .collect()
    }
}

#[async_trait]
impl PageSource for FakeGitHub {
    async fn fetch_page(
        &self,
        _repo: &RepoId,
        endpoint: Endpoint,
        page: u32,
        _per_page: u8,
    ) -> Result<Vec<Value>, FetchError> {
        self.requests.lock().unwrap().push((endpoint, page));

        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&(endpoint, page))
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        Ok(self
            .pages
            .get(&endpoint)
            .and_then(|pages| pages.get(page as usize - 1))
            .cloned()
            .unwrap_or_default())
    }
}

fn pull(number: u64, days_ago: i64) -> Value {
    let created_at = Utc::now() - Duration::days(days_ago);
    json!({
        "number": number,
        "state": "closed",
        "title": format!("PR #{number}"),
        "created_at": created_at.to_rfc3339(),
        "merged_at": (created_at + Duration::days(2)).to_rfc3339(),
        "user": {"login": "alice", "type": "User"}
    })
}

fn pull_at(number: u64, created_at: DateTime<Utc>) -> Value {
    json!({
        "number": number,
        "state": "open",
        "created_at": created_at.to_rfc3339(),
        "merged_at": null,
        "user": {"login": "alice", "type": "User"}
    })
}

fn comment(id: u64) -> Value {
    json!({
        "id": id,
        "user": {"login": "bob", "type": "User"},
        "created_at": Utc::now().to_rfc3339(),
        "body": "looks good"
    })
}

fn config(snapshot_path: &Path) -> AppConfig {
    AppConfig {
        pr_fetch_days: 30,
        snapshot_path: snapshot_path.to_path_buf(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_stops_at_first_page_reaching_past_window() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let page1: Vec<Value> = (0..100).map(|i| pull(1000 - i, i as i64 / 10)).collect();
    let page2: Vec<Value> = (0..100)
        .map(|i| pull(900 - i, if i < 50 { 20 } else { 40 }))
        .collect();
    let page3: Vec<Value> = (0..100).map(|i| pull(800 - i, 50)).collect();

    let github = FakeGitHub::default().with_pages(Endpoint::Pulls, vec![page1, page2, page3]);

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.pull_requests, 150);
    assert_eq!(report.incomplete, 0);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1, 2]);

    let prs = snapshot::read(&config.snapshot_path).unwrap();
    assert_eq!(prs.len(), 150);
    assert_eq!(prs.first().unwrap().pull.number, 1000);
    assert_eq!(prs.last().unwrap().pull.number, 851);
    assert!(prs
        .iter()
        .all(|pr| (Utc::now() - pr.pull.created_at) < Duration::days(31)));
}

#[tokio::test]
async fn test_short_page_ends_listing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(2, 1), pull(1, 3)]]);

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.pull_requests, 2);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1]);
}

#[tokio::test]
async fn test_page_cap_stops_listing() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        max_github_api_pages: Some(1),
        ..config(&dir.path().join("results.json"))
    };

    let page1: Vec<Value> = (0..100).map(|i| pull(500 - i, 1)).collect();
    let page2: Vec<Value> = (0..100).map(|i| pull(400 - i, 2)).collect();
    let github = FakeGitHub::default().with_pages(Endpoint::Pulls, vec![page1, page2]);

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.pull_requests, 100);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1]);
}

#[tokio::test]
async fn test_enriches_every_pull_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(7, 1), pull(6, 2)]])
        .with_pages(
            Endpoint::IssueComments(7),
            vec![(0..100).map(comment).collect(), (100..105).map(comment).collect()],
        )
        .with_pages(
            Endpoint::Reviews(6),
            vec![vec![json!({
                "id": 1,
                "user": {"login": "carol", "type": "User"},
                "state": "APPROVED",
                "submitted_at": Utc::now().to_rfc3339()
            })]],
        );

    collect_into_snapshot(&github, &config).await.unwrap();

    let prs = snapshot::read(&config.snapshot_path).unwrap();
    assert_eq!(prs.len(), 2);

    let pr7 = &prs[0];
    assert_eq!(pr7.pull.number, 7);
    assert_eq!(pr7.comments.as_ref().unwrap().len(), 105);
    assert_eq!(pr7.reviews.as_ref().unwrap().len(), 0);
    assert_eq!(pr7.review_comments.as_ref().unwrap().len(), 0);
    assert_eq!(github.requested(Endpoint::IssueComments(7)), vec![1, 2]);

    let pr6 = &prs[1];
    assert_eq!(pr6.reviews.as_ref().unwrap()[0].state, "APPROVED");
    assert!(pr6.is_complete());
}

#[tokio::test]
async fn test_secondary_limit_marks_sub_resource_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(3, 1)]])
        .failing(
            Endpoint::Reviews(3),
            1,
            FetchError::SecondaryRateLimit {
                retry_after: std::time::Duration::from_secs(60),
            },
        );

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.incomplete, 1);
    assert_eq!(github.requested(Endpoint::Reviews(3)), vec![1]);
    // Later sub-resources are still collected.
    assert_eq!(github.requested(Endpoint::ReviewComments(3)), vec![1]);

    let prs = snapshot::read(&config.snapshot_path).unwrap();
    assert_eq!(prs[0].incomplete, vec![SubResource::Reviews]);
    assert_eq!(prs[0].reviews.as_ref().unwrap().len(), 0);
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(1, 1)]])
        .failing(
            Endpoint::Pulls,
            1,
            FetchError::RateLimited {
                retry_after: std::time::Duration::ZERO,
            },
        );

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.pull_requests, 1);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1, 1]);
}

#[tokio::test]
async fn test_fatal_error_writes_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(2, 1), pull(1, 2)]])
        .failing(
            Endpoint::ReviewComments(1),
            1,
            FetchError::Api {
                status: 502,
                message: "Bad Gateway".to_string(),
            },
        );

    let result = collect_into_snapshot(&github, &config).await;

    assert!(result.is_err());
    assert!(!config.snapshot_path.exists());
}

#[tokio::test]
async fn test_collected_snapshot_can_be_analyzed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![vec![pull(2, 3), pull(1, 5)]]);

    collect_into_snapshot(&github, &config).await.unwrap();
    let summary = run_analyze(&config.snapshot_path).unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.merged, 2);
    assert_eq!(summary.merged_human, 2);
    assert_eq!(summary.merged_bot, 0);
    assert_eq!(summary.avg_days_to_merge_human, 2.0);
    assert!(summary.avg_days_to_merge_bot.is_nan());
}

#[tokio::test]
async fn test_secondary_limit_on_listing_keeps_earlier_pages() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("results.json"));

    let page1: Vec<Value> = (0..100).map(|i| pull(300 - i, 1)).collect();
    let page2: Vec<Value> = (0..100).map(|i| pull(200 - i, 2)).collect();
    let page3: Vec<Value> = (0..100).map(|i| pull(100 - i, 3)).collect();

    let github = FakeGitHub::default()
        .with_pages(Endpoint::Pulls, vec![page1, page2, page3])
        .failing(
            Endpoint::Pulls,
            2,
            FetchError::SecondaryRateLimit {
                retry_after: std::time::Duration::from_secs(60),
            },
        );

    let report = collect_into_snapshot(&github, &config).await.unwrap();

    assert_eq!(report.pull_requests, 100);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1, 2]);

    let prs = snapshot::read(&config.snapshot_path).unwrap();
    assert_eq!(prs.len(), 100);
    assert_eq!(prs[0].pull.number, 300);
    assert_eq!(prs[99].pull.number, 201);
}

/// Lists against a fixed clock with a `days` window.
///
/// Page 1 is fully inside the window, page 2 straddles the boundary (50 items on the
/// last included calendar day, 50 on the first excluded one) and page 3 is outside.
async fn assert_window_boundary(days: i64) {
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 30, 0).unwrap();
    let midnight = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
    // Earliest and latest instants of the calendar day `d` days before today.
    let day_start = |d: i64| midnight - Duration::days(d);
    let day_end = |d: i64| midnight - Duration::days(d - 1) - Duration::minutes(1);

    let page1: Vec<Value> = (0..100).map(|i| pull_at(1000 - i, now)).collect();
    let page2: Vec<Value> = (0..100)
        .map(|i| {
            if i < 50 {
                pull_at(900 - i, day_start(days))
            } else {
                pull_at(900 - i, day_end(days + 1))
            }
        })
        .collect();
    let page3: Vec<Value> = (0..100)
        .map(|i| pull_at(800 - i, day_start(days + 5)))
        .collect();

    let github = FakeGitHub::default().with_pages(Endpoint::Pulls, vec![page1, page2, page3]);
    let repo = RepoId {
        owner: "o".to_string(),
        repo: "r".to_string(),
    };
    let collector = Collector::new(&github, &repo, RecencyWindow::new(days));

    let prs = collector.list_recent_pull_requests(now).await.unwrap();

    assert_eq!(prs.len(), 150, "window of {days} days");
    assert_eq!(prs.last().unwrap().number, 851);
    assert_eq!(github.requested(Endpoint::Pulls), vec![1, 2]);
    assert!(prs
        .iter()
        .all(|pr| (now.date_naive() - pr.created_at.date_naive()).num_days() <= days));
}

#[tokio::test]
async fn test_same_day_window() {
    assert_window_boundary(0).await;
}

#[tokio::test]
async fn test_one_day_window() {
    assert_window_boundary(1).await;
}

#[tokio::test]
async fn test_one_week_window() {
    assert_window_boundary(7).await;
}

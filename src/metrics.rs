use crate::github::{AuthorClass, PullRequest};
use serde::Serialize;
use std::fmt;

/// Merge statistics over a set of pull requests.
///
/// Averages are `NaN` when their group is empty.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MergeSummary {
    /// Number of pull requests analyzed.
    pub total: usize,
    /// Pull requests that are closed and carry a merge timestamp.
    pub merged: usize,
    pub merged_human: usize,
    pub merged_bot: usize,
    /// Mean calendar days from creation to merge over all merged pull requests.
    pub avg_days_to_merge: f64,
    pub avg_days_to_merge_human: f64,
    pub avg_days_to_merge_bot: f64,
}

/// Running sum of days-to-merge for one group.
#[derive(Default)]
struct MergeTally {
    count: usize,
    days: i64,
}

impl MergeTally {
    fn add(&mut self, days: i64) {
        self.count += 1;
        self.days += days;
    }

    fn mean(&self) -> f64 {
        self.days as f64 / self.count as f64
    }
}

/// Calendar days (UTC) between creation and merge, if merged.
pub fn days_to_merge(pr: &PullRequest) -> Option<i64> {
    pr.merged_at
        .map(|merged_at| (merged_at.date_naive() - pr.created_at.date_naive()).num_days())
}

impl MergeSummary {
    pub fn from_pull_requests<'a, I>(prs: I) -> Self
    where
        I: IntoIterator<Item = &'a PullRequest>,
    {
        let mut total = 0;
        let mut all = MergeTally::default();
        let mut human = MergeTally::default();
        let mut bot = MergeTally::default();

        for pr in prs {
            total += 1;

            if !pr.is_merged() {
                continue;
            }
            let Some(days) = days_to_merge(pr) else {
                continue;
            };

            all.add(days);
            match pr.author_class() {
                AuthorClass::Human => human.add(days),
                AuthorClass::Bot => bot.add(days),
                AuthorClass::Other => {}
            }
        }

        Self {
            total,
            merged: all.count,
            merged_human: human.count,
            merged_bot: bot.count,
            avg_days_to_merge: all.mean(),
            avg_days_to_merge_human: human.mean(),
            avg_days_to_merge_bot: bot.mean(),
        }
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total PRs: {}", self.total)?;
        writeln!(
            f,
            "All Successful PRs: {} ({} human, {} bot)",
            self.merged, self.merged_human, self.merged_bot
        )?;
        write!(
            f,
            "Average time to merge: {:.2} days ({:.2} human, {:.2} bot)",
            self.avg_days_to_merge, self.avg_days_to_merge_human, self.avg_days_to_merge_bot
        )
    }
}

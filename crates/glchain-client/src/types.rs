//! GitLab API data transfer objects
//!
//! These types mirror the JSON returned by the GitLab REST API (v4).
//! Unknown fields are ignored; optional fields that GitLab omits on some
//! endpoints are `Option`s or default to empty values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A commit from the repository API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Full SHA
    pub id: String,

    /// Abbreviated SHA
    #[serde(default)]
    pub short_id: String,

    /// First line of the commit message
    #[serde(default)]
    pub title: String,

    /// Full commit message
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub author_name: String,

    #[serde(default)]
    pub author_email: String,

    pub authored_date: Option<DateTime<Utc>>,

    pub committed_date: Option<DateTime<Utc>>,

    /// Commit URL for opening in browser
    #[serde(default)]
    pub web_url: String,

    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl Commit {
    /// The commit SHA (identity of a commit)
    pub fn sha(&self) -> &str {
        &self.id
    }
}

/// A user reference embedded in merge requests and issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

/// A merge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Instance-wide identifier
    pub id: u64,

    /// Project-scoped identifier (`!123`)
    pub iid: u64,

    pub project_id: u64,

    pub title: String,

    pub description: Option<String>,

    /// `opened`, `closed`, `merged` or `locked`
    pub state: String,

    pub author: Option<User>,

    #[serde(default)]
    pub source_branch: String,

    #[serde(default)]
    pub target_branch: String,

    /// HEAD commit of the source branch
    pub sha: Option<String>,

    pub merge_commit_sha: Option<String>,

    pub squash_commit_sha: Option<String>,

    #[serde(default)]
    pub web_url: String,

    pub created_at: Option<DateTime<Utc>>,

    pub merged_at: Option<DateTime<Utc>>,
}

/// Partial epic reference attached to a full issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicRef {
    pub id: u64,
    pub iid: u64,
    pub group_id: u64,
    pub title: Option<String>,
    /// Relative URL, e.g. `/groups/acme/-/epics/3`
    pub url: Option<String>,
}

/// An issue
///
/// The `closes_issues` endpoint returns issues without the `epic` field;
/// only `GET /projects/:id/issues/:iid` includes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Instance-wide identifier
    pub id: u64,

    /// Project-scoped identifier (`#42`)
    pub iid: u64,

    pub project_id: u64,

    pub title: String,

    pub description: Option<String>,

    /// `opened` or `closed`
    pub state: String,

    #[serde(default)]
    pub labels: Vec<String>,

    pub author: Option<User>,

    #[serde(default)]
    pub web_url: String,

    pub created_at: Option<DateTime<Utc>>,

    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub epic: Option<EpicRef>,

    #[serde(default)]
    pub epic_iid: Option<u64>,
}

/// An epic (group-level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    /// Instance-wide identifier
    pub id: u64,

    /// Group-scoped identifier (`&3`)
    pub iid: u64,

    pub group_id: u64,

    pub title: String,

    pub description: Option<String>,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub web_url: String,

    #[serde(default)]
    pub labels: Vec<String>,

    pub start_date: Option<NaiveDate>,

    pub due_date: Option<NaiveDate>,

    /// Set when the epic could not be fetched and was built from an `EpicRef`
    #[serde(default)]
    pub is_stub: bool,
}

impl Epic {
    /// Build a placeholder epic from the partial reference found on an issue
    pub fn stub(reference: &EpicRef) -> Self {
        Self {
            id: reference.id,
            iid: reference.iid,
            group_id: reference.group_id,
            title: reference
                .title
                .clone()
                .unwrap_or_else(|| format!("Epic &{}", reference.iid)),
            description: None,
            state: "unknown".to_string(),
            web_url: reference.url.clone().unwrap_or_default(),
            labels: Vec::new(),
            start_date: None,
            due_date: None,
            is_stub: true,
        }
    }
}

/// Pagination metadata read from `X-*` response headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
    pub total: Option<u32>,
    pub total_pages: Option<u32>,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.next_page.is_some()
    }
}

/// One page of a list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Rate-limit window read from `RateLimit-*` response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub observed: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    /// How long to hold off before the next request
    ///
    /// Only returns a wait when the remaining quota dropped below
    /// `low_water` and the reset time is still ahead of `now`.
    pub fn wait_before_next(&self, low_water: u32, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining >= low_water {
            return None;
        }
        let reset_at = self.reset_at?;
        (reset_at - now).to_std().ok().filter(|wait| !wait.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_commit_deserialize() {
        let json = r#"{
            "id": "ed899a2f4b50b4370feeea94676502b42383c746",
            "short_id": "ed899a2f4b5",
            "title": "Replace sanitize with escape once",
            "author_name": "Example User",
            "author_email": "user@example.com",
            "authored_date": "2021-09-20T11:50:22.001+03:00",
            "committed_date": "2021-09-20T11:50:22.001+03:00",
            "message": "Replace sanitize with escape once",
            "parent_ids": ["6104942438c14ec7bd21c6cd5bd995272b3faff6"],
            "web_url": "https://gitlab.example.com/janedoe/gitlab-foss/-/commit/ed899a2f4b50b4370feeea94676502b42383c746"
        }"#;
        let commit: Commit = serde_json::from_str(json).unwrap();
        assert_eq!(commit.sha(), "ed899a2f4b50b4370feeea94676502b42383c746");
        assert_eq!(
            commit.authored_date,
            Some(Utc.with_ymd_and_hms(2021, 9, 20, 8, 50, 22).unwrap()
                + chrono::Duration::milliseconds(1))
        );
        assert_eq!(commit.parent_ids.len(), 1);
    }

    #[test]
    fn test_full_issue_carries_epic_reference() {
        let json = r#"{
            "id": 76, "iid": 6, "project_id": 8, "title": "Consequatur vero",
            "description": null, "state": "closed", "labels": ["bug"],
            "web_url": "https://gitlab.example.com/g/p/-/issues/6",
            "epic_iid": 5,
            "epic": {"id": 42, "iid": 5, "title": "My epic", "url": "/groups/g/-/epics/5", "group_id": 8}
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        let epic = issue.epic.expect("epic reference");
        assert_eq!(epic.id, 42);
        assert_eq!(epic.group_id, 8);
        assert_eq!(issue.epic_iid, Some(5));
    }

    #[test]
    fn test_partial_issue_has_no_epic() {
        let json = r#"{"id": 1, "iid": 2, "project_id": 3, "title": "t", "state": "opened"}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.epic.is_none());
        assert!(issue.labels.is_empty());
    }

    #[test]
    fn test_epic_stub() {
        let reference = EpicRef {
            id: 10,
            iid: 3,
            group_id: 4,
            title: None,
            url: Some("/groups/acme/-/epics/3".to_string()),
        };
        let epic = Epic::stub(&reference);
        assert!(epic.is_stub);
        assert_eq!(epic.title, "Epic &3");
        assert_eq!(epic.state, "unknown");
        assert_eq!(epic.web_url, "/groups/acme/-/epics/3");
    }

    #[test]
    fn test_rate_limit_wait() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = RateLimitInfo {
            limit: Some(600),
            remaining: 3,
            observed: Some(597),
            reset_at: Some(now + chrono::Duration::seconds(30)),
        };

        assert_eq!(
            info.wait_before_next(10, now),
            Some(Duration::from_secs(30))
        );
        // Enough quota left
        assert_eq!(info.wait_before_next(3, now), None);
        // Reset already passed
        assert_eq!(
            info.wait_before_next(10, now + chrono::Duration::seconds(31)),
            None
        );
    }
}

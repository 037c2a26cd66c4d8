//! Direct GitLab API client
//!
//! Implements `GitLabClient` on top of [`RestClient`]. No caching happens
//! here; wrap it in `CachedGitLabClient` for that.

use crate::client::GitLabClient;
use crate::error::Result;
use crate::rest::{encode_project_id, RestClient};
use crate::types::{Commit, Epic, Issue, MergeRequest, Page};
use async_trait::async_trait;
use log::debug;

/// Upper bound of pages fetched when listing a group's epics
const MAX_EPIC_PAGES: u32 = 10;

/// Page size for list endpoints that we page through completely
const LIST_PER_PAGE: u32 = 100;

/// Direct GitLab API client
#[derive(Debug, Clone)]
pub struct GitLabApiClient {
    rest: RestClient,
}

impl GitLabApiClient {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Access the transport (request counter, rate-limit window)
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }
}

fn project_path(project: &str, rest: &str) -> String {
    format!("/projects/{}{}", encode_project_id(project), rest)
}

fn group_path(group: &str, rest: &str) -> String {
    format!("/groups/{}{}", encode_project_id(group), rest)
}

fn per_page_params() -> Vec<(&'static str, String)> {
    vec![("per_page", LIST_PER_PAGE.to_string())]
}

#[async_trait]
impl GitLabClient for GitLabApiClient {
    async fn fetch_commit(&self, project: &str, sha: &str) -> Result<Commit> {
        debug!("Fetching commit {} in {}", sha, project);
        let path = project_path(project, &format!("/repository/commits/{}", sha));
        self.rest.fetch_one(&path, &[]).await
    }

    async fn list_commits(
        &self,
        project: &str,
        branch: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Commit>> {
        debug!(
            "Listing commits for {} on {} (page {}, per_page {})",
            project,
            branch.unwrap_or("<default>"),
            page,
            per_page
        );
        let path = project_path(project, "/repository/commits");
        let mut params = vec![("page", page.to_string()), ("per_page", per_page.to_string())];
        if let Some(branch) = branch {
            params.push(("ref_name", branch.to_string()));
        }
        self.rest.fetch_page(&path, &params).await
    }

    async fn fetch_commit_merge_requests(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Vec<MergeRequest>> {
        debug!("Fetching merge requests for commit {} in {}", sha, project);
        let path = project_path(
            project,
            &format!("/repository/commits/{}/merge_requests", sha),
        );
        self.rest.fetch_one(&path, &per_page_params()).await
    }

    async fn fetch_closes_issues(&self, project: &str, mr_iid: u64) -> Result<Vec<Issue>> {
        debug!("Fetching issues closed by !{} in {}", mr_iid, project);
        let path = project_path(project, &format!("/merge_requests/{}/closes_issues", mr_iid));
        self.rest.fetch_one(&path, &per_page_params()).await
    }

    async fn fetch_related_merge_requests(
        &self,
        project: &str,
        issue_iid: u64,
    ) -> Result<Vec<MergeRequest>> {
        debug!(
            "Fetching merge requests related to #{} in {}",
            issue_iid, project
        );
        let path = project_path(
            project,
            &format!("/issues/{}/related_merge_requests", issue_iid),
        );
        self.rest.fetch_one(&path, &per_page_params()).await
    }

    async fn fetch_issue(&self, project: &str, issue_iid: u64) -> Result<Issue> {
        debug!("Fetching issue #{} in {}", issue_iid, project);
        let path = project_path(project, &format!("/issues/{}", issue_iid));
        self.rest.fetch_one(&path, &[]).await
    }

    async fn fetch_epic(&self, group: &str, epic_iid: u64) -> Result<Epic> {
        debug!("Fetching epic &{} in group {}", epic_iid, group);
        let path = group_path(group, &format!("/epics/{}", epic_iid));
        self.rest.fetch_one(&path, &[]).await
    }

    async fn list_epics(&self, group: &str) -> Result<Vec<Epic>> {
        debug!("Listing epics of group {}", group);
        let path = group_path(group, "/epics");
        self.rest
            .fetch_all(&path, &per_page_params(), MAX_EPIC_PAGES)
            .await
    }
}

//! In-memory GitLab used by the tracer tests

use async_trait::async_trait;
use glchain_client::{
    ApiError, Commit, Epic, EpicRef, GitLabClient, Issue, MergeRequest, Page, Pagination,
    Result,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub(crate) fn commit(sha: &str) -> Commit {
    Commit {
        id: sha.to_string(),
        short_id: sha.chars().take(8).collect(),
        title: format!("Commit {}", sha),
        message: format!("Commit {}\n", sha),
        author_name: "Jane Doe".to_string(),
        author_email: "jane@example.com".to_string(),
        authored_date: None,
        committed_date: None,
        web_url: format!("https://gitlab.example.com/acme/app/-/commit/{}", sha),
        parent_ids: Vec::new(),
    }
}

pub(crate) fn merge_request(id: u64, iid: u64) -> MergeRequest {
    MergeRequest {
        id,
        iid,
        project_id: 7,
        title: format!("MR !{}", iid),
        description: None,
        state: "merged".to_string(),
        author: None,
        source_branch: format!("feature-{}", iid),
        target_branch: "main".to_string(),
        sha: None,
        merge_commit_sha: None,
        squash_commit_sha: None,
        web_url: format!("https://gitlab.example.com/acme/app/-/merge_requests/{}", iid),
        created_at: None,
        merged_at: None,
    }
}

pub(crate) fn issue(id: u64, iid: u64) -> Issue {
    Issue {
        id,
        iid,
        project_id: 7,
        title: format!("Issue #{}", iid),
        description: None,
        state: "closed".to_string(),
        labels: Vec::new(),
        author: None,
        web_url: format!("https://gitlab.example.com/acme/app/-/issues/{}", iid),
        created_at: None,
        closed_at: None,
        epic: None,
        epic_iid: None,
    }
}

/// Full issue as returned by the single-issue endpoint, pointing at an epic
pub(crate) fn issue_in_epic(id: u64, iid: u64, epic: &Epic) -> Issue {
    Issue {
        epic: Some(EpicRef {
            id: epic.id,
            iid: epic.iid,
            group_id: epic.group_id,
            title: Some(epic.title.clone()),
            url: Some(epic.web_url.clone()),
        }),
        epic_iid: Some(epic.iid),
        ..issue(id, iid)
    }
}

pub(crate) fn epic(id: u64, iid: u64) -> Epic {
    Epic {
        id,
        iid,
        group_id: 9,
        title: format!("Epic &{}", iid),
        description: None,
        state: "opened".to_string(),
        web_url: format!("https://gitlab.example.com/groups/acme/-/epics/{}", iid),
        labels: Vec::new(),
        start_date: None,
        due_date: None,
        is_stub: false,
    }
}

fn not_found(path: String) -> ApiError {
    ApiError::Status {
        status: 404,
        path,
        body: None,
        attempts: 1,
    }
}

fn server_error(path: String) -> ApiError {
    ApiError::Status {
        status: 500,
        path,
        body: None,
        attempts: 4,
    }
}

/// Canned responses keyed by SHA or iid, with per-endpoint failure injection
#[derive(Debug, Default)]
pub(crate) struct FakeGitLab {
    commits: Vec<Commit>,
    commit_mrs: HashMap<String, Vec<MergeRequest>>,
    closes: HashMap<u64, Vec<Issue>>,
    related: HashMap<u64, Vec<MergeRequest>>,
    issues: HashMap<u64, Issue>,
    epics: HashMap<u64, Epic>,
    failing: HashSet<&'static str>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
}

impl FakeGitLab {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits are listed newest first in insertion order
    pub(crate) fn with_commit(mut self, commit: Commit) -> Self {
        self.commits.push(commit);
        self
    }

    pub(crate) fn with_commit_mrs(mut self, sha: &str, mrs: Vec<MergeRequest>) -> Self {
        self.commit_mrs.insert(sha.to_string(), mrs);
        self
    }

    pub(crate) fn with_closes(mut self, mr_iid: u64, issues: Vec<Issue>) -> Self {
        self.closes.insert(mr_iid, issues);
        self
    }

    pub(crate) fn with_related(mut self, issue_iid: u64, mrs: Vec<MergeRequest>) -> Self {
        self.related.insert(issue_iid, mrs);
        self
    }

    pub(crate) fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.insert(issue.iid, issue);
        self
    }

    pub(crate) fn with_epic(mut self, epic: Epic) -> Self {
        self.epics.insert(epic.iid, epic);
        self
    }

    /// Make every call to `endpoint` fail with HTTP 500
    pub(crate) fn failing(mut self, endpoint: &'static str) -> Self {
        self.failing.insert(endpoint);
        self
    }

    pub(crate) fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    fn hit(&self, endpoint: &'static str, path: String) -> Result<()> {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        if self.failing.contains(endpoint) {
            return Err(server_error(path));
        }
        Ok(())
    }
}

#[async_trait]
impl GitLabClient for FakeGitLab {
    async fn fetch_commit(&self, project: &str, sha: &str) -> Result<Commit> {
        let path = format!("/projects/{}/repository/commits/{}", project, sha);
        self.hit("fetch_commit", path.clone())?;
        self.commits
            .iter()
            .find(|c| c.id == sha)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn list_commits(
        &self,
        project: &str,
        _branch: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Commit>> {
        self.hit("list_commits", format!("/projects/{}/repository/commits", project))?;
        let items: Vec<Commit> = self.commits.iter().take(per_page as usize).cloned().collect();
        Ok(Page {
            pagination: Pagination {
                page: Some(page),
                per_page: Some(per_page),
                ..Pagination::default()
            },
            items,
        })
    }

    async fn fetch_commit_merge_requests(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Vec<MergeRequest>> {
        self.hit(
            "fetch_commit_merge_requests",
            format!("/projects/{}/repository/commits/{}/merge_requests", project, sha),
        )?;
        Ok(self.commit_mrs.get(sha).cloned().unwrap_or_default())
    }

    async fn fetch_closes_issues(&self, project: &str, mr_iid: u64) -> Result<Vec<Issue>> {
        self.hit(
            "fetch_closes_issues",
            format!("/projects/{}/merge_requests/{}/closes_issues", project, mr_iid),
        )?;
        Ok(self.closes.get(&mr_iid).cloned().unwrap_or_default())
    }

    async fn fetch_related_merge_requests(
        &self,
        project: &str,
        issue_iid: u64,
    ) -> Result<Vec<MergeRequest>> {
        self.hit(
            "fetch_related_merge_requests",
            format!("/projects/{}/issues/{}/related_merge_requests", project, issue_iid),
        )?;
        Ok(self.related.get(&issue_iid).cloned().unwrap_or_default())
    }

    async fn fetch_issue(&self, project: &str, issue_iid: u64) -> Result<Issue> {
        let path = format!("/projects/{}/issues/{}", project, issue_iid);
        self.hit("fetch_issue", path.clone())?;
        self.issues
            .get(&issue_iid)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn fetch_epic(&self, group: &str, epic_iid: u64) -> Result<Epic> {
        let path = format!("/groups/{}/epics/{}", group, epic_iid);
        self.hit("fetch_epic", path.clone())?;
        self.epics
            .get(&epic_iid)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn list_epics(&self, group: &str) -> Result<Vec<Epic>> {
        self.hit("list_epics", format!("/groups/{}/epics", group))?;
        Ok(self.epics.values().cloned().collect())
    }
}

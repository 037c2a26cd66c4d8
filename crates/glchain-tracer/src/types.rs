//! Chain aggregate types
//!
//! A [`CommitChain`] is owned by the trace that built it and is never
//! modified after being returned.

use crate::step::TracingStep;
use chrono::{DateTime, Utc};
use glchain_client::{Commit, Epic, EpicRef, Issue, MergeRequest};
use serde::{Deserialize, Serialize};

/// A merge request found for the traced commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequestLink {
    pub merge_request: MergeRequest,
    /// Issues this merge request closes (partial records)
    pub closes_issues: Vec<Issue>,
    /// Whether the merge request contains the traced commit
    pub contains_commit: bool,
}

/// An issue together with every merge request known to reference it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLink {
    pub issue: Issue,
    /// Deduplicated by merge request id
    pub related_merge_requests: Vec<MergeRequest>,
    pub epic: Option<Epic>,
}

impl IssueLink {
    pub fn new(issue: Issue) -> Self {
        Self {
            issue,
            related_merge_requests: Vec::new(),
            epic: None,
        }
    }

    /// Add a merge request unless one with the same id is already linked
    pub fn with_merge_request(mut self, merge_request: MergeRequest) -> Self {
        if !self
            .related_merge_requests
            .iter()
            .any(|known| known.id == merge_request.id)
        {
            self.related_merge_requests.push(merge_request);
        }
        self
    }

    pub fn with_merge_requests(self, merge_requests: impl IntoIterator<Item = MergeRequest>) -> Self {
        merge_requests
            .into_iter()
            .fold(self, |link, merge_request| link.with_merge_request(merge_request))
    }

    /// Replace the partial issue with its full representation
    pub fn with_full_issue(mut self, issue: Issue) -> Self {
        self.issue = issue;
        self
    }

    pub fn with_epic(mut self, epic: Epic) -> Self {
        self.epic = Some(epic);
        self
    }

    /// Epic reference carried by the (full) issue
    pub fn epic_ref(&self) -> Option<&EpicRef> {
        self.issue.epic.as_ref()
    }
}

/// Trace telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub traced_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// API calls issued by this trace (cache hits included)
    pub api_calls: u32,
    pub is_complete: bool,
    /// Non-fatal problems encountered along the way
    pub warnings: Vec<String>,
    pub steps: Vec<TracingStep>,
}

/// The relationship graph of one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitChain {
    pub commit: Commit,
    pub merge_requests: Vec<MergeRequestLink>,
    pub issues: Vec<IssueLink>,
    pub epics: Vec<Epic>,
    pub metadata: ChainMetadata,
}

impl CommitChain {
    /// Compare everything except trace telemetry
    pub fn same_content(&self, other: &CommitChain) -> bool {
        self.commit == other.commit
            && self.merge_requests == other.merge_requests
            && self.issues == other.issues
            && self.epics == other.epics
    }
}

/// A commit that could not be traced in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFailure {
    pub sha: String,
    pub error: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Chains flagged complete
    pub complete: usize,
    pub api_calls: u32,
    pub duration_ms: u64,
}

/// Result of tracing several commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTrace {
    pub chains: Vec<CommitChain>,
    pub failures: Vec<TraceFailure>,
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{issue, merge_request};

    #[test]
    fn test_with_merge_request_deduplicates_by_id() {
        let link = IssueLink::new(issue(10, 1))
            .with_merge_request(merge_request(100, 1))
            .with_merge_request(merge_request(101, 2))
            .with_merge_request(merge_request(100, 1));

        let ids: Vec<u64> = link.related_merge_requests.iter().map(|mr| mr.id).collect();
        assert_eq!(ids, vec![100, 101]);
    }

    #[test]
    fn test_with_full_issue_keeps_merge_requests() {
        let mut full = issue(10, 1);
        full.description = Some("full body".to_string());

        let link = IssueLink::new(issue(10, 1))
            .with_merge_request(merge_request(100, 1))
            .with_full_issue(full);

        assert_eq!(link.issue.description.as_deref(), Some("full body"));
        assert_eq!(link.related_merge_requests.len(), 1);
    }
}

//! Cache key composition
//!
//! Every key starts with the entity kind, followed by the scope it lives in
//! (project or group) and the entity identifier. Two entities of the same
//! kind in different scopes therefore never share a key.

use std::fmt;

/// Identifies one cached GitLab response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single commit
    Commit { project: String, sha: String },

    /// One page of a branch's commit listing
    CommitList {
        project: String,
        branch: Option<String>,
        page: u32,
        per_page: u32,
    },

    /// Merge requests that introduced a commit
    CommitMergeRequests { project: String, sha: String },

    /// Issues closed by a merge request
    ClosesIssues { project: String, mr_iid: u64 },

    /// Merge requests related to an issue
    RelatedMergeRequests { project: String, issue_iid: u64 },

    /// Full issue representation
    Issue { project: String, issue_iid: u64 },

    /// A single epic
    Epic { group: String, epic_iid: u64 },

    /// All epics of a group
    EpicList { group: String },
}

impl CacheKey {
    /// Entity kind prefix, also usable with `ChainCache::invalidate_prefix`
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Commit { .. } => "commit",
            CacheKey::CommitList { .. } => "commits",
            CacheKey::CommitMergeRequests { .. } => "commit-mrs",
            CacheKey::ClosesIssues { .. } => "closes-issues",
            CacheKey::RelatedMergeRequests { .. } => "related-mrs",
            CacheKey::Issue { .. } => "issue",
            CacheKey::Epic { .. } => "epic",
            CacheKey::EpicList { .. } => "epics",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            CacheKey::Commit { project, sha } | CacheKey::CommitMergeRequests { project, sha } => {
                write!(f, "{kind}:{project}:{sha}")
            }
            CacheKey::CommitList {
                project,
                branch,
                page,
                per_page,
            } => write!(
                f,
                "{kind}:{project}:{}:{page}:{per_page}",
                branch.as_deref().unwrap_or("*")
            ),
            CacheKey::ClosesIssues { project, mr_iid } => write!(f, "{kind}:{project}:{mr_iid}"),
            CacheKey::RelatedMergeRequests { project, issue_iid }
            | CacheKey::Issue { project, issue_iid } => write!(f, "{kind}:{project}:{issue_iid}"),
            CacheKey::Epic { group, epic_iid } => write!(f, "{kind}:{group}:{epic_iid}"),
            CacheKey::EpicList { group } => write!(f, "{kind}:{group}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = CacheKey::Issue {
            project: "group/app".to_string(),
            issue_iid: 12,
        };
        assert_eq!(key.to_string(), "issue:group/app:12");

        let key = CacheKey::CommitList {
            project: "7".to_string(),
            branch: None,
            page: 1,
            per_page: 100,
        };
        assert_eq!(key.to_string(), "commits:7:*:1:100");
    }

    #[test]
    fn test_keys_do_not_collide_across_scopes() {
        let a = CacheKey::Issue {
            project: "1".to_string(),
            issue_iid: 5,
        };
        let b = CacheKey::Issue {
            project: "2".to_string(),
            issue_iid: 5,
        };
        let c = CacheKey::RelatedMergeRequests {
            project: "1".to_string(),
            issue_iid: 5,
        };
        let d = CacheKey::Epic {
            group: "1".to_string(),
            epic_iid: 5,
        };

        let rendered: std::collections::HashSet<String> =
            [&a, &b, &c, &d].iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered.len(), 4);
    }
}

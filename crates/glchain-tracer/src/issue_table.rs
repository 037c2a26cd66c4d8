//! Deduplicated issue table of one trace

use crate::types::IssueLink;
use glchain_client::{Epic, Issue, MergeRequest};
use std::collections::HashMap;

/// Issues keyed by issue id, in first-seen order
///
/// Several merge requests may close the same issue; they all land in a
/// single [`IssueLink`]. Links are updated through the consuming
/// `IssueLink::with_*` functions so a slot is always replaced wholesale.
#[derive(Debug, Default)]
pub struct IssueTable {
    links: Vec<IssueLink>,
    index: HashMap<u64, usize>,
}

impl IssueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `merge_request` closes `issue`
    ///
    /// Returns `true` if the issue was not in the table yet.
    pub fn insert_reference(&mut self, issue: Issue, merge_request: &MergeRequest) -> bool {
        if self.update(issue.id, |link| link.with_merge_request(merge_request.clone())) {
            return false;
        }
        self.index.insert(issue.id, self.links.len());
        self.links
            .push(IssueLink::new(issue).with_merge_request(merge_request.clone()));
        true
    }

    /// Union related merge requests into an issue's link
    pub fn add_related(&mut self, issue_id: u64, merge_requests: Vec<MergeRequest>) -> bool {
        self.update(issue_id, |link| link.with_merge_requests(merge_requests))
    }

    /// Swap a partial issue record for the full one
    pub fn replace_issue(&mut self, issue_id: u64, issue: Issue) -> bool {
        self.update(issue_id, |link| link.with_full_issue(issue))
    }

    pub fn set_epic(&mut self, issue_id: u64, epic: Epic) -> bool {
        self.update(issue_id, |link| link.with_epic(epic))
    }

    pub fn get(&self, issue_id: u64) -> Option<&IssueLink> {
        self.index.get(&issue_id).map(|&slot| &self.links[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &IssueLink> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn into_links(self) -> Vec<IssueLink> {
        self.links
    }

    fn update(&mut self, issue_id: u64, apply: impl FnOnce(IssueLink) -> IssueLink) -> bool {
        let Some(&slot) = self.index.get(&issue_id) else {
            return false;
        };
        let link = self.links[slot].clone();
        self.links[slot] = apply(link);
        true
    }
}

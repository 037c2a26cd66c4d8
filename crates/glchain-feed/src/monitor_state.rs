//! Per (project, branch) polling state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Polling state of one monitored branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub project: String,
    pub branch: String,
    /// Newest commit seen; `None` until the first successful poll
    pub last_commit_sha: Option<String>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub is_polling: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl MonitorState {
    fn new(project: &str, branch: &str) -> Self {
        Self {
            project: project.to_string(),
            branch: branch.to_string(),
            last_commit_sha: None,
            last_polled_at: None,
            is_polling: false,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// All branch states, keyed by (project, branch)
///
/// Entries are created on the first poll attempt and only go away through
/// [`MonitorStateTable::reset`].
#[derive(Debug, Default)]
pub struct MonitorStateTable {
    states: BTreeMap<(String, String), MonitorState>,
}

impl MonitorStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, project: &str, branch: &str) -> &mut MonitorState {
        self.states
            .entry((project.to_string(), branch.to_string()))
            .or_insert_with(|| MonitorState::new(project, branch))
    }

    /// Mark a branch as polling
    ///
    /// Returns the current baseline, or `None` if a poll of this branch is
    /// already running.
    pub fn begin_poll(&mut self, project: &str, branch: &str) -> Option<Option<String>> {
        let state = self.entry(project, branch);
        if state.is_polling {
            return None;
        }
        state.is_polling = true;
        Some(state.last_commit_sha.clone())
    }

    /// Finish a successful poll, moving the baseline to `newest` if given
    pub fn complete_poll(&mut self, project: &str, branch: &str, newest: Option<String>) {
        let state = self.entry(project, branch);
        if newest.is_some() {
            state.last_commit_sha = newest;
        }
        state.last_polled_at = Some(Utc::now());
        state.is_polling = false;
        state.consecutive_failures = 0;
        state.last_error = None;
    }

    /// Finish a failed poll; the baseline stays where it was
    ///
    /// Returns the new failure streak.
    pub fn fail_poll(&mut self, project: &str, branch: &str, error: String) -> u32 {
        let state = self.entry(project, branch);
        state.last_polled_at = Some(Utc::now());
        state.is_polling = false;
        state.consecutive_failures += 1;
        state.last_error = Some(error);
        state.consecutive_failures
    }

    pub fn set_last_commit(&mut self, project: &str, branch: &str, sha: String) {
        self.entry(project, branch).last_commit_sha = Some(sha);
    }

    /// Forget states matching `project` and `branch` (`None` matches all)
    ///
    /// Returns the number of states removed.
    pub fn reset(&mut self, project: Option<&str>, branch: Option<&str>) -> usize {
        let before = self.states.len();
        self.states.retain(|(p, b), _| {
            let project_matches = project.is_none_or(|project| project == p.as_str());
            let branch_matches = branch.is_none_or(|branch| branch == b.as_str());
            !(project_matches && branch_matches)
        });
        before - self.states.len()
    }

    pub fn get(&self, project: &str, branch: &str) -> Option<&MonitorState> {
        self.states.get(&(project.to_string(), branch.to_string()))
    }

    pub fn snapshot(&self) -> Vec<MonitorState> {
        self.states.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_has_no_baseline() {
        let mut table = MonitorStateTable::new();
        assert_eq!(table.begin_poll("acme/app", "main"), Some(None));
        assert!(table.get("acme/app", "main").unwrap().is_polling);
    }

    #[test]
    fn test_overlapping_poll_is_refused() {
        let mut table = MonitorStateTable::new();
        assert!(table.begin_poll("acme/app", "main").is_some());
        assert!(table.begin_poll("acme/app", "main").is_none());
        // Other pairs are independent
        assert!(table.begin_poll("acme/app", "release").is_some());

        table.complete_poll("acme/app", "main", Some("c1".to_string()));
        assert_eq!(
            table.begin_poll("acme/app", "main"),
            Some(Some("c1".to_string()))
        );
    }

    #[test]
    fn test_failure_keeps_baseline() {
        let mut table = MonitorStateTable::new();
        table.begin_poll("acme/app", "main");
        table.complete_poll("acme/app", "main", Some("c1".to_string()));

        table.begin_poll("acme/app", "main");
        assert_eq!(table.fail_poll("acme/app", "main", "HTTP 500".to_string()), 1);
        table.begin_poll("acme/app", "main");
        assert_eq!(table.fail_poll("acme/app", "main", "HTTP 502".to_string()), 2);

        let state = table.get("acme/app", "main").unwrap();
        assert_eq!(state.last_commit_sha.as_deref(), Some("c1"));
        assert_eq!(state.last_error.as_deref(), Some("HTTP 502"));
        assert!(!state.is_polling);

        table.begin_poll("acme/app", "main");
        table.complete_poll("acme/app", "main", None);
        let state = table.get("acme/app", "main").unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_commit_sha.as_deref(), Some("c1"));
    }

    #[test]
    fn test_reset_matching() {
        let mut table = MonitorStateTable::new();
        table.set_last_commit("a", "main", "1".to_string());
        table.set_last_commit("a", "dev", "2".to_string());
        table.set_last_commit("b", "main", "3".to_string());

        assert_eq!(table.reset(Some("a"), Some("dev")), 1);
        assert_eq!(table.reset(None, Some("main")), 2);
        assert!(table.is_empty());
    }
}

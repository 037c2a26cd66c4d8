//! Tracing options and the chain completeness rule

use crate::types::{IssueLink, MergeRequestLink};
use glchain_client::Epic;
use glchain_config::TracerConfig;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Downgrade per-step failures to warnings instead of failing the trace
    pub continue_on_error: bool,
    /// Union each issue's related merge requests into its link
    pub follow_related_mrs: bool,
    /// Re-fetch full issues and resolve their epics
    pub include_epics: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            follow_related_mrs: true,
            include_epics: true,
        }
    }
}

impl From<&TracerConfig> for TraceOptions {
    fn from(config: &TracerConfig) -> Self {
        Self {
            continue_on_error: config.continue_on_error,
            follow_related_mrs: config.follow_related_mrs,
            include_epics: config.include_epics,
        }
    }
}

/// Decides whether an assembled chain counts as complete
pub trait CompletenessRule: Debug + Send + Sync {
    fn is_complete(
        &self,
        merge_requests: &[MergeRequestLink],
        issues: &[IssueLink],
        epics: &[Epic],
    ) -> bool;
}

/// Default rule: at least one merge request was found, and if any of them
/// closes issues, at least one issue made it into the chain.
///
/// This is a coarse signal. It does not check that every referenced issue
/// or epic was actually resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCompleteness;

impl CompletenessRule for HeuristicCompleteness {
    fn is_complete(
        &self,
        merge_requests: &[MergeRequestLink],
        issues: &[IssueLink],
        _epics: &[Epic],
    ) -> bool {
        if merge_requests.is_empty() {
            return false;
        }
        let closes_any = merge_requests
            .iter()
            .any(|link| !link.closes_issues.is_empty());
        !closes_any || !issues.is_empty()
    }
}

//! GitLab client trait and cache mode definitions
//!
//! This module defines the core `GitLabClient` trait that all client
//! implementations must satisfy, as well as the `CacheMode` enum for
//! controlling caching behavior.

use crate::error::Result;
use crate::types::{Commit, Epic, Issue, MergeRequest, Page};
use async_trait::async_trait;

/// Cache behavior mode for GitLab API clients
///
/// Controls how the client interacts with the cache layer.
/// This is set at client construction time, not per-request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// No caching - neither read nor write
    None,

    /// Write-only - skip cache reads, but write responses to cache
    /// Use for "force refresh" to get fresh data while populating cache
    WriteOnly,

    /// Read-only - read from cache, but don't update it
    ReadOnly,

    /// Full caching - read from cache, write to cache
    #[default]
    ReadWrite,
}

impl CacheMode {
    /// Should we attempt to read from cache before making API call?
    pub fn should_read(&self) -> bool {
        matches!(self, CacheMode::ReadOnly | CacheMode::ReadWrite)
    }

    /// Should we write API responses to cache?
    pub fn should_write(&self) -> bool {
        matches!(self, CacheMode::WriteOnly | CacheMode::ReadWrite)
    }
}

/// GitLab API client trait
///
/// Covers the read-only endpoints the chain tracer and the feed monitor
/// need. `project` accepts either a numeric id or a full path
/// (`group/project`); implementations encode it as needed.
///
/// Implementations must be `Send + Sync` to allow sharing across
/// async tasks.
#[async_trait]
pub trait GitLabClient: Send + Sync {
    /// Fetch a single commit by SHA
    async fn fetch_commit(&self, project: &str, sha: &str) -> Result<Commit>;

    /// List commits, newest first
    ///
    /// `branch` maps to `ref_name`; `None` uses the project's default branch.
    async fn list_commits(
        &self,
        project: &str,
        branch: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Commit>>;

    /// Merge requests that introduced a commit
    async fn fetch_commit_merge_requests(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Vec<MergeRequest>>;

    /// Issues that a merge request closes on merge (partial records)
    async fn fetch_closes_issues(&self, project: &str, mr_iid: u64) -> Result<Vec<Issue>>;

    /// Merge requests that mention or close an issue
    async fn fetch_related_merge_requests(
        &self,
        project: &str,
        issue_iid: u64,
    ) -> Result<Vec<MergeRequest>>;

    /// Full issue representation, including its epic reference
    async fn fetch_issue(&self, project: &str, issue_iid: u64) -> Result<Issue>;

    /// A single epic of a group
    async fn fetch_epic(&self, group: &str, epic_iid: u64) -> Result<Epic>;

    /// All epics of a group
    async fn list_epics(&self, group: &str) -> Result<Vec<Epic>>;
}

//! GitLab API client with caching support
//!
//! This crate provides a trait-based GitLab API client with optional caching.
//! The design follows the decorator pattern, allowing caching behavior to be
//! composed with the base client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              GitLabClient trait                  │
//! │  - fetch_commit() / list_commits()               │
//! │  - fetch_commit_merge_requests()                 │
//! │  - fetch_closes_issues() / fetch_issue()         │
//! │  - fetch_epic()                                  │
//! └─────────────────────────────────────────────────┘
//!                        │
//!        ┌───────────────┴───────────────┐
//!        ▼                               ▼
//! ┌─────────────────┐         ┌─────────────────────┐
//! │ GitLabApiClient │         │ CachedGitLabClient  │
//! │ (RestClient)    │◄────────│ (decorator)         │
//! └─────────────────┘         └─────────────────────┘
//! ```
//!
//! `RestClient` underneath owns authentication, request spacing, quota
//! back-off and retries.
//!
//! # Example
//!
//! ```rust,no_run
//! use glchain_client::{CacheMode, CachedGitLabClient, ChainCache, GitLabApiClient, GitLabClient};
//! use glchain_client::{RestClient, RestConfig};
//! use std::sync::{Arc, Mutex};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rest = RestClient::new(RestConfig::new("https://gitlab.com/api/v4", "token"))?;
//! let cache = Arc::new(Mutex::new(ChainCache::default()));
//! let client = CachedGitLabClient::new(GitLabApiClient::new(rest), cache, CacheMode::ReadWrite);
//!
//! let commit = client.fetch_commit("group/project", "6104942438c14ec7bd21c6cd5bd995272b3faff6").await?;
//! # Ok(())
//! # }
//! ```

pub mod api_client;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod headers;
pub mod rest;
pub mod retry;
pub mod token;
pub mod types;

/// Default GitLab host (gitlab.com)
pub const DEFAULT_HOST: &str = "gitlab.com";

pub use api_client::GitLabApiClient;
pub use cached_client::CachedGitLabClient;
pub use client::{CacheMode, GitLabClient};
pub use error::{ApiError, RemoteErrorBody, Result};
pub use rest::{encode_project_id, RestClient, RestConfig};
pub use retry::{backoff_delay, ResponseMeta, RetryPolicy};
pub use token::TokenResolver;
pub use types::{
    Commit, Epic, EpicRef, Issue, MergeRequest, Page, Pagination, RateLimitInfo, User,
};

// Re-export cache types for convenience
pub use glchain_cache::{CacheKey, CacheStats, ChainCache};

//! Cached GitLab API client (decorator pattern)
//!
//! Wraps any `GitLabClient` implementation to add caching behavior.
//! The cache mode determines whether to read from cache, write to cache, or both.

use crate::client::{CacheMode, GitLabClient};
use crate::error::Result;
use crate::types::{Commit, Epic, Issue, MergeRequest, Page};
use async_trait::async_trait;
use glchain_cache::{CacheKey, CacheStats, ChainCache};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cached GitLab API client using the decorator pattern
///
/// Wraps an inner `GitLabClient` and adds caching behavior based on the configured
/// `CacheMode`. Commit listings are never cached: the feed monitor relies on
/// them to see new commits.
///
/// # Example
///
/// ```rust,ignore
/// use glchain_client::{CachedGitLabClient, GitLabApiClient, CacheMode, ChainCache};
/// use std::sync::{Arc, Mutex};
///
/// let inner = GitLabApiClient::new(rest);
/// let cache = Arc::new(Mutex::new(ChainCache::default()));
///
/// let client = CachedGitLabClient::new(inner, cache, CacheMode::ReadWrite);
/// ```
#[derive(Debug, Clone)]
pub struct CachedGitLabClient<C: GitLabClient + Clone> {
    inner: C,
    cache: Arc<Mutex<ChainCache>>,
    mode: CacheMode,
}

impl<C: GitLabClient + Clone> CachedGitLabClient<C> {
    /// Create a new cached client
    ///
    /// # Arguments
    ///
    /// * `inner` - The inner client to delegate API calls to
    /// * `cache` - Shared cache instance
    /// * `mode` - Cache behavior mode
    pub fn new(inner: C, cache: Arc<Mutex<ChainCache>>, mode: CacheMode) -> Self {
        Self { inner, cache, mode }
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.mode
    }

    /// Create a new client with a different cache mode
    ///
    /// Handy for a "force refresh" client sharing the same cache.
    pub fn with_mode(&self, mode: CacheMode) -> CachedGitLabClient<C> {
        CachedGitLabClient {
            inner: self.inner.clone(),
            cache: Arc::clone(&self.cache),
            mode,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Shared cache handle (for stats and sweeps)
    pub fn cache(&self) -> Arc<Mutex<ChainCache>> {
        Arc::clone(&self.cache)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.lock_cache().clear_expired()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ChainCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_cache_get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.mode.should_read() {
            return None;
        }
        self.lock_cache().get(key)
    }

    fn cache_set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if !self.mode.should_write() {
            return;
        }
        if let Err(e) = self.lock_cache().set(key, value) {
            debug!("Failed to write to cache: {}", e);
        }
    }

    /// Serve `key` from cache, or await `fetch` and remember its result
    ///
    /// `fetch` is lazy and only polled on a cache miss.
    async fn cached<T, F>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = Result<T>> + Send,
    {
        if let Some(value) = self.try_cache_get::<T>(&key) {
            debug!("Cache HIT for {}", key);
            return Ok(value);
        }

        debug!("Cache MISS for {}", key);
        let value = fetch.await?;
        self.cache_set(&key, &value);
        Ok(value)
    }
}

#[async_trait]
impl<C: GitLabClient + Clone> GitLabClient for CachedGitLabClient<C> {
    async fn fetch_commit(&self, project: &str, sha: &str) -> Result<Commit> {
        let key = CacheKey::Commit {
            project: project.to_string(),
            sha: sha.to_string(),
        };
        self.cached(key, self.inner.fetch_commit(project, sha)).await
    }

    // Listings feed the poller and must always be fresh
    async fn list_commits(
        &self,
        project: &str,
        branch: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Commit>> {
        self.inner
            .list_commits(project, branch, page, per_page)
            .await
    }

    async fn fetch_commit_merge_requests(
        &self,
        project: &str,
        sha: &str,
    ) -> Result<Vec<MergeRequest>> {
        let key = CacheKey::CommitMergeRequests {
            project: project.to_string(),
            sha: sha.to_string(),
        };
        self.cached(key, self.inner.fetch_commit_merge_requests(project, sha))
            .await
    }

    async fn fetch_closes_issues(&self, project: &str, mr_iid: u64) -> Result<Vec<Issue>> {
        let key = CacheKey::ClosesIssues {
            project: project.to_string(),
            mr_iid,
        };
        self.cached(key, self.inner.fetch_closes_issues(project, mr_iid))
            .await
    }

    async fn fetch_related_merge_requests(
        &self,
        project: &str,
        issue_iid: u64,
    ) -> Result<Vec<MergeRequest>> {
        let key = CacheKey::RelatedMergeRequests {
            project: project.to_string(),
            issue_iid,
        };
        self.cached(
            key,
            self.inner.fetch_related_merge_requests(project, issue_iid),
        )
        .await
    }

    async fn fetch_issue(&self, project: &str, issue_iid: u64) -> Result<Issue> {
        let key = CacheKey::Issue {
            project: project.to_string(),
            issue_iid,
        };
        self.cached(key, self.inner.fetch_issue(project, issue_iid))
            .await
    }

    async fn fetch_epic(&self, group: &str, epic_iid: u64) -> Result<Epic> {
        let key = CacheKey::Epic {
            group: group.to_string(),
            epic_iid,
        };
        self.cached(key, self.inner.fetch_epic(group, epic_iid)).await
    }

    async fn list_epics(&self, group: &str) -> Result<Vec<Epic>> {
        let key = CacheKey::EpicList {
            group: group.to_string(),
        };
        self.cached(key, self.inner.list_epics(group)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::types::Pagination;

    /// Mock client that counts calls and serves a single issue
    #[derive(Debug, Clone)]
    struct MockClient {
        issue_title: String,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockClient {
        fn new(issue_title: &str) -> Self {
            Self {
                issue_title: issue_title.to_string(),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        fn bump(&self) {
            *self.call_count.lock().unwrap() += 1;
        }
    }

    fn create_test_issue(iid: u64, title: &str) -> Issue {
        Issue {
            id: 1000 + iid,
            iid,
            project_id: 1,
            title: title.to_string(),
            description: None,
            state: "opened".to_string(),
            labels: vec![],
            author: None,
            web_url: format!("https://gitlab.example.com/g/p/-/issues/{}", iid),
            created_at: None,
            closed_at: None,
            epic: None,
            epic_iid: None,
        }
    }

    #[async_trait]
    impl GitLabClient for MockClient {
        async fn fetch_commit(&self, _project: &str, _sha: &str) -> Result<Commit> {
            self.bump();
            Err(ApiError::InvalidRequest("not mocked".to_string()))
        }

        async fn list_commits(
            &self,
            _project: &str,
            _branch: Option<&str>,
            _page: u32,
            _per_page: u32,
        ) -> Result<Page<Commit>> {
            self.bump();
            Ok(Page {
                items: vec![],
                pagination: Pagination::default(),
            })
        }

        async fn fetch_commit_merge_requests(
            &self,
            _project: &str,
            _sha: &str,
        ) -> Result<Vec<MergeRequest>> {
            self.bump();
            Ok(vec![])
        }

        async fn fetch_closes_issues(&self, _project: &str, mr_iid: u64) -> Result<Vec<Issue>> {
            self.bump();
            Ok(vec![create_test_issue(mr_iid, &self.issue_title)])
        }

        async fn fetch_related_merge_requests(
            &self,
            _project: &str,
            _issue_iid: u64,
        ) -> Result<Vec<MergeRequest>> {
            self.bump();
            Ok(vec![])
        }

        async fn fetch_issue(&self, _project: &str, issue_iid: u64) -> Result<Issue> {
            self.bump();
            Ok(create_test_issue(issue_iid, &self.issue_title))
        }

        async fn fetch_epic(&self, _group: &str, _epic_iid: u64) -> Result<Epic> {
            self.bump();
            Err(ApiError::InvalidRequest("not mocked".to_string()))
        }

        async fn list_epics(&self, _group: &str) -> Result<Vec<Epic>> {
            self.bump();
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_cache_mode_none_skips_cache() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache, CacheMode::None);

        client.fetch_issue("p", 1).await.unwrap();
        client.fetch_issue("p", 1).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_mode_read_write_caches() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache.clone(), CacheMode::ReadWrite);

        let first = client.fetch_issue("p", 1).await.unwrap();
        let second = client.fetch_issue("p", 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);

        let stats = cache.lock().unwrap().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_scopes_are_cached_separately() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache, CacheMode::ReadWrite);

        client.fetch_issue("p", 1).await.unwrap();
        client.fetch_issue("q", 1).await.unwrap();
        client.fetch_closes_issues("p", 1).await.unwrap();
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cache_mode_write_only_skips_read() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache.clone(), CacheMode::WriteOnly);

        client.fetch_issue("p", 1).await.unwrap();
        client.fetch_issue("p", 1).await.unwrap();
        assert_eq!(mock.call_count(), 2);

        // The cache was still populated
        let read_client = CachedGitLabClient::new(mock.clone(), cache, CacheMode::ReadWrite);
        read_client.fetch_issue("p", 1).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_mode_read_only_skips_write() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let write_client =
            CachedGitLabClient::new(mock.clone(), cache.clone(), CacheMode::ReadWrite);
        write_client.fetch_issue("p", 1).await.unwrap();

        let mock2 = MockClient::new("second");
        let read_client = CachedGitLabClient::new(mock2.clone(), cache.clone(), CacheMode::ReadOnly);

        // Cached data wins over the new mock
        let issue = read_client.fetch_issue("p", 1).await.unwrap();
        assert_eq!(issue.title, "first");
        assert_eq!(mock2.call_count(), 0);

        // Misses are fetched but not stored
        read_client.fetch_issue("p", 2).await.unwrap();
        read_client.fetch_issue("p", 2).await.unwrap();
        assert_eq!(mock2.call_count(), 2);
    }

    #[tokio::test]
    async fn test_commit_listing_is_never_cached() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache.clone(), CacheMode::ReadWrite);

        client.list_commits("p", Some("main"), 1, 20).await.unwrap();
        client.list_commits("p", Some("main"), 1, 20).await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert!(cache.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock.clone(), cache.clone(), CacheMode::ReadWrite);

        assert!(client.fetch_epic("g", 1).await.is_err());
        assert!(client.fetch_epic("g", 1).await.is_err());
        assert_eq!(mock.call_count(), 2);
        assert!(cache.lock().unwrap().is_empty());
    }

    #[test]
    fn test_with_mode_creates_new_client() {
        let mock = MockClient::new("first");
        let cache = Arc::new(Mutex::new(ChainCache::default()));
        let client = CachedGitLabClient::new(mock, cache, CacheMode::ReadWrite);

        let force_refresh = client.with_mode(CacheMode::WriteOnly);
        assert_eq!(force_refresh.cache_mode(), CacheMode::WriteOnly);
        assert_eq!(client.cache_mode(), CacheMode::ReadWrite);
    }
}

//! Authenticated REST transport
//!
//! `RestClient` is the only place that talks HTTP. It attaches the bearer
//! token, spaces requests out, backs off when the remaining quota runs low,
//! and retries transient failures according to [`RetryPolicy`].

use crate::error::{ApiError, RemoteErrorBody, Result};
use crate::headers::{parse_pagination, parse_rate_limit, parse_retry_after};
use crate::retry::{ResponseMeta, RetryPolicy};
use crate::types::{Page, RateLimitInfo};
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Transport settings
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API root, e.g. `https://gitlab.com/api/v4`
    pub base_url: String,
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Minimum spacing between two requests
    pub min_request_interval: Duration,
    /// Below this many remaining requests, wait for the quota reset
    pub rate_limit_low_water: u32,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            min_request_interval: Duration::from_millis(100),
            rate_limit_low_water: 10,
        }
    }
}

#[derive(Debug, Default)]
struct Throttle {
    /// Earliest instant the next request may start
    next_slot: Option<Instant>,
    rate_limit: Option<RateLimitInfo>,
}

/// Percent-encode a project identifier for use in a path
///
/// Numeric ids pass through untouched; `group/sub/project` becomes
/// `group%2Fsub%2Fproject`.
pub fn encode_project_id(project: &str) -> Cow<'_, str> {
    if !project.is_empty() && project.bytes().all(|b| b.is_ascii_digit()) {
        return Cow::Borrowed(project);
    }
    let encoded: String = url::form_urlencoded::byte_serialize(project.as_bytes()).collect();
    Cow::Owned(encoded.replace('+', "%20"))
}

/// Rate-limited, retrying GitLab REST client
///
/// Cheap to clone; clones share the request counter and throttle state.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: RestConfig,
    throttle: Arc<Mutex<Throttle>>,
    requests: Arc<AtomicU64>,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("glchain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            throttle: Arc::new(Mutex::new(Throttle::default())),
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Total requests sent so far, retries included
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Most recently observed rate-limit window
    pub fn rate_limit(&self) -> Option<RateLimitInfo> {
        self.throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rate_limit
    }

    /// GET a single resource
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let (_, body) = self.get_raw(path, params).await?;
        decode(path, &body)
    }

    /// GET one page of a list resource
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Page<T>> {
        let (headers, body) = self.get_raw(path, params).await?;
        Ok(Page {
            items: decode(path, &body)?,
            pagination: parse_pagination(&headers),
        })
    }

    /// GET a list resource, following `X-Next-Page` for up to `max_pages`
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        max_pages: u32,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut page_params = params.to_vec();
            page_params.push(("page", page.to_string()));

            let result: Page<T> = self.fetch_page(path, &page_params).await?;
            items.extend(result.items);

            match result.pagination.next_page {
                Some(next) if page < max_pages => page = next,
                Some(_) => {
                    debug!("Stopping pagination of {} at page limit {}", path, max_pages);
                    break;
                }
                None => break,
            }
        }

        Ok(items)
    }

    /// Wait for the next request slot and for quota, if it ran low
    async fn wait_for_slot(&self) {
        let (slot_wait, quota_wait) = {
            let mut throttle = self.throttle.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = throttle.next_slot.map_or(now, |next| next.max(now));
            throttle.next_slot = Some(slot + self.config.min_request_interval);

            let quota_wait = throttle.rate_limit.and_then(|rate_limit| {
                rate_limit.wait_before_next(self.config.rate_limit_low_water, chrono::Utc::now())
            });
            (slot - now, quota_wait)
        };

        if let Some(wait) = quota_wait {
            info!(
                "Rate limit nearly exhausted, sleeping {:?} until quota reset",
                wait
            );
            sleep(wait).await;
        }
        if !slot_wait.is_zero() {
            sleep(slot_wait).await;
        }
    }

    fn observe_rate_limit(&self, headers: &HeaderMap) {
        if let Some(rate_limit) = parse_rate_limit(headers) {
            self.throttle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .rate_limit = Some(rate_limit);
        }
    }

    /// Send a GET with retries, returning headers and body on success
    async fn get_raw(&self, path: &str, params: &[(&str, String)]) -> Result<(HeaderMap, String)> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut attempt = 0u32;

        loop {
            self.wait_for_slot().await;
            let request_no = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("GET {} (request #{}, attempt {})", path, request_no, attempt + 1);

            let result = self
                .http
                .get(&url)
                .bearer_auth(&self.config.token)
                .query(params)
                .send()
                .await;

            let (meta, error) = match result {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    self.observe_rate_limit(&headers);

                    if status.is_success() {
                        let body = response.text().await.map_err(|e| ApiError::Transport {
                            path: path.to_string(),
                            message: format!("failed to read body: {}", e),
                            attempts: attempt + 1,
                        })?;
                        return Ok((headers, body));
                    }

                    let text = response.text().await.unwrap_or_default();
                    let body = serde_json::from_str::<RemoteErrorBody>(&text).ok();
                    let meta = ResponseMeta::from_status(status.as_u16())
                        .with_retry_after(parse_retry_after(&headers));
                    let error = ApiError::Status {
                        status: status.as_u16(),
                        path: path.to_string(),
                        body,
                        attempts: attempt + 1,
                    };
                    (meta, error)
                }
                Err(e) if e.is_timeout() => {
                    warn!("GET {} timed out", path);
                    return Err(ApiError::Timeout {
                        path: path.to_string(),
                    });
                }
                Err(e) => {
                    let error = ApiError::Transport {
                        path: path.to_string(),
                        message: e.to_string(),
                        attempts: attempt + 1,
                    };
                    (ResponseMeta::connection_error(), error)
                }
            };

            let Some(delay) = self.config.retry.next_delay(attempt, &meta) else {
                return Err(error);
            };

            warn!(
                "GET {} failed ({}), retrying in {:?} (attempt {}/{})",
                path,
                error,
                delay,
                attempt + 1,
                self.config.retry.max_retries + 1
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_project_id_passes_through() {
        assert_eq!(encode_project_id("278964"), "278964");
        assert!(matches!(encode_project_id("278964"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_namespaced_project_id_is_encoded() {
        assert_eq!(encode_project_id("gitlab-org/gitlab"), "gitlab-org%2Fgitlab");
        assert_eq!(
            encode_project_id("acme/platform/api"),
            "acme%2Fplatform%2Fapi"
        );
        assert_eq!(encode_project_id("my group/app"), "my%20group%2Fapp");
    }

    #[test]
    fn test_request_counter_starts_at_zero() {
        let client = RestClient::new(RestConfig::new("https://gitlab.example.com/api/v4", "t"))
            .unwrap();
        assert_eq!(client.request_count(), 0);
        assert!(client.rate_limit().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let mut config = RestConfig::new("https://gitlab.example.com/api/v4", "t");
        config.min_request_interval = Duration::from_millis(250);
        let client = RestClient::new(config).unwrap();

        let start = Instant::now();
        client.wait_for_slot().await;
        client.wait_for_slot().await;
        client.wait_for_slot().await;

        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_quota_waits_for_reset() {
        let mut config = RestConfig::new("https://gitlab.example.com/api/v4", "t");
        config.min_request_interval = Duration::ZERO;
        let client = RestClient::new(config).unwrap();

        client.throttle.lock().unwrap().rate_limit = Some(RateLimitInfo {
            limit: Some(600),
            remaining: 1,
            observed: Some(599),
            reset_at: Some(chrono::Utc::now() + chrono::Duration::seconds(20)),
        });

        let start = Instant::now();
        client.wait_for_slot().await;
        assert!(start.elapsed() >= Duration::from_secs(19));
    }
}

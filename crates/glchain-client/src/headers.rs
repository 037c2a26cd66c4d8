//! Response header parsing
//!
//! GitLab reports pagination through `X-*` headers and quota through the
//! `RateLimit-*` family. Missing or malformed headers simply yield `None`.

use crate::types::{Pagination, RateLimitInfo};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::str::FromStr;
use std::time::Duration;

fn header_value<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

/// Read pagination metadata
pub fn parse_pagination(headers: &HeaderMap) -> Pagination {
    Pagination {
        page: header_value(headers, "x-page"),
        per_page: header_value(headers, "x-per-page"),
        next_page: header_value(headers, "x-next-page"),
        prev_page: header_value(headers, "x-prev-page"),
        total: header_value(headers, "x-total"),
        total_pages: header_value(headers, "x-total-pages"),
    }
}

/// Read the rate-limit window, if the server reported one
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = header_value::<u32>(headers, "ratelimit-remaining")?;
    let reset_at = header_value::<i64>(headers, "ratelimit-reset")
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Some(RateLimitInfo {
        limit: header_value(headers, "ratelimit-limit"),
        remaining,
        observed: header_value(headers, "ratelimit-observed"),
        reset_at,
    })
}

/// Read a `Retry-After` hint given in seconds
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_value::<u64>(headers, "retry-after").map(Duration::from_secs)
}

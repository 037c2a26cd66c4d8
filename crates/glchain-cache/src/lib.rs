//! In-process response cache for the GitLab chain tracer
//!
//! Responses are stored as serialized JSON bodies under deterministic
//! [`CacheKey`]s and expire after a per-entry TTL. There is no background
//! eviction: expired entries are dropped lazily when looked up, or in bulk
//! via [`ChainCache::clear_expired`].
//!
//! # Example
//!
//! ```rust
//! use glchain_cache::{CacheKey, ChainCache};
//!
//! let mut cache = ChainCache::default();
//! let key = CacheKey::Issue { project: "42".into(), issue_iid: 7 };
//!
//! cache.set(&key, &vec!["payload"]).unwrap();
//! let cached: Option<Vec<String>> = cache.get(&key);
//! assert_eq!(cached, Some(vec!["payload".to_string()]));
//! ```

pub mod cache;
pub mod key;

pub use cache::{CacheEntry, CacheStats, ChainCache, DEFAULT_TTL};
pub use key::CacheKey;

//! Access token resolution
//!
//! Tokens are static bearer credentials. They are looked up per GitLab host
//! so self-managed instances and gitlab.com can be configured side by side.

use crate::DEFAULT_HOST;
use anyhow::{Context, Result};
use log::debug;

/// Resolves GitLab tokens for different hosts
///
/// Tries multiple sources in order:
/// 1. Host-specific env var (e.g., `GLCHAIN_TOKEN_GITLAB_EXAMPLE_COM`)
/// 2. `glab config get token --host {host}`
/// 3. Generic `GITLAB_TOKEN` (any host)
#[derive(Debug, Clone)]
pub struct TokenResolver {
    /// Cached default token from GITLAB_TOKEN
    default_token: Option<String>,
}

impl Default for TokenResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the host-specific token variable
pub fn host_env_key(host: &str) -> String {
    format!(
        "GLCHAIN_TOKEN_{}",
        host.replace(['.', '-', ':'], "_").to_uppercase()
    )
}

impl TokenResolver {
    pub fn new() -> Self {
        Self {
            default_token: std::env::var("GITLAB_TOKEN").ok(),
        }
    }

    /// Get a token for the given host (`None` = gitlab.com)
    pub async fn get_token(&self, host: Option<&str>) -> Result<String> {
        let host = host.unwrap_or(DEFAULT_HOST);

        let env_key = host_env_key(host);
        if let Ok(token) = std::env::var(&env_key) {
            debug!("Using token from env var {} for host {}", env_key, host);
            return Ok(token);
        }

        debug!("Trying glab config for host {}", host);
        match tokio::process::Command::new("glab")
            .args(["config", "get", "token", "--host", host])
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                let token = String::from_utf8(output.stdout)
                    .context("Invalid UTF-8 in glab config output")?
                    .trim()
                    .to_string();
                if !token.is_empty() {
                    debug!("Using token from glab config for host {}", host);
                    return Ok(token);
                }
            }
            Ok(_) => debug!("glab has no token for host {}", host),
            Err(e) => debug!("glab not available: {}", e),
        }

        if let Some(ref token) = self.default_token {
            debug!("Using default token (GITLAB_TOKEN) for {}", host);
            return Ok(token.clone());
        }

        Err(anyhow::anyhow!(
            "No token found for host '{}'. Set {} or GITLAB_TOKEN, or run 'glab auth login --hostname {}'",
            host,
            env_key,
            host
        ))
    }
}

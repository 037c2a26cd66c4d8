//! Wiring of configuration, client, tracer, monitor and processor

use anyhow::{bail, Context, Result};
use glchain_client::{
    CacheMode, CachedGitLabClient, ChainCache, GitLabApiClient, RestClient, RestConfig,
    RetryPolicy, TokenResolver,
};
use glchain_config::AppConfig;
use glchain_feed::{CommitProcessor, FeedMonitor, ProcessorEvent};
use glchain_tracer::{BatchTrace, ChainTracer, CommitTracer, TraceOptions};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Client = CachedGitLabClient<GitLabApiClient>;

pub struct App {
    config: AppConfig,
    client: Client,
    tracer: Arc<ChainTracer<Client>>,
}

impl App {
    /// Build the client stack from config
    ///
    /// `refresh` bypasses cached responses while still refreshing the cache.
    pub async fn build(config: AppConfig, refresh: bool) -> Result<Self> {
        let token = match config.gitlab.token.clone() {
            Some(token) => token,
            None => TokenResolver::new()
                .get_token(Some(config.gitlab.host.as_str()))
                .await
                .context("Failed to resolve GitLab token")?,
        };

        let rest_config = RestConfig {
            timeout: Duration::from_secs(config.gitlab.timeout_secs),
            retry: RetryPolicy {
                max_retries: config.gitlab.max_retries,
                base_delay: Duration::from_millis(config.gitlab.retry_base_delay_ms),
            },
            min_request_interval: Duration::from_millis(config.gitlab.min_request_interval_ms),
            rate_limit_low_water: config.gitlab.rate_limit_low_water,
            ..RestConfig::new(config.gitlab.api_url(), token)
        };
        let rest = RestClient::new(rest_config).context("Failed to create GitLab client")?;

        let mode = if !config.cache.enabled {
            CacheMode::None
        } else if refresh {
            CacheMode::WriteOnly
        } else {
            CacheMode::ReadWrite
        };
        let cache = Arc::new(Mutex::new(ChainCache::new(Duration::from_secs(
            config.cache.ttl_secs,
        ))));
        let client = CachedGitLabClient::new(GitLabApiClient::new(rest), cache, mode);
        info!(
            "Using GitLab API at {} (cache: {:?})",
            config.gitlab.api_url(),
            mode
        );

        let mut tracer = ChainTracer::new(client.clone(), TraceOptions::from(&config.tracer));
        if let Some(project) = &config.gitlab.default_project {
            tracer = tracer.with_default_project(project.clone());
        }

        Ok(Self {
            config,
            client,
            tracer: Arc::new(tracer),
        })
    }

    pub async fn trace(&self, shas: &[String], project: Option<&str>) -> Result<BatchTrace> {
        let batch = self.tracer.trace_commits(shas, project).await?;
        self.log_summary(&batch);
        if batch.summary.succeeded == 0 && !batch.failures.is_empty() {
            bail!("No commit could be traced: {}", batch.failures[0].error);
        }
        Ok(batch)
    }

    pub async fn recent(
        &self,
        count: usize,
        project: Option<&str>,
        branch: Option<&str>,
    ) -> Result<BatchTrace> {
        let batch = self
            .tracer
            .trace_recent_commits(count, project, branch)
            .await?;
        self.log_summary(&batch);
        Ok(batch)
    }

    /// Monitor the configured projects and trace new commits until Ctrl-C
    pub async fn watch(&self, compact: bool) -> Result<()> {
        if !self.config.monitor.projects.iter().any(|p| p.enabled) {
            bail!("No enabled projects in [[monitor.projects]], nothing to watch");
        }

        let monitor = FeedMonitor::new(self.client.clone(), self.config.monitor.clone());
        let tracer: Arc<dyn CommitTracer> = self.tracer.clone();
        let processor = CommitProcessor::new(tracer, self.config.processor.clone());

        let mut processed = processor.subscribe();
        let reporter = tokio::spawn(async move {
            while let Some(event) = processed.recv().await {
                match event {
                    ProcessorEvent::CommitProcessed {
                        chain: Some(chain), ..
                    } => match to_json(chain.as_ref(), compact) {
                        Ok(json) => println!("{}", json),
                        Err(e) => warn!("Failed to serialize chain: {}", e),
                    },
                    ProcessorEvent::CommitProcessed {
                        commit,
                        error: Some(error),
                        ..
                    } => warn!("Giving up on {}: {}", commit.sha(), error),
                    ProcessorEvent::QueueEmpty => info!("All detected commits processed"),
                    _ => {}
                }
            }
        });
        let intake = processor.spawn_intake(monitor.subscribe());

        let client = self.client.clone();
        let sweep_every = Duration::from_secs(self.config.cache.ttl_secs.max(1));
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = client.sweep_expired();
                if removed > 0 {
                    debug!("Removed {} expired cache entries", removed);
                }
            }
        });

        monitor.start();
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Shutting down");

        monitor.stop();
        intake.abort();
        reporter.abort();
        sweeper.abort();

        let stats = processor.stats();
        info!(
            "Processed {} commit(s), {} failed, {} still queued",
            stats.completed, stats.failed, stats.queued
        );
        self.log_cache_stats();
        Ok(())
    }

    fn log_summary(&self, batch: &BatchTrace) {
        let summary = &batch.summary;
        info!(
            "Traced {}/{} commit(s) in {}ms, {} complete, {} API call(s)",
            summary.succeeded, summary.total, summary.duration_ms, summary.complete, summary.api_calls
        );
        for failure in &batch.failures {
            warn!("{}: {}", failure.sha, failure.error);
        }
        self.log_cache_stats();
    }

    fn log_cache_stats(&self) {
        let stats = self.client.cache_stats();
        info!(
            "Cache: {} entries, {} hits, {} misses ({:.0}% hit rate), {} request(s) sent",
            stats.entries,
            stats.hits,
            stats.misses,
            stats.hit_rate() * 100.0,
            self.client.inner().rest().request_count()
        );
    }
}

pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

//! Commit processing queue
//!
//! Detected commits are queued once per SHA and traced with bounded
//! concurrency. A failed attempt puts the commit back to pending with a
//! fixed delay until `max_retries` attempts have failed, after which it is
//! marked failed for good. Finished commits move to the processed set,
//! which also keeps them from being queued again.

use crate::event_bus::EventBus;
use crate::events::{DetectedCommit, MonitorEvent, ProcessorEvent};
use chrono::{DateTime, Utc};
use glchain_config::ProcessorConfig;
use glchain_tracer::{CommitChain, CommitTracer, TraceError};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitStatus::Completed | CommitStatus::Failed)
    }
}

/// A detected commit and its processing bookkeeping
#[derive(Debug, Clone)]
pub struct QueuedCommit {
    pub detected: DetectedCommit,
    pub status: CommitStatus,
    /// Failed attempts so far
    pub retries: u32,
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    /// Earliest time a pending retry may start
    pub not_before: Option<Instant>,
}

impl QueuedCommit {
    fn new(detected: DetectedCommit) -> Self {
        Self {
            detected,
            status: CommitStatus::Pending,
            retries: 0,
            error: None,
            queued_at: Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
            not_before: None,
        }
    }

    pub fn sha(&self) -> &str {
        self.detected.sha()
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.status == CommitStatus::Pending && self.not_before.is_none_or(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    /// Commits in the live queue (pending or processing)
    pub queued: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Live queue plus the processed set; SHAs are unique across both
#[derive(Debug, Default)]
struct ProcessorState {
    queue: Vec<QueuedCommit>,
    processed: HashMap<String, QueuedCommit>,
    active: usize,
}

impl ProcessorState {
    fn knows(&self, sha: &str) -> bool {
        self.processed.contains_key(sha) || self.queue.iter().any(|c| c.sha() == sha)
    }

    fn position(&self, sha: &str) -> Option<usize> {
        self.queue.iter().position(|c| c.sha() == sha)
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }
}

/// Traces queued commits with bounded concurrency
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct CommitProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    tracer: Arc<dyn CommitTracer>,
    config: ProcessorConfig,
    state: Mutex<ProcessorState>,
    events: EventBus<ProcessorEvent>,
}

impl std::fmt::Debug for CommitProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitProcessor")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CommitProcessor {
    pub fn new(tracer: Arc<dyn CommitTracer>, config: ProcessorConfig) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                tracer,
                config,
                state: Mutex::new(ProcessorState::default()),
                events: EventBus::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProcessorEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> EventBus<ProcessorEvent> {
        self.inner.events.clone()
    }

    /// Queue a commit unless its SHA is queued or processed already
    pub fn enqueue(&self, detected: DetectedCommit) -> bool {
        {
            let mut state = self.lock_state();
            if state.knows(detected.sha()) {
                debug!("Commit {} already known, not queueing", detected.sha());
                return false;
            }
            debug!("Queueing commit {} of {}", detected.sha(), detected.project);
            state.queue.push(QueuedCommit::new(detected.clone()));
        }
        self.inner.events.publish(ProcessorEvent::CommitQueued(detected));
        self.process_next();
        true
    }

    /// Start as many eligible pending commits as the concurrency limit allows
    pub fn process_next(&self) {
        loop {
            let started = {
                let mut state = self.lock_state();
                if state.active >= self.inner.config.concurrency {
                    return;
                }
                let now = Instant::now();
                let Some(index) = state.queue.iter().position(|c| c.is_eligible(now)) else {
                    return;
                };
                state.active += 1;
                let entry = &mut state.queue[index];
                entry.status = CommitStatus::Processing;
                entry.processing_started_at = Some(Utc::now());
                entry.not_before = None;
                (entry.detected.clone(), entry.retries + 1)
            };

            let (detected, attempt) = started;
            debug!("Processing {} (attempt {})", detected.sha(), attempt);
            self.inner.events.publish(ProcessorEvent::CommitProcessing {
                sha: detected.sha().to_string(),
                attempt,
            });

            let processor = self.clone();
            tokio::spawn(async move {
                let result = processor
                    .inner
                    .tracer
                    .trace_commit(detected.sha(), Some(&detected.project))
                    .await;
                processor.finish(detected.sha(), result);
            });
        }
    }

    fn finish(&self, sha: &str, result: Result<CommitChain, TraceError>) {
        let mut events = Vec::new();
        let mut retry_after = None;
        {
            let mut state = self.lock_state();
            state.active = state.active.saturating_sub(1);
            let Some(index) = state.position(sha) else {
                error!("Finished commit {} is no longer queued", sha);
                return;
            };

            match result {
                Ok(chain) => {
                    let mut entry = state.queue.remove(index);
                    entry.status = CommitStatus::Completed;
                    entry.error = None;
                    entry.processing_completed_at = Some(Utc::now());
                    info!(
                        "Processed {}: {} MR(s), {} issue(s), {} epic(s)",
                        sha,
                        chain.merge_requests.len(),
                        chain.issues.len(),
                        chain.epics.len()
                    );
                    events.push(ProcessorEvent::CommitProcessed {
                        commit: entry.detected.clone(),
                        success: true,
                        error: None,
                        chain: Some(Arc::new(chain)),
                    });
                    state.processed.insert(sha.to_string(), entry);
                }
                Err(e) => {
                    let message = e.to_string();
                    let max_retries = self.inner.config.max_retries;
                    let entry = &mut state.queue[index];
                    entry.retries += 1;
                    entry.error = Some(message.clone());

                    if entry.retries < max_retries {
                        let delay = Duration::from_millis(self.inner.config.retry_delay_ms);
                        entry.status = CommitStatus::Pending;
                        entry.not_before = Some(Instant::now() + delay);
                        warn!(
                            "Processing {} failed (attempt {}/{}), retrying in {:?}: {}",
                            sha, entry.retries, max_retries, delay, message
                        );
                        events.push(ProcessorEvent::CommitRetrying {
                            sha: sha.to_string(),
                            retries: entry.retries,
                            error: message,
                        });
                        retry_after = Some(delay);
                    } else {
                        let mut entry = state.queue.remove(index);
                        entry.status = CommitStatus::Failed;
                        entry.processing_completed_at = Some(Utc::now());
                        error!(
                            "Processing {} failed after {} attempt(s): {}",
                            sha, entry.retries, message
                        );
                        events.push(ProcessorEvent::CommitProcessed {
                            commit: entry.detected.clone(),
                            success: false,
                            error: Some(message),
                            chain: None,
                        });
                        state.processed.insert(sha.to_string(), entry);
                    }
                }
            }

            if state.is_drained() {
                events.push(ProcessorEvent::QueueEmpty);
            }
        }

        for event in events {
            self.inner.events.publish(event);
        }
        if let Some(delay) = retry_after {
            let processor = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                processor.process_next();
            });
        }
        self.process_next();
    }

    /// Re-queue a commit that failed for good, with its counters reset
    pub fn retry(&self, sha: &str) -> bool {
        let detected = {
            let mut state = self.lock_state();
            let failed = state
                .processed
                .get(sha)
                .is_some_and(|c| c.status == CommitStatus::Failed);
            if !failed {
                debug!("Commit {} has not failed, nothing to retry", sha);
                return false;
            }
            let Some(previous) = state.processed.remove(sha) else {
                return false;
            };
            let detected = previous.detected;
            state.queue.push(QueuedCommit::new(detected.clone()));
            detected
        };
        info!("Retrying commit {}", sha);
        self.inner.events.publish(ProcessorEvent::CommitQueued(detected));
        self.process_next();
        true
    }

    pub fn stats(&self) -> ProcessorStats {
        let state = self.lock_state();
        let count = |status: CommitStatus| state.queue.iter().filter(|c| c.status == status).count();
        let processed = |status: CommitStatus| {
            state
                .processed
                .values()
                .filter(|c| c.status == status)
                .count()
        };
        ProcessorStats {
            queued: state.queue.len(),
            pending: count(CommitStatus::Pending),
            active: count(CommitStatus::Processing),
            completed: processed(CommitStatus::Completed),
            failed: processed(CommitStatus::Failed),
        }
    }

    /// Drop the processed set, allowing those SHAs to be queued again
    pub fn clear_processed(&self) -> usize {
        let mut state = self.lock_state();
        let cleared = state.processed.len();
        state.processed.clear();
        cleared
    }

    pub fn status_of(&self, sha: &str) -> Option<CommitStatus> {
        self.record(sha).map(|c| c.status)
    }

    /// The bookkeeping of a queued or processed commit
    pub fn record(&self, sha: &str) -> Option<QueuedCommit> {
        let state = self.lock_state();
        state
            .processed
            .get(sha)
            .or_else(|| state.queue.iter().find(|c| c.sha() == sha))
            .cloned()
    }

    /// Snapshot of the live queue, oldest first
    pub fn queued(&self) -> Vec<QueuedCommit> {
        self.lock_state().queue.clone()
    }

    /// Feed every detected commit from a monitor subscription into the queue
    pub fn spawn_intake(&self, mut events: mpsc::UnboundedReceiver<MonitorEvent>) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let MonitorEvent::CommitDetected(detected) = event {
                    processor.enqueue(detected);
                }
            }
            debug!("Monitor event stream closed, intake finished");
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ProcessorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use glchain_client::{ApiError, Commit};
    use glchain_tracer::ChainMetadata;

    fn detected(sha: &str) -> DetectedCommit {
        DetectedCommit {
            commit: Commit {
                id: sha.to_string(),
                short_id: sha.to_string(),
                title: format!("Commit {}", sha),
                message: String::new(),
                author_name: "Jane Doe".to_string(),
                author_email: "jane@example.com".to_string(),
                authored_date: None,
                committed_date: None,
                web_url: String::new(),
                parent_ids: Vec::new(),
            },
            project: "acme/app".to_string(),
            branch: "main".to_string(),
        }
    }

    /// Fails the first `failures[sha]` attempts of a commit, then succeeds
    #[derive(Debug, Default)]
    struct ScriptedTracer {
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<HashMap<String, u32>>,
        delay: Option<Duration>,
    }

    impl ScriptedTracer {
        fn failing(sha: &str, times: u32) -> Self {
            let tracer = Self::default();
            tracer.failures.lock().unwrap().insert(sha.to_string(), times);
            tracer
        }

        fn calls(&self, sha: &str) -> u32 {
            self.calls.lock().unwrap().get(sha).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl CommitTracer for ScriptedTracer {
        async fn trace_commit(
            &self,
            sha: &str,
            _project: Option<&str>,
        ) -> Result<CommitChain, TraceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(sha.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            let failures = self.failures.lock().unwrap().get(sha).copied().unwrap_or(0);
            if attempt <= failures {
                return Err(TraceError::Listing {
                    project: "acme/app".to_string(),
                    source: ApiError::Status {
                        status: 502,
                        path: "/projects/acme%2Fapp".to_string(),
                        body: None,
                        attempts: 4,
                    },
                });
            }
            Ok(CommitChain {
                commit: detected(sha).commit,
                merge_requests: Vec::new(),
                issues: Vec::new(),
                epics: Vec::new(),
                metadata: ChainMetadata {
                    traced_at: Utc::now(),
                    duration_ms: 0,
                    api_calls: 2,
                    is_complete: false,
                    warnings: Vec::new(),
                    steps: Vec::new(),
                },
            })
        }
    }

    fn processor(tracer: Arc<ScriptedTracer>, concurrency: usize) -> CommitProcessor {
        CommitProcessor::new(
            tracer,
            ProcessorConfig {
                concurrency,
                max_retries: 3,
                retry_delay_ms: 5000,
            },
        )
    }

    /// Wait for the terminal event of `sha`
    async fn processed(
        rx: &mut mpsc::UnboundedReceiver<ProcessorEvent>,
        sha: &str,
    ) -> (bool, Option<String>) {
        while let Some(event) = rx.recv().await {
            if let ProcessorEvent::CommitProcessed {
                commit,
                success,
                error,
                ..
            } = event
            {
                if commit.sha() == sha {
                    return (success, error);
                }
            }
        }
        panic!("event stream closed before {sha} was processed");
    }

    async fn queue_empty(rx: &mut mpsc::UnboundedReceiver<ProcessorEvent>) {
        while let Some(event) = rx.recv().await {
            if matches!(event, ProcessorEvent::QueueEmpty) {
                return;
            }
        }
        panic!("event stream closed before the queue drained");
    }

    #[tokio::test]
    async fn test_successful_commit_completes() {
        let tracer = Arc::new(ScriptedTracer::default());
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();

        assert!(processor.enqueue(detected("c1")));
        let (success, error) = processed(&mut rx, "c1").await;

        assert!(success);
        assert!(error.is_none());
        assert_eq!(processor.status_of("c1"), Some(CommitStatus::Completed));
        assert_eq!(tracer.calls("c1"), 1);
        let stats = processor.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let tracer = Arc::new(ScriptedTracer::default());
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();

        assert!(processor.enqueue(detected("c1")));
        assert!(!processor.enqueue(detected("c1")));
        processed(&mut rx, "c1").await;

        // Completed commits are not queued again
        assert!(!processor.enqueue(detected("c1")));
        assert_eq!(tracer.calls("c1"), 1);

        assert_eq!(processor.clear_processed(), 1);
        assert!(processor.enqueue(detected("c1")));
        processed(&mut rx, "c1").await;
        assert_eq!(tracer.calls("c1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_after_delay() {
        let tracer = Arc::new(ScriptedTracer::failing("c1", 1));
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();
        let start = Instant::now();

        processor.enqueue(detected("c1"));
        let (success, _) = processed(&mut rx, "c1").await;

        assert!(success);
        assert_eq!(tracer.calls("c1"), 2);
        assert!(start.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_marks_commit_failed() {
        let tracer = Arc::new(ScriptedTracer::failing("c1", u32::MAX));
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();

        processor.enqueue(detected("c1"));
        let (success, error) = processed(&mut rx, "c1").await;

        assert!(!success);
        assert!(error.unwrap().contains("502"));
        assert_eq!(tracer.calls("c1"), 3);
        assert_eq!(processor.status_of("c1"), Some(CommitStatus::Failed));
        assert_eq!(processor.stats().failed, 1);
        assert!(processor.queued().is_empty());

        let record = processor.record("c1").unwrap();
        assert_eq!(record.status, CommitStatus::Failed);
        assert_eq!(record.retries, 3);
        assert!(record.error.as_deref().is_some_and(|e| e.contains("502")));
        assert!(record.processing_completed_at.is_some());
        assert!(processor.record("c9").is_none());
        assert!(!processor.enqueue(detected("c1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_requeues_failed_commit() {
        let tracer = Arc::new(ScriptedTracer::failing("c1", 3));
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();

        processor.enqueue(detected("c1"));
        let (success, _) = processed(&mut rx, "c1").await;
        assert!(!success);

        assert!(processor.retry("c1"));
        assert!(!processor.retry("c1"));
        let (success, _) = processed(&mut rx, "c1").await;
        assert!(success);
        assert_eq!(tracer.calls("c1"), 4);
        assert!(!processor.retry("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let tracer = Arc::new(ScriptedTracer {
            delay: Some(Duration::from_secs(1)),
            ..ScriptedTracer::default()
        });
        let processor = processor(tracer.clone(), 2);
        let mut rx = processor.subscribe();

        for sha in ["c1", "c2", "c3", "c4"] {
            processor.enqueue(detected(sha));
        }
        let stats = processor.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.pending, 2);

        // Oldest pending goes first
        let queued: Vec<CommitStatus> = processor.queued().iter().map(|c| c.status).collect();
        assert_eq!(
            queued,
            vec![
                CommitStatus::Processing,
                CommitStatus::Processing,
                CommitStatus::Pending,
                CommitStatus::Pending
            ]
        );

        queue_empty(&mut rx).await;
        assert_eq!(processor.stats().completed, 4);
    }

    #[tokio::test]
    async fn test_intake_enqueues_detected_commits() {
        let tracer = Arc::new(ScriptedTracer::default());
        let processor = processor(tracer.clone(), 3);
        let mut rx = processor.subscribe();
        let monitor_events = EventBus::new();

        let intake = processor.spawn_intake(monitor_events.subscribe());
        monitor_events.publish(MonitorEvent::PollCompleted {
            project: "acme/app".to_string(),
            branch: "main".to_string(),
            new_commits: 1,
        });
        monitor_events.publish(MonitorEvent::CommitDetected(detected("c9")));

        let (success, _) = processed(&mut rx, "c9").await;
        assert!(success);
        intake.abort();
    }
}

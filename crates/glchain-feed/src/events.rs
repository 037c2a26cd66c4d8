//! Events published by the monitor and the processor

use glchain_client::Commit;
use glchain_tracer::CommitChain;
use std::sync::Arc;

/// A commit seen on a monitored branch
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCommit {
    pub commit: Commit,
    pub project: String,
    pub branch: String,
}

impl DetectedCommit {
    pub fn sha(&self) -> &str {
        &self.commit.id
    }
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    CommitDetected(DetectedCommit),
    PollCompleted {
        project: String,
        branch: String,
        new_commits: usize,
    },
    PollFailed {
        project: String,
        branch: String,
        error: String,
        consecutive_failures: u32,
    },
}

#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    CommitQueued(DetectedCommit),
    CommitProcessing {
        sha: String,
        attempt: u32,
    },
    /// An attempt failed and the commit went back to pending
    CommitRetrying {
        sha: String,
        retries: u32,
        error: String,
    },
    /// Terminal outcome of a commit
    CommitProcessed {
        commit: DetectedCommit,
        success: bool,
        error: Option<String>,
        chain: Option<Arc<CommitChain>>,
    },
    /// Nothing pending and nothing in flight
    QueueEmpty,
}

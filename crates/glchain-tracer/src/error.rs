use crate::step::{TraceStep, TracingStep};
use glchain_client::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("no project given and no default project configured")]
    NoProject,

    /// The commit itself could not be fetched; nothing to trace
    #[error("failed to fetch commit {sha}: {source}")]
    CommitFetch {
        sha: String,
        #[source]
        source: ApiError,
        steps: Vec<TracingStep>,
    },

    /// A later step failed and errors are not tolerated
    #[error("step {step} failed while tracing {sha}: {source}")]
    Step {
        sha: String,
        step: TraceStep,
        #[source]
        source: ApiError,
        steps: Vec<TracingStep>,
    },

    #[error("failed to list recent commits of {project}: {source}")]
    Listing {
        project: String,
        #[source]
        source: ApiError,
    },
}

impl TraceError {
    /// Step log up to and including the failing step
    pub fn steps(&self) -> &[TracingStep] {
        match self {
            TraceError::CommitFetch { steps, .. } | TraceError::Step { steps, .. } => steps,
            TraceError::NoProject | TraceError::Listing { .. } => &[],
        }
    }

    /// HTTP status of the underlying API failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TraceError::CommitFetch { source, .. }
            | TraceError::Step { source, .. }
            | TraceError::Listing { source, .. } => source.status(),
            TraceError::NoProject => None,
        }
    }
}

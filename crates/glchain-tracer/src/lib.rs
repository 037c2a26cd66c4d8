//! Commit relationship chain tracing
//!
//! Given a commit SHA, [`ChainTracer`] walks
//! commit → merge requests → closed issues → epics and returns a
//! [`CommitChain`]. Every stage is timed and logged as a [`TracingStep`];
//! with `continue_on_error` set, failures of individual lookups become
//! warnings on the chain instead of failing the trace.
//!
//! # Example
//!
//! ```rust,ignore
//! use glchain_tracer::{ChainTracer, TraceOptions};
//!
//! let tracer = ChainTracer::new(client, TraceOptions::default())
//!     .with_default_project("acme/app");
//! let chain = tracer.trace_commit("ed899a2f", None).await?;
//! println!("{} issues, complete: {}", chain.issues.len(), chain.metadata.is_complete);
//! ```

pub mod error;
pub mod issue_table;
pub mod options;
pub mod step;
pub mod tracer;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::TraceError;
pub use issue_table::IssueTable;
pub use options::{CompletenessRule, HeuristicCompleteness, TraceOptions};
pub use step::{TraceStep, TracingStep};
pub use tracer::{ChainTracer, CommitTracer};
pub use types::{
    BatchSummary, BatchTrace, ChainMetadata, CommitChain, IssueLink, MergeRequestLink,
    TraceFailure,
};

//! Step log of a single trace
//!
//! A trace runs its stages in a fixed order. Each stage appends exactly one
//! [`TracingStep`]; entries are never changed after being appended.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Instant;
use strum::Display as StrumDisplay;

/// Stages of a trace, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TraceStep {
    FetchCommit,
    FetchMergeRequests,
    FetchClosingIssues,
    MergeIssues,
    FetchFullIssues,
    FetchEpics,
    AssembleChain,
}

/// One entry of the step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingStep {
    pub name: TraceStep,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// Human-readable outcome
    pub result: String,
    pub error: Option<String>,
}

/// A started, not yet recorded step
#[derive(Debug)]
pub(crate) struct StepTimer {
    step: TraceStep,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl StepTimer {
    pub(crate) fn step(&self) -> TraceStep {
        self.step
    }
}

/// Per-trace bookkeeping: API calls, warnings and the step log
///
/// A fresh `TraceRun` is created for every trace, so counters never leak
/// between traces even when several run at once.
#[derive(Debug)]
pub(crate) struct TraceRun {
    start: Instant,
    pub(crate) api_calls: u32,
    pub(crate) warnings: Vec<String>,
    pub(crate) steps: Vec<TracingStep>,
}

impl TraceRun {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            api_calls: 0,
            warnings: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub(crate) fn count_call(&mut self) {
        self.api_calls += 1;
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub(crate) fn begin(&self, step: TraceStep) -> StepTimer {
        debug!("Step {} started", step);
        StepTimer {
            step,
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub(crate) fn succeed(&mut self, timer: StepTimer, result: impl Into<String>) {
        self.push(timer, true, result.into(), None);
    }

    pub(crate) fn fail(&mut self, timer: StepTimer, result: impl Into<String>, error: impl Display) {
        self.push(timer, false, result.into(), Some(error.to_string()));
    }

    fn push(&mut self, timer: StepTimer, success: bool, result: String, error: Option<String>) {
        let duration_ms = timer.start.elapsed().as_millis() as u64;
        debug!(
            "Step {} finished in {}ms ({}): {}",
            timer.step,
            duration_ms,
            if success { "ok" } else { "failed" },
            result
        );
        self.steps.push(TracingStep {
            name: timer.step,
            started_at: timer.started_at,
            duration_ms,
            success,
            result,
            error,
        });
    }
}

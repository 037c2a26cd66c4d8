//! Commit feed monitor
//!
//! Polls the configured (project, branch) pairs for new commits. The first
//! successful poll of a branch sets its baseline and emits up to
//! `bulk_load_limit` of the newest commits; later polls emit only the
//! commits newer than the baseline. Commits are always emitted oldest first.

use crate::event_bus::EventBus;
use crate::events::{DetectedCommit, MonitorEvent};
use crate::filter::AuthorFilter;
use crate::monitor_state::{MonitorState, MonitorStateTable};
use glchain_client::{ApiError, Commit, GitLabClient};
use glchain_config::{MonitorConfig, MonitorProject};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("project '{0}' is not monitored")]
    UnknownProject(String),

    #[error("project '{0}' is disabled")]
    ProjectDisabled(String),

    #[error("failed to poll {project}@{branch}: {source}")]
    Api {
        project: String,
        branch: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A poll of the same branch was still running
    Skipped,
    Polled { new_commits: usize },
}

impl PollOutcome {
    pub fn new_commits(&self) -> usize {
        match self {
            PollOutcome::Skipped => 0,
            PollOutcome::Polled { new_commits } => *new_commits,
        }
    }
}

/// Polls project branches and publishes [`MonitorEvent`]s
#[derive(Debug)]
pub struct FeedMonitor<C: GitLabClient + 'static> {
    inner: Arc<MonitorInner<C>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct MonitorInner<C> {
    client: C,
    config: MonitorConfig,
    states: Mutex<MonitorStateTable>,
    events: EventBus<MonitorEvent>,
}

impl<C: GitLabClient + 'static> FeedMonitor<C> {
    pub fn new(client: C, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                client,
                config,
                states: Mutex::new(MonitorStateTable::new()),
                events: EventBus::new(),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> EventBus<MonitorEvent> {
        self.inner.events.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Poll every enabled branch now and then once per poll interval
    ///
    /// Returns `false` if the monitor was already running.
    pub fn start(&self) -> bool {
        let mut timer = self.lock_timer();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Feed monitor already running");
            return false;
        }

        let period = Duration::from_secs(self.inner.config.poll_interval_secs.max(1));
        let inner = Arc::clone(&self.inner);
        info!(
            "Starting feed monitor for {} project(s), polling every {:?}",
            self.inner.config.projects.iter().filter(|p| p.enabled).count(),
            period
        );

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Each cycle runs detached so stopping never cuts a poll short
                let cycle = Arc::clone(&inner);
                tokio::spawn(async move {
                    cycle.poll_all().await;
                });
            }
        }));
        true
    }

    /// Cancel the poll timer; polls already running finish normally
    pub fn stop(&self) -> bool {
        match self.lock_timer().take() {
            Some(handle) => {
                handle.abort();
                info!("Feed monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Poll all enabled branches concurrently
    ///
    /// Returns the number of commits emitted. Failures are reported through
    /// [`MonitorEvent::PollFailed`].
    pub async fn poll_all(&self) -> usize {
        Arc::clone(&self.inner).poll_all().await
    }

    /// Poll every branch of one project
    ///
    /// All branches are polled even if one fails; the first failure is
    /// returned.
    pub async fn poll_project(&self, project_id: &str) -> Result<usize, MonitorError> {
        let project = self.inner.project(project_id)?;
        let mut emitted = 0;
        let mut first_error = None;

        for branch in &project.branches {
            match self.inner.poll_branch(project, branch).await {
                Ok(outcome) => emitted += outcome.new_commits(),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(emitted),
        }
    }

    /// Poll a single branch of a monitored project
    pub async fn poll_branch(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<PollOutcome, MonitorError> {
        let project = self.inner.project(project_id)?;
        self.inner.poll_branch(project, branch).await
    }

    /// Forget baselines; the next poll of a matching branch bulk-loads again
    pub fn reset_state(&self, project: Option<&str>, branch: Option<&str>) -> usize {
        let removed = self.inner.lock_states().reset(project, branch);
        info!("Reset {} monitor state(s)", removed);
        removed
    }

    /// Move a branch baseline by hand
    pub fn update_last_commit(&self, project: &str, branch: &str, sha: impl Into<String>) {
        let sha = sha.into();
        debug!("Setting baseline of {}@{} to {}", project, branch, sha);
        self.inner
            .lock_states()
            .set_last_commit(project, branch, sha);
    }

    pub fn states(&self) -> Vec<MonitorState> {
        self.inner.lock_states().snapshot()
    }

    pub fn state(&self, project: &str, branch: &str) -> Option<MonitorState> {
        self.inner.lock_states().get(project, branch).cloned()
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: GitLabClient + 'static> Drop for FeedMonitor<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
    }
}

impl<C: GitLabClient + 'static> MonitorInner<C> {
    fn lock_states(&self) -> MutexGuard<'_, MonitorStateTable> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn project(&self, project_id: &str) -> Result<&MonitorProject, MonitorError> {
        let project = self
            .config
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| MonitorError::UnknownProject(project_id.to_string()))?;
        if !project.enabled {
            return Err(MonitorError::ProjectDisabled(project_id.to_string()));
        }
        Ok(project)
    }

    async fn poll_all(self: Arc<Self>) -> usize {
        let mut polls = JoinSet::new();
        for project in self.config.projects.iter().filter(|p| p.enabled) {
            for branch in &project.branches {
                let inner = Arc::clone(&self);
                let project = project.clone();
                let branch = branch.clone();
                polls.spawn(async move { inner.poll_branch(&project, &branch).await });
            }
        }

        let mut emitted = 0;
        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok(Ok(outcome)) => emitted += outcome.new_commits(),
                // Already logged and published by poll_branch
                Ok(Err(_)) => {}
                Err(e) => warn!("Poll task failed: {}", e),
            }
        }
        debug!("Poll cycle finished, {} new commit(s)", emitted);
        emitted
    }

    async fn poll_branch(
        &self,
        project: &MonitorProject,
        branch: &str,
    ) -> Result<PollOutcome, MonitorError> {
        let started = self.lock_states().begin_poll(&project.id, branch);
        let Some(baseline) = started else {
            debug!("Poll of {}@{} still running, skipping", project.id, branch);
            return Ok(PollOutcome::Skipped);
        };
        let guard = PollGuard {
            states: &self.states,
            project: &project.id,
            branch,
            settled: false,
        };

        let page = match self
            .client
            .list_commits(&project.id, Some(branch), 1, self.config.page_size)
            .await
        {
            Ok(page) => page,
            Err(source) => {
                let error = source.to_string();
                let failures = guard.fail(error.clone());
                warn!(
                    "Polling {}@{} failed ({} in a row): {}",
                    project.id, branch, failures, error
                );
                self.events.publish(MonitorEvent::PollFailed {
                    project: project.id.clone(),
                    branch: branch.to_string(),
                    error,
                    consecutive_failures: failures,
                });
                return Err(MonitorError::Api {
                    project: project.id.clone(),
                    branch: branch.to_string(),
                    source,
                });
            }
        };

        let newest = page.items.first().map(|c| c.id.clone());
        let selection = select_new_commits(
            page.items,
            baseline.as_deref(),
            self.config.bulk_load_limit,
        );
        if selection.baseline_missing {
            warn!(
                "Baseline {} of {}@{} not in the latest page, emitting all {} commit(s)",
                baseline.as_deref().unwrap_or_default(),
                project.id,
                branch,
                selection.commits.len()
            );
        } else if baseline.is_none() {
            info!(
                "Initial load of {}@{}: {} commit(s)",
                project.id,
                branch,
                selection.commits.len()
            );
        }

        let filter = AuthorFilter::from(project);
        let (accepted, rejected): (Vec<Commit>, Vec<Commit>) = selection
            .commits
            .into_iter()
            .partition(|commit| filter.allows(commit));
        for commit in &rejected {
            debug!(
                "Ignoring commit {} by {} <{}> on {}@{}",
                commit.short_id, commit.author_name, commit.author_email, project.id, branch
            );
        }

        // The baseline follows the newest commit even when it was filtered out
        guard.complete(newest);

        let new_commits = accepted.len();
        for commit in accepted {
            debug!("New commit {} on {}@{}", commit.short_id, project.id, branch);
            self.events
                .publish(MonitorEvent::CommitDetected(DetectedCommit {
                    commit,
                    project: project.id.clone(),
                    branch: branch.to_string(),
                }));
        }
        self.events.publish(MonitorEvent::PollCompleted {
            project: project.id.clone(),
            branch: branch.to_string(),
            new_commits,
        });

        Ok(PollOutcome::Polled { new_commits })
    }
}

/// Releases a branch claimed by `begin_poll`
///
/// A poll that is cancelled or panics before settling counts as a failed
/// poll, so the branch can be polled again.
struct PollGuard<'a> {
    states: &'a Mutex<MonitorStateTable>,
    project: &'a str,
    branch: &'a str,
    settled: bool,
}

impl PollGuard<'_> {
    fn lock(&self) -> MutexGuard<'_, MonitorStateTable> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(mut self, newest: Option<String>) {
        self.lock().complete_poll(self.project, self.branch, newest);
        self.settled = true;
    }

    fn fail(mut self, error: String) -> u32 {
        let failures = self.lock().fail_poll(self.project, self.branch, error);
        self.settled = true;
        failures
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Poll of {}@{} was interrupted", self.project, self.branch);
        self.lock()
            .fail_poll(self.project, self.branch, "poll interrupted".to_string());
    }
}

#[derive(Debug, PartialEq)]
struct Selection {
    /// Oldest first
    commits: Vec<Commit>,
    baseline_missing: bool,
}

/// Pick the commits to emit from a newest-first page
fn select_new_commits(page: Vec<Commit>, baseline: Option<&str>, bulk_limit: usize) -> Selection {
    let (mut commits, baseline_missing) = match baseline {
        None => (page.into_iter().take(bulk_limit).collect::<Vec<_>>(), false),
        Some(sha) => match page.iter().position(|c| c.id == sha) {
            Some(index) => (page.into_iter().take(index).collect(), false),
            None => (page, true),
        },
    };
    commits.reverse();
    Selection {
        commits,
        baseline_missing,
    }
}

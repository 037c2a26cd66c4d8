//! Commit → merge request → issue → epic tracing

use crate::error::TraceError;
use crate::issue_table::IssueTable;
use crate::options::{CompletenessRule, HeuristicCompleteness, TraceOptions};
use crate::step::{StepTimer, TraceRun, TraceStep};
use crate::types::{
    BatchSummary, BatchTrace, ChainMetadata, CommitChain, MergeRequestLink, TraceFailure,
};
use async_trait::async_trait;
use chrono::Utc;
use glchain_client::{ApiError, Epic, EpicRef, GitLabClient};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Largest page the commit listing endpoint accepts
const MAX_PAGE_SIZE: usize = 100;

/// Anything that can turn a SHA into a [`CommitChain`]
///
/// The commit processor only depends on this, so it can be driven by a
/// fake in tests.
#[async_trait]
pub trait CommitTracer: Send + Sync {
    async fn trace_commit(&self, sha: &str, project: Option<&str>)
        -> Result<CommitChain, TraceError>;
}

/// Traces commits against a [`GitLabClient`]
///
/// The tracer holds no per-trace state; every call gets its own counters,
/// so one instance can serve many concurrent traces.
#[derive(Debug)]
pub struct ChainTracer<C: GitLabClient> {
    client: C,
    options: TraceOptions,
    default_project: Option<String>,
    completeness: Arc<dyn CompletenessRule>,
}

impl<C: GitLabClient> ChainTracer<C> {
    pub fn new(client: C, options: TraceOptions) -> Self {
        Self {
            client,
            options,
            default_project: None,
            completeness: Arc::new(HeuristicCompleteness),
        }
    }

    /// Project used when a call names none
    pub fn with_default_project(mut self, project: impl Into<String>) -> Self {
        self.default_project = Some(project.into());
        self
    }

    pub fn with_completeness_rule(mut self, rule: Arc<dyn CompletenessRule>) -> Self {
        self.completeness = rule;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> TraceOptions {
        self.options
    }

    fn resolve_project<'a>(&'a self, project: Option<&'a str>) -> Result<&'a str, TraceError> {
        project
            .or(self.default_project.as_deref())
            .ok_or(TraceError::NoProject)
    }

    /// Trace one commit
    ///
    /// Fails outright only when the commit cannot be fetched, or when a
    /// later lookup fails and `continue_on_error` is off. Epics that cannot
    /// be fetched always become stubs.
    pub async fn trace_commit(
        &self,
        sha: &str,
        project: Option<&str>,
    ) -> Result<CommitChain, TraceError> {
        let project = self.resolve_project(project)?;
        info!("Tracing commit {} in {}", sha, project);

        let traced_at = Utc::now();
        let mut run = TraceRun::new();

        // 1. The commit itself
        let timer = run.begin(TraceStep::FetchCommit);
        run.count_call();
        let commit = match self.client.fetch_commit(project, sha).await {
            Ok(commit) => {
                run.succeed(timer, format!("found {}", commit.title));
                commit
            }
            Err(source) => {
                run.fail(timer, "commit could not be fetched", &source);
                return Err(TraceError::CommitFetch {
                    sha: sha.to_string(),
                    source,
                    steps: run.steps,
                });
            }
        };

        // 2. Merge requests containing the commit
        let timer = run.begin(TraceStep::FetchMergeRequests);
        run.count_call();
        let merge_requests = match self.client.fetch_commit_merge_requests(project, sha).await {
            Ok(merge_requests) => {
                if merge_requests.is_empty() {
                    run.warn(format!("No merge requests found for commit {}", sha));
                }
                run.succeed(timer, format!("{} merge request(s)", merge_requests.len()));
                merge_requests
            }
            Err(source) => {
                if !self.options.continue_on_error {
                    return Err(abort(run, timer, sha, source));
                }
                let message = format!("Failed to fetch merge requests for {}: {}", sha, source);
                run.warn(message.clone());
                run.fail(timer, "merge request lookup failed", message);
                Vec::new()
            }
        };

        // 3. Issues each merge request closes
        let timer = run.begin(TraceStep::FetchClosingIssues);
        let mut errors = Vec::new();
        let mut links = Vec::with_capacity(merge_requests.len());
        for merge_request in merge_requests {
            run.count_call();
            let project_id = merge_request.project_id.to_string();
            let closes_issues = match self
                .client
                .fetch_closes_issues(&project_id, merge_request.iid)
                .await
            {
                Ok(issues) => issues,
                Err(source) => {
                    if !self.options.continue_on_error {
                        return Err(abort(run, timer, sha, source));
                    }
                    let message = format!(
                        "Failed to fetch closed issues of !{}: {}",
                        merge_request.iid, source
                    );
                    run.warn(message.clone());
                    errors.push(message);
                    Vec::new()
                }
            };
            links.push(MergeRequestLink {
                merge_request,
                closes_issues,
                contains_commit: true,
            });
        }
        let closing_total: usize = links.iter().map(|l| l.closes_issues.len()).sum();
        finish(
            &mut run,
            timer,
            format!("{} closed issue reference(s)", closing_total),
            &errors,
        );

        // 4. Deduplicate issues, optionally widening with related MRs
        let timer = run.begin(TraceStep::MergeIssues);
        let mut errors = Vec::new();
        let mut table = IssueTable::new();
        for link in &links {
            for issue in &link.closes_issues {
                table.insert_reference(issue.clone(), &link.merge_request);
            }
        }
        if self.options.follow_related_mrs {
            let keys: Vec<(u64, u64, u64)> = table
                .iter()
                .map(|l| (l.issue.id, l.issue.project_id, l.issue.iid))
                .collect();
            for (issue_id, project_id, iid) in keys {
                run.count_call();
                match self
                    .client
                    .fetch_related_merge_requests(&project_id.to_string(), iid)
                    .await
                {
                    Ok(related) => {
                        table.add_related(issue_id, related);
                    }
                    Err(source) => {
                        let message =
                            format!("Failed to fetch related merge requests of #{}: {}", iid, source);
                        run.warn(message.clone());
                        errors.push(message);
                    }
                }
            }
        }
        finish(
            &mut run,
            timer,
            format!("{} unique issue(s)", table.len()),
            &errors,
        );

        // 5. Full issues carry the epic reference
        let timer = run.begin(TraceStep::FetchFullIssues);
        if !self.options.include_epics {
            run.succeed(timer, "skipped: epics disabled");
        } else if table.is_empty() {
            run.succeed(timer, "skipped: no issues");
        } else {
            let mut errors = Vec::new();
            let keys: Vec<(u64, u64, u64)> = table
                .iter()
                .map(|l| (l.issue.id, l.issue.project_id, l.issue.iid))
                .collect();
            for (issue_id, project_id, iid) in keys {
                run.count_call();
                match self.client.fetch_issue(&project_id.to_string(), iid).await {
                    Ok(full) => {
                        table.replace_issue(issue_id, full);
                    }
                    Err(source) => {
                        let message = format!("Failed to fetch issue #{}: {}", iid, source);
                        run.warn(message.clone());
                        errors.push(message);
                    }
                }
            }
            finish(&mut run, timer, format!("{} issue(s) refreshed", table.len()), &errors);
        }

        // 6. Each distinct epic once
        let timer = run.begin(TraceStep::FetchEpics);
        let mut epics: Vec<Epic> = Vec::new();
        if !self.options.include_epics {
            run.succeed(timer, "skipped: epics disabled");
        } else {
            let mut errors = Vec::new();
            let mut resolved: HashMap<u64, usize> = HashMap::new();
            let references: Vec<(u64, EpicRef)> = table
                .iter()
                .filter_map(|l| l.epic_ref().map(|r| (l.issue.id, r.clone())))
                .collect();
            for (issue_id, reference) in references {
                if let Some(&slot) = resolved.get(&reference.id) {
                    table.set_epic(issue_id, epics[slot].clone());
                    continue;
                }
                run.count_call();
                let epic = match self
                    .client
                    .fetch_epic(&reference.group_id.to_string(), reference.iid)
                    .await
                {
                    Ok(epic) => epic,
                    Err(source) => {
                        let message = format!(
                            "Failed to fetch epic &{}, using a stub: {}",
                            reference.iid, source
                        );
                        run.warn(message.clone());
                        errors.push(message);
                        Epic::stub(&reference)
                    }
                };
                resolved.insert(reference.id, epics.len());
                table.set_epic(issue_id, epic.clone());
                epics.push(epic);
            }
            finish(&mut run, timer, format!("{} unique epic(s)", epics.len()), &errors);
        }

        // 7. Assemble
        let timer = run.begin(TraceStep::AssembleChain);
        let issues = table.into_links();
        let is_complete = self.completeness.is_complete(&links, &issues, &epics);
        run.succeed(
            timer,
            format!(
                "{} merge request(s), {} issue(s), {} epic(s), complete: {}",
                links.len(),
                issues.len(),
                epics.len(),
                is_complete
            ),
        );

        let metadata = ChainMetadata {
            traced_at,
            duration_ms: run.elapsed_ms(),
            api_calls: run.api_calls,
            is_complete,
            warnings: run.warnings,
            steps: run.steps,
        };
        info!(
            "Traced {} in {}ms with {} API call(s): {} MR(s), {} issue(s), {} epic(s)",
            sha,
            metadata.duration_ms,
            metadata.api_calls,
            links.len(),
            issues.len(),
            epics.len()
        );

        Ok(CommitChain {
            commit,
            merge_requests: links,
            issues,
            epics,
            metadata,
        })
    }

    /// Trace several commits one after another, collecting failures
    pub async fn trace_commits<S>(
        &self,
        shas: &[S],
        project: Option<&str>,
    ) -> Result<BatchTrace, TraceError>
    where
        S: AsRef<str> + Sync,
    {
        let project = self.resolve_project(project)?;
        let start = Instant::now();
        let mut chains = Vec::with_capacity(shas.len());
        let mut failures = Vec::new();

        for sha in shas {
            let sha = sha.as_ref();
            match self.trace_commit(sha, Some(project)).await {
                Ok(chain) => chains.push(chain),
                Err(e) => {
                    warn!("Failed to trace {}: {}", sha, e);
                    failures.push(TraceFailure {
                        sha: sha.to_string(),
                        error: e.to_string(),
                        status: e.status(),
                    });
                }
            }
        }

        let summary = BatchSummary {
            total: shas.len(),
            succeeded: chains.len(),
            failed: failures.len(),
            complete: chains.iter().filter(|c| c.metadata.is_complete).count(),
            api_calls: chains.iter().map(|c| c.metadata.api_calls).sum(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Batch trace finished: {}/{} succeeded, {} complete",
            summary.succeeded, summary.total, summary.complete
        );

        Ok(BatchTrace {
            chains,
            failures,
            summary,
        })
    }

    /// Trace the newest `count` commits of a branch (default branch if `None`)
    pub async fn trace_recent_commits(
        &self,
        count: usize,
        project: Option<&str>,
        branch: Option<&str>,
    ) -> Result<BatchTrace, TraceError> {
        let project = self.resolve_project(project)?;
        let per_page = count.clamp(1, MAX_PAGE_SIZE) as u32;

        let page = self
            .client
            .list_commits(project, branch, 1, per_page)
            .await
            .map_err(|source| TraceError::Listing {
                project: project.to_string(),
                source,
            })?;
        let shas: Vec<String> = page
            .items
            .into_iter()
            .take(count)
            .map(|c| c.id)
            .collect();
        debug!("Tracing {} recent commit(s) of {}", shas.len(), project);

        self.trace_commits(&shas, Some(project)).await
    }
}

#[async_trait]
impl<C: GitLabClient> CommitTracer for ChainTracer<C> {
    async fn trace_commit(
        &self,
        sha: &str,
        project: Option<&str>,
    ) -> Result<CommitChain, TraceError> {
        ChainTracer::trace_commit(self, sha, project).await
    }
}

/// Close a step that may have tolerated some failures
fn finish(run: &mut TraceRun, timer: StepTimer, result: String, errors: &[String]) {
    if errors.is_empty() {
        run.succeed(timer, result);
    } else {
        run.fail(timer, result, errors.join("; "));
    }
}

/// End the trace at a failed step
fn abort(mut run: TraceRun, timer: StepTimer, sha: &str, source: ApiError) -> TraceError {
    let step = timer.step();
    run.fail(timer, "aborted", &source);
    TraceError::Step {
        sha: sha.to_string(),
        step,
        source,
        steps: run.steps,
    }
}

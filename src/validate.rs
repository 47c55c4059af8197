//! Validation pipeline shared by the CLI and the HTTP service
//!
//! rules -> relevant paths -> change set -> agent -> result, under one deadline.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::info;

use crate::agent::{AgentContext, AgentRun, TaskValidatorAgent};
use crate::analysis_log::{AnalysisDetails, AnalysisLog, AnalysisLogger, Performance};
use crate::git::{self, Change, GitRepository, Vcs};
use crate::rules::TaskRules;

pub struct ValidationRequest {
    pub rules: TaskRules,
    pub repository_path: PathBuf,
    pub base_branch: String,
    /// Deadline for the whole run
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub git: Duration,
    pub ai: Duration,
    pub total: Duration,
}

pub struct ValidationOutcome {
    pub run: AgentRun,
    pub changes: Vec<Change>,
    pub branch_name: String,
    pub relevant_paths: Vec<String>,
    pub timings: Timings,
}

impl Timings {
    pub fn performance(&self) -> Performance {
        Performance {
            git_analysis_ms: self.git.as_millis() as u64,
            ai_analysis_ms: self.ai.as_millis() as u64,
            total_ms: self.total.as_millis() as u64,
        }
    }
}

impl ValidationOutcome {
    /// Write the audit trail for this run. Failures are logged, never fatal.
    pub fn write_logs(&self, logger: &AnalysisLogger, request: &ValidationRequest) {
        let task_id = &request.rules.task_id;
        logger.log_git_changes(&self.changes, &request.base_branch, &self.branch_name);
        logger.log_agent_prompt(&self.run.prompt, task_id);
        logger.log_agent_response(&self.run.raw_response, task_id);
        logger.log_analysis(&AnalysisLog {
            timestamp: Utc::now(),
            task_id,
            task_title: &request.rules.title,
            branch_name: &self.branch_name,
            base_branch: &request.base_branch,
            analysis_details: AnalysisDetails {
                rules_analyzed: &request.rules.rules,
                git_changes: &self.changes,
                agent_prompt: &self.run.prompt,
                agent_response: &self.run.raw_response,
                final_result: &self.run.result,
            },
            performance: self.timings.performance(),
        });
    }
}

struct ChangeSnapshot {
    branch_name: String,
    changes: Vec<Change>,
}

/// Run one validation, failing if it does not finish within the deadline
pub async fn run_validation(
    agent: &TaskValidatorAgent,
    request: &ValidationRequest,
) -> Result<ValidationOutcome> {
    tokio::time::timeout(request.timeout, validate(agent, request))
        .await
        .map_err(|_| anyhow!("validation timed out after {}s", request.timeout.as_secs()))?
}

async fn validate(
    agent: &TaskValidatorAgent,
    request: &ValidationRequest,
) -> Result<ValidationOutcome> {
    let started = Instant::now();
    let relevant_paths = request.rules.relevant_paths();
    if relevant_paths.is_empty() {
        info!("no relevant paths derived from rules; considering every change");
    } else {
        info!(paths = ?relevant_paths, "restricting analysis to relevant paths");
    }

    let snapshot = collect_snapshot(
        request.repository_path.clone(),
        request.base_branch.clone(),
        relevant_paths.clone(),
    )
    .await?;
    let git_elapsed = started.elapsed();

    let ai_started = Instant::now();
    let context = AgentContext {
        rules: &request.rules,
        changes: &snapshot.changes,
        repository_path: &request.repository_path,
        branch_name: &snapshot.branch_name,
    };
    let run = agent
        .validate_task(&context)
        .await
        .context("Rule analysis failed")?;

    Ok(ValidationOutcome {
        run,
        changes: snapshot.changes,
        branch_name: snapshot.branch_name,
        relevant_paths,
        timings: Timings {
            git: git_elapsed,
            ai: ai_started.elapsed(),
            total: started.elapsed(),
        },
    })
}

/// Branch name and change set, gathered on a blocking thread
async fn collect_snapshot(
    repository_path: PathBuf,
    base_branch: String,
    relevant_paths: Vec<String>,
) -> Result<ChangeSnapshot> {
    tokio::task::spawn_blocking(move || -> Result<ChangeSnapshot> {
        let repo = GitRepository::discover(&repository_path)?;
        let workdir = repo.working_dir()?;
        let branch_name = repo.current_branch_name()?;
        let changes =
            git::ChangeSetBuilder::new(&repo, &workdir).get_changes(&base_branch, &relevant_paths)?;
        Ok(ChangeSnapshot {
            branch_name,
            changes,
        })
    })
    .await
    .context("git worker panicked")?
    .context("Failed to collect git changes")
}

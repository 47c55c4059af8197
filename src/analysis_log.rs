//! Audit trail of validation runs
//!
//! Every write is best effort: a failure is logged and reported as `None`,
//! never as an error of the run itself.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::agent::ValidationResult;
use crate::git::{Change, ChangeType};
use crate::report::{file_name_part, file_timestamp};
use crate::rules::BusinessRule;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub git_analysis_ms: u64,
    pub ai_analysis_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDetails<'a> {
    pub rules_analyzed: &'a [BusinessRule],
    pub git_changes: &'a [Change],
    pub agent_prompt: &'a str,
    pub agent_response: &'a str,
    pub final_result: &'a ValidationResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLog<'a> {
    pub timestamp: DateTime<Utc>,
    pub task_id: &'a str,
    pub task_title: &'a str,
    pub branch_name: &'a str,
    pub base_branch: &'a str,
    pub analysis_details: AnalysisDetails<'a>,
    pub performance: Performance,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GitChangeEntry<'a> {
    file_path: &'a str,
    change_type: ChangeType,
    additions: usize,
    deletions: usize,
    diff: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GitChangesLog<'a> {
    timestamp: DateTime<Utc>,
    base_branch: &'a str,
    current_branch: &'a str,
    total_changes: usize,
    changes: Vec<GitChangeEntry<'a>>,
}

pub struct AnalysisLogger {
    log_dir: PathBuf,
}

impl AnalysisLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Full record of one run
    pub fn log_analysis(&self, log: &AnalysisLog<'_>) -> Option<PathBuf> {
        let name = format!("analysis-{}-{}.json", file_name_part(log.task_id), stamp());
        self.write_json(&name, log)
    }

    /// The change set handed to the analyzer (content omitted)
    pub fn log_git_changes(
        &self,
        changes: &[Change],
        base_branch: &str,
        current_branch: &str,
    ) -> Option<PathBuf> {
        let log = GitChangesLog {
            timestamp: Utc::now(),
            base_branch,
            current_branch,
            total_changes: changes.len(),
            changes: changes
                .iter()
                .map(|c| GitChangeEntry {
                    file_path: &c.file_path,
                    change_type: c.change_type,
                    additions: c.additions,
                    deletions: c.deletions,
                    diff: &c.diff,
                })
                .collect(),
        };
        let name = format!("git-changes-{}-{}.json", file_name_part(current_branch), stamp());
        self.write_json(&name, &log)
    }

    pub fn log_agent_prompt(&self, prompt: &str, task_id: &str) -> Option<PathBuf> {
        let name = format!("agent-prompt-{}-{}.txt", file_name_part(task_id), stamp());
        self.write(&name, prompt)
    }

    pub fn log_agent_response(&self, response: &str, task_id: &str) -> Option<PathBuf> {
        let name = format!("agent-response-{}-{}.json", file_name_part(task_id), stamp());
        self.write(&name, response)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Option<PathBuf> {
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.write(name, &json),
            Err(e) => {
                warn!(file = name, error = %e, "could not serialize analysis log");
                None
            }
        }
    }

    fn write(&self, name: &str, contents: &str) -> Option<PathBuf> {
        let path = self.log_dir.join(name);
        let written = fs::create_dir_all(&self.log_dir).and_then(|_| fs::write(&path, contents));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not write analysis log");
                None
            }
        }
    }
}

fn stamp() -> String {
    file_timestamp(Utc::now())
}

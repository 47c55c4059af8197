//! Task rules: the business rules a branch is validated against
//!
//! Rules are loaded from a JSON file (`task-rules.json` by default). Their
//! free-text criteria may name source paths, which narrow the set of
//! changed files worth showing to the analyzer.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rule priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// A single business rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRule {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// Free text, e.g. `api`, `security`, `controller`
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub implemented: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// Acceptance criteria; may mention paths such as `src/api/login.ts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<String>>,
}

/// The rule set for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRules {
    pub task_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<BusinessRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Categories that point at the API layer when no criterion names a path
const API_CATEGORIES: &[&str] = &["controller", "routes", "api"];

/// Folder assumed for API-layer rules
const API_FOLDER: &str = "src/api";

static SOURCE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"src/[^\s]+").unwrap());

impl TaskRules {
    /// Load rules from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid rules file {}", path.display()))
    }

    /// Path fragments the rules care about; empty means "all files".
    ///
    /// Each criterion contributes the first `src/...` token it contains.
    /// Without any such token, API-layer categories fall back to `src/api`.
    pub fn relevant_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();

        let criteria = self
            .rules
            .iter()
            .filter_map(|rule| rule.criteria.as_ref())
            .flatten();
        for criterion in criteria {
            if let Some(found) = SOURCE_PATH.find(criterion) {
                let found = found.as_str();
                if !paths.iter().any(|p| p == found) {
                    paths.push(found.to_string());
                }
            }
        }

        if paths.is_empty()
            && self
                .rules
                .iter()
                .any(|rule| API_CATEGORIES.contains(&rule.category.as_str()))
        {
            paths.push(API_FOLDER.to_string());
        }

        paths
    }

    /// Sample rule set written by `init`
    pub fn example() -> Self {
        let rule = |id: &str, category: &str, description: &str, priority: Priority| BusinessRule {
            id: id.to_string(),
            description: description.to_string(),
            priority,
            category: category.to_string(),
            implemented: false,
            confidence: 0.0,
            evidence: Some(String::new()),
            criteria: None,
        };
        let now = Utc::now();

        TaskRules {
            task_id: "TASK-001".to_string(),
            title: "Implement user authentication".to_string(),
            description: "Create user login and registration".to_string(),
            rules: vec![
                rule("AUTH-001", "api", "Implement the login endpoint", Priority::High),
                rule("AUTH-002", "api", "Implement the registration endpoint", Priority::High),
                rule(
                    "AUTH-003",
                    "security",
                    "Implement the authentication middleware",
                    Priority::Medium,
                ),
            ],
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

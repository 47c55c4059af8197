//! Validation result assembled from rules and model verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::response::AgentResponse;
use crate::rules::{BusinessRule, Priority, TaskRules};

/// Evidence recorded for rules the model did not mention
const NOT_ANALYSED: &str = "Rule was not analysed by the agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_rules: usize,
    pub implemented_count: usize,
    pub missing_count: usize,
    pub high_priority_missing: usize,
}

/// Outcome of validating one task on one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub task_id: String,
    pub branch_name: String,
    /// 0.0 to 1.0, as judged by the model
    pub completeness_score: f64,
    pub implemented_rules: Vec<BusinessRule>,
    pub missing_rules: Vec<BusinessRule>,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub summary: ValidationSummary,
}

impl ValidationResult {
    /// Split the rules into implemented and missing using the model verdicts
    pub fn from_analysis(rules: &TaskRules, branch_name: &str, response: &AgentResponse) -> Self {
        let mut implemented_rules = Vec::new();
        let mut missing_rules = Vec::new();

        for rule in &rules.rules {
            match response.analysis.iter().find(|a| a.rule_id == rule.id) {
                Some(analysis) => {
                    let updated = BusinessRule {
                        implemented: analysis.implemented,
                        confidence: analysis.confidence,
                        evidence: Some(analysis.evidence.clone()),
                        ..rule.clone()
                    };
                    if analysis.implemented {
                        implemented_rules.push(updated);
                    } else {
                        missing_rules.push(updated);
                    }
                }
                None => {
                    info!(rule = %rule.id, "rule has no analysis from the agent");
                    missing_rules.push(BusinessRule {
                        implemented: false,
                        confidence: 0.0,
                        evidence: Some(NOT_ANALYSED.to_string()),
                        ..rule.clone()
                    });
                }
            }
        }

        let summary = ValidationSummary {
            total_rules: rules.rules.len(),
            implemented_count: implemented_rules.len(),
            missing_count: missing_rules.len(),
            high_priority_missing: missing_rules
                .iter()
                .filter(|r| r.priority == Priority::High)
                .count(),
        };

        let result = Self {
            task_id: rules.task_id.clone(),
            branch_name: branch_name.to_string(),
            completeness_score: response.overall_completeness,
            implemented_rules,
            missing_rules,
            suggestions: response.general_suggestions.clone(),
            timestamp: Utc::now(),
            summary,
        };

        if result.is_inconsistent() {
            warn!(
                score = result.completeness_score,
                "high completeness score but no rule implemented"
            );
        }

        result
    }

    /// High score with nothing implemented usually means a confused model
    pub fn is_inconsistent(&self) -> bool {
        self.completeness_score > 0.8 && self.summary.implemented_count == 0
    }
}

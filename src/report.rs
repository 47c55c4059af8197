//! Validation reports
//!
//! Turns a `ValidationResult` into the JSON report stored on disk and
//! returned by the HTTP service.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::ValidationResult;
use crate::rules::{BusinessRule, Priority};

/// Scores below this are called out as weak
const LOW_SCORE: f64 = 0.5;

/// High-priority missing rules listed as next steps
const MAX_NEXT_STEPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_rules: usize,
    pub implemented_count: usize,
    pub missing_count: usize,
    pub high_priority_missing: usize,
    pub completeness_score: f64,
    /// Score as a percentage with one decimal, e.g. `62.5%`
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub task_id: String,
    pub branch_name: String,
    pub timestamp: DateTime<Utc>,
    pub summary: ReportSummary,
    pub implemented_rules: Vec<BusinessRule>,
    pub missing_rules: Vec<BusinessRule>,
    pub suggestions: Vec<String>,
    pub analysis: ReportAnalysis,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityBreakdown {
    pub total: usize,
    pub implemented: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEntry {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub implemented: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub total: usize,
    pub implemented: usize,
    pub missing: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByPriority {
    pub high: PriorityBreakdown,
    pub medium: PriorityBreakdown,
    pub low: PriorityBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesBreakdown {
    pub by_priority: ByPriority,
    pub by_category: BTreeMap<String, CategoryBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub validator_version: String,
    /// Wall-clock time of the run in milliseconds, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedReport {
    #[serde(flatten)]
    pub report: Report,
    pub metadata: ReportMetadata,
    pub rules_breakdown: RulesBreakdown,
}

impl Report {
    pub fn from_result(result: &ValidationResult) -> Self {
        Self {
            task_id: result.task_id.clone(),
            branch_name: result.branch_name.clone(),
            timestamp: result.timestamp,
            summary: ReportSummary {
                total_rules: result.summary.total_rules,
                implemented_count: result.summary.implemented_count,
                missing_count: result.summary.missing_count,
                high_priority_missing: result.summary.high_priority_missing,
                completeness_score: result.completeness_score,
                percentage: format!("{:.1}%", result.completeness_score * 100.0),
            },
            implemented_rules: result.implemented_rules.clone(),
            missing_rules: result.missing_rules.clone(),
            suggestions: result.suggestions.clone(),
            analysis: analyze(result),
        }
    }
}

fn analyze(result: &ValidationResult) -> ReportAnalysis {
    let mut analysis = ReportAnalysis::default();
    let high = |rules: &[BusinessRule]| {
        rules
            .iter()
            .filter(|r| r.priority == Priority::High)
            .count()
    };

    if !result.implemented_rules.is_empty() {
        analysis.strengths.push(format!(
            "{} rules implemented",
            result.implemented_rules.len()
        ));
        let high_done = high(&result.implemented_rules);
        if high_done > 0 {
            analysis
                .strengths
                .push(format!("{high_done} high-priority rules implemented"));
        }
    }

    if !result.missing_rules.is_empty() {
        analysis
            .weaknesses
            .push(format!("{} rules not implemented", result.missing_rules.len()));
        let high_missing = high(&result.missing_rules);
        if high_missing > 0 {
            analysis
                .weaknesses
                .push(format!("{high_missing} high-priority rules pending"));
        }
    }

    if result.completeness_score < LOW_SCORE {
        analysis
            .weaknesses
            .push("Low completeness score (< 50%)".to_string());
    }

    for rule in result
        .missing_rules
        .iter()
        .filter(|r| r.priority == Priority::High)
        .take(MAX_NEXT_STEPS)
    {
        analysis
            .next_steps
            .push(format!("Implement: {}", rule.description));
    }
    analysis
        .next_steps
        .extend(result.suggestions.iter().cloned());

    analysis
}

impl DetailedReport {
    pub fn from_result(result: &ValidationResult, duration_ms: Option<u64>) -> Self {
        Self {
            report: Report::from_result(result),
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                validator_version: env!("CARGO_PKG_VERSION").to_string(),
                validation_duration_ms: duration_ms,
            },
            rules_breakdown: RulesBreakdown {
                by_priority: ByPriority {
                    high: priority_breakdown(result, Priority::High),
                    medium: priority_breakdown(result, Priority::Medium),
                    low: priority_breakdown(result, Priority::Low),
                },
                by_category: category_breakdown(result),
            },
        }
    }
}

fn priority_breakdown(result: &ValidationResult, priority: Priority) -> PriorityBreakdown {
    let count = |rules: &[BusinessRule]| rules.iter().filter(|r| r.priority == priority).count();
    let implemented = count(&result.implemented_rules);
    let missing = count(&result.missing_rules);
    PriorityBreakdown {
        total: implemented + missing,
        implemented,
        missing,
    }
}

fn category_breakdown(result: &ValidationResult) -> BTreeMap<String, CategoryBreakdown> {
    let mut categories: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();

    for rule in result.implemented_rules.iter().chain(&result.missing_rules) {
        let entry = categories.entry(rule.category.clone()).or_default();
        entry.total += 1;
        if rule.implemented {
            entry.implemented += 1;
        } else {
            entry.missing += 1;
        }
        entry.rules.push(RuleEntry {
            id: rule.id.clone(),
            description: rule.description.clone(),
            priority: rule.priority,
            implemented: rule.implemented,
            confidence: rule.confidence,
            evidence: rule.evidence.clone(),
        });
    }

    categories
}

/// Writes reports into an output directory
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Save a summary report; returns the file written
    pub fn save_report(&self, report: &Report) -> Result<PathBuf> {
        let name = format!(
            "validation-report-{}-{}.json",
            file_name_part(&report.task_id),
            file_timestamp(Utc::now())
        );
        self.write_json(&name, report)
    }

    /// Save a detailed report; returns the file written
    pub fn save_detailed_report(&self, report: &DetailedReport) -> Result<PathBuf> {
        let name = format!(
            "detailed-validation-{}-{}.json",
            file_name_part(&report.report.task_id),
            file_timestamp(Utc::now())
        );
        self.write_json(&name, report)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create report directory {}", self.output_dir.display())
        })?;

        let path = self.output_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        info!(path = %path.display(), "validation report saved");
        Ok(path)
    }
}

/// Task ids and branch names like `feature/x` must not create subdirectories
pub fn file_name_part(part: &str) -> String {
    part.replace(['/', '\\'], "-")
}

/// Filesystem-safe timestamp, e.g. `2026-10-19T08-30-00-123Z`
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::result::ValidationSummary;
    use chrono::TimeZone;

    fn rule(id: &str, category: &str, priority: Priority, implemented: bool) -> BusinessRule {
        BusinessRule {
            id: id.to_string(),
            description: format!("Do {id}"),
            priority,
            category: category.to_string(),
            implemented,
            confidence: if implemented { 0.9 } else { 0.1 },
            evidence: Some("seen".to_string()),
            criteria: None,
        }
    }

    fn result(score: f64) -> ValidationResult {
        let implemented = vec![rule("A", "api", Priority::High, true)];
        let missing = vec![
            rule("B", "api", Priority::High, false),
            rule("C", "security", Priority::Medium, false),
            rule("D", "ui", Priority::High, false),
            rule("E", "ui", Priority::High, false),
            rule("F", "ui", Priority::High, false),
        ];
        ValidationResult {
            task_id: "TASK-1".to_string(),
            branch_name: "feature/x".to_string(),
            completeness_score: score,
            summary: ValidationSummary {
                total_rules: 6,
                implemented_count: 1,
                missing_count: 5,
                high_priority_missing: 4,
            },
            implemented_rules: implemented,
            missing_rules: missing,
            suggestions: vec!["Add integration tests".to_string()],
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_report_summary_and_analysis() {
        let report = Report::from_result(&result(0.375));

        assert_eq!(report.summary.percentage, "37.5%");
        assert_eq!(report.summary.high_priority_missing, 4);
        assert_eq!(
            report.analysis.strengths,
            vec!["1 rules implemented", "1 high-priority rules implemented"]
        );
        assert_eq!(
            report.analysis.weaknesses,
            vec![
                "5 rules not implemented",
                "4 high-priority rules pending",
                "Low completeness score (< 50%)",
            ]
        );
        // Three high-priority rules at most, then the suggestions
        assert_eq!(
            report.analysis.next_steps,
            vec!["Implement: Do B", "Implement: Do D", "Implement: Do E", "Add integration tests"]
        );
    }

    #[test]
    fn test_good_score_is_not_a_weakness() {
        let report = Report::from_result(&result(0.8));
        assert!(!report
            .analysis
            .weaknesses
            .iter()
            .any(|w| w.starts_with("Low completeness")));
    }

    #[test]
    fn test_detailed_breakdowns() {
        let detailed = DetailedReport::from_result(&result(0.5), Some(1200));
        let breakdown = &detailed.rules_breakdown;

        assert_eq!(
            breakdown.by_priority.high,
            PriorityBreakdown {
                total: 5,
                implemented: 1,
                missing: 4,
            }
        );
        assert_eq!(breakdown.by_priority.low, PriorityBreakdown::default());

        let api = &breakdown.by_category["api"];
        assert_eq!((api.total, api.implemented, api.missing), (2, 1, 1));
        assert_eq!(breakdown.by_category["ui"].rules.len(), 3);
        assert_eq!(detailed.metadata.validation_duration_ms, Some(1200));
    }

    #[test]
    fn test_detailed_report_flattens_base_fields() {
        let detailed = DetailedReport::from_result(&result(0.5), None);
        let json = serde_json::to_value(&detailed).unwrap();

        assert_eq!(json["taskId"], "TASK-1");
        assert_eq!(json["summary"]["percentage"], "50.0%");
        assert!(json["rulesBreakdown"]["byCategory"]["security"].is_object());
        assert!(json["metadata"].get("validationDurationMs").is_none());
    }

    #[test]
    fn test_writer_creates_directory_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports"));

        let report = Report::from_result(&result(0.5));
        let path = writer.save_report(&report).unwrap();
        assert_eq!(path.parent().unwrap(), dir.path().join("reports"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("validation-report-TASK-1-"));

        let saved: Report = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, report);

        let detailed = writer
            .save_detailed_report(&DetailedReport::from_result(&result(0.5), None))
            .unwrap();
        assert!(detailed
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("detailed-validation-TASK-1-"));
    }

    #[test]
    fn test_task_id_with_separators_stays_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let writer = ReportWriter::new(&reports);

        for task_id in ["TEAM/42", "../x", "a\\b"] {
            let mut res = result(0.5);
            res.task_id = task_id.to_string();

            let path = writer.save_report(&Report::from_result(&res)).unwrap();
            assert_eq!(path.parent().unwrap(), reports);

            let detailed = writer
                .save_detailed_report(&DetailedReport::from_result(&res, None))
                .unwrap();
            assert_eq!(detailed.parent().unwrap(), reports);
        }

        let names: Vec<String> = fs::read_dir(&reports)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("validation-report-TEAM-42-")));
        assert!(names.iter().any(|n| n.starts_with("detailed-validation-..-x-")));
    }

    #[test]
    fn test_file_name_part() {
        assert_eq!(file_name_part("feature/x"), "feature-x");
        assert_eq!(file_name_part("TASK-1"), "TASK-1");
    }

    #[test]
    fn test_file_timestamp_has_no_colons() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        assert_eq!(file_timestamp(at), "2026-10-19T08-30-00-000Z");
    }
}

//! Parsing of the model's JSON answer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Verdict for one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAnalysis {
    pub rule_id: String,
    #[serde(default)]
    pub implemented: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Whole analysis as returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub analysis: Vec<RuleAnalysis>,
    pub overall_completeness: f64,
    #[serde(default)]
    pub general_suggestions: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl AgentResponse {
    /// Zero-confidence answer used when the model output is unusable
    pub fn unparsable() -> Self {
        Self {
            analysis: Vec::new(),
            overall_completeness: 0.0,
            general_suggestions: vec![
                "Could not process the agent response. Check the logs.".to_string(),
            ],
            summary: "Analysis failed because the agent response could not be parsed.".to_string(),
        }
    }
}

/// Parse model output, tolerating markdown code fences.
///
/// Never fails: output without an `analysis` array or a numeric
/// `overallCompleteness` yields `AgentResponse::unparsable()`.
pub fn parse_agent_response(content: &str) -> AgentResponse {
    match try_parse(content) {
        Ok(parsed) => {
            debug!(
                analysis = parsed.analysis.len(),
                completeness = parsed.overall_completeness,
                "parsed agent response"
            );
            parsed
        }
        Err(reason) => {
            warn!(%reason, preview = %preview(content), "unusable agent response");
            AgentResponse::unparsable()
        }
    }
}

fn try_parse(content: &str) -> Result<AgentResponse, String> {
    let cleaned = strip_code_fences(content);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| format!("invalid JSON: {e}"))?;

    if !value.get("analysis").is_some_and(Value::is_array) {
        return Err("missing or invalid analysis array".to_string());
    }
    if !value.get("overallCompleteness").is_some_and(Value::is_number) {
        return Err("missing or invalid overallCompleteness".to_string());
    }

    serde_json::from_value(value).map_err(|e| format!("unexpected shape: {e}"))
}

fn strip_code_fences(content: &str) -> String {
    content
        .replace("```json\n", "")
        .replace("```json", "")
        .replace("```\n", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn preview(content: &str) -> String {
    content.chars().take(200).collect()
}

//! Task validation agent

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::prompt::build_validation_prompt;
use super::response::parse_agent_response;
use super::result::ValidationResult;
use super::{AgentError, Analyzer};
use crate::git::Change;
use crate::rules::TaskRules;

/// What the agent needs to judge a task
pub struct AgentContext<'a> {
    pub rules: &'a TaskRules,
    pub changes: &'a [Change],
    pub repository_path: &'a Path,
    pub branch_name: &'a str,
}

/// Result plus the raw exchange with the model, kept for the audit log
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub result: ValidationResult,
    pub prompt: String,
    pub raw_response: String,
}

/// Drives one analyzer: prompt, bounded retries, parse, result
pub struct TaskValidatorAgent {
    analyzer: Box<dyn Analyzer>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TaskValidatorAgent {
    pub fn new(analyzer: Box<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Total attempts per request (at least one)
    #[cfg(test)]
    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Ask the model which rules the changes implement.
    ///
    /// Transport failures are retried and then returned. An unusable answer
    /// is not an error: it produces a zero-confidence result.
    pub async fn validate_task(&self, context: &AgentContext<'_>) -> Result<AgentRun, AgentError> {
        info!(
            task = %context.rules.task_id,
            repository = %context.repository_path.display(),
            "starting validation"
        );

        let prompt = build_validation_prompt(context.rules, context.branch_name, context.changes);
        info!(
            analyzer = self.analyzer.name(),
            prompt_len = prompt.len(),
            rules = context.rules.rules.len(),
            changes = context.changes.len(),
            "sending prompt"
        );

        let raw_response = self.complete_with_retries(&prompt).await?;
        info!(response_len = raw_response.len(), "agent response received");

        let response = parse_agent_response(&raw_response);
        let result = ValidationResult::from_analysis(context.rules, context.branch_name, &response);

        info!(
            task = %result.task_id,
            score = result.completeness_score,
            implemented = result.summary.implemented_count,
            missing = result.summary.missing_count,
            "validation completed"
        );

        Ok(AgentRun {
            result,
            prompt,
            raw_response,
        })
    }

    async fn complete_with_retries(&self, prompt: &str) -> Result<String, AgentError> {
        let mut attempt = 1;
        loop {
            match self.analyzer.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(AgentError::MissingApiKey) => return Err(AgentError::MissingApiKey),
                Err(e) if attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "model request failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BusinessRule, Priority};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned outcomes in order and records prompts
    struct ScriptedAnalyzer {
        outcomes: Mutex<Vec<Result<String, AgentError>>>,
        prompts: std::sync::Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedAnalyzer {
        fn new(outcomes: Vec<Result<String, AgentError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                prompts: Default::default(),
            }
        }
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.outcomes.lock().unwrap().remove(0)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn rules() -> TaskRules {
        TaskRules {
            task_id: "TASK-1".to_string(),
            title: "Login".to_string(),
            description: "Add login".to_string(),
            rules: vec![BusinessRule {
                id: "AUTH-001".to_string(),
                description: "Login endpoint".to_string(),
                priority: Priority::High,
                category: "api".to_string(),
                implemented: false,
                confidence: 0.0,
                evidence: None,
                criteria: None,
            }],
            created_at: None,
            updated_at: None,
        }
    }

    const GOOD: &str = r#"{"analysis":[{"ruleId":"AUTH-001","implemented":true,"confidence":0.9,"evidence":"POST /login"}],"overallCompleteness":0.9,"generalSuggestions":[],"summary":"done"}"#;

    #[tokio::test]
    async fn test_validate_task_uses_model_verdicts() {
        let analyzer = ScriptedAnalyzer::new(vec![Ok(GOOD.to_string())]);
        let prompts = analyzer.prompts.clone();
        let agent = TaskValidatorAgent::new(Box::new(analyzer));
        let rules = rules();
        let context = AgentContext {
            rules: &rules,
            changes: &[],
            repository_path: Path::new("."),
            branch_name: "feature/login",
        };

        let run = agent.validate_task(&context).await.unwrap();

        assert_eq!(run.result.summary.implemented_count, 1);
        assert_eq!(run.result.completeness_score, 0.9);
        assert_eq!(run.raw_response, GOOD);
        assert_eq!(prompts.lock().unwrap().as_slice(), &[run.prompt.clone()]);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let analyzer = ScriptedAnalyzer::new(vec![
            Err(AgentError::Transport("reset".to_string())),
            Ok(GOOD.to_string()),
        ]);
        let agent = TaskValidatorAgent::new(Box::new(analyzer)).with_retries(2, Duration::ZERO);
        let rules = rules();
        let context = AgentContext {
            rules: &rules,
            changes: &[],
            repository_path: Path::new("."),
            branch_name: "main",
        };

        let run = agent.validate_task(&context).await.unwrap();
        assert_eq!(run.result.summary.implemented_count, 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let analyzer = ScriptedAnalyzer::new(vec![
            Err(AgentError::Transport("one".to_string())),
            Err(AgentError::Api {
                status: 503,
                body: "busy".to_string(),
            }),
        ]);
        let agent = TaskValidatorAgent::new(Box::new(analyzer)).with_retries(2, Duration::ZERO);
        let rules = rules();
        let context = AgentContext {
            rules: &rules,
            changes: &[],
            repository_path: Path::new("."),
            branch_name: "main",
        };

        let err = agent.validate_task(&context).await.unwrap_err();
        assert!(matches!(err, AgentError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unparsable_answer_is_not_an_error() {
        let analyzer = ScriptedAnalyzer::new(vec![Ok("sorry, no JSON today".to_string())]);
        let agent = TaskValidatorAgent::new(Box::new(analyzer));
        let rules = rules();
        let context = AgentContext {
            rules: &rules,
            changes: &[],
            repository_path: Path::new("."),
            branch_name: "main",
        };

        let run = agent.validate_task(&context).await.unwrap();
        assert_eq!(run.result.completeness_score, 0.0);
        assert_eq!(run.result.summary.missing_count, 1);
        assert_eq!(run.result.implemented_rules.len(), 0);
    }
}

use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::agent::TaskValidatorAgent;
use crate::analysis_log::AnalysisLogger;
use crate::config::{API_KEY_ENV_VARS, DEFAULT_BRANCH};
use crate::report::{DetailedReport, Report, ReportWriter};
use crate::rules::TaskRules;
use crate::validate::{ValidationOutcome, ValidationRequest, run_validation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ReportType {
    #[default]
    Detailed,
    Summary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ValidateBody {
    rules: TaskRules,
    repository_path: Option<PathBuf>,
    #[serde(default = "default_branch")]
    base_branch: String,
    #[serde(default)]
    report_type: ReportType,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedReport<'a> {
    #[serde(flatten)]
    report: &'a Report,
    report_path: String,
}

enum ApiError {
    NotConfigured,
    Failed(anyhow::Error),
}

impl ApiError {
    fn respond(self, message: &str) -> Response {
        match self {
            ApiError::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("{} not configured", API_KEY_ENV_VARS[0]),
                })),
            )
                .into_response(),
            ApiError::Failed(e) => {
                error!(error = %format!("{e:#}"), "{message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "message": message,
                        "error": format!("{e:#}"),
                    })),
                )
                    .into_response()
            }
        }
    }
}

pub(super) async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "message": "Task Validator is running",
        "timestamp": Utc::now(),
        "uptime": state.started.elapsed().as_secs_f64(),
        "environment": state.settings.environment,
    }))
}

pub(super) async fn ready(State(state): State<AppState>) -> Response {
    if state.settings.api_key.is_none() {
        tracing::warn!("readiness probe failed: no API key");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "message": "Service not ready",
                "missingEnvironmentVariables": [API_KEY_ENV_VARS[0]],
            })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "message": "Service is ready",
        "timestamp": Utc::now(),
    }))
    .into_response()
}

pub(super) async fn validate(
    State(state): State<AppState>,
    payload: Result<Json<ValidateBody>, JsonRejection>,
) -> Response {
    const FAILED: &str = "Error during validation";

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return invalid_body(rejection),
    };
    let outcome = match execute(&state, body).await {
        Ok(done) => done,
        Err(e) => return e.respond(FAILED),
    };

    let result = &outcome.run.result;
    let detailed =
        DetailedReport::from_result(result, Some(outcome.timings.total.as_millis() as u64));
    let saved = ReportWriter::new(&state.settings.output_dir).save_detailed_report(&detailed);
    let report_path = match saved {
        Ok(path) => path,
        Err(e) => return ApiError::Failed(e).respond(FAILED),
    };

    Json(json!({
        "success": true,
        "data": result,
        "report": {
            "summary": detailed.report.summary,
            "analysis": detailed.report.analysis,
            "reportPath": report_path.display().to_string(),
        },
    }))
    .into_response()
}

pub(super) async fn report(
    State(state): State<AppState>,
    payload: Result<Json<ValidateBody>, JsonRejection>,
) -> Response {
    const FAILED: &str = "Error generating report";

    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return invalid_body(rejection),
    };
    let report_type = body.report_type;
    let outcome = match execute(&state, body).await {
        Ok(done) => done,
        Err(e) => return e.respond(FAILED),
    };

    let result = &outcome.run.result;
    let writer = ReportWriter::new(&state.settings.output_dir);
    let report = Report::from_result(result);
    let saved = match report_type {
        ReportType::Detailed => writer.save_detailed_report(&DetailedReport::from_result(
            result,
            Some(outcome.timings.total.as_millis() as u64),
        )),
        ReportType::Summary => writer.save_report(&report),
    };
    let report_path = match saved {
        Ok(path) => path,
        Err(e) => return ApiError::Failed(e).respond(FAILED),
    };

    Json(json!({
        "success": true,
        "report": SavedReport {
            report: &report,
            report_path: report_path.display().to_string(),
        },
    }))
    .into_response()
}

fn invalid_body(rejection: JsonRejection) -> Response {
    (
        rejection.status(),
        Json(json!({
            "success": false,
            "message": "Invalid request body",
            "error": rejection.body_text(),
        })),
    )
        .into_response()
}

pub(super) async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Route not found",
            "path": uri.path(),
        })),
    )
        .into_response()
}

/// Run the pipeline for a request body and write the audit logs
async fn execute(
    state: &AppState,
    body: ValidateBody,
) -> Result<ValidationOutcome, ApiError> {
    let api_key = state
        .settings
        .api_key
        .as_deref()
        .ok_or(ApiError::NotConfigured)?;
    let analyzer = (state.analyzers)(api_key).map_err(|e| ApiError::Failed(e.into()))?;
    let agent = TaskValidatorAgent::new(analyzer);

    let repository_path = match body.repository_path {
        Some(path) => path,
        None => std::env::current_dir().map_err(|e| ApiError::Failed(e.into()))?,
    };
    let request = ValidationRequest {
        rules: body.rules,
        repository_path,
        base_branch: body.base_branch,
        timeout: state.settings.timeout,
    };

    let outcome = run_validation(&agent, &request)
        .await
        .map_err(ApiError::Failed)?;
    outcome.write_logs(&AnalysisLogger::new(&state.settings.log_dir), &request);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::super::{AnalyzerFactory, ServerSettings, build_router};
    use super::*;
    use crate::agent::{AgentError, Analyzer};
    use crate::git::testutil::TestRepo;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedAnalyzer;

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn complete(&self, _prompt: &str) -> Result<String, AgentError> {
            Ok(r#"```json
{"analysis":[{"ruleId":"API-1","implemented":true,"confidence":0.9,"evidence":"src/api/b.ts"},
{"ruleId":"API-2","implemented":false,"confidence":0.7,"evidence":"no tests","suggestion":"add tests"}],
"overallCompleteness":0.5,"generalSuggestions":["write tests"],"summary":"half done"}
```"#
                .to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Harness {
        base: String,
        scratch: TempDir,
        repo: TestRepo,
    }

    async fn start(api_key: Option<&str>) -> Harness {
        let scratch = tempfile::tempdir().unwrap();
        let settings = ServerSettings {
            api_key: api_key.map(str::to_string),
            model: "test".to_string(),
            output_dir: scratch.path().join("reports"),
            log_dir: scratch.path().join("logs"),
            timeout: Duration::from_secs(30),
            environment: "test".to_string(),
        };
        let factory: AnalyzerFactory = Arc::new(|_key: &str| {
            let analyzer: Box<dyn Analyzer> = Box::new(FixedAnalyzer);
            Ok(analyzer)
        });
        let app = build_router(AppState::with_analyzer_factory(settings, factory));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let repo = TestRepo::init();
        repo.write("src/api/a.ts", "a\n");
        repo.commit_all("base");
        repo.checkout_new_branch("feature/api");
        repo.write("src/api/b.ts", "one\ntwo\n");

        Harness {
            base: format!("http://{addr}"),
            scratch,
            repo,
        }
    }

    fn body(repo: &TestRepo) -> Value {
        json!({
            "rules": {
                "taskId": "TASK-9",
                "title": "API",
                "rules": [
                    { "id": "API-1", "description": "b endpoint", "priority": "high", "category": "api" },
                    { "id": "API-2", "description": "tests", "priority": "high", "category": "api" }
                ]
            },
            "repositoryPath": repo.path(),
        })
    }

    fn files(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_health() {
        let h = start(None).await;
        let res = reqwest::get(format!("{}/api/health", h.base)).await.unwrap();
        assert_eq!(res.status(), 200);

        let json: Value = res.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["environment"], "test");
        assert!(json["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_ready_requires_api_key() {
        let h = start(None).await;
        let res = reqwest::get(format!("{}/api/health/ready", h.base)).await.unwrap();
        assert_eq!(res.status(), 503);
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["missingEnvironmentVariables"][0], "GOOGLE_AI_API_KEY");

        let h = start(Some("key")).await;
        let res = reqwest::get(format!("{}/api/health/ready", h.base)).await.unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let h = start(None).await;
        let res = reqwest::get(format!("{}/api/nope", h.base)).await.unwrap();
        assert_eq!(res.status(), 404);
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["path"], "/api/nope");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let h = start(Some("key")).await;
        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/validate", h.base))
            .json(&json!({ "rules": { "title": "no id" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 422);

        let json: Value = res.json().await.unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Invalid request body");
        assert!(json["error"].as_str().unwrap().contains("taskId"));

        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/report", h.base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_validate_without_key_fails() {
        let h = start(None).await;
        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/validate", h.base))
            .json(&body(&h.repo))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 500);
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "GOOGLE_AI_API_KEY not configured");
    }

    #[tokio::test]
    async fn test_validate_returns_result_and_saves_detailed_report() {
        let h = start(Some("key")).await;
        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/validate", h.base))
            .json(&body(&h.repo))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);

        let json: Value = res.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["branchName"], "feature/api");
        assert_eq!(json["data"]["summary"]["implementedCount"], 1);
        assert_eq!(json["data"]["summary"]["highPriorityMissing"], 1);
        assert_eq!(json["report"]["summary"]["percentage"], "50.0%");

        let reports = files(&h.scratch.path().join("reports"));
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("detailed-validation-TASK-9-"));
        assert!(json["report"]["reportPath"]
            .as_str()
            .unwrap()
            .ends_with(&reports[0]));

        assert_eq!(files(&h.scratch.path().join("logs")).len(), 4);
    }

    #[tokio::test]
    async fn test_summary_report() {
        let h = start(Some("key")).await;
        let mut request = body(&h.repo);
        request["reportType"] = json!("summary");

        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/report", h.base))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);

        let json: Value = res.json().await.unwrap();
        assert_eq!(json["report"]["taskId"], "TASK-9");
        assert_eq!(json["report"]["missingRules"][0]["id"], "API-2");
        assert!(json["report"]["reportPath"].is_string());

        let reports = files(&h.scratch.path().join("reports"));
        assert!(reports[0].starts_with("validation-report-TASK-9-"));
    }

    #[tokio::test]
    async fn test_validation_failure_is_500() {
        let h = start(Some("key")).await;
        let mut request = body(&h.repo);
        request["baseBranch"] = json!("does-not-exist");

        let res = reqwest::Client::new()
            .post(format!("{}/api/validation/validate", h.base))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 500);

        let json: Value = res.json().await.unwrap();
        assert_eq!(json["message"], "Error during validation");
        assert!(json["error"].as_str().unwrap().contains("does-not-exist"));
    }
}

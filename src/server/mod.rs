//! HTTP service
//!
//! Health probes plus the validation endpoints, sharing the pipeline used by
//! the CLI. Every response body is JSON, including malformed-request errors.

mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tracing::info;

use crate::agent::{AgentError, Analyzer, GeminiAnalyzer};

pub const DEFAULT_PORT: u16 = 3001;

/// Largest accepted request body
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Builds an analyzer for an API key
pub type AnalyzerFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn Analyzer>, AgentError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub timeout: Duration,
    /// Reported by the health probe
    pub environment: String,
}

#[derive(Clone)]
pub struct AppState {
    settings: Arc<ServerSettings>,
    analyzers: AnalyzerFactory,
    started: Instant,
}

impl AppState {
    /// State backed by the Gemini analyzer for the configured model
    pub fn new(settings: ServerSettings) -> Self {
        let model = settings.model.clone();
        let factory: AnalyzerFactory = Arc::new(move |api_key: &str| {
            let analyzer: Box<dyn Analyzer> = Box::new(GeminiAnalyzer::new(api_key, &model)?);
            Ok(analyzer)
        });
        Self::with_analyzer_factory(settings, factory)
    }

    pub fn with_analyzer_factory(settings: ServerSettings, analyzers: AnalyzerFactory) -> Self {
        Self {
            settings: Arc::new(settings),
            analyzers,
            started: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/health/ready", get(routes::ready))
        .route("/api/validation/validate", post(routes::validate))
        .route("/api/validation/report", post(routes::report))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Serve until Ctrl-C
pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    if state.settings.api_key.is_none() {
        tracing::warn!("no API key configured; validation requests will fail");
    }
    info!(%addr, environment = %state.settings.environment, "task validator listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("Server error")
}

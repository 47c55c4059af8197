//! task-validator - check a branch against a task's business rules
//!
//! Collects the changes a branch makes relative to its base (commits plus
//! uncommitted work), asks a language model which rules they implement, and
//! writes a JSON report.
//!
//! # Usage
//!
//! ```bash
//! task-validator init                      # Write an example task-rules.json
//! task-validator config --api-key <key>    # Store the Google AI key
//! task-validator changes -b main           # Print the change set as JSON
//! task-validator validate -b main          # Validate the current branch
//! task-validator serve --port 3001         # Run the HTTP service
//! ```

mod agent;
mod analysis_log;
mod config;
mod git;
mod report;
mod rules;
mod server;
mod validate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use agent::{GeminiAnalyzer, TaskValidatorAgent, ValidationResult};
use analysis_log::AnalysisLogger;
use config::{CliConfig, mask_api_key};
use report::{DetailedReport, ReportWriter};
use rules::TaskRules;
use server::{AppState, ServerSettings};
use validate::{ValidationRequest, run_validation};

/// Validate task completion from git changes
#[derive(Parser, Debug)]
#[command(name = "task-validator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TASK_VALIDATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change the stored configuration
    Config {
        /// Google AI API key
        #[arg(long)]
        api_key: Option<String>,

        /// Branch to compare against by default
        #[arg(long)]
        default_branch: Option<String>,

        /// Directory for reports
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Rules file used when --rules is not given
        #[arg(long)]
        rules_file: Option<PathBuf>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Print the current configuration
        #[arg(long)]
        show: bool,

        /// Delete the configuration file
        #[arg(long)]
        clear: bool,
    },

    /// Write an example rules file
    Init {
        /// Where to write it (defaults to the configured rules file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the change set against a base branch as JSON
    Changes {
        /// Base branch (defaults to the configured branch)
        #[arg(short, long)]
        base_branch: Option<String>,

        /// Repository path
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Restrict to paths derived from this rules file
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Validate the current branch against the task rules
    Validate {
        /// Base branch (defaults to the configured branch)
        #[arg(short, long)]
        base_branch: Option<String>,

        /// Report directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Google AI API key
        #[arg(short = 'k', long)]
        api_key: Option<String>,

        /// Rules file (defaults to the configured one)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Repository path
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Send the request to a running service instead
        #[arg(long)]
        server: Option<String>,
    },

    /// Run the HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value_t = server::DEFAULT_PORT)]
        port: u16,

        /// Google AI API key
        #[arg(short = 'k', long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(matches!(args.command, Command::Serve { .. }));

    let config_path = match args.config {
        Some(path) => path,
        None => config::config_path().context("Cannot determine the config directory")?,
    };
    let config = CliConfig::load(&config_path);

    match args.command {
        Command::Config {
            api_key,
            default_branch,
            output_dir,
            rules_file,
            model,
            show,
            clear,
        } => {
            if show {
                show_config(&config, &config_path);
                return Ok(());
            }
            if clear {
                CliConfig::clear(&config_path)?;
                println!("Configuration cleared");
                return Ok(());
            }

            let mut updated = config.clone();
            if let Some(key) = api_key {
                updated.api_key = Some(key);
            }
            if let Some(branch) = default_branch {
                updated.default_branch = branch;
            }
            if let Some(dir) = output_dir {
                updated.output_dir = dir;
            }
            if let Some(file) = rules_file {
                updated.rules_file = file;
            }
            if let Some(model) = model {
                updated.model = model;
            }

            if updated == config {
                println!("Nothing to change. Use --show to see the current configuration.");
                return Ok(());
            }
            updated.save(&config_path)?;
            println!("Configuration saved to {}", config_path.display());
        }

        Command::Init { output } => {
            let path = output.unwrap_or_else(|| config.rules_file.clone());
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            let json = serde_json::to_string_pretty(&TaskRules::example())?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Rules file created: {}", path.display());
        }

        Command::Changes {
            base_branch,
            path,
            rules,
        } => {
            let base = base_branch.unwrap_or_else(|| config.default_branch.clone());
            let relevant = match rules {
                Some(file) => TaskRules::load(&file)?.relevant_paths(),
                None => Vec::new(),
            };
            let changes = git::collect_changes(&path, &base, &relevant)?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }

        Command::Validate {
            base_branch,
            output,
            api_key,
            rules,
            path,
            server,
        } => {
            let rules_file = rules.unwrap_or_else(|| config.rules_file.clone());
            let request = ValidationRequest {
                rules: TaskRules::load(&rules_file)?,
                repository_path: path.canonicalize().unwrap_or(path),
                base_branch: base_branch.unwrap_or_else(|| config.default_branch.clone()),
                timeout: Duration::from_secs(config.timeout_secs),
            };
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());

            match server {
                Some(url) => validate_remote(&url, &request).await?,
                None => {
                    let api_key = config.resolve_api_key(api_key.as_deref()).context(
                        "No API key configured. Use `task-validator config --api-key <key>`, \
                         pass --api-key, or set GOOGLE_AI_API_KEY",
                    )?;
                    validate_local(&config, &api_key, &request, &output_dir).await?;
                }
            }
        }

        Command::Serve { port, api_key } => {
            let settings = ServerSettings {
                api_key: config.resolve_api_key(api_key.as_deref()),
                model: config.model.clone(),
                output_dir: config.output_dir.clone(),
                log_dir: config.log_dir.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
                environment: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            };
            server::serve(port, AppState::new(settings)).await?;
        }
    }

    Ok(())
}

fn init_tracing(serving: bool) {
    let default = if serving { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn show_config(config: &CliConfig, path: &Path) {
    let key = config
        .api_key
        .as_deref()
        .map(mask_api_key)
        .unwrap_or_else(|| "(not set)".to_string());
    println!("API key:        {key}");
    println!("Default branch: {}", config.default_branch);
    println!("Output dir:     {}", config.output_dir.display());
    println!("Rules file:     {}", config.rules_file.display());
    println!("Log dir:        {}", config.log_dir.display());
    println!("Model:          {}", config.model);
    println!("Timeout:        {}s", config.timeout_secs);
    println!();
    println!("Config file: {}", path.display());
}

async fn validate_local(
    config: &CliConfig,
    api_key: &str,
    request: &ValidationRequest,
    output_dir: &Path,
) -> Result<()> {
    let analyzer = GeminiAnalyzer::new(api_key, &config.model)?;
    let agent = TaskValidatorAgent::new(Box::new(analyzer));

    let outcome = run_validation(&agent, request).await?;
    if !outcome.relevant_paths.is_empty() {
        println!("Analysing relevant paths only: {}", outcome.relevant_paths.join(", "));
    }

    let result = &outcome.run.result;
    print_result(result, &request.rules, &request.base_branch);

    let detailed =
        DetailedReport::from_result(result, Some(outcome.timings.total.as_millis() as u64));
    let report_path = ReportWriter::new(output_dir).save_detailed_report(&detailed)?;
    println!("\nReport saved to {}", report_path.display());

    let logger = AnalysisLogger::new(&config.log_dir);
    outcome.write_logs(&logger, request);
    println!("Analysis logs written to {}", logger.log_dir().display());

    if result.is_inconsistent() {
        println!("WARNING: high score but no rule implemented; check the analysis logs.");
    }
    Ok(())
}

#[derive(Deserialize)]
struct RemoteResponse {
    success: bool,
    data: Option<ValidationResult>,
    message: Option<String>,
    error: Option<String>,
}

async fn validate_remote(server: &str, request: &ValidationRequest) -> Result<()> {
    let url = format!("{}/api/validation/validate", server.trim_end_matches('/'));
    println!("Validation server: {server}");

    let response: RemoteResponse = reqwest::Client::new()
        .post(&url)
        .timeout(request.timeout)
        .json(&json!({
            "rules": request.rules,
            "repositoryPath": request.repository_path,
            "baseBranch": request.base_branch,
        }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?
        .json()
        .await
        .context("Invalid response from validation server")?;

    match response {
        RemoteResponse {
            success: true,
            data: Some(result),
            ..
        } => {
            print_result(&result, &request.rules, &request.base_branch);
            Ok(())
        }
        RemoteResponse { message, error, .. } => bail!(
            "{}: {}",
            message.unwrap_or_else(|| "Validation failed".to_string()),
            error.unwrap_or_default()
        ),
    }
}

fn print_result(result: &ValidationResult, rules: &TaskRules, base_branch: &str) {
    let rule_line = "-".repeat(50);
    println!("\nVALIDATION RESULT");
    println!("{rule_line}");
    println!("Task:   {}", rules.title);
    println!("ID:     {}", rules.task_id);
    println!("Branch: {}", result.branch_name);
    println!("Base:   {base_branch}");
    println!("{rule_line}");
    println!("Total rules:        {}", result.summary.total_rules);
    println!("Implemented:        {}", result.summary.implemented_count);
    println!("Missing:            {}", result.summary.missing_count);
    println!("Completeness score: {:.1}%", result.completeness_score * 100.0);
    if result.summary.high_priority_missing > 0 {
        println!(
            "High priority missing: {} rules",
            result.summary.high_priority_missing
        );
    }
    println!("{rule_line}");

    if !result.implemented_rules.is_empty() {
        println!("\nIMPLEMENTED:");
        for rule in &result.implemented_rules {
            println!("  * {}: {}", rule.id, rule.description);
            if let Some(evidence) = rule.evidence.as_deref().filter(|e| !e.is_empty()) {
                println!("    evidence: {evidence}");
            }
            println!("    confidence: {:.0}%", rule.confidence * 100.0);
        }
    }

    if !result.missing_rules.is_empty() {
        println!("\nMISSING:");
        for rule in &result.missing_rules {
            println!("  * {}: {} ({})", rule.id, rule.description, rule.priority.as_str());
        }
    }

    if !result.suggestions.is_empty() {
        println!("\nSUGGESTIONS:");
        for suggestion in &result.suggestions {
            println!("  * {suggestion}");
        }
    }
}

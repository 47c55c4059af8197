//! Persistent CLI configuration
//!
//! Stored as YAML in the platform config directory, e.g.
//! `~/.config/task-validator/config.yaml` on Linux.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_OUTPUT_DIR: &str = "reports";
pub const DEFAULT_RULES_FILE: &str = "task-rules.json";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variables consulted for the API key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["GOOGLE_AI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub default_branch: String,
    pub output_dir: PathBuf,
    pub rules_file: PathBuf,
    pub log_dir: PathBuf,
    pub model: String,
    /// Deadline for a whole validation run
    pub timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_branch: DEFAULT_BRANCH.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Default location of the config file
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "task-validator").map(|dirs| dirs.config_dir().join("config.yaml"))
}

impl CliConfig {
    /// Load from `path`. A missing file gives defaults; an unreadable one is
    /// reported and also gives defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_yaml::from_str(&raw).map_err(anyhow::Error::from))
        {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Delete the config file if present
    pub fn clear(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    /// API key by priority: explicit value, config file, environment
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(explicit, |name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(
        &self,
        explicit: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.api_key.clone())
            .or_else(|| API_KEY_ENV_VARS.iter().find_map(|name| env(name)))
            .filter(|key| !key.trim().is_empty())
    }
}

/// Hide all but the first and last four characters
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

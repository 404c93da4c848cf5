//! Workflow configuration structures

use std::path::{Path, PathBuf};

use lg_episode::HistoryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration from `lorebook.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Editor undo/redo behaviour
    #[serde(default)]
    pub history: HistoryConfig,

    /// Remote service connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Event log output
    #[serde(default)]
    pub events: EventsConfig,
}

/// Remote service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, without a trailing slash (e.g. "https://api.example.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// The bearer token, if the configured variable is set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

// Serde default functions
fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_token_env() -> String {
    "LOREGATE_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Event log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Append workflow events as JSONL to this file. Disabled when unset.
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl WorkflowConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Try to load config, returning default if the file is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = %path.display(), "using default config: {}", e);
                }
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_to_empty_file() {
        let config: WorkflowConfig = toml::from_str("").unwrap();
        assert_eq!(config.history.debounce_ms, 500);
        assert_eq!(config.history.max_entries, 100);
        assert_eq!(config.backend.token_env, "LOREGATE_TOKEN");
        assert_eq!(config.backend.timeout_secs, 30);
        assert!(config.events.log_path.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: WorkflowConfig = toml::from_str(
            r#"
            [history]
            debounce_ms = 250

            [backend]
            base_url = "https://lore.example.com/api"

            [events]
            log_path = "logs/workflow.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.history.debounce_ms, 250);
        assert_eq!(config.history.max_entries, 100);
        assert_eq!(config.backend.base_url, "https://lore.example.com/api");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(
            config.events.log_path.as_deref(),
            Some(Path::new("logs/workflow.jsonl"))
        );
    }

    #[test]
    fn load_or_default_tolerates_missing_and_invalid_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("lorebook.toml");
        assert_eq!(WorkflowConfig::load_or_default(&missing).backend.timeout_secs, 30);

        let invalid = dir.path().join("broken.toml");
        std::fs::write(&invalid, "[history\n").unwrap();
        assert!(matches!(
            WorkflowConfig::load(&invalid),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(WorkflowConfig::load_or_default(&invalid).history.debounce_ms, 500);
    }

    #[test]
    fn token_reads_configured_variable() {
        let config = BackendConfig {
            token_env: "LG_WORKFLOW_TEST_TOKEN_UNSET".into(),
            ..Default::default()
        };
        assert!(config.token().is_none());
    }
}

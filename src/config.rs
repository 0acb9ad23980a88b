//! Configuration loading.
//!
//! The on-disk format is a small YAML file, `.vex-rag.yml` by default,
//! overridable with the `RAG_CONFIG` environment variable and otherwise
//! searched for in the current directory and up to five parent directories.
//! Every field has a typed default, so [`Config::default`] alone is enough
//! to drive the library with no file present — only the (out-of-scope) CLI
//! front-end treats a missing file as fatal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RagError;

const DEFAULT_CONFIG_FILENAME: &str = ".vex-rag.yml";
const CONFIG_ENV_VAR: &str = "RAG_CONFIG";
const MAX_PARENT_SEARCH: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

fn default_project_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "vex_kb.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enable_reranking: bool,
    #[serde(default = "default_reranker_model")]
    pub reranker_model: String,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_reranking: true,
            reranker_model: default_reranker_model(),
            default_top_k: default_top_k(),
        }
    }
}

fn default_reranker_model() -> String {
    "BAAI/bge-reranker-large".to_string()
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_true")]
    pub enable_sanitization: bool,
    /// When set, a HIGH/CRITICAL scan finding rejects the document instead
    /// of sanitizing and proceeding.
    #[serde(default)]
    pub strict_mode: bool,
    /// Context Generator worker count (§5: default 4).
    #[serde(default = "default_context_workers")]
    pub context_workers: usize,
    /// Embedding batch size.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enable_sanitization: true,
            strict_mode: false,
            context_workers: default_context_workers(),
            embedding_batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_context_workers() -> usize {
    4
}

fn default_embedding_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub allowed_base_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleNotifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookNotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_webhook_template")]
    pub template: String,
    #[serde(default)]
    pub notify_stages: Option<Vec<String>>,
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: f64,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_template() -> String {
    "generic".to_string()
}

fn default_min_interval() -> f64 {
    2.0
}

fn default_webhook_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub console: ConsoleNotifierConfig,
    #[serde(default)]
    pub webhook: WebhookNotifierConfig,
}

fn default_true() -> bool {
    true
}

/// Top-level configuration, mirroring the `.vex-rag.yml` schema (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Locates and parses the configuration file, falling back to
    /// [`Config::default`] semantics for every field it does not set.
    ///
    /// Loads a `.env` file from the current directory first, if present,
    /// so a webhook URL's `${VAR}` reference or `RAG_CONFIG` itself can be
    /// set there instead of the real environment.
    ///
    /// Resolution order: `RAG_CONFIG` env var (if set, must exist or this
    /// returns [`RagError::ConfigMissing`]); otherwise `.vex-rag.yml` in the
    /// current directory, then up to five parent directories. If none is
    /// found, returns `Ok(Config::default())` — only the CLI front-end
    /// treats a missing file as fatal, not the library.
    pub fn load() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();

        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(&explicit);
            if !path.is_file() {
                return Err(RagError::ConfigMissing {
                    hint: format!("RAG_CONFIG points at {explicit}, which does not exist"),
                });
            }
            return Self::from_file(&path);
        }

        match Self::find_in_ancestors(&std::env::current_dir().unwrap_or_default()) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn find_in_ancestors(start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        for _ in 0..=MAX_PARENT_SEARCH {
            let current = dir?;
            let candidate = current.join(DEFAULT_CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = current.parent();
        }
        None
    }

    fn from_file(path: &Path) -> Result<Self, RagError> {
        let raw = std::fs::read_to_string(path).map_err(|e| RagError::ConfigMissing {
            hint: format!("could not read {}: {e}", path.display()),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| RagError::ConfigMissing {
            hint: format!("failed to parse {}: {e}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.project.name, "default");
        assert!(config.retrieval.enable_reranking);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert!(config.indexing.enable_sanitization);
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "project:\n  name: demo\nsecurity:\n  allowed_base_paths:\n    - /allowed\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.security.allowed_base_paths, vec![PathBuf::from("/allowed")]);
        // Untouched sections still carry their defaults.
        assert!(config.retrieval.enable_reranking);
    }

    #[test]
    fn find_in_ancestors_walks_up_past_the_starting_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILENAME), "project:\n  name: root\n").unwrap();

        let found = Config::find_in_ancestors(&nested).expect("should find config in an ancestor directory");
        assert_eq!(found, dir.path().join(DEFAULT_CONFIG_FILENAME));
    }

    #[test]
    fn find_in_ancestors_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::find_in_ancestors(dir.path()).is_none());
    }
}

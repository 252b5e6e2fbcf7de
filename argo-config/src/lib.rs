//! Application settings: an optional YAML file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use argo_types::{RetryPolicy, StageParams};
use serde::Deserialize;
use thiserror::Error;

pub mod logging;

/// Environment variable naming the YAML file.
pub const CONFIG_ENV: &str = "ARGO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "argo.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("invalid config yaml: {0}")]
    Parse(String),
    #[error("{key}={value:?} is not valid")]
    Env { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub stages: StagesConfig,
    pub embedding: EmbeddingConfig,
    pub context: ContextConfig,
    pub database: DatabaseConfig,
    pub history: HistoryConfig,
    pub summary: SummaryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 250,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key: None,
            model: "llama-3.1-8b-instant".into(),
            timeout_ms: 30_000,
            retry: RetryConfig {
                max_retries: 2,
                backoff_ms: 500,
            },
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pipeline stage that calls the completion service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Sql,
    Summary,
}

impl Stage {
    pub fn default_temperature(self) -> f32 {
        match self {
            Stage::Classify | Stage::Sql => 0.0,
            Stage::Summary => 0.1,
        }
    }
}

/// Per-stage overrides. Unset fields fall back to `completion.model` and the
/// stage's own default temperature.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub classify: StageConfig,
    pub sql: StageConfig,
    pub summary: StageConfig,
}

impl StagesConfig {
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Classify => &self.classify,
            Stage::Sql => &self.sql,
            Stage::Summary => &self.summary,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedBackend {
    #[default]
    Hash,
    Http,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbedBackend,
    pub url: Option<String>,
    pub model: String,
    pub dim: usize,
    /// Per-call deadline for the http backend.
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbedBackend::Hash,
            url: None,
            model: "all-MiniLM-L6-v2".into(),
            dim: 384,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Unset means an in-memory store seeded with the default documents.
    pub qdrant_url: Option<String>,
    pub collection: String,
    pub top_k: usize,
    /// Per-call deadline for Qdrant.
    pub timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            collection: "argo_tables_schema".into(),
            top_k: 2,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub query_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("CleanData"),
            max_connections: 8,
            query_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSONL file; unset keeps history in memory for the life of the process.
    pub path: Option<PathBuf>,
    pub record_turns: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub preview_rows: usize,
    pub table_rows: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            preview_rows: 50,
            table_rows: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter expression, e.g. `info` or `debug,argo_core=trace`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }

    /// Process configuration: `$ARGO_CONFIG` (which must exist) or `./argo.yaml`
    /// (if present), then environment overrides, then validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_path(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ARGO_HTTP_ADDR") {
            self.server.addr = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.completion.base_url = v;
        }
        if let Some(v) = lookup("GROQ_API_KEY").filter(|v| !v.is_empty()) {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = lookup("LLM_TIMEOUT_MS") {
            self.completion.timeout_ms = parse("LLM_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("EMBED_BACKEND") {
            self.embedding.backend = match v.to_ascii_lowercase().as_str() {
                "hash" => EmbedBackend::Hash,
                "http" => EmbedBackend::Http,
                _ => {
                    return Err(ConfigError::Env {
                        key: "EMBED_BACKEND".into(),
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("EMBED_URL") {
            self.embedding.url = Some(v);
        }
        if let Some(v) = lookup("EMBED_DIM") {
            self.embedding.dim = parse("EMBED_DIM", &v)?;
        }
        if let Some(v) = lookup("QDRANT_HTTP_URL").filter(|v| !v.is_empty()) {
            self.context.qdrant_url = Some(v);
        }
        if let Some(v) = lookup("QDRANT_COLLECTION") {
            self.context.collection = v;
        }
        if let Some(v) = lookup("ARGO_DATA_DIR") {
            self.database.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARGO_HISTORY_FILE").filter(|v| !v.is_empty()) {
            self.history.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ARGO_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("ARGO_LOG_JSON") {
            self.logging.json = v == "1" || v.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.embedding.dim == 0 {
            return invalid("embedding.dim must be positive");
        }
        if self.embedding.backend == EmbedBackend::Http && self.embedding.url.is_none() {
            return invalid("embedding.backend=http needs embedding.url");
        }
        if self.embedding.timeout_ms == 0 || self.context.timeout_ms == 0 {
            return invalid("embedding.timeout_ms and context.timeout_ms must be positive");
        }
        if self.context.top_k == 0 {
            return invalid("context.top_k must be positive");
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections must be positive");
        }
        if self.summary.table_rows == 0 || self.summary.preview_rows == 0 {
            return invalid("summary row limits must be positive");
        }
        Ok(())
    }

    pub fn stage_params(&self, stage: Stage) -> StageParams {
        let overrides = self.stages.get(stage);
        let model = overrides
            .model
            .clone()
            .unwrap_or_else(|| self.completion.model.clone());
        let temperature = overrides
            .temperature
            .unwrap_or_else(|| stage.default_temperature());
        StageParams::new(model, temperature)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = AppConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg.server.addr, "127.0.0.1:5000");
        assert_eq!(cfg.completion.model, "llama-3.1-8b-instant");
        assert_eq!(cfg.completion.retry.max_retries, 2);
        assert_eq!(cfg.stage_params(Stage::Summary).temperature, 0.1);
        assert_eq!(cfg.context.top_k, 2);
        assert_eq!(cfg.summary.table_rows, 10);
        assert!(cfg.context.qdrant_url.is_none());
        assert_eq!(cfg.embedding.timeout_ms, 10_000);
        assert_eq!(cfg.context.timeout_ms, 10_000);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = AppConfig::from_yaml_str(
            r#"
completion:
  model: llama-3.3-70b-versatile
stages:
  sql:
    model: sql-tuned
    temperature: 0.0
database:
  data_dir: /srv/argo
  retry:
    max_retries: 1
"#,
        )
        .unwrap();
        assert_eq!(cfg.completion.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(cfg.database.data_dir, PathBuf::from("/srv/argo"));
        assert_eq!(cfg.database.retry.max_retries, 1);
        assert_eq!(cfg.database.retry.backoff_ms, 250);

        assert_eq!(cfg.stage_params(Stage::Sql).model, "sql-tuned");
        let classify = cfg.stage_params(Stage::Classify);
        assert_eq!(classify.model, "llama-3.3-70b-versatile");
        assert_eq!(classify.temperature, 0.0);
    }

    #[test]
    fn model_only_stage_keeps_its_temperature() {
        let cfg = AppConfig::from_yaml_str("stages:\n  summary:\n    model: big-model\n").unwrap();
        let summary = cfg.stage_params(Stage::Summary);
        assert_eq!(summary.model, "big-model");
        assert_eq!(summary.temperature, 0.1);

        let cfg = AppConfig::from_yaml_str("stages:\n  sql:\n    temperature: 0.2\n").unwrap();
        let sql = cfg.stage_params(Stage::Sql);
        assert_eq!(sql.model, "llama-3.1-8b-instant");
        assert_eq!(sql.temperature, 0.2);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GROQ_API_KEY", "secret"),
            ("EMBED_DIM", "768"),
            ("QDRANT_HTTP_URL", "http://localhost:6333"),
            ("ARGO_LOG_JSON", "true"),
            ("EMBED_BACKEND", "HTTP"),
            ("EMBED_URL", "http://localhost:8080/v1"),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.completion.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.embedding.dim, 768);
        assert_eq!(cfg.embedding.backend, EmbedBackend::Http);
        assert_eq!(cfg.context.qdrant_url.as_deref(), Some("http://localhost:6333"));
        assert!(cfg.logging.json);
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_env(|k| (k == "EMBED_DIM").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "EMBED_DIM"));
    }

    #[test]
    fn http_embedder_needs_url() {
        let mut cfg = AppConfig::default();
        cfg.embedding.backend = EmbedBackend::Http;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_yaml_shape_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_yaml_str("context: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }
}

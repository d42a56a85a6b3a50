//! TOML configuration and environment credentials.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//! Credentials never live in the TOML file. They are read from the
//! environment (optionally populated from a `.env` next to the config):
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `YC_FOLDER_ID` | knowledge service (files, indexes, assistants) |
//! | `YC_API_KEY` | knowledge service |
//! | `GEMINI_API_KEY` | vision model |
//! | `GEMINI_MODEL` | overrides `vision.model` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs)
    }
}

/// Upper bound for `retry.base_delay_secs` (one hour).
pub const MAX_BASE_DELAY_SECS: f64 = 3600.0;

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_secs() -> f64 {
    5.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_url")]
    pub base_url: String,
    #[serde(default = "default_operations_url")]
    pub operations_url: String,
    /// Assistant model name, expanded to `gpt://<folder>/<model>/latest`.
    #[serde(default = "default_assistant_model")]
    pub model: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_label_key")]
    pub label_key: String,
    #[serde(default = "default_label_value")]
    pub label_value: String,
    #[serde(default = "default_index_poll_ms")]
    pub index_poll_ms: u64,
    #[serde(default = "default_run_poll_ms")]
    pub run_poll_ms: u64,
    #[serde(default = "default_file_ttl_days")]
    pub file_ttl_days: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_knowledge_url(),
            operations_url: default_operations_url(),
            model: default_assistant_model(),
            index_name: default_index_name(),
            label_key: default_label_key(),
            label_value: default_label_value(),
            index_poll_ms: default_index_poll_ms(),
            run_poll_ms: default_run_poll_ms(),
            file_ttl_days: default_file_ttl_days(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl KnowledgeConfig {
    pub fn index_poll_interval(&self) -> Duration {
        Duration::from_millis(self.index_poll_ms)
    }

    pub fn run_poll_interval(&self) -> Duration {
        Duration::from_millis(self.run_poll_ms)
    }
}

fn default_knowledge_url() -> String {
    "https://rest-assistant.api.cloud.yandex.net".to_string()
}
fn default_operations_url() -> String {
    "https://operation.api.cloud.yandex.net".to_string()
}
fn default_assistant_model() -> String {
    "yandexgpt".to_string()
}
fn default_index_name() -> String {
    "ad_censor_index".to_string()
}
fn default_label_key() -> String {
    "app".to_string()
}
fn default_label_value() -> String {
    "ad_censor".to_string()
}
fn default_index_poll_ms() -> u64 {
    1000
}
fn default_run_poll_ms() -> u64 {
    500
}
fn default_file_ttl_days() -> u32 {
    365
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_vision_url")]
    pub base_url: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_url(),
            model: default_vision_model(),
            max_dimension: default_max_dimension(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_vision_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_vision_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_max_dimension() -> u32 {
    2048
}

/// Vision models offered by the shell's model switcher.
pub const AVAILABLE_VISION_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.5-flash-lite",
];

/// Secrets read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub folder_id: Option<String>,
    pub knowledge_api_key: Option<String>,
    pub vision_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            folder_id: non_empty_var("YC_FOLDER_ID"),
            knowledge_api_key: non_empty_var("YC_API_KEY"),
            vision_api_key: non_empty_var("GEMINI_API_KEY"),
        }
    }

    /// Both halves of the knowledge-service credentials are present.
    pub fn knowledge_configured(&self) -> bool {
        self.folder_id.is_some() && self.knowledge_api_key.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load the configuration file (if present), then credentials from the environment.
pub fn load_config(path: &Path) -> Result<Config> {
    if let Some(dir) = path.parent() {
        let _ = dotenvy::from_path(dir.join(".env"));
    }
    let _ = dotenvy::dotenv();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    if let Some(model) = non_empty_var("GEMINI_MODEL") {
        config.vision.model = model;
    }
    config.credentials = Credentials::from_env();
    Ok(config)
}

/// Parse and validate TOML configuration text. Credentials are left empty.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }
    if !(0.0..=MAX_BASE_DELAY_SECS).contains(&config.retry.base_delay_secs) {
        anyhow::bail!(
            "retry.base_delay_secs must be between 0 and {}",
            MAX_BASE_DELAY_SECS
        );
    }
    if config.vision.max_dimension == 0 {
        anyhow::bail!("vision.max_dimension must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(config.knowledge.index_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.knowledge.run_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.knowledge.label_value, "ad_censor");
        assert_eq!(config.vision.max_dimension, 2048);
        assert!(!config.credentials.knowledge_configured());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
[chunking]
chunk_size = 500
chunk_overlap = 50

[retry]
max_retries = 1
base_delay_secs = 0.5

[vision]
model = "gemini-2.5-pro"
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(500));
        assert_eq!(config.vision.model, "gemini-2.5-pro");
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn huge_base_delay_rejected() {
        let err = parse_config("[retry]\nbase_delay_secs = 1e20\n").unwrap_err();
        assert!(err.to_string().contains("retry.base_delay_secs"));
        assert!(parse_config("[retry]\nbase_delay_secs = nan\n").is_err());
        assert!(parse_config("[retry]\nbase_delay_secs = -1.0\n").is_err());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(parse_config("[chunking]\nchunk_size = 0\nchunk_overlap = 0\n").is_err());
    }

    #[test]
    fn knowledge_needs_both_credentials() {
        let creds = Credentials {
            folder_id: Some("b1g".into()),
            knowledge_api_key: None,
            vision_api_key: None,
        };
        assert!(!creds.knowledge_configured());
    }
}

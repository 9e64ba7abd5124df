//! TOML configuration parsing and validation.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`]) is a
//! valid configuration. [`load_config`] reads the file and checks the values
//! the pipeline relies on.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Configuration with every section at its default.
    pub fn minimal() -> Self {
        Self::default()
    }
}

// ============ [llm] ============

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Gemini harm-block threshold applied to every harm category.
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            safety_threshold: default_safety_threshold(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_llm_timeout_secs() -> u64 {
    300
}
fn default_safety_threshold() -> String {
    "BLOCK_ONLY_HIGH".to_string()
}

// ============ [cache] ============

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// `memory`, `file`, or `disabled`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: default_cache_path(),
        }
    }
}

fn default_cache_backend() -> String {
    "memory".to_string()
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("./llm_cache.json")
}

// ============ [pipeline] ============

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_extraction_backoff_ms")]
    pub extraction_backoff_ms: u64,
    #[serde(default = "default_max_abstractions")]
    pub max_abstractions: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Append the previous failure reason to retry prompts.
    #[serde(default)]
    pub feedback_on_retry: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            extraction_backoff_ms: default_extraction_backoff_ms(),
            max_abstractions: default_max_abstractions(),
            language: default_language(),
            use_cache: true,
            feedback_on_retry: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    10_000
}
fn default_extraction_backoff_ms() -> u64 {
    1_000
}
fn default_max_abstractions() -> usize {
    10
}
fn default_language() -> String {
    "english".to_string()
}
fn default_true() -> bool {
    true
}

// ============ [acquisition] ============

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            max_file_size: default_max_file_size(),
            github_token_env: default_github_token_env(),
            github_api_url: default_github_api_url(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.py", "**/*.js", "**/*.jsx", "**/*.ts", "**/*.tsx", "**/*.go", "**/*.java",
        "**/*.c", "**/*.cc", "**/*.cpp", "**/*.h", "**/*.hpp", "**/*.rs", "**/*.rb",
        "**/*.php", "**/*.cs", "**/*.swift", "**/*.kt", "**/*.scala", "**/*.md",
        "**/*.rst", "**/Dockerfile", "**/Makefile", "**/*.yaml", "**/*.yml", "**/*.toml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_globs() -> Vec<String> {
    [
        "**/.git/**",
        "**/node_modules/**",
        "**/target/**",
        "**/dist/**",
        "**/build/**",
        "**/venv/**",
        "**/.venv/**",
        "**/__pycache__/**",
        "**/tests/**",
        "**/test/**",
        "**/docs/**",
        "**/examples/**",
        "**/*.min.js",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> u64 {
    100_000
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

// ============ [server] ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_request_timeout_secs() -> u64 {
    1800
}
fn default_max_archive_bytes() -> usize {
    50 * 1024 * 1024
}

// ============ [output] ============

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

// ============ Loading ============

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints. Called by [`load_config`]; exposed for
/// configs built in code.
pub fn validate(config: &Config) -> Result<()> {
    match config.llm.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.trim().is_empty() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    match config.cache.backend.as_str() {
        "memory" | "file" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown cache backend: '{}'. Must be memory, file, or disabled.",
            other
        ),
    }

    if config.pipeline.max_attempts == 0 {
        anyhow::bail!("pipeline.max_attempts must be >= 1");
    }

    if config.pipeline.max_abstractions < 1 {
        anyhow::bail!("pipeline.max_abstractions must be >= 1");
    }

    if config.acquisition.max_file_size == 0 {
        anyhow::bail!("acquisition.max_file_size must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.acquisition.max_file_size, 100_000);
        assert_eq!(config.llm.provider, "gemini");
        assert!(!config.pipeline.feedback_on_retry);
        assert_eq!(config.llm.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[pipeline]
max_attempts = 2
language = "french"
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.max_attempts, 2);
        assert_eq!(config.pipeline.language, "french");
        assert_eq!(config.pipeline.max_abstractions, 10);
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config: Config = toml::from_str("[llm]\nprovider = \"bard\"\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config: Config = toml::from_str("[pipeline]\nmax_attempts = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_config_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tut.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }
}

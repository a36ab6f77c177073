use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

/// Sliding-window parameters, in characters.
///
/// Signed on purpose: a non-positive `max_chars` is a valid setting that
/// disables windowing (see [`crate::chunk::chunk_text`]).
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: i64,
    #[serde(default = "default_overlap")]
    pub overlap: i64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> i64 {
    1000
}
fn default_overlap() -> i64 {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_k: default_max_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for the HTTP providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            normalize: true,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub default_provider: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "LlmProviderConfig::gemini")]
    pub gemini: LlmProviderConfig,
    #[serde(default = "LlmProviderConfig::groq")]
    pub groq: LlmProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_llm_provider(),
            temperature: default_temperature(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout_secs(),
            gemini: LlmProviderConfig::gemini(),
            groq: LlmProviderConfig::groq(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout_secs() -> u64 {
    120
}

/// Connection settings for one hosted LLM.
///
/// Partially specified tables are filled in from the provider defaults
/// by [`load_config`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmProviderConfig {
    /// Inline key. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
}

impl LlmProviderConfig {
    pub fn gemini() -> Self {
        Self {
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "models/gemini-2.0-flash-exp".to_string(),
        }
    }

    pub fn groq() -> Self {
        Self {
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
        }
    }

    /// Resolve the API key: inline value first, then the environment.
    /// Empty strings count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    fn fill_from(&mut self, defaults: LlmProviderConfig) {
        if self.api_key_env.is_empty() {
            self.api_key_env = defaults.api_key_env;
        }
        if self.base_url.is_empty() {
            self.base_url = defaults.base_url;
        }
        if self.model.is_empty() {
            self.model = defaults.model;
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_mb() -> usize {
    50
}

pub const LLM_PROVIDERS: &[&str] = &["gemini", "groq"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.llm.gemini.fill_from(LlmProviderConfig::gemini());
    config.llm.groq.fill_from(LlmProviderConfig::groq());
    config.llm.default_provider = config.llm.default_provider.to_lowercase();

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_k < config.retrieval.top_k {
        anyhow::bail!("retrieval.max_k must be >= retrieval.top_k");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    // Validate llm
    if !LLM_PROVIDERS.contains(&config.llm.default_provider.as_str()) {
        anyhow::bail!(
            "Unknown llm.default_provider: '{}'. Must be gemini or groq.",
            config.llm.default_provider
        );
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/docqa.sqlite\"\n").unwrap();
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.chunking.overlap, 150);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.embedding.batch_size, 32);
        assert!(cfg.embedding.normalize);
        assert_eq!(cfg.llm.default_provider, "gemini");
        assert_eq!(cfg.llm.groq.model, "llama-3.3-70b-versatile");
        assert_eq!(cfg.llm.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn partial_provider_table_is_filled() {
        let cfg = parse_config(
            r#"
[db]
path = "x.sqlite"

[llm.groq]
base_url = "http://127.0.0.1:9999"
"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.groq.base_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.llm.groq.model, "llama-3.3-70b-versatile");
        assert_eq!(cfg.llm.groq.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn http_embedding_requires_model_and_dims() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let err =
            parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn unknown_llm_provider_rejected() {
        let err =
            parse_config("[db]\npath = \"x\"\n[llm]\ndefault_provider = \"acme\"\n").unwrap_err();
        assert!(err.to_string().contains("llm.default_provider"));
    }

    #[test]
    fn zero_top_k_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn inline_key_wins_and_blank_is_missing() {
        let mut p = LlmProviderConfig::groq();
        p.api_key_env = "DOCQA_TEST_UNSET_KEY_VAR".to_string();
        assert_eq!(p.resolve_api_key(), None);
        p.api_key = Some("   ".to_string());
        assert_eq!(p.resolve_api_key(), None);
        p.api_key = Some("gsk_test".to_string());
        assert_eq!(p.resolve_api_key().as_deref(), Some("gsk_test"));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    pub admin_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    Anthropic,
    OpenAi,
}

impl LlmProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProviderType::Anthropic => "anthropic",
            LlmProviderType::OpenAi => "openai",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            LlmProviderType::Anthropic => "https://api.anthropic.com/v1/messages",
            LlmProviderType::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProviderType::Anthropic => "claude-sonnet-4-5",
            LlmProviderType::OpenAi => "gpt-4o-mini",
        }
    }
}

impl std::str::FromStr for LlmProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProviderType::Anthropic),
            "openai" | "open_ai" | "openai-compatible" => Ok(LlmProviderType::OpenAi),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProviderType,
    /// Falls back to the provider's public endpoint
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// SQLite URL for the persistent translation cache; in-memory when unset
    pub database_url: Option<String>,
    pub ttl_secs: Option<u64>,
    /// How often expired entries are deleted while serving
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            admin_key: None,
            page_size: default_page_size(),
            sample_limit: default_sample_limit(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            model: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            ttl_secs: None,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl LlmConfig {
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_url())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Optional TOML file, then environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_var("FILTER_STORE_URL") {
            self.store.url = url;
        }
        if let Some(key) = env_var("FILTER_STORE_KEY") {
            self.store.admin_key = Some(key);
        }
        if let Some(provider) = env_var("LLM_PROVIDER") {
            self.llm.provider = provider
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("LLM_PROVIDER is invalid")?;
        }
        if let Some(url) = env_var("LLM_API_URL") {
            self.llm.api_url = Some(url);
        }
        if let Some(model) = env_var("LLM_API_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(key) = env_var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(secs) = env_var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = secs
                .parse()
                .context("LLM_TIMEOUT_SECS must be a number")?;
        }
        if let Some(url) = env_var("CACHE_DATABASE_URL") {
            self.cache.database_url = Some(url);
        }
        if let Some(secs) = env_var("CACHE_TTL_SECS") {
            self.cache.ttl_secs = Some(secs.parse().context("CACHE_TTL_SECS must be a number")?);
        }
        if let Some(port) = env_var("PORT") {
            self.server.port = port.parse().context("PORT must be a number")?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// Default functions
fn default_store_url() -> String {
    "http://127.0.0.1:3210".to_string()
}

fn default_page_size() -> usize {
    filter_common::DEFAULT_PAGE_SIZE
}

fn default_sample_limit() -> usize {
    5
}

fn default_provider() -> LlmProviderType {
    LlmProviderType::Anthropic
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_purge_interval_secs() -> u64 {
    3600
}

fn default_port() -> u16 {
    8080
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::fetcher::strategy::{Envelope, ProxyRoute, Raw};

static CONFIG_FILE: &str = "config";
static ENV_PREFIX: &str = "NOVEL_READER";

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

/// 读取 config.toml（可选）并叠加 NOVEL_READER__* 环境变量
pub fn init_config() -> Result<Config> {
    config::Config::builder()
        .add_source(
            config::File::with_name(CONFIG_FILE)
                .format(config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
        .map_err(|e| anyhow::anyhow!("配置文件反序列化失败: {}", e))
}

#[derive(Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_proxies")]
    pub proxies: Vec<Box<dyn ProxyRoute>>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_content_len: default_min_content_len(),
            timeout_secs: default_timeout_secs(),
            proxies: default_proxies(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_min_content_len() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    20
}

pub fn default_proxies() -> Vec<Box<dyn ProxyRoute>> {
    vec![
        Box::new(Envelope::new(
            "AllOrigins",
            "https://api.allorigins.win/get?url={url}",
        )),
        Box::new(Raw::new("CorsProxy", "https://corsproxy.io/?{url}")),
        Box::new(Raw::new(
            "CodeTabs",
            "https://api.codetabs.com/v1/proxy?quest={url}",
        )),
    ]
}

#[derive(Deserialize, Clone, Copy)]
pub struct ProgressConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl ProgressConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("library.json")
}

#[derive(Deserialize, Clone, Default)]
pub struct AuthConfig {
    pub profile: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl AiConfig {
    /// 配置优先，其次 GEMINI_API_KEY / API_KEY 环境变量
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = from_toml("");
        assert_eq!(config.fetch.min_content_len, 100);
        assert_eq!(config.fetch.proxies.len(), 3);
        assert_eq!(config.fetch.proxies[0].name(), "AllOrigins");
        assert_eq!(config.progress.debounce(), Duration::from_millis(500));
        assert_eq!(config.store.path, PathBuf::from("library.json"));
        assert!(config.auth.profile.is_none());
        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert_eq!(config.ai.max_retries, 3);
    }

    #[test]
    fn proxies_are_declared_by_type() {
        let config = from_toml(
            r#"
            [fetch]
            min_content_len = 250

            [[fetch.proxies]]
            type = "Direct"

            [[fetch.proxies]]
            type = "Envelope"
            name = "Mirror"
            endpoint = "https://mirror.example/get?u={url}"
            field = "body"
            "#,
        );
        assert_eq!(config.fetch.min_content_len, 250);
        let names: Vec<_> = config.fetch.proxies.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["Direct", "Mirror"]);
    }
}

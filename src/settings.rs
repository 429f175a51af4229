use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::pools::Protocol;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_http_url")]
    pub http_url: String,
}

fn default_http_url() -> String {
    "http://localhost:8545".to_string()
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chain {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

fn default_chain_id() -> u64 {
    1
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MulticallSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_multicall_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_multicall_retries")]
    pub max_retries: u32,
}

fn default_batch_size() -> usize {
    100
}
fn default_multicall_timeout_seconds() -> u64 {
    3
}
fn default_multicall_retries() -> u32 {
    1
}

impl Default for MulticallSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_seconds: default_multicall_timeout_seconds(),
            max_retries: default_multicall_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenCacheSettings {
    #[serde(default = "default_token_cache_max_entries")]
    pub max_entries: usize,
}

fn default_token_cache_max_entries() -> usize {
    10_000
}

impl Default for TokenCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_token_cache_max_entries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteCacheSettings {
    #[serde(default = "default_route_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_route_cache_max_entries")]
    pub max_entries: usize,
    /// When set and the `redis` feature is enabled, plans are stored in Redis.
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_route_cache_ttl_seconds() -> u64 {
    60
}
fn default_route_cache_max_entries() -> usize {
    1000
}

impl Default for RouteCacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_route_cache_ttl_seconds(),
            max_entries: default_route_cache_max_entries(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Routing {
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
}

fn default_protocols() -> Vec<String> {
    vec!["v2".to_string(), "v3".to_string(), "mixed".to_string()]
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            protocols: default_protocols(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Per-chain deployment overrides from a `[chains.<id>]` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChainOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub multicall: Option<String>,
    #[serde(default)]
    pub layered: Option<String>,
    #[serde(default)]
    pub v2_factory: Option<String>,
    #[serde(default)]
    pub v2_init_code_hash: Option<String>,
    #[serde(default)]
    pub v3_factory: Option<String>,
    #[serde(default)]
    pub v3_init_code_hash: Option<String>,
    #[serde(default)]
    pub base_swap_cost: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub chain: Chain,
    #[serde(default)]
    pub multicall: MulticallSettings,
    #[serde(default)]
    pub token_cache: TokenCacheSettings,
    #[serde(default)]
    pub route_cache: RouteCacheSettings,
    #[serde(default)]
    pub routing: Routing,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub chains: HashMap<String, ChainOverride>,
}

impl Settings {
    /// Loads `Config.toml` from the working directory and applies `SDK_*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Applies `SDK_*` overrides from `lookup`. Empty or unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = non_empty("SDK_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(raw) = non_empty("SDK_CHAIN_ID") {
            match raw.parse() {
                Ok(id) => self.chain.chain_id = id,
                Err(e) => eprintln!("Failed to parse SDK_CHAIN_ID '{}': {}", raw, e),
            }
        }
        if let Some(raw) = non_empty("SDK_ROUTE_CACHE_TTL_SECONDS") {
            match raw.parse() {
                Ok(ttl) => self.route_cache.ttl_seconds = ttl,
                Err(e) => eprintln!("Failed to parse SDK_ROUTE_CACHE_TTL_SECONDS '{}': {}", raw, e),
            }
        }
        if let Some(url) = non_empty("SDK_REDIS_URL") {
            self.route_cache.redis_url = Some(url);
        }
    }

    /// Enabled protocols in canonical order. Unknown names are an error.
    pub fn protocols(&self) -> Result<Vec<Protocol>, String> {
        let mut out: Vec<Protocol> = self
            .routing
            .protocols
            .iter()
            .map(|p| p.parse())
            .collect::<Result<_, _>>()?;
        out.sort();
        out.dedup();
        Ok(out)
    }
}

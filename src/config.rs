//! TOML configuration.
//!
//! Read once at startup. The `[classifier]` and `[query]` sections are
//! turned into the immutable core tables ([`Taxonomy`], [`FacetTypeMap`])
//! that request handlers share by reference.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use sparc_search_core::query::{FacetTypeMap, DEFAULT_PAGE_SIZE};
use sparc_search_core::taxonomy::{PathRenames, Taxonomy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the index; `/_search` and `/_doc/<id>` are appended.
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "SCICRUNCH_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl IndexConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_size")]
    pub default_size: u64,
    /// Overrides and additions to the built-in facet terms.
    #[serde(default)]
    pub facets: BTreeMap<String, Vec<String>>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_PAGE_SIZE,
            facets: BTreeMap::new(),
        }
    }
}

fn default_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    /// Historical `dataset.path` → current path.
    #[serde(default)]
    pub path_renames: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Configuration for commands that never contact the index.
    pub fn minimal() -> Self {
        Self {
            index: IndexConfig {
                endpoint: String::new(),
                api_key_env: default_api_key_env(),
                timeout_secs: default_timeout_secs(),
                max_retries: default_max_retries(),
            },
            query: QueryConfig::default(),
            classifier: ClassifierConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Built-in taxonomy plus configured path renames.
    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::builtin().with_renames(PathRenames::new(
            self.classifier
                .path_renames
                .iter()
                .map(|(old, new)| (old.as_str(), new.as_str())),
        ))
    }

    /// Built-in facet terms with configured overrides applied.
    pub fn facet_map(&self) -> FacetTypeMap {
        let mut map = FacetTypeMap::builtin();
        for (term, fields) in &self.query.facets {
            map.insert(term, fields.iter().cloned());
        }
        map
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.index.endpoint.trim().is_empty() {
        anyhow::bail!("index.endpoint must not be empty");
    }
    if !config.index.endpoint.starts_with("http://") && !config.index.endpoint.starts_with("https://") {
        anyhow::bail!(
            "index.endpoint must be an http(s) URL, got '{}'",
            config.index.endpoint
        );
    }
    if config.index.timeout_secs == 0 {
        anyhow::bail!("index.timeout_secs must be > 0");
    }

    if config.query.default_size < 1 {
        anyhow::bail!("query.default_size must be >= 1");
    }
    for (term, fields) in &config.query.facets {
        if fields.is_empty() {
            anyhow::bail!("query.facets.{} must list at least one field", term);
        }
    }

    Ok(config)
}

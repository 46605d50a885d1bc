use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::params::{DbType, DEFAULT_DB_COLLECTION, DEFAULT_DB_ROOT, DEFAULT_DB_TYPE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub couchdb: CouchDbConfig,
}

/// Defaults for `--db_type`, `--db_root` and `--db_collection`.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(rename = "type", default = "default_type")]
    pub db_type: String,
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_type: default_type(),
            root: default_root(),
            collection: default_collection(),
        }
    }
}

fn default_type() -> String {
    DEFAULT_DB_TYPE.to_string()
}
fn default_root() -> String {
    DEFAULT_DB_ROOT.to_string()
}
fn default_collection() -> String {
    DEFAULT_DB_COLLECTION.to_string()
}

/// HTTP client settings for the CouchDB backend.
#[derive(Debug, Deserialize, Clone)]
pub struct CouchDbConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for CouchDbConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            username: None,
            password: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, otherwise fall back to built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate db
    if config.db.db_type.parse::<DbType>().is_err() {
        bail!(
            "Unknown db.type: '{}'. Must be {}.",
            config.db.db_type,
            DEFAULT_DB_TYPE
        );
    }
    if config.db.collection.trim().is_empty() {
        bail!("db.collection must not be empty");
    }
    if !(config.db.root.starts_with("http://") || config.db.root.starts_with("https://")) {
        bail!(
            "db.root must be an http:// or https:// URL, got '{}'",
            config.db.root
        );
    }

    // Validate couchdb
    if config.couchdb.timeout_secs == 0 {
        bail!("couchdb.timeout_secs must be > 0");
    }
    if config.couchdb.password.is_some() && config.couchdb.username.is_none() {
        bail!("couchdb.password requires couchdb.username");
    }

    Ok(())
}

//! Connection parameters and their translation from CLI arguments.
//!
//! The CLI exposes `--db_type`, `--db_root` and `--db_collection` plus a
//! repeatable `--db_param KEY=VALUE` override. [`args_to_db_params`] merges
//! them into a [`DbParameters`], with the overrides taking precedence.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::config::DbConfig;
use crate::error::{DbError, Result};

pub const DEFAULT_DB_COLLECTION: &str = "object_recognition";
pub const DEFAULT_DB_ROOT: &str = "http://localhost:5984";
pub const DEFAULT_DB_TYPE: &str = "CouchDB";

/// Database backends with a registered implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    CouchDb,
}

impl DbType {
    pub const ALL: &'static [DbType] = &[DbType::CouchDb];

    pub fn name(&self) -> &'static str {
        match self {
            DbType::CouchDb => "CouchDB",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        DbType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DbError::UnsupportedBackend(s.to_string()))
    }
}

/// Normalized connection parameters.
///
/// Each field is optional; absent fields are also left out of the JSON
/// form `{"type": ..., "root": ..., "collection": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbParameters {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    db_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
}

impl DbParameters {
    pub fn new(
        db_type: Option<String>,
        root: Option<String>,
        collection: Option<String>,
    ) -> Self {
        Self {
            db_type,
            root,
            collection,
        }
    }

    pub fn db_type(&self) -> Option<&str> {
        self.db_type.as_deref()
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// The backend named by `type`. Missing or unknown types are unsupported.
    pub fn backend(&self) -> Result<DbType> {
        self.db_type.as_deref().unwrap_or_default().parse()
    }

    pub fn root_or_default(&self) -> &str {
        self.root.as_deref().unwrap_or(DEFAULT_DB_ROOT)
    }

    pub fn collection_or_default(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_DB_COLLECTION)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Database flags shared by every `ordb` command.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Database Parameters")]
pub struct DbArgs {
    /// The type of database used: one of [CouchDB].
    #[arg(long = "db_type", value_name = "DB_TYPE", global = true, value_parser = parse_db_type)]
    pub db_type: Option<String>,

    /// The database root URL to connect to.
    #[arg(long = "db_root", value_name = "DB_ROOT_URL", global = true)]
    pub db_root: Option<String>,

    /// The database (collection) name to use.
    #[arg(long = "db_collection", value_name = "DB_COLLECTION", global = true)]
    pub db_collection: Option<String>,

    /// Override a connection parameter (`type`, `root` or `collection`).
    /// Takes precedence over the flags above.
    #[arg(
        long = "db_param",
        value_name = "KEY=VALUE",
        global = true,
        value_parser = parse_key_val
    )]
    pub db_params: Vec<(String, String)>,
}

impl DbArgs {
    /// Fill flags that were not given from the configured defaults.
    pub fn with_defaults(&self, defaults: &DbConfig) -> DbArgs {
        DbArgs {
            db_type: self
                .db_type
                .clone()
                .or_else(|| Some(defaults.db_type.clone())),
            db_root: self.db_root.clone().or_else(|| Some(defaults.root.clone())),
            db_collection: self
                .db_collection
                .clone()
                .or_else(|| Some(defaults.collection.clone())),
            db_params: self.db_params.clone(),
        }
    }

    /// The `--db_param` overrides as a map; later duplicates win.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        self.db_params.iter().cloned().collect()
    }
}

fn parse_db_type(s: &str) -> std::result::Result<String, String> {
    s.parse::<DbType>()
        .map(|t| t.name().to_string())
        .map_err(|e| e.to_string())
}

/// Parse a `key=value` pair for `--db_param` arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Merge CLI flags and a secondary map into [`DbParameters`].
///
/// For each of `type`, `root` and `collection`: the CLI value is used when
/// present, then replaced by the secondary map's value when that has one.
/// Fields set by neither stay absent. Other keys in `secondary` are ignored.
pub fn args_to_db_params(args: &DbArgs, secondary: &BTreeMap<String, String>) -> DbParameters {
    let pick = |cli: &Option<String>, key: &str| -> Option<String> {
        secondary.get(key).cloned().or_else(|| cli.clone())
    };
    DbParameters {
        db_type: pick(&args.db_type, "type"),
        root: pick(&args.db_root, "root"),
        collection: pick(&args.db_collection, "collection"),
    }
}

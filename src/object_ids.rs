//! Resolution of object-id selections.
//!
//! Scripts take `--ids` and `--names` arguments that are either the
//! keywords `all` / `missing` or a literal list such as `["id1", "id2"]`.
//! [`Selector::parse`] turns the text into a value without evaluating it,
//! and [`resolve_object_ids`] expands the selection against the database.

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::CouchDbConfig;
use crate::db;
use crate::error::{DbError, Result};
use crate::models;
use crate::params::DbParameters;
use crate::store::Database;

/// One `--ids` or `--names` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every known object.
    All,
    /// Objects that have no model yet.
    Missing,
    Explicit(Vec<String>),
}

impl Default for Selector {
    fn default() -> Self {
        Selector::Explicit(Vec::new())
    }
}

impl From<Vec<String>> for Selector {
    fn from(items: Vec<String>) -> Self {
        Selector::Explicit(items)
    }
}

impl Selector {
    /// Parse `all`, `missing`, or a list literal.
    ///
    /// Accepted list forms: `["a", 'b']`, `("a", "b",)`, and bare
    /// comma-separated words `a, b`. Empty text is an empty list.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        match trimmed {
            "all" => return Ok(Selector::All),
            "missing" => return Ok(Selector::Missing),
            _ => {}
        }
        let inner = match (trimmed.chars().next(), trimmed.chars().last()) {
            (Some('['), Some(']')) | (Some('('), Some(')')) if trimmed.len() >= 2 => {
                &trimmed[1..trimmed.len() - 1]
            }
            (Some('[' | '('), _) => {
                return Err(DbError::InvalidSelector(format!(
                    "unclosed list: {}",
                    text
                )))
            }
            _ => trimmed,
        };
        parse_items(inner)
            .map(Selector::Explicit)
            .map_err(|reason| DbError::InvalidSelector(format!("{} in '{}'", reason, text)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Selector::Explicit(items) if items.is_empty())
    }

    fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }

    fn is_missing(&self) -> bool {
        matches!(self, Selector::Missing)
    }
}

fn parse_items(inner: &str) -> std::result::Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek().copied() {
            None => break,
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                let mut item = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some('\\') => match chars.next() {
                            Some(c) => item.push(c),
                            None => return Err("dangling escape".to_string()),
                        },
                        Some(c) => item.push(c),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                items.push(item);
            }
            Some(_) => {
                let mut item = String::new();
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    item.push(c);
                }
                let item = item.trim_end();
                if item.is_empty() {
                    return Err("empty item".to_string());
                }
                if item.contains(['\'', '"']) {
                    return Err(format!("stray quote in '{}'", item));
                }
                items.push(item.to_string());
            }
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(format!("unexpected '{}'", c)),
        }
    }
    Ok(items)
}

/// Expand `ids` and `names` into concrete object ids, sorted and deduplicated.
///
/// - both empty: nothing;
/// - either `All`: every object id, ignoring everything else;
/// - either `Missing`: objects with no model at all;
/// - explicit ids are taken as given; explicit names are looked up.
pub fn resolve_object_ids(db: &dyn Database, ids: &Selector, names: &Selector) -> Result<Vec<String>> {
    if ids.is_empty() && names.is_empty() {
        return Ok(Vec::new());
    }

    let all_object_ids = || -> Result<BTreeSet<String>> {
        Ok(models::all_objects(db)?
            .iter()
            .map(|o| o.id().to_string())
            .collect())
    };

    if ids.is_all() || names.is_all() {
        return Ok(all_object_ids()?.into_iter().collect());
    }

    let mut object_ids = BTreeSet::new();
    if ids.is_missing() || names.is_missing() {
        let modeled: BTreeSet<String> = models::all_models(db)?
            .iter()
            .map(|m| m.object_id().to_string())
            .collect();
        object_ids.extend(all_object_ids()?.difference(&modeled).cloned());
    }
    if let Selector::Explicit(list) = ids {
        object_ids.extend(list.iter().cloned());
    }
    if let Selector::Explicit(list) = names {
        for name in list {
            object_ids.extend(
                models::objects_by_name(db, name)?
                    .iter()
                    .map(|o| o.id().to_string()),
            );
        }
    }
    Ok(object_ids.into_iter().collect())
}

/// Whether `params` names a supported backend; logs and returns false if not.
pub fn backend_supported(params: &DbParameters) -> Result<bool> {
    match params.backend() {
        Ok(_) => Ok(true),
        Err(DbError::UnsupportedBackend(kind)) => {
            warn!(db_type = %kind, "unsupported database type, no object ids resolved");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Connect with `params` and resolve the selection.
///
/// An unsupported database type yields an empty list rather than an error.
/// Nothing is opened when both selectors are empty.
pub fn resolve_with_params(
    params: &DbParameters,
    ids: &Selector,
    names: &Selector,
    settings: &CouchDbConfig,
) -> Result<Vec<String>> {
    if !backend_supported(params)? {
        return Ok(Vec::new());
    }
    if ids.is_empty() && names.is_empty() {
        return Ok(Vec::new());
    }
    let db = db::db_params_to_db(params, settings)?;
    resolve_object_ids(db.as_ref(), ids, names)
}

/// String-encoded form of [`resolve_with_params`].
///
/// `params_json` is the JSON form of [`DbParameters`]; `ids` and `names`
/// go through [`Selector::parse`].
pub fn interpret_object_ids(
    params_json: &str,
    ids: &str,
    names: &str,
    settings: &CouchDbConfig,
) -> Result<Vec<String>> {
    let params = DbParameters::from_json(params_json)?;
    if !backend_supported(&params)? {
        return Ok(Vec::new());
    }
    let ids = Selector::parse(ids)?;
    let names = Selector::parse(names)?;
    resolve_with_params(&params, &ids, &names, settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit(items: &[&str]) -> Selector {
        Selector::Explicit(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Selector::parse("all").unwrap(), Selector::All);
        assert_eq!(Selector::parse(" missing ").unwrap(), Selector::Missing);
    }

    #[test]
    fn test_parse_list_literals() {
        assert_eq!(
            Selector::parse(r#"["a1", 'b2']"#).unwrap(),
            explicit(&["a1", "b2"])
        );
        assert_eq!(
            Selector::parse("('a1',)").unwrap(),
            explicit(&["a1"])
        );
        assert_eq!(Selector::parse("a1, b2").unwrap(), explicit(&["a1", "b2"]));
        assert_eq!(Selector::parse("[]").unwrap(), Selector::default());
        assert_eq!(Selector::parse("").unwrap(), Selector::default());
        assert_eq!(
            Selector::parse(r#"["it's", "a \"b\""]"#).unwrap(),
            explicit(&["it's", "a \"b\""])
        );
    }

    #[test]
    fn test_parse_keyword_inside_list_is_literal() {
        assert_eq!(Selector::parse("['all']").unwrap(), explicit(&["all"]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["[a, b", "['a'", "[a,,b]", "['a' 'b']", "a'b"] {
            let err = Selector::parse(bad).unwrap_err();
            assert!(
                matches!(err, DbError::InvalidSelector(_)),
                "expected InvalidSelector for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_unsupported_type_is_empty() {
        let ids = interpret_object_ids(
            r#"{"type": "SQL", "root": "http://localhost:5984"}"#,
            "all",
            "",
            &CouchDbConfig::default(),
        )
        .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_missing_type_is_empty() {
        let ids = interpret_object_ids("{}", "all", "", &CouchDbConfig::default()).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_empty_selectors_do_not_connect() {
        // Port 9 is never a CouchDB; reaching the network would fail.
        let ids = interpret_object_ids(
            r#"{"type": "CouchDB", "root": "http://127.0.0.1:9"}"#,
            "[]",
            "",
            &CouchDbConfig::default(),
        )
        .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_malformed_params_json() {
        let err = interpret_object_ids("{'type': 'CouchDB'}", "all", "", &CouchDbConfig::default())
            .unwrap_err();
        assert!(matches!(err, DbError::Json(_)));
    }
}

//! Storage abstraction over a CouchDB-style document server.
//!
//! [`DocumentServer`] names and creates databases; [`Database`] is a handle
//! to one of them and covers the document, attachment, and query calls the
//! tools need. Two backends implement them:
//!
//! | Backend | Module | Used by |
//! |---------|--------|---------|
//! | CouchDB over HTTP | [`couchdb`] | the `ordb` binary |
//! | In-memory | [`memory`] | tests |
//!
//! All calls block until the server answers.

pub mod couchdb;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Metadata CouchDB keeps for each attachment of a document.
///
/// Sent back with `stub: true` when the document is saved so the server
/// keeps the attachment data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentStub {
    pub content_type: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revpos: Option<u64>,
    #[serde(default = "default_stub")]
    pub stub: bool,
}

fn default_stub() -> bool {
    true
}

/// A JSON document with CouchDB's reserved `_id`, `_rev` and
/// `_attachments` members split out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Empty until the document is first saved.
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attachments: BTreeMap<String, AttachmentStub>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// True when every key of `selector` is present with an equal value.
    pub fn matches(&self, selector: &Map<String, Value>) -> bool {
        selector.iter().all(|(key, expected)| match key.as_str() {
            "_id" => expected.as_str() == Some(self.id.as_str()),
            _ => self.fields.get(key) == Some(expected),
        })
    }
}

/// A server hosting named databases.
pub trait DocumentServer: Send + Sync {
    /// Whether a database with this name exists.
    fn has_database(&self, name: &str) -> Result<bool>;

    /// Create a database. Fails with a 412 server error if it already exists.
    fn create_database(&self, name: &str) -> Result<Box<dyn Database>>;

    /// Handle to an existing database.
    ///
    /// When a missing database is reported is up to the backend: CouchDB
    /// returns a handle without a request and the first operation fails
    /// with 404, the in-memory server fails here with the same 404 error.
    fn database(&self, name: &str) -> Result<Box<dyn Database>>;
}

/// Handle to one named database.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](Database::get) | Fetch a document by id |
/// | [`save`](Database::save) | Create or update a document |
/// | [`put_attachment`](Database::put_attachment) | Add binary content to a saved document |
/// | [`find`](Database::find) | Equality query over document fields |
/// | [`ensure_index`](Database::ensure_index) | Install a query index |
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a document, `None` if it does not exist.
    fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Create or update `doc`.
    ///
    /// Assigns a fresh id to new documents and stores the new revision
    /// back into `doc`.
    fn save(&self, doc: &mut Document) -> Result<()>;

    /// Attach `content` to an already-saved document under `filename`.
    ///
    /// Updates `doc.rev` and records the attachment stub on `doc`.
    fn put_attachment(
        &self,
        doc: &mut Document,
        filename: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<()>;

    /// All documents whose fields equal every entry of `selector`.
    fn find(&self, selector: &Map<String, Value>) -> Result<Vec<Document>>;

    /// Install (or keep) a named index over `fields`.
    fn ensure_index(&self, name: &str, fields: &[&str]) -> Result<()>;
}

/// Build a selector map from `(field, value)` pairs.
pub fn selector<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

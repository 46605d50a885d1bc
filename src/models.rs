//! Document shapes stored in the object-recognition database.
//!
//! Two kinds of documents live side by side, told apart by their `Type`
//! field:
//!
//! - **Object**: a physical object known to the pipeline (`object_name`,
//!   `description`, `tags`, author, `added` timestamp).
//! - **Model**: something computed for one object by one `method` (e.g.
//!   `"mesh"`), carrying its artifacts as attachments.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{DbError, Result};
use crate::store::{selector, Database, Document};

pub const OBJECT_TYPE: &str = "Object";
pub const MODEL_TYPE: &str = "Model";

/// Indexes installed by [`sync_models`], as `(name, fields)`.
pub const MODEL_INDEXES: &[(&str, &[&str])] = &[
    ("objects_by_name", &["Type", "object_name"]),
    ("models_by_object_and_method", &["Type", "object_id", "method"]),
];

/// An object document.
#[derive(Debug, Clone)]
pub struct ObjectDoc {
    doc: Document,
}

impl ObjectDoc {
    pub fn new(
        object_name: &str,
        description: &str,
        tags: &[String],
        author_name: &str,
        author_email: &str,
    ) -> Self {
        let mut doc = Document::new();
        doc.set("Type", OBJECT_TYPE);
        doc.set("object_name", object_name);
        doc.set("description", description);
        doc.set("tags", json!(tags));
        doc.set("author_name", author_name);
        doc.set("author_email", author_email);
        doc.set("added", Utc::now().to_rfc3339());
        Self { doc }
    }

    pub fn id(&self) -> &str {
        &self.doc.id
    }

    pub fn object_name(&self) -> &str {
        self.doc.get_str("object_name").unwrap_or_default()
    }

    pub fn tags(&self) -> Vec<String> {
        self.doc
            .fields
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn store(&mut self, db: &dyn Database) -> Result<()> {
        db.save(&mut self.doc)
    }

    /// Serialized form as it would be sent to the server.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.doc)?)
    }
}

/// A model document for one (object, method) pair.
#[derive(Debug, Clone)]
pub struct ModelDoc {
    doc: Document,
}

impl ModelDoc {
    pub fn new(object_id: &str, method: &str) -> Self {
        let mut doc = Document::new();
        doc.set("Type", MODEL_TYPE);
        doc.set("object_id", object_id);
        doc.set("method", method);
        doc.set("parameters", json!({}));
        Self { doc }
    }

    /// Load a model by document id.
    pub fn load(db: &dyn Database, id: &str) -> Result<Self> {
        let doc = db
            .get(id)?
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;
        Ok(Self { doc })
    }

    pub fn id(&self) -> &str {
        &self.doc.id
    }

    pub fn object_id(&self) -> &str {
        self.doc.get_str("object_id").unwrap_or_default()
    }

    pub fn method(&self) -> &str {
        self.doc.get_str("method").unwrap_or_default()
    }

    /// Names of the attachments the server holds for this model.
    pub fn attachment_names(&self) -> Vec<String> {
        self.doc.attachments.keys().cloned().collect()
    }

    pub fn store(&mut self, db: &dyn Database) -> Result<()> {
        db.save(&mut self.doc)
    }

    pub fn put_attachment(
        &mut self,
        db: &dyn Database,
        filename: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        db.put_attachment(&mut self.doc, filename, content_type, content)
    }
}

/// Install the query indexes the models rely on. Safe to call repeatedly.
pub fn sync_models(db: &dyn Database) -> Result<()> {
    for (name, fields) in MODEL_INDEXES {
        db.ensure_index(name, fields)?;
    }
    info!(db = db.name(), indexes = MODEL_INDEXES.len(), "models synced");
    Ok(())
}

/// Ids of the models computed for `object_id` by `method`.
pub fn find_model_for_object(db: &dyn Database, object_id: &str, method: &str) -> Result<Vec<String>> {
    let docs = db.find(&selector([
        ("Type", json!(MODEL_TYPE)),
        ("object_id", json!(object_id)),
        ("method", json!(method)),
    ]))?;
    Ok(docs.into_iter().map(|d| d.id).collect())
}

pub fn all_objects(db: &dyn Database) -> Result<Vec<ObjectDoc>> {
    let docs = db.find(&selector([("Type", json!(OBJECT_TYPE))]))?;
    Ok(docs.into_iter().map(|doc| ObjectDoc { doc }).collect())
}

pub fn all_models(db: &dyn Database) -> Result<Vec<ModelDoc>> {
    let docs = db.find(&selector([("Type", json!(MODEL_TYPE))]))?;
    Ok(docs.into_iter().map(|doc| ModelDoc { doc }).collect())
}

/// Objects whose `object_name` equals `name`.
pub fn objects_by_name(db: &dyn Database, name: &str) -> Result<Vec<ObjectDoc>> {
    let docs = db.find(&selector([
        ("Type", json!(OBJECT_TYPE)),
        ("object_name", json!(name)),
    ]))?;
    Ok(docs.into_iter().map(|doc| ObjectDoc { doc }).collect())
}

//! In-memory [`DocumentServer`] used by tests.
//!
//! Mirrors the CouchDB behaviour the tools rely on: revisions are checked
//! on every write, creating an existing database answers 412, and saving a
//! document drops any attachment whose stub was not sent back.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::error::{DbError, Result};

use super::{AttachmentStub, Database, Document, DocumentServer};

struct StoredDoc {
    doc: Document,
    data: BTreeMap<String, Vec<u8>>,
    seq: u64,
}

#[derive(Default)]
struct Collection {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    indexes: RwLock<BTreeMap<String, Vec<String>>>,
}

/// In-memory server holding any number of named databases.
pub struct InMemoryServer {
    databases: RwLock<HashMap<String, Arc<Collection>>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(HashMap::new()),
        }
    }

    pub fn database_count(&self) -> usize {
        self.databases.read().unwrap().len()
    }

    /// Concrete handle with test accessors, `None` if the database is absent.
    pub fn open(&self, name: &str) -> Option<InMemoryDatabase> {
        self.databases
            .read()
            .unwrap()
            .get(name)
            .map(|inner| InMemoryDatabase {
                name: name.to_string(),
                inner: Arc::clone(inner),
            })
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict() -> DbError {
    DbError::Server {
        status: 409,
        error: "conflict".to_string(),
        reason: "Document update conflict.".to_string(),
    }
}

fn missing_database(name: &str) -> DbError {
    DbError::Server {
        status: 404,
        error: "not_found".to_string(),
        reason: format!("Database does not exist: {}", name),
    }
}

impl DocumentServer for InMemoryServer {
    fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self.databases.read().unwrap().contains_key(name))
    }

    fn create_database(&self, name: &str) -> Result<Box<dyn Database>> {
        let mut dbs = self.databases.write().unwrap();
        if dbs.contains_key(name) {
            return Err(DbError::Server {
                status: 412,
                error: "file_exists".to_string(),
                reason: "The database could not be created, the file already exists."
                    .to_string(),
            });
        }
        let inner = Arc::new(Collection::default());
        dbs.insert(name.to_string(), Arc::clone(&inner));
        Ok(Box::new(InMemoryDatabase {
            name: name.to_string(),
            inner,
        }))
    }

    fn database(&self, name: &str) -> Result<Box<dyn Database>> {
        self.open(name)
            .map(|db| Box::new(db) as Box<dyn Database>)
            .ok_or_else(|| missing_database(name))
    }
}

/// Handle to one in-memory database. Clones share the same data.
#[derive(Clone)]
pub struct InMemoryDatabase {
    name: String,
    inner: Arc<Collection>,
}

impl InMemoryDatabase {
    /// Raw bytes of an attachment.
    pub fn attachment(&self, doc_id: &str, filename: &str) -> Option<Vec<u8>> {
        let docs = self.inner.docs.read().unwrap();
        docs.get(doc_id)
            .and_then(|stored| stored.data.get(filename).cloned())
    }

    pub fn document_count(&self) -> usize {
        self.inner.docs.read().unwrap().len()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.inner.indexes.read().unwrap().keys().cloned().collect()
    }

    /// Whether both handles address the same underlying collection.
    pub fn same_collection(&self, other: &InMemoryDatabase) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn next_rev(seq: u64) -> String {
    format!("{}-{}", seq, uuid::Uuid::new_v4().simple())
}

impl Database for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.inner.docs.read().unwrap();
        Ok(docs.get(id).map(|stored| stored.doc.clone()))
    }

    fn save(&self, doc: &mut Document) -> Result<()> {
        if doc.id.is_empty() {
            doc.id = uuid::Uuid::new_v4().simple().to_string();
        }
        let mut docs = self.inner.docs.write().unwrap();
        let (seq, mut data) = match docs.remove(&doc.id) {
            Some(stored) => {
                if stored.doc.rev != doc.rev {
                    docs.insert(doc.id.clone(), stored);
                    return Err(conflict());
                }
                (stored.seq + 1, stored.data)
            }
            None => {
                if doc.rev.is_some() {
                    return Err(conflict());
                }
                (1, BTreeMap::new())
            }
        };

        // Attachments survive only if their stubs came back with the document.
        data.retain(|name, _| doc.attachments.contains_key(name));
        doc.attachments.retain(|name, _| data.contains_key(name));
        doc.rev = Some(next_rev(seq));

        docs.insert(
            doc.id.clone(),
            StoredDoc {
                doc: doc.clone(),
                data,
                seq,
            },
        );
        Ok(())
    }

    fn put_attachment(
        &self,
        doc: &mut Document,
        filename: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let mut docs = self.inner.docs.write().unwrap();
        let stored = docs
            .get_mut(&doc.id)
            .ok_or_else(|| DbError::NotFound(doc.id.clone()))?;
        if stored.doc.rev != doc.rev {
            return Err(conflict());
        }

        stored.seq += 1;
        let stub = AttachmentStub {
            content_type: content_type.to_string(),
            length: content.len() as u64,
            digest: None,
            revpos: Some(stored.seq),
            stub: true,
        };
        stored.data.insert(filename.to_string(), content);
        stored
            .doc
            .attachments
            .insert(filename.to_string(), stub.clone());
        stored.doc.rev = Some(next_rev(stored.seq));

        doc.attachments.insert(filename.to_string(), stub);
        doc.rev = stored.doc.rev.clone();
        Ok(())
    }

    fn find(&self, selector: &Map<String, Value>) -> Result<Vec<Document>> {
        let docs = self.inner.docs.read().unwrap();
        Ok(docs
            .values()
            .filter(|stored| stored.doc.matches(selector))
            .map(|stored| stored.doc.clone())
            .collect())
    }

    fn ensure_index(&self, name: &str, fields: &[&str]) -> Result<()> {
        let mut indexes = self.inner.indexes.write().unwrap();
        indexes.insert(
            name.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        Ok(())
    }
}

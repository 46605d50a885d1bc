use tracing::info;

use crate::config::CouchDbConfig;
use crate::error::{DbError, Result};
use crate::models;
use crate::params::{DbParameters, DbType, DEFAULT_DB_COLLECTION};
use crate::store::couchdb::CouchServer;
use crate::store::{Database, DocumentServer};

/// Return the named database, creating it if it does not exist yet.
///
/// A 412 reply to the create (someone else created it in between) is
/// treated as success.
pub fn create_or_get(server: &dyn DocumentServer, name: &str) -> Result<Box<dyn Database>> {
    if server.has_database(name)? {
        return server.database(name);
    }
    match server.create_database(name) {
        Ok(db) => {
            info!(db = name, "created database");
            Ok(db)
        }
        Err(DbError::Server { status: 412, .. }) => server.database(name),
        Err(e) => Err(e),
    }
}

/// [`create_or_get`] followed by [`models::sync_models`].
pub fn init_object_databases(server: &dyn DocumentServer, name: &str) -> Result<Box<dyn Database>> {
    let db = create_or_get(server, name)?;
    models::sync_models(db.as_ref())?;
    Ok(db)
}

/// [`init_object_databases`] on the default `object_recognition` database.
pub fn init_default_database(server: &dyn DocumentServer) -> Result<Box<dyn Database>> {
    init_object_databases(server, DEFAULT_DB_COLLECTION)
}

/// Connect to the server described by `params`.
pub fn connect(params: &DbParameters, settings: &CouchDbConfig) -> Result<Box<dyn DocumentServer>> {
    match params.backend()? {
        DbType::CouchDb => Ok(Box::new(CouchServer::new(
            params.root_or_default(),
            settings,
        )?)),
    }
}

/// Open and initialize the database described by `params`.
pub fn db_params_to_db(params: &DbParameters, settings: &CouchDbConfig) -> Result<Box<dyn Database>> {
    let server = connect(params, settings)?;
    init_object_databases(server.as_ref(), params.collection_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryServer;
    use crate::store::Document;

    #[test]
    fn test_create_or_get_is_idempotent() {
        let server = InMemoryServer::new();
        let first = create_or_get(&server, "objects").unwrap();
        let second = create_or_get(&server, "objects").unwrap();
        assert_eq!(server.database_count(), 1);

        let mut doc = Document::new();
        first.save(&mut doc).unwrap();
        assert!(second.get(&doc.id).unwrap().is_some());
        assert_eq!(first.name(), second.name());
    }

    #[test]
    fn test_init_syncs_models() {
        let server = InMemoryServer::new();
        init_object_databases(&server, "objects").unwrap();
        let db = server.open("objects").unwrap();
        assert_eq!(db.index_names().len(), models::MODEL_INDEXES.len());
    }

    #[test]
    fn test_init_default_name() {
        let server = InMemoryServer::new();
        let db = init_default_database(&server).unwrap();
        assert_eq!(db.name(), "object_recognition");
    }

    #[test]
    fn test_unsupported_backend_is_an_error() {
        let params = DbParameters::new(Some("SQL".to_string()), None, None);
        let err = db_params_to_db(&params, &CouchDbConfig::default()).err().unwrap();
        assert!(matches!(err, DbError::UnsupportedBackend(_)));
    }
}

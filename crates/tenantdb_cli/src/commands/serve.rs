//! Serve command implementation.

use super::{open_registry, CliError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tenantdb_core::{BlobStore, DatabaseRegistry};
use tenantdb_server::{Backend, DatabaseServer, ServerConfig};

/// Runs the serve command. Blocks until the process is stopped.
pub fn run(
    data_dir: &Path,
    database: &str,
    bind: SocketAddr,
    batch_size: Option<usize>,
) -> Result<(), CliError> {
    let mut registry = open_registry(data_dir)?;
    let snapshot = registry.database(database)?.to_snapshot();
    tracing::info!(
        database,
        entities = snapshot.entities.len(),
        data_dir = %data_dir.display(),
        "serving database"
    );

    let mut config = ServerConfig::new(bind);
    if let Some(size) = batch_size {
        config = config.with_batch_size(size);
    }

    let registry = Arc::new(Mutex::new(registry));
    let name = database.to_string();
    let server = DatabaseServer::from_snapshot(config, snapshot)?
        .on_disconnect(move |backend| {
            persist(&registry, &name, backend);
        });
    server.run()?;
    Ok(())
}

/// Writes the backend's entities to the registry if they changed.
///
/// Returns true if a snapshot was written.
pub fn persist<B: BlobStore>(
    registry: &Mutex<DatabaseRegistry<B>>,
    database: &str,
    backend: &Backend,
) -> bool {
    let Some(snapshot) = backend.snapshot_if_dirty() else {
        return false;
    };
    let entities = snapshot.entities.len();
    match registry.lock().replace(database, snapshot) {
        Ok(()) => {
            tracing::info!(database, entities, "database persisted");
            true
        }
        Err(err) => {
            tracing::error!(database, error = %err, "failed to persist database");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantdb_core::{EmulatedStore, Entity, EntityDatabase, FileBlobStore};

    #[test]
    fn persists_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Mutex::new(
            DatabaseRegistry::open(FileBlobStore::open(dir.path()).unwrap()).unwrap(),
        );
        let backend = Backend::new(ServerConfig::default(), EmulatedStore::new());

        assert!(!persist(&registry, "main", &backend));

        backend
            .with_store(|store| store.save_entity(&mut Entity::empty("Item")))
            .unwrap();
        assert!(persist(&registry, "main", &backend));
        assert!(!persist(&registry, "main", &backend));

        let mut reopened = open_registry(dir.path()).unwrap();
        assert_eq!(reopened.database("main").unwrap().len(), 1);
    }
}

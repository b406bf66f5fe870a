//! Test fixtures.
//!
//! Entity builders, seeded stores, file-backed registries and servers on an
//! ephemeral port.

use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tenantdb_client::{ClientConfig, DatabaseClient, LoopbackConnection, TcpConnection};
use tenantdb_core::{
    DatabaseRegistry, EmulatedStore, Entity, EntityDatabase, EntityId, FileBlobStore,
};
use tenantdb_server::{Backend, DatabaseServer, ServerConfig, ServerHandle, Session};

/// Entity type used by the player fixtures.
pub const PLAYER_TYPE: &str = "PlayerEntity";

/// A player entity owned by `owner`.
pub fn player(name: &str, owner: &str) -> Entity {
    Entity::new(PLAYER_TYPE, json!({ "Name": name })).with_owner(owner)
}

/// An entity of `entity_type` without owners.
pub fn game_entity(entity_type: &str, data: Value) -> Entity {
    Entity::new(entity_type, data)
}

/// An entity of `entity_type` owned by every principal in `owners`.
pub fn shared_entity<'a>(entity_type: &str, owners: impl IntoIterator<Item = &'a str>) -> Entity {
    owners
        .into_iter()
        .fold(Entity::empty(entity_type), Entity::with_owner)
}

/// Saves `entities` into `store` and returns their ids in order.
pub fn seed<D: EntityDatabase>(
    store: &mut D,
    entities: impl IntoIterator<Item = Entity>,
) -> Vec<EntityId> {
    entities
        .into_iter()
        .map(|mut entity| {
            store.save_entity(&mut entity).expect("Failed to seed entity");
            entity.id().cloned().expect("Saved entity has no id")
        })
        .collect()
}

/// A fresh emulated store holding `entities`.
pub fn seeded_store(entities: impl IntoIterator<Item = Entity>) -> (EmulatedStore, Vec<EntityId>) {
    let mut store = EmulatedStore::new();
    let ids = seed(&mut store, entities);
    (store, ids)
}

/// A registry over a temporary directory, removed on drop.
pub struct TestRegistry {
    /// The registry.
    pub registry: DatabaseRegistry<FileBlobStore>,
    _temp_dir: TempDir,
}

impl TestRegistry {
    /// Creates an empty registry in a new temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let registry = open_registry(temp_dir.path());
        Self {
            registry,
            _temp_dir: temp_dir,
        }
    }

    /// Directory holding the blobs.
    pub fn path(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Opens a second registry over the same directory, as a restarted
    /// process would.
    pub fn reopen(&self) -> DatabaseRegistry<FileBlobStore> {
        open_registry(self.path())
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestRegistry {
    type Target = DatabaseRegistry<FileBlobStore>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

impl std::ops::DerefMut for TestRegistry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.registry
    }
}

fn open_registry(dir: &Path) -> DatabaseRegistry<FileBlobStore> {
    let blobs = FileBlobStore::open(dir).expect("Failed to open blob directory");
    DatabaseRegistry::open(blobs).expect("Failed to open registry")
}

/// A server on an ephemeral localhost port, stopped on drop.
pub struct TestServer {
    handle: Option<ServerHandle>,
    backend: Arc<Backend>,
}

impl TestServer {
    /// Starts a server over an empty store with default configuration.
    pub fn start() -> Self {
        Self::with_config(ServerConfig::default(), EmulatedStore::new())
    }

    /// Starts a server with the given cursor batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::with_config(
            ServerConfig::default().with_batch_size(batch_size),
            EmulatedStore::new(),
        )
    }

    /// Starts a server over `store`.
    pub fn with_config(config: ServerConfig, store: EmulatedStore) -> Self {
        let server = DatabaseServer::new(config, store);
        let backend = Arc::clone(server.backend());
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
        let handle = server.spawn(listener).expect("Failed to spawn test server");
        Self {
            handle: Some(handle),
            backend,
        }
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.handle
            .as_ref()
            .map(ServerHandle::local_addr)
            .expect("Server already stopped")
    }

    /// Shared backend, for inspecting locks and stored entities.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Connects a backend-context client.
    pub fn client(&self, execution_id: &str) -> DatabaseClient<TcpConnection> {
        let config =
            ClientConfig::new(execution_id).with_read_timeout(Duration::from_secs(10));
        DatabaseClient::connect_tcp(self.addr(), config).expect("Failed to connect test client")
    }

    /// Stops accepting connections.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A client talking to a session in the same process.
pub type LoopbackClient = DatabaseClient<LoopbackConnection<Session>>;

/// Connects an in-process client to `backend`.
pub fn loopback_client(backend: &Arc<Backend>, execution_id: &str) -> LoopbackClient {
    let connection = LoopbackConnection::new(Session::new(Arc::clone(backend)));
    DatabaseClient::connect(connection, ClientConfig::new(execution_id))
        .expect("Failed to connect loopback client")
}

/// A backend over an empty store with the given cursor batch size.
pub fn test_backend(batch_size: usize) -> Arc<Backend> {
    Arc::new(Backend::new(
        ServerConfig::default().with_batch_size(batch_size),
        EmulatedStore::new(),
    ))
}

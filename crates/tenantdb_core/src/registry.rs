//! Named databases persisted through a blob collaborator.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::{EmulatedStore, Snapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Key under which the list of database names is stored.
pub const DATABASE_LIST_KEY: &str = "tenantdb.databases";

/// Key under which a database snapshot is stored.
#[must_use]
pub fn database_key(name: &str) -> String {
    format!("tenantdb.database:{name}")
}

/// Opaque key/value byte storage.
///
/// The registry owns the meaning of keys and values; a blob store only
/// keeps bytes. A missing key is `Ok(None)`, never an error.
pub trait BlobStore {
    /// Reads the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn load(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn save(&mut self, key: &str, bytes: &[u8]) -> CoreResult<()>;

    /// Removes the blob stored under `key`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn delete(&mut self, key: &str) -> CoreResult<()>;
}

/// Blob store kept in memory, for tests and ephemeral use.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> CoreResult<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Blob store keeping one file per key inside a directory.
///
/// Keys are percent-encoded into file names, so any key is accepted.
/// Writes go to a temporary file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Opens a blob directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The blob directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_') {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".blob");
        self.dir.join(name)
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("blob.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> CoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Table of named databases.
///
/// Databases are loaded from the blob store on first access and kept in
/// memory afterwards. Asking for a database that does not exist creates and
/// persists an empty one.
///
/// # Example
///
/// ```rust
/// use tenantdb_core::{DatabaseRegistry, Entity, EntityDatabase, MemoryBlobStore};
///
/// let mut registry = DatabaseRegistry::open(MemoryBlobStore::new())?;
/// let db = registry.database("main")?;
/// db.save_entity(&mut Entity::empty("Item"))?;
/// registry.save("main")?;
///
/// assert_eq!(registry.names().collect::<Vec<_>>(), ["main"]);
/// # Ok::<(), tenantdb_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct DatabaseRegistry<B: BlobStore> {
    blobs: B,
    config: StoreConfig,
    names: BTreeSet<String>,
    loaded: BTreeMap<String, EmulatedStore>,
}

impl<B: BlobStore> DatabaseRegistry<B> {
    /// Opens a registry over a blob store.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored name list cannot be read or decoded.
    pub fn open(blobs: B) -> CoreResult<Self> {
        Self::with_config(blobs, StoreConfig::default())
    }

    /// Opens a registry whose databases use the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored name list cannot be read or decoded.
    pub fn with_config(blobs: B, config: StoreConfig) -> CoreResult<Self> {
        let names: BTreeSet<String> = match blobs.load(DATABASE_LIST_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => BTreeSet::new(),
        };
        tracing::info!(databases = names.len(), "database registry opened");
        Ok(Self {
            blobs,
            config,
            names,
            loaded: BTreeMap::new(),
        })
    }

    /// Names of every database, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// Returns true if a database with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// The underlying blob store.
    #[must_use]
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Returns the named database, loading or creating it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty name, or an error if the blob
    /// store fails or holds an undecodable snapshot.
    pub fn database(&mut self, name: &str) -> CoreResult<&mut EmulatedStore> {
        if name.is_empty() {
            return Err(CoreError::invalid_argument("database name is empty"));
        }

        if !self.loaded.contains_key(name) {
            let store = match self.blobs.load(&database_key(name))? {
                Some(bytes) => {
                    let store =
                        EmulatedStore::from_snapshot(Snapshot::from_bytes(&bytes)?, self.config.clone())?;
                    tracing::info!(database = name, entities = store.len(), "database loaded");
                    store
                }
                None => {
                    let store = EmulatedStore::with_config(self.config.clone());
                    self.blobs
                        .save(&database_key(name), &store.to_snapshot().to_bytes()?)?;
                    tracing::info!(database = name, "database created");
                    store
                }
            };
            if self.names.insert(name.to_string()) {
                self.save_names()?;
            }
            self.loaded.insert(name.to_string(), store);
        }

        self.loaded
            .get_mut(name)
            .ok_or_else(|| CoreError::invalid_operation(format!("database '{name}' not loaded")))
    }

    /// Persists a loaded database. Returns false if it is not loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store fails.
    pub fn save(&mut self, name: &str) -> CoreResult<bool> {
        let Some(store) = self.loaded.get_mut(name) else {
            return Ok(false);
        };
        self.blobs
            .save(&database_key(name), &store.to_snapshot().to_bytes()?)?;
        store.mark_clean();
        tracing::debug!(database = name, entities = store.len(), "database saved");
        Ok(true)
    }

    /// Persists every loaded database that changed. Returns how many were saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store fails.
    pub fn save_dirty(&mut self) -> CoreResult<usize> {
        let dirty: Vec<String> = self
            .loaded
            .iter()
            .filter(|(_, store)| store.is_dirty())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &dirty {
            self.save(name)?;
        }
        Ok(dirty.len())
    }

    /// Replaces the contents of a database and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is invalid or the blob store fails.
    pub fn replace(&mut self, name: &str, snapshot: Snapshot) -> CoreResult<()> {
        let store = EmulatedStore::from_snapshot(snapshot, self.config.clone())?;
        self.database(name)?;
        self.loaded.insert(name.to_string(), store);
        self.save(name)?;
        Ok(())
    }

    /// Deletes a database. Returns false if no such database exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store fails.
    pub fn delete(&mut self, name: &str) -> CoreResult<bool> {
        if !self.names.remove(name) {
            return Ok(false);
        }
        if let Some(mut store) = self.loaded.remove(name) {
            store.clear();
        }
        self.save_names()?;
        self.blobs.delete(&database_key(name))?;
        tracing::info!(database = name, "database deleted");
        Ok(true)
    }

    fn save_names(&mut self) -> CoreResult<()> {
        let bytes = serde_json::to_vec(&self.names)?;
        self.blobs.save(DATABASE_LIST_KEY, &bytes)
    }
}

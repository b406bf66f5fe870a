//! # TenantDB Core
//!
//! Core document engine for TenantDB.
//!
//! This crate provides:
//! - `Entity` documents with a type tag, free-form JSON data and an owner set
//! - `OwnerSet` with complete/incomplete knowledge and delta tracking
//! - `Query` values and the evaluator shared by every store implementation
//! - `EmulatedStore`, the in-process reference implementation of `EntityDatabase`
//! - `TransactionTracker` for nested transaction depth
//! - `DatabaseRegistry` for named databases persisted through a `BlobStore`
//!
//! ## Quick Start
//!
//! ```rust
//! use tenantdb_core::{EmulatedStore, Entity, EntityDatabase, Query};
//! use serde_json::json;
//!
//! let mut store = EmulatedStore::new();
//!
//! let mut player = Entity::new("PlayerEntity", json!({ "name": "John" }));
//! player.owners_mut().add("alice");
//! store.save_entity(&mut player)?;
//!
//! let query = Query::new("PlayerEntity").require_owner("alice");
//! let found: Vec<_> = store.query_entities(&query)?.collect::<Result<_, _>>()?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), tenantdb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod entity;
mod error;
mod query;
mod registry;
mod store;
mod transaction;

pub use config::{AccessPolicy, StoreConfig};
pub use entity::{Entity, EntityId, OwnerDelta, OwnerSet, Ownership, PrincipalId};
pub use error::{CoreError, CoreResult};
pub use query::{
    execute_query, BooleanOp, Operator, Query, QuerySource, ValuePath, WhereClause,
};
pub use registry::{
    database_key, BlobStore, DatabaseRegistry, FileBlobStore, MemoryBlobStore, DATABASE_LIST_KEY,
};
pub use store::{
    EmulatedStore, EntityDatabase, LockType, OwnerIter, OwnershipIndex, QueryResults, Snapshot,
};
pub use transaction::TransactionTracker;

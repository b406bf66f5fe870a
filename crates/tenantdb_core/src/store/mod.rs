//! Entity stores.

mod emulated;
mod index;

pub use emulated::{EmulatedStore, OwnerIter, QueryResults, Snapshot};
pub use index::OwnershipIndex;

use crate::entity::{Entity, EntityId, PrincipalId};
use crate::error::CoreResult;
use crate::query::Query;
use serde::{Deserialize, Serialize};

/// Row lock requested by a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// Exclusive lock held until the outermost transaction level ends.
    ForUpdate,
}

impl LockType {
    /// Wire name of the lock type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForUpdate => "for_update",
        }
    }
}

/// Operations every entity store supports.
///
/// Implemented by the in-process [`EmulatedStore`] and by the remote client.
/// Sequences returned by `entity_owners` and `query_entities` are lazy; a
/// remote implementation fetches them in batches as they are consumed.
pub trait EntityDatabase {
    /// Lazy sequence of owner ids.
    type Owners<'a>: Iterator<Item = CoreResult<PrincipalId>> + 'a
    where
        Self: 'a;

    /// Lazy sequence of query results.
    type Entities<'a>: Iterator<Item = CoreResult<Entity>> + 'a
    where
        Self: 'a;

    /// Inserts or updates an entity.
    ///
    /// On success the entity's id and timestamps are populated and its owner
    /// delta is cleared.
    fn save_entity(&mut self, entity: &mut Entity) -> CoreResult<()>;

    /// Loads an entity with a complete owner set, or `None` if absent.
    fn load_entity(&mut self, id: &EntityId, lock: Option<LockType>) -> CoreResult<Option<Entity>>;

    /// Deletes an entity. Returns false if it did not exist.
    fn delete_entity(&mut self, id: &EntityId) -> CoreResult<bool>;

    /// Enumerates the owners of an entity; empty if the entity is absent.
    fn entity_owners<'a>(&'a mut self, id: &EntityId) -> CoreResult<Self::Owners<'a>>;

    /// Returns true if the principal owns the entity.
    fn is_entity_owner(&mut self, id: &EntityId, principal: &PrincipalId) -> CoreResult<bool>;

    /// Runs a query.
    fn query_entities<'a>(&'a mut self, query: &Query) -> CoreResult<Self::Entities<'a>>;

    /// Opens a transaction level.
    fn start_transaction(&mut self) -> CoreResult<()>;

    /// Commits the innermost level; no-op at depth zero.
    fn commit_transaction(&mut self) -> CoreResult<()>;

    /// Rolls back the innermost level; no-op at depth zero.
    fn rollback_transaction(&mut self) -> CoreResult<()>;

    /// Current transaction depth.
    fn transaction_level(&self) -> usize;
}

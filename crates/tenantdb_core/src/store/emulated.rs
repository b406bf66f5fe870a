//! In-process reference store.

use super::index::OwnershipIndex;
use super::{EntityDatabase, LockType};
use crate::config::{AccessPolicy, StoreConfig};
use crate::entity::{Entity, EntityId, OwnerSet, PrincipalId};
use crate::error::{CoreError, CoreResult};
use crate::query::{execute_query, Query, QuerySource};
use crate::transaction::TransactionTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{btree_set, BTreeMap, BTreeSet};
use std::vec;

#[derive(Debug, Clone)]
struct Document {
    entity_type: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted form of a whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every stored entity, with complete owner sets.
    pub entities: Vec<Entity>,
}

impl Snapshot {
    /// Encodes the snapshot as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the bytes are not a valid snapshot.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// In-memory entity store.
///
/// Documents and the ownership index live in ordered maps, so query results
/// come out in id order. Transactions only track depth here: every write is
/// visible immediately and rollback does not undo anything.
///
/// # Example
///
/// ```rust
/// use tenantdb_core::{EmulatedStore, Entity, EntityDatabase};
/// use serde_json::json;
///
/// let mut store = EmulatedStore::new();
/// let mut item = Entity::new("Item", json!({ "level": 1 })).with_owner("alice");
/// store.save_entity(&mut item)?;
///
/// let id = item.id().cloned().unwrap();
/// let loaded = store.load_entity(&id, None)?.unwrap();
/// assert!(loaded.owners().contains("alice"));
/// # Ok::<(), tenantdb_core::CoreError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmulatedStore {
    config: StoreConfig,
    documents: BTreeMap<EntityId, Document>,
    index: OwnershipIndex,
    transactions: TransactionTracker,
    dirty: bool,
}

impl EmulatedStore {
    /// Creates an empty store that allows every operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a snapshot entity has no id or type.
    pub fn from_snapshot(snapshot: Snapshot, config: StoreConfig) -> CoreResult<Self> {
        let mut store = Self::with_config(config);
        for entity in snapshot.entities {
            let id = entity
                .id()
                .cloned()
                .ok_or_else(|| CoreError::invalid_argument("snapshot entity has no id"))?;
            validate_id(&id)?;
            validate_type(entity.entity_type())?;
            store.restore_entity(&id, Some(entity));
        }
        store.dirty = false;
        Ok(store)
    }

    /// Captures every entity.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            entities: self.documents.keys().filter_map(|id| self.get(id)).collect(),
        }
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns true if the entity exists.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.documents.contains_key(id)
    }

    /// Ownership index.
    #[must_use]
    pub fn index(&self) -> &OwnershipIndex {
        &self.index
    }

    /// Returns true if anything changed since the last [`mark_clean`](Self::mark_clean).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the change flag after the store was persisted.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        if !self.documents.is_empty() {
            self.dirty = true;
        }
        self.documents.clear();
        self.index.clear();
        self.transactions.reset();
    }

    /// Reads an entity without access checks or locking.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        let doc = self.documents.get(id)?;
        Some(Entity::from_parts(
            id.clone(),
            doc.entity_type.clone(),
            doc.data.clone(),
            OwnerSet::complete(self.index.owners_of(id)),
            doc.created_at,
            doc.updated_at,
        ))
    }

    /// Iterates over every entity in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.documents.keys().filter_map(|id| self.get(id))
    }

    /// Evaluates a query without access checks and returns matching ids.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the query fails validation.
    pub fn find(&self, query: &Query) -> CoreResult<Vec<EntityId>> {
        execute_query(self, query)
    }

    /// Puts an entity back exactly as captured by [`get`](Self::get), or
    /// removes it when `entity` is `None`.
    ///
    /// Timestamps and owners are taken verbatim.
    pub fn restore_entity(&mut self, id: &EntityId, entity: Option<Entity>) {
        self.dirty = true;
        let Some(entity) = entity else {
            self.documents.remove(id);
            self.index.remove_entity(id);
            return;
        };

        let now = Utc::now();
        let created_at = entity.created_at().unwrap_or(now);
        let updated_at = entity.updated_at().unwrap_or(created_at);
        self.index.replace(id, entity.owners().known_owners());
        self.documents.insert(
            id.clone(),
            Document {
                entity_type: entity.entity_type().to_string(),
                data: entity.data().clone(),
                created_at,
                updated_at,
            },
        );
    }

    fn ensure_access(&self) -> CoreResult<()> {
        match self.config.access {
            AccessPolicy::Allow => Ok(()),
            AccessPolicy::Forbid => Err(CoreError::Forbidden),
        }
    }

    fn fresh_id(&self) -> EntityId {
        loop {
            let id = EntityId::generate();
            if !self.documents.contains_key(&id) {
                return id;
            }
        }
    }

    fn reconcile_owners(&mut self, id: &EntityId, owners: &OwnerSet, existed: bool) {
        if !existed || owners.is_complete() {
            self.index.replace(id, owners.known_owners());
            return;
        }

        let delta = owners.delta();
        for owner in &delta.removed {
            self.index.remove(id, owner);
        }
        for owner in &delta.added {
            self.index.add(id, owner);
        }
    }
}

impl QuerySource for EmulatedStore {
    fn entities_of_type(&self, entity_type: &str) -> Vec<EntityId> {
        self.documents
            .iter()
            .filter(|(_, doc)| doc.entity_type == entity_type)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn entities_owned_by(&self, owner: &PrincipalId) -> BTreeSet<EntityId> {
        self.index.owned_by(owner)
    }

    fn owner_count(&self, id: &EntityId) -> usize {
        self.index.owner_count(id)
    }

    fn entity_data(&self, id: &EntityId) -> Option<&Value> {
        self.documents.get(id).map(|doc| &doc.data)
    }
}

impl EntityDatabase for EmulatedStore {
    type Owners<'a> = OwnerIter;
    type Entities<'a> = QueryResults<'a>;

    fn save_entity(&mut self, entity: &mut Entity) -> CoreResult<()> {
        self.ensure_access()?;
        validate_type(entity.entity_type())?;

        let now = Utc::now();
        let (id, created_at, existed) = match entity.id().cloned() {
            None => (self.fresh_id(), now, false),
            Some(id) => {
                validate_id(&id)?;
                match self.documents.get(&id) {
                    Some(doc) => (id, doc.created_at, true),
                    None => (id, entity.created_at().unwrap_or(now), false),
                }
            }
        };

        self.documents.insert(
            id.clone(),
            Document {
                entity_type: entity.entity_type().to_string(),
                data: entity.data().clone(),
                created_at,
                updated_at: now,
            },
        );
        self.reconcile_owners(&id, entity.owners(), existed);
        self.dirty = true;

        tracing::debug!(entity_id = %id, inserted = !existed, "entity saved");
        entity.mark_saved(id, created_at, now);
        Ok(())
    }

    fn load_entity(&mut self, id: &EntityId, _lock: Option<LockType>) -> CoreResult<Option<Entity>> {
        self.ensure_access()?;
        validate_id(id)?;
        Ok(self.get(id))
    }

    fn delete_entity(&mut self, id: &EntityId) -> CoreResult<bool> {
        self.ensure_access()?;
        validate_id(id)?;
        let existed = self.documents.remove(id).is_some();
        self.index.remove_entity(id);
        if existed {
            self.dirty = true;
            tracing::debug!(entity_id = %id, "entity deleted");
        }
        Ok(existed)
    }

    fn entity_owners<'a>(&'a mut self, id: &EntityId) -> CoreResult<OwnerIter> {
        self.ensure_access()?;
        validate_id(id)?;
        Ok(OwnerIter {
            inner: self.index.owners_of(id).into_iter(),
        })
    }

    fn is_entity_owner(&mut self, id: &EntityId, principal: &PrincipalId) -> CoreResult<bool> {
        self.ensure_access()?;
        validate_id(id)?;
        if principal.is_empty() {
            return Err(CoreError::invalid_argument("principal id is empty"));
        }
        Ok(self.index.is_owner(id, principal))
    }

    fn query_entities<'a>(&'a mut self, query: &Query) -> CoreResult<QueryResults<'a>> {
        self.ensure_access()?;
        let ids = execute_query(&*self, query)?;
        Ok(QueryResults {
            store: self,
            ids: ids.into_iter(),
        })
    }

    fn start_transaction(&mut self) -> CoreResult<()> {
        self.ensure_access()?;
        self.transactions.start();
        Ok(())
    }

    fn commit_transaction(&mut self) -> CoreResult<()> {
        self.ensure_access()?;
        self.transactions.commit();
        Ok(())
    }

    fn rollback_transaction(&mut self) -> CoreResult<()> {
        self.ensure_access()?;
        self.transactions.rollback();
        Ok(())
    }

    fn transaction_level(&self) -> usize {
        self.transactions.level()
    }
}

/// Owner ids of one entity.
#[derive(Debug)]
pub struct OwnerIter {
    inner: btree_set::IntoIter<PrincipalId>,
}

impl Iterator for OwnerIter {
    type Item = CoreResult<PrincipalId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Query results materialized one entity at a time.
#[derive(Debug)]
pub struct QueryResults<'a> {
    store: &'a EmulatedStore,
    ids: vec::IntoIter<EntityId>,
}

impl Iterator for QueryResults<'_> {
    type Item = CoreResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.by_ref().find_map(|id| self.store.get(&id)).map(Ok)
    }
}

fn validate_id(id: &EntityId) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_argument("entity id is empty"));
    }
    Ok(())
}

fn validate_type(entity_type: &str) -> CoreResult<()> {
    if entity_type.is_empty() {
        return Err(CoreError::invalid_argument("entity type is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn save(store: &mut EmulatedStore, ty: &str, data: Value, owners: &[&str]) -> EntityId {
        let mut entity = Entity::new(ty, data);
        for owner in owners {
            entity.owners_mut().add(*owner);
        }
        store.save_entity(&mut entity).unwrap();
        entity.id().cloned().unwrap()
    }

    fn query_ids(store: &mut EmulatedStore, query: &Query) -> Vec<EntityId> {
        store
            .query_entities(query)
            .unwrap()
            .map(|e| e.unwrap().id().cloned().unwrap())
            .collect()
    }

    #[test]
    fn insert_assigns_id_and_timestamps() {
        let mut store = EmulatedStore::new();
        let mut entity = Entity::new("Item", json!({ "a": 1 }));
        store.save_entity(&mut entity).unwrap();

        assert!(entity.id().is_some());
        assert_eq!(entity.created_at(), entity.updated_at());
        assert!(store.is_dirty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_then_load_round_trip() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({ "name": "sword" }), &["alice", "bob"]);

        let loaded = store.load_entity(&id, None).unwrap().unwrap();
        assert_eq!(loaded.entity_type(), "Item");
        assert_eq!(loaded.data(), &json!({ "name": "sword" }));
        assert!(loaded.owners().is_complete());
        assert_eq!(loaded.owners().count(), 2);
    }

    #[test]
    fn update_keeps_created_at() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({}), &[]);
        let mut loaded = store.load_entity(&id, None).unwrap().unwrap();
        let created = loaded.created_at();

        loaded.set_data(json!({ "changed": true }));
        store.save_entity(&mut loaded).unwrap();

        let reloaded = store.load_entity(&id, None).unwrap().unwrap();
        assert_eq!(reloaded.created_at(), created);
        assert!(reloaded.updated_at() >= created);
        assert_eq!(reloaded.data()["changed"], true);
    }

    #[test]
    fn saved_copy_is_detached() {
        let mut store = EmulatedStore::new();
        let mut entity = Entity::new("Item", json!({ "v": 1 }));
        store.save_entity(&mut entity).unwrap();
        entity.set_data(json!({ "v": 2 }));

        let id = entity.id().cloned().unwrap();
        let loaded = store.load_entity(&id, None).unwrap().unwrap();
        assert_eq!(loaded.data()["v"], 1);
    }

    #[test]
    fn complete_owner_set_replaces_rows() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({}), &["alice", "bob"]);

        let mut loaded = store.load_entity(&id, None).unwrap().unwrap();
        loaded.owners_mut().remove("alice");
        loaded.owners_mut().add("carol");
        store.save_entity(&mut loaded).unwrap();

        let owners: Vec<_> = store
            .entity_owners(&id)
            .unwrap()
            .map(|o| o.unwrap().as_str().to_string())
            .collect();
        assert_eq!(owners, ["bob", "carol"]);
    }

    #[test]
    fn incomplete_owner_set_keeps_unknown_owners() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({}), &["alice", "bob", "carol"]);

        let loaded = store.load_entity(&id, None).unwrap().unwrap();
        let mut partial = Entity::from_parts(
            id.clone(),
            "Item",
            loaded.data().clone(),
            OwnerSet::partial(["alice"], 3),
            loaded.created_at().unwrap(),
            loaded.updated_at().unwrap(),
        );
        partial.owners_mut().remove("alice");
        partial.owners_mut().add("dave");
        store.save_entity(&mut partial).unwrap();

        let p = |s: &str| PrincipalId::new(s);
        assert!(!store.is_entity_owner(&id, &p("alice")).unwrap());
        assert!(store.is_entity_owner(&id, &p("bob")).unwrap());
        assert!(store.is_entity_owner(&id, &p("carol")).unwrap());
        assert!(store.is_entity_owner(&id, &p("dave")).unwrap());
        assert_eq!(partial.owners().count(), 3);
    }

    #[test]
    fn reload_corrects_overstated_owner_count() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({}), &["alice", "bob"]);

        let loaded = store.load_entity(&id, None).unwrap().unwrap();
        let mut partial = Entity::from_parts(
            id.clone(),
            "Item",
            loaded.data().clone(),
            OwnerSet::partial(["alice"], 2),
            loaded.created_at().unwrap(),
            loaded.updated_at().unwrap(),
        );
        partial.owners_mut().add("bob");
        assert_eq!(partial.owners().count(), 3);
        store.save_entity(&mut partial).unwrap();

        let reloaded = store.load_entity(&id, None).unwrap().unwrap();
        assert!(reloaded.owners().is_complete());
        assert_eq!(reloaded.owners().count(), 2);
    }

    #[test]
    fn upsert_unknown_id() {
        let mut store = EmulatedStore::new();
        let mut entity = Entity::new("Item", json!({})).with_id("fixed-id");
        store.save_entity(&mut entity).unwrap();
        assert!(store.contains(&EntityId::new("fixed-id")));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({}), &["alice"]);
        assert!(store.delete_entity(&id).unwrap());
        assert!(!store.delete_entity(&id).unwrap());
        assert!(store.load_entity(&id, None).unwrap().is_none());
        assert!(store.index().owned_by(&PrincipalId::new("alice")).is_empty());
    }

    #[test]
    fn absent_entity_lookups() {
        let mut store = EmulatedStore::new();
        let id = EntityId::new("missing");
        assert!(store.load_entity(&id, Some(LockType::ForUpdate)).unwrap().is_none());
        assert_eq!(store.entity_owners(&id).unwrap().count(), 0);
        assert!(!store.is_entity_owner(&id, &PrincipalId::new("a")).unwrap());
    }

    #[test]
    fn ownership_classification_queries() {
        let mut store = EmulatedStore::new();
        let game = save(&mut store, "Item", json!({}), &[]);
        let player = save(&mut store, "Item", json!({}), &["alice"]);
        let shared = save(&mut store, "Item", json!({}), &["alice", "bob"]);

        assert_eq!(query_ids(&mut store, &Query::new("Item").exactly()), [game]);
        assert_eq!(
            query_ids(&mut store, &Query::new("Item").require_owner("alice").exactly()),
            [player.clone()]
        );

        let mut at_least = query_ids(&mut store, &Query::new("Item").require_owner("alice"));
        at_least.sort();
        let mut expected = vec![player, shared.clone()];
        expected.sort();
        assert_eq!(at_least, expected);

        assert_eq!(
            query_ids(
                &mut store,
                &Query::new("Item").require_owner("alice").require_owner("bob")
            ),
            [shared]
        );
    }

    #[test]
    fn invalid_arguments() {
        let mut store = EmulatedStore::new();
        let err = store.load_entity(&EntityId::new(""), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));

        let err = store.save_entity(&mut Entity::empty("")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));

        let err = store.query_entities(&Query::new("")).err().unwrap();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn forbidden_store_rejects_everything() {
        let mut store = EmulatedStore::with_config(StoreConfig::forbidden());
        let id = EntityId::new("x");
        assert!(matches!(
            store.save_entity(&mut Entity::empty("Item")),
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(store.load_entity(&id, None), Err(CoreError::Forbidden)));
        assert!(matches!(store.delete_entity(&id), Err(CoreError::Forbidden)));
        assert!(matches!(
            store.query_entities(&Query::new("Item")).err(),
            Some(CoreError::Forbidden)
        ));
        assert!(matches!(store.start_transaction(), Err(CoreError::Forbidden)));
        // checked before arguments
        assert!(matches!(
            store.load_entity(&EntityId::new(""), None),
            Err(CoreError::Forbidden)
        ));
    }

    #[test]
    fn transaction_depth_only() {
        let mut store = EmulatedStore::new();
        store.start_transaction().unwrap();
        let id = save(&mut store, "Item", json!({}), &[]);
        store.rollback_transaction().unwrap();

        assert_eq!(store.transaction_level(), 0);
        assert!(store.contains(&id));
        store.commit_transaction().unwrap();
        assert_eq!(store.transaction_level(), 0);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({ "x": [1, 2] }), &["alice"]);
        save(&mut store, "Other", json!(null), &[]);

        let bytes = store.to_snapshot().to_bytes().unwrap();
        let restored =
            EmulatedStore::from_snapshot(Snapshot::from_bytes(&bytes).unwrap(), StoreConfig::new())
                .unwrap();

        assert_eq!(restored.len(), 2);
        assert!(!restored.is_dirty());
        assert_eq!(restored.get(&id), store.get(&id));
    }

    #[test]
    fn restore_entity_undoes_writes() {
        let mut store = EmulatedStore::new();
        let id = save(&mut store, "Item", json!({ "v": 1 }), &["alice"]);
        let before = store.get(&id);

        let mut changed = before.clone().unwrap();
        changed.set_data(json!({ "v": 2 }));
        changed.owners_mut().remove("alice");
        store.save_entity(&mut changed).unwrap();

        store.restore_entity(&id, before.clone());
        assert_eq!(store.get(&id), before);

        store.restore_entity(&id, None);
        assert!(!store.contains(&id));
        assert!(store.index().owned_by(&PrincipalId::new("alice")).is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = EmulatedStore::new();
        save(&mut store, "Item", json!({}), &["alice"]);
        store.mark_clean();
        store.clear();
        assert!(store.is_empty());
        assert!(store.is_dirty());
        assert_eq!(store.index().principal_count(), 0);
    }
}

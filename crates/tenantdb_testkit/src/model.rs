//! Reference model for random workloads.
//!
//! [`ModelCheck`] applies [`StoreOp`]s to any `EntityDatabase` and to a plain
//! in-memory model side by side, then compares loads, owner enumeration and
//! owner queries. Running the same sequence against the emulated store and
//! a remote client checks that both honour the same contract.

use crate::generators::{StoreOp, PRINCIPALS, SLOTS};
use serde_json::Value;
use std::collections::BTreeSet;
use tenantdb_core::{CoreError, CoreResult, Entity, EntityDatabase, EntityId, PrincipalId, Query};

/// Entity type used by model workloads.
pub const MODEL_TYPE: &str = "ModelEntity";

#[derive(Debug, Clone)]
struct ModelEntry {
    id: EntityId,
    data: Value,
    owners: BTreeSet<PrincipalId>,
}

/// Expected state of a store after a sequence of operations.
#[derive(Debug, Clone)]
pub struct ModelCheck {
    slots: Vec<Option<ModelEntry>>,
}

impl ModelCheck {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOTS],
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns true if no entity is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies one operation to the store and to the model.
    pub fn apply<D: EntityDatabase>(&mut self, db: &mut D, op: &StoreOp) -> CoreResult<()> {
        match op {
            StoreOp::Save { slot, data, owners } => {
                let mut entity = Entity::new(MODEL_TYPE, data.clone());
                for owner in owners {
                    entity.owners_mut().add(owner.clone());
                }
                if let Some(entry) = &self.slots[*slot] {
                    entity = entity.with_id(entry.id.clone());
                }
                db.save_entity(&mut entity)?;
                let id = entity
                    .id()
                    .cloned()
                    .ok_or_else(|| CoreError::invalid_operation("saved entity has no id"))?;
                self.slots[*slot] = Some(ModelEntry {
                    id,
                    data: data.clone(),
                    owners: owners.clone(),
                });
            }
            StoreOp::AddOwner { slot, owner } => {
                if let Some(entry) = self.slots[*slot].as_mut() {
                    if let Some(mut entity) = db.load_entity(&entry.id, None)? {
                        entity.owners_mut().add(owner.clone());
                        db.save_entity(&mut entity)?;
                    }
                    entry.owners.insert(owner.clone());
                }
            }
            StoreOp::RemoveOwner { slot, owner } => {
                if let Some(entry) = self.slots[*slot].as_mut() {
                    if let Some(mut entity) = db.load_entity(&entry.id, None)? {
                        entity.owners_mut().remove(owner.clone());
                        db.save_entity(&mut entity)?;
                    }
                    entry.owners.remove(owner);
                }
            }
            StoreOp::Delete { slot } => {
                if let Some(entry) = self.slots[*slot].take() {
                    db.delete_entity(&entry.id)?;
                }
            }
        }
        Ok(())
    }

    /// Applies every operation in order.
    pub fn apply_all<D: EntityDatabase>(&mut self, db: &mut D, ops: &[StoreOp]) -> CoreResult<()> {
        ops.iter().try_for_each(|op| self.apply(db, op))
    }

    /// Compares the store with the model. Returns a description of the first
    /// mismatch.
    pub fn verify<D: EntityDatabase>(&self, db: &mut D) -> Result<(), String> {
        for entry in self.slots.iter().flatten() {
            let loaded = db
                .load_entity(&entry.id, None)
                .map_err(|e| format!("load {}: {e}", entry.id))?
                .ok_or_else(|| format!("entity {} missing", entry.id))?;
            if loaded.data() != &entry.data {
                return Err(format!("entity {} data {} != {}", entry.id, loaded.data(), entry.data));
            }

            let owners: BTreeSet<PrincipalId> = db
                .entity_owners(&entry.id)
                .and_then(|owners| owners.collect())
                .map_err(|e| format!("owners of {}: {e}", entry.id))?;
            if owners != entry.owners {
                return Err(format!(
                    "entity {} owners {:?} != {:?}",
                    entry.id, owners, entry.owners
                ));
            }

            let exact = Query::new(MODEL_TYPE).exactly();
            let exact = entry.owners.iter().cloned().fold(exact, Query::require_owner);
            let found = query_ids(db, &exact)?;
            if !found.contains(&entry.id) {
                return Err(format!("exact owner query misses {}", entry.id));
            }
        }

        for principal in PRINCIPALS {
            let expected: BTreeSet<EntityId> = self
                .slots
                .iter()
                .flatten()
                .filter(|entry| entry.owners.contains(principal))
                .map(|entry| entry.id.clone())
                .collect();
            let query = Query::new(MODEL_TYPE).require_owner(principal);
            let found = query_ids(db, &query)?;
            if found != expected {
                return Err(format!("owner {principal}: {found:?} != {expected:?}"));
            }
        }

        let all = query_ids(db, &Query::new(MODEL_TYPE))?;
        if all.len() != self.len() {
            return Err(format!("{} entities stored, {} expected", all.len(), self.len()));
        }
        Ok(())
    }
}

impl Default for ModelCheck {
    fn default() -> Self {
        Self::new()
    }
}

fn query_ids<D: EntityDatabase>(db: &mut D, query: &Query) -> Result<BTreeSet<EntityId>, String> {
    db.query_entities(query)
        .and_then(|results| {
            results
                .filter_map(|entity| entity.map(|e| e.id().cloned()).transpose())
                .collect()
        })
        .map_err(|e| format!("query {}: {e}", query.entity_type))
}

//! Ownership index.

use crate::entity::{EntityId, PrincipalId};
use std::collections::{BTreeMap, BTreeSet};

/// Bidirectional entity/owner index.
///
/// Both directions are kept in step by every mutation; an entity or owner
/// with no rows has no map entry.
#[derive(Debug, Clone, Default)]
pub struct OwnershipIndex {
    by_entity: BTreeMap<EntityId, BTreeSet<PrincipalId>>,
    by_owner: BTreeMap<PrincipalId, BTreeSet<EntityId>>,
}

impl OwnershipIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an ownership row. Returns false if it already existed.
    pub fn add(&mut self, entity: &EntityId, owner: &PrincipalId) -> bool {
        let added = self
            .by_entity
            .entry(entity.clone())
            .or_default()
            .insert(owner.clone());
        self.by_owner
            .entry(owner.clone())
            .or_default()
            .insert(entity.clone());
        added
    }

    /// Removes an ownership row. Returns false if it did not exist.
    pub fn remove(&mut self, entity: &EntityId, owner: &PrincipalId) -> bool {
        let removed = remove_row(&mut self.by_entity, entity, owner);
        remove_row(&mut self.by_owner, owner, entity);
        removed
    }

    /// Removes every row of an entity.
    pub fn remove_entity(&mut self, entity: &EntityId) {
        if let Some(owners) = self.by_entity.remove(entity) {
            for owner in owners {
                remove_row(&mut self.by_owner, &owner, entity);
            }
        }
    }

    /// Replaces every row of an entity.
    pub fn replace<'a, I>(&mut self, entity: &EntityId, owners: I)
    where
        I: IntoIterator<Item = &'a PrincipalId>,
    {
        self.remove_entity(entity);
        for owner in owners {
            self.add(entity, owner);
        }
    }

    /// Owners of an entity.
    #[must_use]
    pub fn owners_of(&self, entity: &EntityId) -> BTreeSet<PrincipalId> {
        self.by_entity.get(entity).cloned().unwrap_or_default()
    }

    /// Number of owners of an entity.
    #[must_use]
    pub fn owner_count(&self, entity: &EntityId) -> usize {
        self.by_entity.get(entity).map_or(0, BTreeSet::len)
    }

    /// Entities owned by a principal.
    #[must_use]
    pub fn owned_by(&self, owner: &PrincipalId) -> BTreeSet<EntityId> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }

    /// Returns true if the row exists.
    #[must_use]
    pub fn is_owner(&self, entity: &EntityId, owner: &PrincipalId) -> bool {
        self.by_entity
            .get(entity)
            .is_some_and(|owners| owners.contains(owner))
    }

    /// Number of distinct principals owning anything.
    #[must_use]
    pub fn principal_count(&self) -> usize {
        self.by_owner.len()
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_owner.clear();
    }
}

fn remove_row<K: Ord, V: Ord>(map: &mut BTreeMap<K, BTreeSet<V>>, key: &K, value: &V) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: &str) -> EntityId {
        EntityId::new(id)
    }

    fn p(id: &str) -> PrincipalId {
        PrincipalId::new(id)
    }

    #[test]
    fn rows_are_bidirectional() {
        let mut index = OwnershipIndex::new();
        assert!(index.add(&e("e1"), &p("alice")));
        assert!(!index.add(&e("e1"), &p("alice")));
        index.add(&e("e2"), &p("alice"));

        assert_eq!(index.owned_by(&p("alice")).len(), 2);
        assert!(index.is_owner(&e("e1"), &p("alice")));

        assert!(index.remove(&e("e1"), &p("alice")));
        assert!(!index.is_owner(&e("e1"), &p("alice")));
        assert_eq!(index.owned_by(&p("alice")).len(), 1);
        assert_eq!(index.owner_count(&e("e1")), 0);
    }

    #[test]
    fn remove_entity_clears_reverse_rows() {
        let mut index = OwnershipIndex::new();
        index.add(&e("e1"), &p("alice"));
        index.add(&e("e1"), &p("bob"));
        index.remove_entity(&e("e1"));
        assert!(index.owned_by(&p("alice")).is_empty());
        assert_eq!(index.principal_count(), 0);
    }

    #[test]
    fn replace_rows() {
        let mut index = OwnershipIndex::new();
        index.add(&e("e1"), &p("alice"));
        index.replace(&e("e1"), &[p("bob"), p("carol")]);
        assert!(!index.is_owner(&e("e1"), &p("alice")));
        assert_eq!(index.owner_count(&e("e1")), 2);
    }
}

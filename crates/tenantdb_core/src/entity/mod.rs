//! Entity documents.

mod id;
mod owners;

pub use id::{EntityId, PrincipalId};
pub use owners::{OwnerDelta, OwnerSet, Ownership};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document.
///
/// An entity has no id until it is saved for the first time. Every save
/// refreshes `updated_at`; `created_at` is set once on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<EntityId>,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default = "empty_object")]
    data: Value,
    #[serde(default)]
    owner_ids: OwnerSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Entity {
    /// Creates an unsaved entity with no owners.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            data,
            owner_ids: OwnerSet::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Creates an unsaved entity with an empty object as data.
    #[must_use]
    pub fn empty(entity_type: impl Into<String>) -> Self {
        Self::new(entity_type, empty_object())
    }

    /// Reassembles an entity from stored parts.
    #[must_use]
    pub fn from_parts(
        id: EntityId,
        entity_type: impl Into<String>,
        data: Value,
        owners: OwnerSet,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            entity_type: entity_type.into(),
            data,
            owner_ids: owners,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        }
    }

    /// Adds an owner, builder style.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<PrincipalId>) -> Self {
        self.owner_ids.add(owner);
        self
    }

    /// Uses an existing id, builder style.
    ///
    /// Saving an entity whose id the store does not hold creates it under
    /// that id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Entity id, `None` until saved.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Type discriminator.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Document data.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Mutable document data.
    pub fn data_mut(&mut self) -> &mut Value {
        &mut self.data
    }

    /// Replaces the document data.
    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    /// Owner set.
    #[must_use]
    pub fn owners(&self) -> &OwnerSet {
        &self.owner_ids
    }

    /// Mutable owner set.
    pub fn owners_mut(&mut self) -> &mut OwnerSet {
        &mut self.owner_ids
    }

    /// Insert timestamp.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Last save timestamp.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Ownership classification.
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        self.owner_ids.ownership()
    }

    /// Records the outcome of a successful save and clears the owner delta.
    pub fn mark_saved(&mut self, id: EntityId, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        self.id = Some(id);
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
        self.owner_ids.mark_saved();
    }
}

//! Property-based test generators using proptest.
//!
//! Owners are drawn from a small fixed universe so that random operation
//! sequences produce shared entities and owner collisions often.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tenantdb_core::PrincipalId;

/// Principals every generator draws from.
pub const PRINCIPALS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// Number of entity slots a generated operation sequence addresses.
pub const SLOTS: usize = 4;

/// Strategy for a principal from [`PRINCIPALS`].
pub fn principal_strategy() -> impl Strategy<Value = PrincipalId> {
    prop::sample::select(PRINCIPALS.to_vec()).prop_map(PrincipalId::new)
}

/// Strategy for an owner set of zero to all principals.
pub fn owner_set_strategy() -> impl Strategy<Value = BTreeSet<PrincipalId>> {
    prop::collection::btree_set(principal_strategy(), 0..=PRINCIPALS.len())
}

/// Strategy for entity data with a top-level string, a number and a nested
/// object, the shapes where clauses address.
pub fn document_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[A-Z][a-z]{0,7}").expect("Invalid regex"),
        0i64..100,
        prop::option::of(0i64..100),
    )
        .prop_map(|(name, level, score)| match score {
            Some(score) => json!({ "Name": name, "Level": level, "Stats": { "Score": score } }),
            None => json!({ "Name": name, "Level": level }),
        })
}

/// One step of a random store workload. Slots index entities created
/// earlier in the same sequence.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Saves `data` with exactly `owners` into a slot, inserting if the slot
    /// is empty.
    Save {
        /// Target slot.
        slot: usize,
        /// New data.
        data: Value,
        /// New owner set.
        owners: BTreeSet<PrincipalId>,
    },
    /// Loads the slot's entity, adds an owner and saves it.
    AddOwner {
        /// Target slot.
        slot: usize,
        /// Owner to add.
        owner: PrincipalId,
    },
    /// Loads the slot's entity, removes an owner and saves it.
    RemoveOwner {
        /// Target slot.
        slot: usize,
        /// Owner to remove.
        owner: PrincipalId,
    },
    /// Deletes the slot's entity.
    Delete {
        /// Target slot.
        slot: usize,
    },
}

/// Strategy for a single [`StoreOp`].
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    let slot = 0..SLOTS;
    prop_oneof![
        3 => (slot.clone(), document_strategy(), owner_set_strategy())
            .prop_map(|(slot, data, owners)| StoreOp::Save { slot, data, owners }),
        2 => (slot.clone(), principal_strategy())
            .prop_map(|(slot, owner)| StoreOp::AddOwner { slot, owner }),
        2 => (slot.clone(), principal_strategy())
            .prop_map(|(slot, owner)| StoreOp::RemoveOwner { slot, owner }),
        1 => slot.prop_map(|slot| StoreOp::Delete { slot }),
    ]
}

/// Strategy for a sequence of up to `max` operations.
pub fn store_ops_strategy(max: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), 1..=max)
}

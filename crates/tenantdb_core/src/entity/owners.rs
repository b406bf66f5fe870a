//! Owner sets.

use super::id::PrincipalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ownership classification derived from the owner count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// No owners; the entity belongs to the game itself.
    Game,
    /// Exactly one owner.
    Player,
    /// Two or more owners.
    Shared,
}

impl Ownership {
    /// Classifies an owner count.
    #[must_use]
    pub const fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Game,
            1 => Self::Player,
            _ => Self::Shared,
        }
    }
}

/// Owner changes made since an [`OwnerSet`] was loaded or last saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerDelta {
    /// Principals added.
    pub added: BTreeSet<PrincipalId>,
    /// Principals removed.
    pub removed: BTreeSet<PrincipalId>,
}

impl OwnerDelta {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The principals owning an entity.
///
/// A complete set enumerates every owner. An incomplete set knows only some
/// of them plus the total count; it still supports `add` and `remove`, and
/// saving it applies only the recorded delta so owners it never saw are kept.
///
/// For an incomplete set, `contains` returning `false` only means the
/// principal is not among the known owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OwnerSetRepr", into = "OwnerSetRepr")]
pub struct OwnerSet {
    known: BTreeSet<PrincipalId>,
    complete: bool,
    count: usize,
    delta: OwnerDelta,
}

impl OwnerSet {
    /// Creates an empty, complete owner set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known: BTreeSet::new(),
            complete: true,
            count: 0,
            delta: OwnerDelta::default(),
        }
    }

    /// Creates a complete owner set with a clean delta.
    #[must_use]
    pub fn complete<I, P>(owners: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PrincipalId>,
    {
        let known: BTreeSet<PrincipalId> = owners.into_iter().map(Into::into).collect();
        Self {
            count: known.len(),
            known,
            complete: true,
            delta: OwnerDelta::default(),
        }
    }

    /// Creates an incomplete owner set that knows `known` out of `total` owners.
    ///
    /// `total` is raised to the number of known owners if it is smaller.
    #[must_use]
    pub fn partial<I, P>(known: I, total: usize) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PrincipalId>,
    {
        let known: BTreeSet<PrincipalId> = known.into_iter().map(Into::into).collect();
        Self {
            count: total.max(known.len()),
            known,
            complete: false,
            delta: OwnerDelta::default(),
        }
    }

    /// Adds an owner. Returns true if it was not already known.
    ///
    /// On an incomplete set a newly known owner always raises
    /// [`count`](Self::count), even if the store already lists it.
    pub fn add(&mut self, owner: impl Into<PrincipalId>) -> bool {
        let owner = owner.into();
        self.delta.removed.remove(&owner);
        self.delta.added.insert(owner.clone());
        let inserted = self.known.insert(owner);
        if inserted {
            self.count += 1;
        }
        inserted
    }

    /// Removes an owner. Returns true if it was known.
    ///
    /// Removing a principal an incomplete set does not know is still recorded
    /// and applied on save, but leaves `count` unchanged.
    pub fn remove(&mut self, owner: impl Into<PrincipalId>) -> bool {
        let owner = owner.into();
        self.delta.added.remove(&owner);
        let removed = self.known.remove(&owner);
        if removed {
            self.count -= 1;
        }
        if removed || !self.complete {
            self.delta.removed.insert(owner);
        }
        removed
    }

    /// Returns true if the principal is a known owner.
    #[must_use]
    pub fn contains(&self, owner: &str) -> bool {
        self.known.contains(owner)
    }

    /// Number of owners.
    ///
    /// Exact for complete sets. For incomplete sets it is the loaded total
    /// adjusted by local changes, so it can be off until the entity is
    /// reloaded: adding a principal that already owns the entity but is not
    /// among the known owners counts it twice, and removing an owner that is
    /// not known leaves the total unchanged.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns true if the set has no owners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if every owner is known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Iterates over the known owners in order.
    pub fn known_owners(&self) -> impl Iterator<Item = &PrincipalId> + '_ {
        self.known.iter()
    }

    /// Changes since the set was loaded or last saved.
    #[must_use]
    pub fn delta(&self) -> &OwnerDelta {
        &self.delta
    }

    /// Clears the recorded delta after a successful save.
    pub fn mark_saved(&mut self) {
        self.delta = OwnerDelta::default();
    }

    /// Classifies the set by owner count.
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        Ownership::from_count(self.count())
    }
}

impl Default for OwnerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Into<PrincipalId>> FromIterator<P> for OwnerSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::complete(iter)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerSetRepr {
    #[serde(default)]
    ids: Vec<PrincipalId>,
    #[serde(default = "default_complete")]
    is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    added: Vec<PrincipalId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    removed: Vec<PrincipalId>,
}

fn default_complete() -> bool {
    true
}

impl From<OwnerSet> for OwnerSetRepr {
    fn from(set: OwnerSet) -> Self {
        Self {
            count: (!set.complete).then_some(set.count),
            ids: set.known.into_iter().collect(),
            is_complete: set.complete,
            added: set.delta.added.into_iter().collect(),
            removed: set.delta.removed.into_iter().collect(),
        }
    }
}

impl From<OwnerSetRepr> for OwnerSet {
    fn from(repr: OwnerSetRepr) -> Self {
        let known: BTreeSet<PrincipalId> = repr.ids.into_iter().collect();
        let count = if repr.is_complete {
            known.len()
        } else {
            repr.count.unwrap_or(known.len()).max(known.len())
        };
        Self {
            known,
            complete: repr.is_complete,
            count,
            delta: OwnerDelta {
                added: repr.added.into_iter().collect(),
                removed: repr.removed.into_iter().collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_set_tracks_members_exactly() {
        let mut owners = OwnerSet::new();
        assert!(owners.add("alice"));
        assert!(!owners.add("alice"));
        assert!(owners.add("bob"));
        assert_eq!(owners.count(), 2);
        assert!(owners.contains("alice"));

        assert!(owners.remove("alice"));
        assert!(!owners.remove("carol"));
        assert_eq!(owners.count(), 1);
        assert!(!owners.contains("alice"));
    }

    #[test]
    fn complete_set_delta() {
        let mut owners = OwnerSet::complete(["alice"]);
        assert!(owners.delta().is_empty());

        owners.add("bob");
        owners.remove("alice");
        owners.remove("nobody");
        let delta = owners.delta();
        assert!(delta.added.contains("bob"));
        assert!(delta.removed.contains("alice"));
        assert!(!delta.removed.contains("nobody"));

        owners.mark_saved();
        assert!(owners.delta().is_empty());
    }

    #[test]
    fn add_then_remove_cancels_in_delta() {
        let mut owners = OwnerSet::new();
        owners.add("alice");
        owners.remove("alice");
        assert!(owners.delta().added.is_empty());
        assert!(owners.delta().removed.contains("alice"));
        assert_eq!(owners.count(), 0);
    }

    #[test]
    fn incomplete_set_count_adjusts() {
        let mut owners = OwnerSet::partial(["alice"], 5);
        assert!(!owners.is_complete());
        assert_eq!(owners.count(), 5);

        owners.add("bob");
        assert_eq!(owners.count(), 6);

        owners.remove("alice");
        assert_eq!(owners.count(), 5);

        // not known locally: recorded, count unchanged
        assert!(!owners.remove("zed"));
        assert_eq!(owners.count(), 5);
        assert!(owners.delta().removed.contains("zed"));
    }

    #[test]
    fn incomplete_add_of_unlisted_owner_overstates_count() {
        // "bob" owns the entity but was not loaded
        let mut owners = OwnerSet::partial(["alice"], 2);
        assert!(owners.add("bob"));
        assert_eq!(owners.count(), 3);
        assert!(owners.delta().added.contains("bob"));
    }

    #[test]
    fn partial_total_never_below_known() {
        let owners = OwnerSet::partial(["a", "b", "c"], 1);
        assert_eq!(owners.count(), 3);
    }

    #[test]
    fn ownership_classification() {
        assert_eq!(OwnerSet::new().ownership(), Ownership::Game);
        assert_eq!(OwnerSet::complete(["a"]).ownership(), Ownership::Player);
        assert_eq!(OwnerSet::complete(["a", "b"]).ownership(), Ownership::Shared);
        assert_eq!(OwnerSet::partial(["a"], 3).ownership(), Ownership::Shared);
    }

    #[test]
    fn serialized_shape() {
        let owners = OwnerSet::complete(["bob", "alice"]);
        let value = serde_json::to_value(&owners).unwrap();
        assert_eq!(value, json!({ "ids": ["alice", "bob"], "isComplete": true }));

        let mut partial = OwnerSet::partial(["alice"], 4);
        partial.add("carol");
        let value = serde_json::to_value(&partial).unwrap();
        assert_eq!(
            value,
            json!({
                "ids": ["alice", "carol"],
                "isComplete": false,
                "count": 5,
                "added": ["carol"]
            })
        );

        let back: OwnerSet = serde_json::from_value(value).unwrap();
        assert_eq!(back, partial);
    }

    #[test]
    fn missing_fields_default_to_complete() {
        let owners: OwnerSet = serde_json::from_value(json!({ "ids": ["x"] })).unwrap();
        assert!(owners.is_complete());
        assert_eq!(owners.count(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn op() -> impl Strategy<Value = (bool, String)> {
            (any::<bool>(), "[a-d]")
        }

        proptest! {
            #[test]
            fn complete_set_matches_plain_set(ops in prop::collection::vec(op(), 0..32)) {
                let mut owners = OwnerSet::new();
                let mut expected = BTreeSet::new();
                for (add, name) in ops {
                    if add {
                        owners.add(name.as_str());
                        expected.insert(PrincipalId::new(name));
                    } else {
                        owners.remove(name.as_str());
                        expected.remove(name.as_str());
                    }
                }
                let known: BTreeSet<PrincipalId> = owners.known_owners().cloned().collect();
                prop_assert_eq!(&known, &expected);
                prop_assert_eq!(owners.count(), expected.len());
                let delta = owners.delta();
                prop_assert!(delta.added.is_disjoint(&delta.removed));
            }
        }
    }
}

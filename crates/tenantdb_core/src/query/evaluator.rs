//! Query evaluation.

use super::Query;
use crate::entity::{EntityId, PrincipalId};
use crate::error::CoreResult;
use serde_json::Value;
use std::collections::BTreeSet;

/// Read access to the data a query is evaluated against.
pub trait QuerySource {
    /// Ids of every entity of the given type, in id order.
    fn entities_of_type(&self, entity_type: &str) -> Vec<EntityId>;

    /// Ids of every entity the principal owns.
    fn entities_owned_by(&self, owner: &PrincipalId) -> BTreeSet<EntityId>;

    /// Number of owners of an entity.
    fn owner_count(&self, id: &EntityId) -> usize;

    /// Document data of an entity.
    fn entity_data(&self, id: &EntityId) -> Option<&Value>;
}

/// Evaluates a query and returns the ids of the matching entities in order.
///
/// # Errors
///
/// Returns `InvalidArgument` if the query fails validation.
pub fn execute_query<S: QuerySource + ?Sized>(source: &S, query: &Query) -> CoreResult<Vec<EntityId>> {
    query.validate()?;

    let mut candidates = source.entities_of_type(&query.entity_type);

    if !query.required_owners.is_empty() {
        let owned = owned_by_all(source, &query.required_owners);
        candidates.retain(|id| owned.contains(id));
    }

    if !query.where_clauses.is_empty() {
        candidates.retain(|id| {
            source
                .entity_data(id)
                .is_some_and(|data| query.where_clauses.iter().all(|c| c.matches(data)))
        });
    }

    if query.require_owners_exactly {
        let expected = query.required_owners.len();
        candidates.retain(|id| source.owner_count(id) == expected);
    }

    let shaped: Vec<EntityId> = if query.take_first_found {
        candidates.into_iter().take(1).collect()
    } else {
        let rest = candidates.into_iter().skip(query.skip.unwrap_or(0));
        match query.take {
            Some(n) => rest.take(n).collect(),
            None => rest.collect(),
        }
    };

    tracing::debug!(
        entity_type = %query.entity_type,
        matches = shaped.len(),
        "query evaluated"
    );
    Ok(shaped)
}

fn owned_by_all<S: QuerySource + ?Sized>(
    source: &S,
    owners: &BTreeSet<PrincipalId>,
) -> BTreeSet<EntityId> {
    let mut iter = owners.iter();
    let Some(first) = iter.next() else {
        return BTreeSet::new();
    };
    let mut result = source.entities_owned_by(first);
    for owner in iter {
        if result.is_empty() {
            break;
        }
        let owned = source.entities_owned_by(owner);
        result.retain(|id| owned.contains(id));
    }
    result
}

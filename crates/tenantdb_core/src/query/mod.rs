//! Entity queries.

mod clause;
mod evaluator;
mod path;

pub use clause::{BooleanOp, Operator, WhereClause};
pub use evaluator::{execute_query, QuerySource};
pub use path::ValuePath;

use crate::entity::PrincipalId;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A query over entities of one type.
///
/// Evaluation order is fixed: type filter, owner intersection, where clauses,
/// exact-owner post-filter, then shaping (`take_first_found`, or `skip` and
/// `take`). Results are ordered by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Entity type to match.
    pub entity_type: String,
    /// Principals that must all own a matching entity.
    #[serde(default)]
    pub required_owners: BTreeSet<PrincipalId>,
    /// Also require the owner count to equal `required_owners.len()`.
    #[serde(default)]
    pub require_owners_exactly: bool,
    /// Clauses that must all hold.
    #[serde(default)]
    pub where_clauses: Vec<WhereClause>,
    /// Return at most one entity.
    #[serde(default)]
    pub take_first_found: bool,
    /// Number of matches to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    /// Maximum number of matches to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<usize>,
}

impl Query {
    /// Creates a query matching every entity of a type.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            required_owners: BTreeSet::new(),
            require_owners_exactly: false,
            where_clauses: Vec::new(),
            take_first_found: false,
            skip: None,
            take: None,
        }
    }

    /// Requires a principal to own every match.
    #[must_use]
    pub fn require_owner(mut self, owner: impl Into<PrincipalId>) -> Self {
        self.required_owners.insert(owner.into());
        self
    }

    /// Requires matches to be owned by exactly the required owners.
    #[must_use]
    pub fn exactly(mut self) -> Self {
        self.require_owners_exactly = true;
        self
    }

    /// Adds a where clause.
    #[must_use]
    pub fn filter(mut self, clause: WhereClause) -> Self {
        self.where_clauses.push(clause);
        self
    }

    /// Adds a basic where clause from textual parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for a malformed path or unknown operator.
    pub fn where_path(self, path: &str, operator: &str, value: Value) -> CoreResult<Self> {
        Ok(self.filter(WhereClause::parse(path, operator, value)?))
    }

    /// Returns at most the first match.
    #[must_use]
    pub fn first(mut self) -> Self {
        self.take_first_found = true;
        self
    }

    /// Skips the first `n` matches.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Returns at most `n` matches.
    #[must_use]
    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// Parses a query from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the value is not a well-formed query.
    pub fn from_json(value: Value) -> CoreResult<Self> {
        let query: Self =
            serde_json::from_value(value).map_err(|e| CoreError::invalid_query(e.to_string()))?;
        query.validate()?;
        Ok(query)
    }

    /// Checks the arguments that must be present before evaluation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty entity type or owner id.
    pub fn validate(&self) -> CoreResult<()> {
        if self.entity_type.is_empty() {
            return Err(CoreError::invalid_argument("query entity type is empty"));
        }
        if self.required_owners.iter().any(PrincipalId::is_empty) {
            return Err(CoreError::invalid_argument("required owner id is empty"));
        }
        Ok(())
    }
}

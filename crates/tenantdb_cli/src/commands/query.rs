//! Query command implementation.

use super::{open_registry, CliError};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tenantdb_core::{BlobStore, DatabaseRegistry, Entity, EntityDatabase, Query};

/// Builds a query from command-line arguments.
///
/// `where_args` holds flattened `PATH OP VALUE` triples. A value that is not
/// valid JSON is taken as a string.
pub fn build_query(
    entity_type: &str,
    owners: &[String],
    exact: bool,
    where_args: &[String],
    skip: Option<usize>,
    take: Option<usize>,
) -> Result<Query, CliError> {
    if where_args.len() % 3 != 0 {
        return Err(CliError::InvalidArgument(
            "--where takes PATH OP VALUE".to_string(),
        ));
    }

    let mut query = owners
        .iter()
        .fold(Query::new(entity_type), |query, owner| {
            query.require_owner(owner.as_str())
        });
    if exact {
        query = query.exactly();
    }
    for clause in where_args.chunks(3) {
        let value = serde_json::from_str(&clause[2]).unwrap_or_else(|_| Value::String(clause[2].clone()));
        query = query.where_path(&clause[0], &clause[1], value)?;
    }
    if let Some(n) = skip {
        query = query.skip(n);
    }
    if let Some(n) = take {
        query = query.take(n);
    }
    query.validate()?;
    Ok(query)
}

/// Runs the query command.
pub fn run(data_dir: &Path, database: &str, query: &Query) -> Result<(), CliError> {
    let mut registry = open_registry(data_dir)?;
    let entities = execute(&mut registry, database, query)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entity in &entities {
        serde_json::to_writer(&mut out, entity)?;
        if writeln!(out).is_err() {
            break;
        }
    }
    tracing::debug!(results = entities.len(), "query finished");
    Ok(())
}

/// Runs a query against a database in the registry.
pub fn execute<B: BlobStore>(
    registry: &mut DatabaseRegistry<B>,
    database: &str,
    query: &Query,
) -> Result<Vec<Entity>, CliError> {
    if !registry.contains(database) {
        return Err(CliError::UnknownDatabase(database.to_string()));
    }
    let store = registry.database(database)?;
    let entities = store.query_entities(query)?.collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantdb_core::MemoryBlobStore;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_owner_and_where_filters() {
        let query = build_query(
            "PlayerEntity",
            &args(&["alice"]),
            true,
            &args(&["Foo->Bar", "<", "50", "Name", "=", "John"]),
            None,
            Some(3),
        )
        .unwrap();
        assert!(query.require_owners_exactly);
        assert_eq!(query.required_owners.len(), 1);
        assert_eq!(query.where_clauses.len(), 2);
        assert_eq!(query.take, Some(3));
    }

    #[test]
    fn rejects_bad_operator() {
        let err = build_query("T", &[], false, &args(&["a", "~", "1"]), None, None).unwrap_err();
        assert!(matches!(err, CliError::Database(_)));
    }

    #[test]
    fn executes_against_registry() {
        let mut registry = DatabaseRegistry::open(MemoryBlobStore::new()).unwrap();
        let db = registry.database("main").unwrap();
        for (name, level) in [("a", 10), ("b", 60)] {
            db.save_entity(&mut Entity::new("Item", json!({ "name": name, "Foo": { "Bar": level } })))
                .unwrap();
        }

        let query = build_query("Item", &[], false, &args(&["Foo.Bar", "<", "50"]), None, None)
            .unwrap();
        let found = execute(&mut registry, "main", &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data()["name"], "a");

        assert!(matches!(
            execute(&mut registry, "other", &query),
            Err(CliError::UnknownDatabase(_))
        ));
    }
}

//! Inspect command implementation.

use super::{open_registry, CliError, OutputFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tenantdb_core::{BlobStore, DatabaseRegistry, EmulatedStore, Ownership};

/// Registry inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory.
    pub path: String,
    /// Per-database statistics.
    pub databases: Vec<DatabaseStats>,
}

/// Statistics for a single database.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Database name.
    pub name: String,
    /// Number of entities.
    pub entity_count: usize,
    /// Entities without owners.
    pub game: usize,
    /// Entities with one owner.
    pub player: usize,
    /// Entities with several owners.
    pub shared: usize,
    /// Entity count per type.
    pub types: BTreeMap<String, usize>,
}

impl DatabaseStats {
    fn collect(name: &str, store: &EmulatedStore) -> Self {
        let mut stats = Self {
            name: name.to_string(),
            ..Self::default()
        };
        for entity in store.entities() {
            stats.entity_count += 1;
            match entity.ownership() {
                Ownership::Game => stats.game += 1,
                Ownership::Player => stats.player += 1,
                Ownership::Shared => stats.shared += 1,
            }
            *stats
                .types
                .entry(entity.entity_type().to_string())
                .or_default() += 1;
        }
        stats
    }
}

/// Runs the inspect command.
pub fn run(data_dir: &Path, database: Option<&str>, format: OutputFormat) -> Result<(), CliError> {
    let mut registry = open_registry(data_dir)?;
    let result = InspectResult {
        path: data_dir.display().to_string(),
        databases: inspect(&mut registry, database)?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects statistics for one database, or for every database.
pub fn inspect<B: BlobStore>(
    registry: &mut DatabaseRegistry<B>,
    database: Option<&str>,
) -> Result<Vec<DatabaseStats>, CliError> {
    let names: Vec<String> = match database {
        Some(name) if !registry.contains(name) => {
            return Err(CliError::UnknownDatabase(name.to_string()))
        }
        Some(name) => vec![name.to_string()],
        None => registry.names().map(str::to_string).collect(),
    };

    let mut stats = Vec::with_capacity(names.len());
    for name in &names {
        stats.push(DatabaseStats::collect(name, registry.database(name)?));
    }
    Ok(stats)
}

fn print_text_output(result: &InspectResult) {
    println!("TenantDB Inspection");
    println!("===================");
    println!();
    println!("Path: {}", result.path);

    if result.databases.is_empty() {
        println!();
        println!("No databases.");
        return;
    }

    for db in &result.databases {
        println!();
        println!("Database '{}':", db.name);
        println!("  Entities: {}", db.entity_count);
        println!("  Game:     {}", db.game);
        println!("  Player:   {}", db.player);
        println!("  Shared:   {}", db.shared);
        if !db.types.is_empty() {
            println!("  Types:");
            for (entity_type, count) in &db.types {
                println!("    {entity_type}: {count}");
            }
        }
    }
}

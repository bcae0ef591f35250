//! SQLite schema definitions.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Safe to call on every start: an up-to-date database is left untouched.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StorageError::Backend(BackendError::MigrationError {
            message: format!(
                "database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
            ),
        }));
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| migration_error("create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| migration_error("clear schema_version", e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| migration_error("set schema_version", e))?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS resources (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            data TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            PRIMARY KEY (resource_type, id)
        );

        CREATE INDEX IF NOT EXISTS idx_resources_updated
            ON resources(resource_type, last_updated);

        CREATE TABLE IF NOT EXISTS resource_history (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            data TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            method TEXT NOT NULL,
            PRIMARY KEY (resource_type, id, version_id)
        );",
    )
    .map_err(|e| migration_error("create resource tables", e))?;

    // One row per extracted value. Which value columns are set depends on
    // param_type; reference `:identifier` values reuse the token columns.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS search_index (
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            param_name TEXT NOT NULL,
            param_type TEXT NOT NULL,
            component TEXT,
            composite_group INTEGER,
            value_string TEXT,
            value_string_norm TEXT,
            value_number INTEGER,
            value_date_start TEXT,
            value_date_end TEXT,
            value_quantity INTEGER,
            value_quantity_unit TEXT,
            value_quantity_system TEXT,
            value_quantity_code TEXT,
            token_system TEXT,
            token_code TEXT,
            token_display TEXT,
            token_type_system TEXT,
            token_type_code TEXT,
            ref_type TEXT,
            ref_id TEXT,
            ref_url TEXT,
            value_uri TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_search_string
            ON search_index(resource_type, param_name, value_string_norm);
        CREATE INDEX IF NOT EXISTS idx_search_token
            ON search_index(resource_type, param_name, token_code);
        CREATE INDEX IF NOT EXISTS idx_search_date
            ON search_index(resource_type, param_name, value_date_start, value_date_end);
        CREATE INDEX IF NOT EXISTS idx_search_number
            ON search_index(resource_type, param_name, value_number);
        CREATE INDEX IF NOT EXISTS idx_search_quantity
            ON search_index(resource_type, param_name, value_quantity);
        CREATE INDEX IF NOT EXISTS idx_search_reference
            ON search_index(param_name, ref_type, ref_id);
        CREATE INDEX IF NOT EXISTS idx_search_resource
            ON search_index(resource_type, resource_id);",
    )
    .map_err(|e| migration_error("create search_index table", e))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reference_edges (
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            path TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_edges_source
            ON reference_edges(source_type, source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target
            ON reference_edges(target_type, target_id);

        CREATE TABLE IF NOT EXISTS compartment_membership (
            compartment_type TEXT NOT NULL,
            compartment_id TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            PRIMARY KEY (compartment_type, compartment_id, resource_type, resource_id)
        );

        CREATE INDEX IF NOT EXISTS idx_membership_resource
            ON compartment_membership(resource_type, resource_id);",
    )
    .map_err(|e| migration_error("create edge and membership tables", e))?;

    Ok(())
}

fn migration_error(step: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::MigrationError {
        message: format!("failed to {step}: {e}"),
    })
}

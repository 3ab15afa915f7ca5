//! Layer store schema: creation of new store files and validation of existing ones

use std::path::Path;
use std::time::Duration;
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};
use crate::{Error, Result};

/// SQL to create the tiles table
///
/// No uniqueness constraint: upserts are keyed in the statements instead.
pub const CREATE_TILES_TABLE: &str =
    "CREATE TABLE tiles (grid_set_id TEXT, x INTEGER, y INTEGER, z INTEGER, type TEXT, data BLOB)";

/// SQL to create the meta table
pub const CREATE_META_TABLE: &str = "CREATE TABLE meta (key TEXT, value TEXT)";

/// Tables every layer store must contain
pub const REQUIRED_TABLES: &[&str] = &["tiles", "meta"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_TILES_TABLE, CREATE_META_TABLE]
}

fn create_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

pub(crate) fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Create a new layer store file and its tables.
///
/// On failure the connection is dropped and the partially written file is
/// removed best-effort; if removal fails, [`validate`] rejects the leftover.
pub fn create(layer_name: &str, path: &Path, busy_timeout: Duration) -> Result<Connection> {
    create_with(layer_name, path, busy_timeout, &all_schema_statements())
}

/// [`create`] with an explicit statement list, run in one transaction
pub(crate) fn create_with(
    layer_name: &str,
    path: &Path,
    busy_timeout: Duration,
    statements: &[&str],
) -> Result<Connection> {
    if path.exists() {
        return Err(Error::Schema {
            layer: layer_name.to_string(),
            reason: format!("store file {} already exists", path.display()),
        });
    }

    info!("Creating SQLite tile database {}", path.display());

    let conn = Connection::open_with_flags(path, create_flags())
        .map_err(|e| Error::open(layer_name, "create store", e))?;

    match initialize(&conn, busy_timeout, statements) {
        Ok(()) => Ok(conn),
        Err(e) => {
            drop(conn);
            if let Err(remove_err) = std::fs::remove_file(path) {
                warn!(
                    "Could not remove partially created store {}: {}",
                    path.display(),
                    remove_err
                );
            }
            Err(Error::Schema {
                layer: layer_name.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

fn initialize(conn: &Connection, busy_timeout: Duration, statements: &[&str]) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    let mut batch = String::from("BEGIN IMMEDIATE;\n");
    for stmt in statements {
        batch.push_str(stmt);
        batch.push_str(";\n");
    }
    batch.push_str("COMMIT;");
    conn.execute_batch(&batch)
}

/// Check that an existing store file carries both required tables.
pub fn validate(layer_name: &str, conn: &Connection) -> Result<()> {
    let schema_error = |reason: String| Error::Schema {
        layer: layer_name.to_string(),
        reason,
    };

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(|e| schema_error(e.to_string()))?;

    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| schema_error(e.to_string()))?
        .collect::<rusqlite::Result<_>>()
        .map_err(|e| schema_error(e.to_string()))?;

    for required in REQUIRED_TABLES {
        if !tables.iter().any(|t| t == required) {
            return Err(schema_error(format!("missing table '{}'", required)));
        }
    }
    Ok(())
}

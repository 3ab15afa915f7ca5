//! Connection registry: one cached SQLite handle per layer store
//!
//! Each layer file stem owns a slot, a mutex around an optional connection.
//! The slot map lock is only held to find or insert a slot, so different
//! layers never wait on each other. Everything done to one layer, including
//! the create-or-open sequence, runs under that layer's slot lock: creation
//! races on the same layer are impossible and the non-`Sync` connection is
//! never used from two threads at once.
//!
//! Slots are never removed from the map. Removing one while another thread
//! still holds it would let two handles exist for the same file. The map
//! therefore keeps one small entry per stem ever touched, including deleted
//! and renamed layers, for the lifetime of the registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info, warn};
use crate::{Error, Result};
use super::layout::StorageLayout;
use super::schema;

type Slot = Arc<Mutex<Option<Connection>>>;

/// Owns every open layer connection of a store instance
pub struct ConnectionRegistry {
    layout: StorageLayout,
    busy_timeout: Duration,
    schema_statements: Vec<&'static str>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    pub fn new(layout: StorageLayout, busy_timeout: Duration) -> Self {
        Self {
            layout,
            busy_timeout,
            schema_statements: schema::all_schema_statements(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_schema_statements(mut self, statements: Vec<&'static str>) -> Self {
        self.schema_statements = statements;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn slot(&self, layer_name: &str) -> Slot {
        let stem = self.layout.file_stem(layer_name);
        self.slots.lock().entry(stem).or_default().clone()
    }

    /// Run `f` against the layer's connection, creating or opening the store first if needed.
    ///
    /// Errors from `f` are wrapped as query errors tagged with `operation`. A
    /// connection that fails with a connection-level fault is closed and dropped
    /// so the next call reopens the file.
    pub fn with_connection<T, F>(&self, layer_name: &str, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let slot = self.slot(layer_name);
        let mut guard = slot.lock();

        let path = self.layout.layer_path(layer_name);
        let mut conn = match guard.take() {
            Some(conn) if is_usable(&conn, &path) => conn,
            stale => {
                if let Some(conn) = stale {
                    debug!("Dropping stale connection for layer {}", layer_name);
                    close_quietly(layer_name, conn);
                }
                self.create_or_open(layer_name, &path)?
            }
        };

        let result = f(&mut conn);
        match &result {
            Err(e) if is_connection_fault(e) => {
                warn!("Connection for layer {} failed ({}), discarding handle", layer_name, e);
                close_quietly(layer_name, conn);
            }
            _ => *guard = Some(conn),
        }

        result.map_err(|e| Error::query(layer_name, operation, e))
    }

    /// Run `f` with the layer's slot locked and its cached handle closed.
    ///
    /// Used for operations that replace or remove the backing file.
    pub fn with_layer_exclusive<T, F>(&self, layer_name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let slot = self.slot(layer_name);
        let mut guard = slot.lock();
        if let Some(conn) = guard.take() {
            close_quietly(layer_name, conn);
        }
        f(&self.layout.layer_path(layer_name))
    }

    /// Like [`with_layer_exclusive`](Self::with_layer_exclusive) for two layers at once.
    ///
    /// Slots are locked in stem order so concurrent calls over the same pair
    /// cannot deadlock. Layers sharing a stem are locked once.
    pub fn with_layers_exclusive<T, F>(&self, first: &str, second: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Path, &Path) -> Result<T>,
    {
        let first_stem = self.layout.file_stem(first);
        let second_stem = self.layout.file_stem(second);
        if first_stem == second_stem {
            return self.with_layer_exclusive(first, |path| f(path, path));
        }

        let (low, high) = if first_stem < second_stem {
            (first, second)
        } else {
            (second, first)
        };
        let low_slot = self.slot(low);
        let high_slot = self.slot(high);
        let mut low_guard = low_slot.lock();
        let mut high_guard = high_slot.lock();

        if let Some(conn) = low_guard.take() {
            close_quietly(low, conn);
        }
        if let Some(conn) = high_guard.take() {
            close_quietly(high, conn);
        }

        f(&self.layout.layer_path(first), &self.layout.layer_path(second))
    }

    /// Close and drop the cached handle of one layer, if any
    pub fn invalidate(&self, layer_name: &str) {
        let slot = self.slot(layer_name);
        let mut guard = slot.lock();
        if let Some(conn) = guard.take() {
            debug!("Invalidating connection for layer {}", layer_name);
            close_quietly(layer_name, conn);
        }
    }

    /// Whether a handle is currently cached for the layer
    pub fn is_open(&self, layer_name: &str) -> bool {
        let stem = self.layout.file_stem(layer_name);
        let slot = match self.slots.lock().get(&stem) {
            Some(slot) => slot.clone(),
            None => return false,
        };
        slot.lock().is_some()
    }

    /// Number of layers with a cached handle
    pub fn open_count(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Close every cached handle. A failing close is logged and the rest are still closed.
    pub fn release_all(&self) {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(stem, slot)| (stem.clone(), slot.clone()))
            .collect();

        let mut closed = 0;
        for (stem, slot) in slots {
            if let Some(conn) = slot.lock().take() {
                close_quietly(&stem, conn);
                closed += 1;
            }
        }
        if closed > 0 {
            info!("Closed {} SQLite layer connection(s)", closed);
        }
    }

    fn create_or_open(&self, layer_name: &str, path: &Path) -> Result<Connection> {
        if !path.exists() {
            return schema::create_with(layer_name, path, self.busy_timeout, &self.schema_statements);
        }

        debug!("Opening existing layer store {}", path.display());
        let conn = Connection::open_with_flags(path, schema::open_flags())
            .map_err(|e| Error::open(layer_name, "open store", e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| Error::query(layer_name, "open store", e))?;
        schema::validate(layer_name, &conn)?;
        Ok(conn)
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// A cached handle is reused only while its file is still in place and it answers a ping.
fn is_usable(conn: &Connection, path: &Path) -> bool {
    path.exists() && conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
}

fn is_connection_fault(e: &rusqlite::Error) -> bool {
    match e.sqlite_error_code() {
        Some(code) => matches!(
            code,
            ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::CannotOpen
        ),
        None => false,
    }
}

fn close_quietly(layer_name: &str, conn: Connection) {
    if let Err((_conn, e)) = conn.close() {
        warn!("Failed to close connection for layer {}: {}", layer_name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ConnectionRegistry {
        ConnectionRegistry::new(
            StorageLayout::new(dir.path(), "sqlite"),
            Duration::from_millis(500),
        )
    }

    /// TEMP tables live only as long as their connection
    fn mark_connection(registry: &ConnectionRegistry, layer: &str) {
        registry
            .with_connection(layer, "mark", |conn| conn.execute_batch("CREATE TEMP TABLE marker (v INTEGER)"))
            .unwrap();
    }

    fn has_marker(registry: &ConnectionRegistry, layer: &str) -> bool {
        registry
            .with_connection(layer, "probe", |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'marker'",
                    [],
                    |row| row.get::<_, i64>(0),
                )
            })
            .unwrap()
            == 1
    }

    #[test]
    fn test_lazy_creation() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let path = dir.path().join("topp_states.sqlite");

        assert!(!path.exists());
        registry.with_connection("topp:states", "noop", |_| Ok(())).unwrap();
        assert!(path.exists());
        assert!(registry.is_open("topp:states"));
    }

    #[test]
    fn test_handle_reused_across_calls() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        mark_connection(&registry, "layer");
        assert!(has_marker(&registry, "layer"));
        assert_eq!(registry.open_count(), 1);
    }

    #[test]
    fn test_reopens_existing_file_after_invalidate() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry
            .with_connection("layer", "insert", |conn| {
                conn.execute("INSERT INTO meta (key, value) VALUES ('k', 'v')", [])
            })
            .unwrap();
        mark_connection(&registry, "layer");

        registry.invalidate("layer");
        assert!(!registry.is_open("layer"));

        // Fresh connection, same data
        assert!(!has_marker(&registry, "layer"));
        let value: String = registry
            .with_connection("layer", "select", |conn| {
                conn.query_row("SELECT value FROM meta WHERE key = 'k'", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(value, "v");
    }

    #[test]
    fn test_recovers_when_file_removed_externally() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let path = dir.path().join("layer.sqlite");

        mark_connection(&registry, "layer");
        std::fs::remove_file(&path).unwrap();

        assert!(!has_marker(&registry, "layer"));
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        std::fs::write(dir.path().join("broken.sqlite"), vec![0x13u8; 2048]).unwrap();

        for _ in 0..2 {
            let err = registry.with_connection("broken", "noop", |_| Ok(())).unwrap_err();
            assert!(matches!(err, Error::Schema { .. }));
            assert!(!registry.is_open("broken"));
        }
    }

    #[test]
    fn test_failed_creation_releases_slot() {
        let dir = TempDir::new().unwrap();
        let broken = registry(&dir)
            .with_schema_statements(vec![schema::CREATE_TILES_TABLE, schema::CREATE_TILES_TABLE]);

        for _ in 0..2 {
            let err = broken.with_connection("roads", "noop", |_| Ok(())).unwrap_err();
            assert!(matches!(err, Error::Schema { .. }));
            assert!(!broken.is_open("roads"));
            assert!(!dir.path().join("roads.sqlite").exists());
        }

        // Slot lock is free again on another thread
        std::thread::scope(|s| {
            s.spawn(|| broken.with_layer_exclusive("roads", |_| Ok(())).unwrap());
        });

        let healthy = registry(&dir);
        healthy.with_connection("roads", "noop", |_| Ok(())).unwrap();
        assert!(healthy.is_open("roads"));
    }

    #[test]
    fn test_unreachable_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir(&root).unwrap();
        let registry = ConnectionRegistry::new(StorageLayout::new(&root, "sqlite"), Duration::from_millis(500));
        std::fs::remove_dir(&root).unwrap();

        let err = registry.with_connection("roads", "noop", |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{:?}", err);
        assert!(!registry.is_open("roads"));
    }

    #[test]
    fn test_query_errors_carry_context() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let err = registry
            .with_connection("layer", "bogus select", |conn| conn.execute("SELECT * FROM nowhere", []))
            .unwrap_err();
        match err {
            Error::Query { layer, operation, .. } => {
                assert_eq!(layer, "layer");
                assert_eq!(operation, "bogus select");
            }
            other => panic!("unexpected error: {other}"),
        }
        // A plain statement error keeps the handle
        assert!(registry.is_open("layer"));
    }

    #[test]
    fn test_release_all_closes_everything() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        for layer in ["a", "b", "c"] {
            mark_connection(&registry, layer);
        }
        assert_eq!(registry.open_count(), 3);

        registry.release_all();
        assert_eq!(registry.open_count(), 0);
        assert!(!has_marker(&registry, "a"));
    }

    #[test]
    fn test_concurrent_first_access_creates_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    registry
                        .with_connection("shared", "noop", |conn| conn.query_row("SELECT 1", [], |_| Ok(())))
                        .unwrap();
                });
            }
        });

        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.layout().list_stems().unwrap(), vec!["shared"]);
    }

    #[test]
    fn test_other_layers_not_blocked_by_held_layer() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::scope(|s| {
            let registry = &registry;
            s.spawn(move || {
                registry
                    .with_connection("slow", "hold", |_| {
                        // Held until the other layer finished
                        rx.recv_timeout(Duration::from_secs(10)).ok();
                        Ok(())
                    })
                    .unwrap();
            });

            registry.with_connection("fast", "noop", |_| Ok(())).unwrap();
            tx.send(()).unwrap();
        });
    }

    #[test]
    fn test_exclusive_pair_same_stem() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let same = registry
            .with_layers_exclusive("a:b", "a_b", |first, second| Ok(first == second))
            .unwrap();
        assert!(same);
    }
}

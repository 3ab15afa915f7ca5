//! Tile rows of a layer store

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};
use crate::listener::ListenerList;
use crate::tile::{TileKey, TileRange, TileRecord};
use crate::{Error, Result};
use super::registry::ConnectionRegistry;

const KEY_PREDICATE: &str = "grid_set_id = ?1 AND x = ?2 AND y = ?3 AND z = ?4 AND type = ?5";

/// Tile CRUD over the registry's per-layer connections
pub struct TileRepository<'a> {
    registry: &'a ConnectionRegistry,
    listeners: &'a ListenerList,
}

impl<'a> TileRepository<'a> {
    pub fn new(registry: &'a ConnectionRegistry, listeners: &'a ListenerList) -> Self {
        Self { registry, listeners }
    }

    /// Fetch a tile; `None` if the layer has no such row.
    ///
    /// A row whose `data` is NULL carries no tile and is reported as `None`.
    pub fn get(&self, key: &TileKey) -> Result<Option<TileRecord>> {
        let sql = format!("SELECT data FROM tiles WHERE {} LIMIT 1", KEY_PREDICATE);
        let data: Option<Option<Vec<u8>>> = self.registry.with_connection(&key.layer_name, "get tile", |conn| {
            conn.query_row(&sql, key_params(key), |row| row.get(0)).optional()
        })?;

        Ok(data.flatten().map(|data| TileRecord::new(key.clone(), data)))
    }

    /// Insert or replace the tile's blob.
    ///
    /// Lookup and write run in one immediate transaction, so the row for the
    /// key is replaced atomically and never duplicated.
    pub fn put(&self, key: &TileKey, blob: &[u8]) -> Result<()> {
        let c = &key.coordinate;
        let old_size = self.registry.with_connection(&key.layer_name, "put tile", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // NULL data counts as an existing row of size 0
            let old_size: Option<i64> = tx
                .query_row(
                    &format!("SELECT COALESCE(length(data), 0) FROM tiles WHERE {} LIMIT 1", KEY_PREDICATE),
                    key_params(key),
                    |row| row.get(0),
                )
                .optional()?;

            if old_size.is_some() {
                tx.execute(
                    &format!("UPDATE tiles SET data = ?6 WHERE {}", KEY_PREDICATE),
                    params![key.grid_set_id, c.x, c.y, c.z, key.format, blob],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO tiles (grid_set_id, x, y, z, type, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![key.grid_set_id, c.x, c.y, c.z, key.format, blob],
                )?;
            }
            tx.commit()?;
            Ok(old_size)
        })?;

        match old_size {
            Some(old) => self.listeners.send_tile_updated(key, blob.len(), old.max(0) as usize),
            None => self.listeners.send_tile_stored(key, blob.len()),
        }
        Ok(())
    }

    /// Remove a tile; returns whether a row existed
    pub fn delete(&self, key: &TileKey) -> Result<bool> {
        debug!("Deleting tile {}", key);
        let removed = self.registry.with_connection(&key.layer_name, "delete tile", |conn| {
            conn.execute(&format!("DELETE FROM tiles WHERE {}", KEY_PREDICATE), key_params(key))
        })?;

        if removed > 0 {
            self.listeners.send_tile_deleted(key);
        }
        Ok(removed > 0)
    }

    /// Remove every tile of a grid set in the layer; returns the number of rows removed
    pub fn delete_by_grid_set(&self, layer_name: &str, grid_set_id: &str) -> Result<usize> {
        info!("Deleting SQLite cached layer {}; {}", layer_name, grid_set_id);
        let removed = self.registry.with_connection(layer_name, "delete grid set", |conn| {
            conn.execute("DELETE FROM tiles WHERE grid_set_id = ?1", [grid_set_id])
        })?;

        if removed > 0 {
            self.listeners.send_grid_set_deleted(layer_name, grid_set_id);
        }
        Ok(removed)
    }

    /// Range deletion is not supported by this store
    pub fn delete_range(&self, range: &TileRange) -> Result<usize> {
        debug!(
            "Refusing range delete on layer {} (zoom {}..={})",
            range.layer_name, range.zoom_start, range.zoom_stop
        );
        Err(Error::NotImplemented("tile range delete"))
    }

    /// Number of tile rows in the layer
    pub fn count(&self, layer_name: &str) -> Result<usize> {
        let count: i64 = self.registry.with_connection(layer_name, "count tiles", |conn| {
            conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }

    /// Total blob bytes stored in the layer
    pub fn total_bytes(&self, layer_name: &str) -> Result<u64> {
        let bytes: i64 = self.registry.with_connection(layer_name, "sum tile sizes", |conn| {
            conn.query_row("SELECT COALESCE(SUM(length(data)), 0) FROM tiles", [], |row| row.get(0))
        })?;
        Ok(bytes.max(0) as u64)
    }
}

fn key_params(key: &TileKey) -> (&str, i64, i64, i64, &str) {
    let c = &key.coordinate;
    (key.grid_set_id.as_str(), c.x, c.y, c.z, key.format.as_str())
}

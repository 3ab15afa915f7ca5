//! SQLite blob store: the store instance and its capability surface

use std::collections::HashMap;
use std::sync::Arc;
use rusqlite::Connection;
use tracing::info;
use crate::config::{self, TileStoreConfig};
use crate::listener::{BlobStoreListener, ListenerList};
use crate::storage::{ConnectionRegistry, LayerLifecycle, LayerMetadataStore, StorageLayout, TileRepository};
use crate::tile::{TileKey, TileRange, TileRecord};
use crate::{Error, Result};

/// Generic tile blob store contract.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &TileKey) -> Result<Option<TileRecord>>;

    fn put(&self, key: &TileKey, blob: &[u8]) -> Result<()>;

    fn delete(&self, key: &TileKey) -> Result<bool>;

    fn delete_by_grid_set(&self, layer_name: &str, grid_set_id: &str) -> Result<usize>;

    fn delete_range(&self, range: &TileRange) -> Result<usize>;

    fn delete_layer(&self, layer_name: &str) -> Result<bool>;

    fn rename_layer(&self, old_name: &str, new_name: &str) -> Result<bool>;

    fn get_layer_metadata(&self, layer_name: &str, key: &str) -> Result<Option<String>>;

    fn put_layer_metadata(&self, layer_name: &str, key: &str, value: &str) -> Result<()>;

    fn layer_metadata(&self, layer_name: &str) -> Result<HashMap<String, String>>;

    fn add_listener(&self, listener: Arc<dyn BlobStoreListener>);

    fn remove_listener(&self, listener: &Arc<dyn BlobStoreListener>) -> bool;

    /// Remove everything in the store
    fn clear(&self) -> Result<()>;

    /// Release every resource held by the store
    fn destroy(&self);
}

/// Blob store keeping one SQLite database file per layer under a root directory
pub struct SqliteBlobStore {
    config: TileStoreConfig,
    registry: ConnectionRegistry,
    listeners: ListenerList,
}

impl SqliteBlobStore {
    /// Open a store over `config.root`, creating the directory if needed
    pub fn open(config: TileStoreConfig) -> Result<Self> {
        check_engine()?;
        config::ensure_root_dir(&config.root)?;
        if config.extension.is_empty() || config.extension.contains(['/', '\\', '.']) {
            return Err(Error::Config(format!("invalid store file extension '{}'", config.extension)));
        }

        let layout = StorageLayout::new(&config.root, &config.extension);
        let registry = ConnectionRegistry::new(layout, config.busy_timeout());
        info!("Configured SqliteBlobStore with path {}", config.root.display());

        Ok(Self {
            config,
            registry,
            listeners: ListenerList::new(),
        })
    }

    /// Open a store with default settings
    pub fn new(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(TileStoreConfig::new(root))
    }

    pub fn config(&self) -> &TileStoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn tiles(&self) -> TileRepository<'_> {
        TileRepository::new(&self.registry, &self.listeners)
    }

    pub fn metadata(&self) -> LayerMetadataStore<'_> {
        LayerMetadataStore::new(&self.registry, self.config.metadata_reads)
    }

    pub fn lifecycle(&self) -> LayerLifecycle<'_> {
        LayerLifecycle::new(&self.registry, &self.listeners)
    }

    /// File stems of every layer store under the root
    pub fn layers(&self) -> Result<Vec<String>> {
        self.registry
            .layout()
            .list_stems()
            .map_err(|e| Error::io("*", "list layers", e))
    }

    /// Get store statistics for one layer
    pub fn stats(&self, layer_name: &str) -> Result<LayerStats> {
        let tiles = self.tiles();
        let path = self.registry.layout().layer_path(layer_name);
        let tile_count = tiles.count(layer_name)?;
        let tile_bytes = tiles.total_bytes(layer_name)?;
        let metadata_entries = self.metadata().get_all(layer_name)?.len();
        let file_bytes = std::fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| Error::io(layer_name, "stat store", e))?;

        Ok(LayerStats {
            layer: layer_name.to_string(),
            path: path.display().to_string(),
            tile_count,
            tile_bytes,
            metadata_entries,
            file_bytes,
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &TileKey) -> Result<Option<TileRecord>> {
        self.tiles().get(key)
    }

    fn put(&self, key: &TileKey, blob: &[u8]) -> Result<()> {
        self.tiles().put(key, blob)
    }

    fn delete(&self, key: &TileKey) -> Result<bool> {
        self.tiles().delete(key)
    }

    fn delete_by_grid_set(&self, layer_name: &str, grid_set_id: &str) -> Result<usize> {
        self.tiles().delete_by_grid_set(layer_name, grid_set_id)
    }

    fn delete_range(&self, range: &TileRange) -> Result<usize> {
        self.tiles().delete_range(range)
    }

    fn delete_layer(&self, layer_name: &str) -> Result<bool> {
        self.lifecycle().delete_layer(layer_name)
    }

    fn rename_layer(&self, old_name: &str, new_name: &str) -> Result<bool> {
        self.lifecycle().rename_layer(old_name, new_name)
    }

    fn get_layer_metadata(&self, layer_name: &str, key: &str) -> Result<Option<String>> {
        self.metadata().get(layer_name, key)
    }

    fn put_layer_metadata(&self, layer_name: &str, key: &str, value: &str) -> Result<()> {
        self.metadata().put(layer_name, key, value)
    }

    fn layer_metadata(&self, layer_name: &str) -> Result<HashMap<String, String>> {
        self.metadata().get_all(layer_name)
    }

    fn add_listener(&self, listener: Arc<dyn BlobStoreListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn BlobStoreListener>) -> bool {
        self.listeners.remove(listener)
    }

    fn clear(&self) -> Result<()> {
        Err(Error::NotImplemented("blob store clear"))
    }

    fn destroy(&self) {
        info!("Closing SqliteBlobStore connections.");
        self.registry.release_all();
    }
}

/// Fail fast when the SQLite engine cannot be used at all
fn check_engine() -> Result<()> {
    let conn = Connection::open_in_memory()
        .map_err(|e| Error::EngineUnavailable(e.to_string()))?;
    conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
        .map_err(|e| Error::EngineUnavailable(e.to_string()))?;
    Ok(())
}

/// Layer store statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerStats {
    pub layer: String,
    pub path: String,
    pub tile_count: usize,
    pub tile_bytes: u64,
    pub metadata_entries: usize,
    pub file_bytes: u64,
}

impl std::fmt::Display for LayerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Layer Statistics ({}):", self.layer)?;
        writeln!(f, "  File: {}", self.path)?;
        writeln!(f, "  Tiles: {}", self.tile_count)?;
        writeln!(f, "  Tile bytes: {}", self.tile_bytes)?;
        writeln!(f, "  Metadata entries: {}", self.metadata_entries)?;
        writeln!(f, "  File bytes: {}", self.file_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataReadPolicy;
    use crate::tile::TileCoordinate;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache").join("sqlite");
        let store = SqliteBlobStore::new(&root).unwrap();
        assert!(root.is_dir());
        assert!(store.layers().unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(SqliteBlobStore::new(&file), Err(Error::InvalidRoot { .. })));
    }

    #[test]
    fn test_open_rejects_bad_extension() {
        let dir = TempDir::new().unwrap();
        let mut config = TileStoreConfig::new(dir.path());
        config.extension = "../db".to_string();
        assert!(matches!(SqliteBlobStore::open(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_clear_not_implemented() {
        let dir = TempDir::new().unwrap();
        let store = SqliteBlobStore::new(dir.path()).unwrap();
        assert!(store.clear().unwrap_err().is_not_implemented());
    }

    #[test]
    fn test_destroy_then_reuse() {
        let dir = TempDir::new().unwrap();
        let store = SqliteBlobStore::new(dir.path()).unwrap();
        let key = TileKey::new("l", "g", "png", TileCoordinate::new(0, 0, 0));
        store.put(&key, b"tile").unwrap();

        store.destroy();
        assert_eq!(store.registry().open_count(), 0);
        assert_eq!(store.get(&key).unwrap().unwrap().data(), b"tile");
    }

    #[test]
    fn test_stats_and_layers() {
        let dir = TempDir::new().unwrap();
        let store = SqliteBlobStore::open(
            TileStoreConfig::new(dir.path()).with_metadata_reads(MetadataReadPolicy::Strict),
        )
        .unwrap();
        store.put(&TileKey::new("topp:states", "g", "png", TileCoordinate::new(0, 0, 0)), b"abc").unwrap();
        store.put_layer_metadata("topp:states", "bbox", "0,0,1,1").unwrap();

        let stats = store.stats("topp:states").unwrap();
        assert_eq!(stats.tile_count, 1);
        assert_eq!(stats.tile_bytes, 3);
        assert_eq!(stats.metadata_entries, 1);
        assert!(stats.file_bytes > 0);
        assert_eq!(store.layers().unwrap(), vec!["topp_states"]);
    }
}

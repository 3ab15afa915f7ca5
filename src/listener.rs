//! Store event notifications
//!
//! Listeners are called synchronously, on the thread that performed the
//! storage operation, in registration order. Delivery is best-effort: a
//! listener error is logged and never undoes the operation that triggered it.

use std::sync::Arc;
use parking_lot::RwLock;
use tracing::warn;
use crate::tile::TileKey;

/// Receiver of blob store events.
///
/// Only `tile_stored` and `tile_deleted` are required; the other events have
/// no-op defaults, and `tile_updated` forwards to `tile_stored`.
pub trait BlobStoreListener: Send + Sync {
    /// A tile was written; `size` is the blob length in bytes
    fn tile_stored(&self, key: &TileKey, size: usize) -> anyhow::Result<()>;

    /// A tile row was removed
    fn tile_deleted(&self, key: &TileKey) -> anyhow::Result<()>;

    /// A tile was written over an existing row
    fn tile_updated(&self, key: &TileKey, size: usize, _old_size: usize) -> anyhow::Result<()> {
        self.tile_stored(key, size)
    }

    fn grid_set_deleted(&self, _layer_name: &str, _grid_set_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn layer_deleted(&self, _layer_name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn layer_renamed(&self, _old_name: &str, _new_name: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Registered listeners of one store instance
#[derive(Default)]
pub struct ListenerList {
    listeners: RwLock<Vec<Arc<dyn BlobStoreListener>>>,
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn BlobStoreListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener previously added, compared by identity
    pub fn remove(&self, listener: &Arc<dyn BlobStoreListener>) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn send_tile_stored(&self, key: &TileKey, size: usize) {
        self.dispatch("tile_stored", |l| l.tile_stored(key, size));
    }

    pub fn send_tile_updated(&self, key: &TileKey, size: usize, old_size: usize) {
        self.dispatch("tile_updated", |l| l.tile_updated(key, size, old_size));
    }

    pub fn send_tile_deleted(&self, key: &TileKey) {
        self.dispatch("tile_deleted", |l| l.tile_deleted(key));
    }

    pub fn send_grid_set_deleted(&self, layer_name: &str, grid_set_id: &str) {
        self.dispatch("grid_set_deleted", |l| l.grid_set_deleted(layer_name, grid_set_id));
    }

    pub fn send_layer_deleted(&self, layer_name: &str) {
        self.dispatch("layer_deleted", |l| l.layer_deleted(layer_name));
    }

    pub fn send_layer_renamed(&self, old_name: &str, new_name: &str) {
        self.dispatch("layer_renamed", |l| l.layer_renamed(old_name, new_name));
    }

    fn dispatch<F>(&self, event: &str, f: F)
    where
        F: Fn(&dyn BlobStoreListener) -> anyhow::Result<()>,
    {
        // Snapshot so listeners may add/remove listeners without deadlocking
        let listeners: Vec<Arc<dyn BlobStoreListener>> = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = f(listener.as_ref()) {
                warn!("Listener failed handling {} event: {:#}", event, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoordinate;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl BlobStoreListener for Recorder {
        fn tile_stored(&self, key: &TileKey, size: usize) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}:stored:{}:{}", self.name, key, size));
            if self.fail {
                anyhow::bail!("listener {} refuses", self.name);
            }
            Ok(())
        }

        fn tile_deleted(&self, key: &TileKey) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}:deleted:{}", self.name, key));
            Ok(())
        }
    }

    fn key() -> TileKey {
        TileKey::new("l", "g", "png", TileCoordinate::new(1, 2, 3))
    }

    #[test]
    fn test_registration_order_and_failure_isolation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = ListenerList::new();
        list.add(Arc::new(Recorder { name: "first", log: log.clone(), fail: true }));
        list.add(Arc::new(Recorder { name: "second", log: log.clone(), fail: false }));

        list.send_tile_stored(&key(), 7);

        assert_eq!(
            *log.lock(),
            vec!["first:stored:l/g/3/1/2.png:7", "second:stored:l/g/3/1/2.png:7"]
        );
    }

    #[test]
    fn test_updated_defaults_to_stored() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = ListenerList::new();
        list.add(Arc::new(Recorder { name: "r", log: log.clone(), fail: false }));

        list.send_tile_updated(&key(), 10, 4);
        list.send_layer_deleted("l");

        assert_eq!(*log.lock(), vec!["r:stored:l/g/3/1/2.png:10"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = ListenerList::new();
        let a: Arc<dyn BlobStoreListener> = Arc::new(Recorder { name: "a", log: log.clone(), fail: false });
        let b: Arc<dyn BlobStoreListener> = Arc::new(Recorder { name: "b", log: log.clone(), fail: false });
        list.add(a.clone());
        list.add(b.clone());

        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert_eq!(list.len(), 1);

        list.send_tile_deleted(&key());
        assert_eq!(*log.lock(), vec!["b:deleted:l/g/3/1/2.png"]);
    }
}

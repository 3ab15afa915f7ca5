//! Whole-layer operations: delete and rename of the backing store file

use std::io::ErrorKind;
use tracing::{info, warn};
use crate::listener::ListenerList;
use crate::{Error, Result};
use super::registry::ConnectionRegistry;

pub struct LayerLifecycle<'a> {
    registry: &'a ConnectionRegistry,
    listeners: &'a ListenerList,
}

impl<'a> LayerLifecycle<'a> {
    pub fn new(registry: &'a ConnectionRegistry, listeners: &'a ListenerList) -> Self {
        Self { registry, listeners }
    }

    /// Remove the layer's store file; returns whether it existed.
    ///
    /// The cached handle is closed first. The next access recreates an empty store.
    pub fn delete_layer(&self, layer_name: &str) -> Result<bool> {
        info!("Deleting SQLite cached layer {}", layer_name);
        let removed = self.registry.with_layer_exclusive(layer_name, |path| {
            let removed = match std::fs::remove_file(path) {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(Error::io(layer_name, "delete layer", e)),
            };

            for sidecar in self.registry.layout().sidecar_paths(layer_name) {
                match std::fs::remove_file(&sidecar) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove {}: {}", sidecar.display(), e),
                }
            }
            Ok(removed)
        })?;

        if removed {
            self.listeners.send_layer_deleted(layer_name);
        }
        Ok(removed)
    }

    /// Rename the layer's store file.
    ///
    /// Returns `false` when no store exists under `old_name`. Fails with
    /// [`Error::TargetExists`] if a store already exists under `new_name`.
    pub fn rename_layer(&self, old_name: &str, new_name: &str) -> Result<bool> {
        info!("Renaming SQLite cached layer {} to {}", old_name, new_name);
        let renamed = self.registry.with_layers_exclusive(old_name, new_name, |from, to| {
            if to.exists() {
                return Err(Error::TargetExists {
                    from: old_name.to_string(),
                    to: new_name.to_string(),
                });
            }
            if !from.exists() {
                return Ok(false);
            }
            std::fs::rename(from, to).map_err(|e| Error::io(old_name, "rename layer", e))?;
            Ok(true)
        })?;

        if renamed {
            self.listeners.send_layer_renamed(old_name, new_name);
        }
        Ok(renamed)
    }
}

//! Per-layer key/value metadata stored in the `meta` table

use std::collections::HashMap;
use rusqlite::{OptionalExtension, TransactionBehavior};
use tracing::warn;
use crate::config::MetadataReadPolicy;
use crate::Result;
use super::registry::ConnectionRegistry;

pub struct LayerMetadataStore<'a> {
    registry: &'a ConnectionRegistry,
    read_policy: MetadataReadPolicy,
}

impl<'a> LayerMetadataStore<'a> {
    pub fn new(registry: &'a ConnectionRegistry, read_policy: MetadataReadPolicy) -> Self {
        Self { registry, read_policy }
    }

    /// Look up one metadata value.
    ///
    /// Under [`MetadataReadPolicy::Lenient`] a storage failure is logged and
    /// reported as `None`; callers that must tell "no value" from "store
    /// unavailable" configure [`MetadataReadPolicy::Strict`].
    pub fn get(&self, layer_name: &str, key: &str) -> Result<Option<String>> {
        let result = self.registry.with_connection(layer_name, "get metadata", |conn| {
            conn.query_row("SELECT value FROM meta WHERE key = ?1 LIMIT 1", [key], |row| row.get(0))
                .optional()
        });
        self.degrade(layer_name, result, None)
    }

    /// Insert or replace a metadata value
    pub fn put(&self, layer_name: &str, key: &str, value: &str) -> Result<()> {
        self.registry.with_connection(layer_name, "put metadata", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx.execute("UPDATE meta SET value = ?2 WHERE key = ?1", [key, value])?;
            if updated == 0 {
                tx.execute("INSERT INTO meta (key, value) VALUES (?1, ?2)", [key, value])?;
            }
            tx.commit()
        })
    }

    /// Every metadata entry of the layer
    pub fn get_all(&self, layer_name: &str) -> Result<HashMap<String, String>> {
        let result = self.registry.with_connection(layer_name, "list metadata", |conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM meta")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;

            let mut entries = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                entries.insert(key, value.unwrap_or_default());
            }
            Ok(entries)
        });
        self.degrade(layer_name, result, HashMap::new())
    }

    fn degrade<T>(&self, layer_name: &str, result: Result<T>, fallback: T) -> Result<T> {
        match (result, self.read_policy) {
            (Ok(value), _) => Ok(value),
            (Err(e), MetadataReadPolicy::Lenient) => {
                warn!("Metadata read on layer {} failed, treating as absent: {}", layer_name, e);
                Ok(fallback)
            }
            (Err(e), MetadataReadPolicy::Strict) => Err(e),
        }
    }
}

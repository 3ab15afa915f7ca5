use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How metadata reads react to storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataReadPolicy {
    /// A failed metadata read is logged and reported as "no value".
    #[default]
    Lenient,
    /// A failed metadata read is returned to the caller.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileStoreConfig {
    /// Directory holding one database file per layer
    pub root: PathBuf,
    /// File extension of the per-layer databases
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub metadata_reads: MetadataReadPolicy,
}

fn default_extension() -> String {
    "sqlite".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl TileStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: default_extension(),
            busy_timeout_ms: default_busy_timeout_ms(),
            metadata_reads: MetadataReadPolicy::default(),
        }
    }

    pub fn with_metadata_reads(mut self, policy: MetadataReadPolicy) -> Self {
        self.metadata_reads = policy;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tilestore.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<TileStoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: TileStoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &TileStoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the storage root if missing; reject a root that is not a directory.
pub fn ensure_root_dir(root: &Path) -> crate::Result<()> {
    if root.as_os_str().is_empty() {
        return Err(crate::Error::InvalidRoot {
            path: root.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }
    if root.exists() {
        if !root.is_dir() {
            return Err(crate::Error::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        return Ok(());
    }
    std::fs::create_dir_all(root).map_err(|e| crate::Error::InvalidRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: TileStoreConfig = toml::from_str(r#"root = "/var/cache/tiles""#).unwrap();
        assert_eq!(config.root, PathBuf::from("/var/cache/tiles"));
        assert_eq!(config.extension, "sqlite");
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.metadata_reads, MetadataReadPolicy::Lenient);
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tilestore.toml");
        let config = TileStoreConfig::new(dir.path().join("cache"))
            .with_metadata_reads(MetadataReadPolicy::Strict);

        write_config(&path, &config, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);

        // Refuses to clobber without force
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_ensure_root_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_root_dir(&nested).unwrap();
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(ensure_root_dir(&file), Err(crate::Error::InvalidRoot { .. })));
    }
}

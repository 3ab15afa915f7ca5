//! On-disk layout: one database file per layer under the storage root

use std::path::{Path, PathBuf};

/// Sidecar suffixes SQLite may leave next to a database file
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    extension: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name stem for a layer; two layer names with the same stem share a store
    pub fn file_stem(&self, layer_name: &str) -> String {
        sanitize_layer_name(layer_name)
    }

    /// Full path of the layer's database file
    pub fn layer_path(&self, layer_name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", self.file_stem(layer_name), self.extension))
    }

    /// Journal/WAL files belonging to the layer's database
    pub fn sidecar_paths(&self, layer_name: &str) -> Vec<PathBuf> {
        let main = self.layer_path(layer_name);
        SIDECAR_SUFFIXES
            .iter()
            .map(|suffix| {
                let mut name = main.as_os_str().to_os_string();
                name.push(suffix);
                PathBuf::from(name)
            })
            .collect()
    }

    /// Layer file stems currently present under the root, sorted
    pub fn list_stems(&self) -> std::io::Result<Vec<String>> {
        let mut stems = Vec::new();
        if !self.root.exists() {
            return Ok(stems);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }
}

/// Replace every character that is unsafe in a file name with `_`.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; a leading `.` is replaced so
/// layer files are never hidden, and an empty name maps to `_`.
pub fn sanitize_layer_name(layer_name: &str) -> String {
    let mut out: String = layer_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_layer_name("topp:states"), "topp_states");
        assert_eq!(sanitize_layer_name("roads v2"), "roads_v2");
        assert_eq!(sanitize_layer_name("../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_layer_name(".hidden"), "_hidden");
        assert_eq!(sanitize_layer_name(""), "_");
        assert_eq!(sanitize_layer_name("basemap-1.0_x"), "basemap-1.0_x");
        assert_eq!(sanitize_layer_name("città"), "citt_");
    }

    #[test]
    fn test_layer_path() {
        let layout = StorageLayout::new("/cache", "sqlite");
        assert_eq!(layout.layer_path("topp:states"), PathBuf::from("/cache/topp_states.sqlite"));
        assert_eq!(
            layout.sidecar_paths("a")[0],
            PathBuf::from("/cache/a.sqlite-journal")
        );
    }

    #[test]
    fn test_list_stems() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "sqlite");
        std::fs::write(dir.path().join("b.sqlite"), b"").unwrap();
        std::fs::write(dir.path().join("a.sqlite"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(layout.list_stems().unwrap(), vec!["a", "b"]);
    }
}

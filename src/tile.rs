//! Tile identity and payload types
//!
//! Textual key format: `<layer>/<grid_set_id>/<z>/<x>/<y>.<format>`
//!
//! Examples:
//! - `topp:states/EPSG:4326/3/4/2.png`
//! - `basemap/EPSG:900913/12/2048/1361.jpeg`
//!
//! The key is parsed from the right, so layer names may themselves contain `/`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Column/row/zoom position of a tile inside a grid set.
///
/// No bounds are enforced here; the grid set decides what is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl TileCoordinate {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Identifies one cached tile.
///
/// Within a layer's store there is at most one row per
/// `(grid_set_id, x, y, z, format)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    /// Layer the tile belongs to; selects the backing store file
    pub layer_name: String,
    /// Tiling scheme identifier, e.g. `EPSG:4326`
    pub grid_set_id: String,
    /// Blob format, e.g. `png`, `jpeg`, `pbf`
    pub format: String,
    pub coordinate: TileCoordinate,
}

impl TileKey {
    /// Create a new TileKey
    pub fn new(
        layer_name: impl Into<String>,
        grid_set_id: impl Into<String>,
        format: impl Into<String>,
        coordinate: TileCoordinate,
    ) -> Self {
        Self {
            layer_name: layer_name.into(),
            grid_set_id: grid_set_id.into(),
            format: format.into(),
            coordinate,
        }
    }

    /// Parse a key string
    ///
    /// Expected format: `<layer>/<grid_set_id>/<z>/<x>/<y>.<format>`
    pub fn parse(key: &str) -> Result<Self> {
        let (rest, last) = key
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidKey(format!("{}: missing path segments", key)))?;

        let (y_str, format) = last
            .split_once('.')
            .ok_or_else(|| Error::InvalidKey(format!("{}: last segment must be <y>.<format>", key)))?;

        let (rest, x_str) = rest
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidKey(format!("{}: missing x segment", key)))?;

        let (rest, z_str) = rest
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidKey(format!("{}: missing z segment", key)))?;

        let (layer, grid_set_id) = rest
            .rsplit_once('/')
            .ok_or_else(|| Error::InvalidKey(format!("{}: missing layer or grid set", key)))?;

        if layer.is_empty() || grid_set_id.is_empty() || format.is_empty() {
            return Err(Error::InvalidKey(format!("{}: empty component", key)));
        }

        let parse_ordinate = |name: &str, value: &str| -> Result<i64> {
            value
                .parse()
                .map_err(|_| Error::InvalidKey(format!("{}: invalid {} '{}'", key, name, value)))
        };

        let coordinate = TileCoordinate::new(
            parse_ordinate("x", x_str)?,
            parse_ordinate("y", y_str)?,
            parse_ordinate("z", z_str)?,
        );

        Ok(Self::new(layer, grid_set_id, format, coordinate))
    }

    /// Convert to the textual key form
    pub fn to_key_string(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}.{}",
            self.layer_name,
            self.grid_set_id,
            self.coordinate.z,
            self.coordinate.x,
            self.coordinate.y,
            self.format
        )
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key_string())
    }
}

impl FromStr for TileKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A tile read back from a layer store.
///
/// Size and timestamp are derived from the stored row and cannot be set
/// independently of it.
#[derive(Debug, Clone)]
pub struct TileRecord {
    key: TileKey,
    data: Vec<u8>,
    created: SystemTime,
}

impl TileRecord {
    pub(crate) fn new(key: TileKey, data: Vec<u8>) -> Self {
        Self {
            key,
            data,
            created: SystemTime::now(),
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Blob length in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Timestamp of the blob as handed out by the store.
    ///
    /// The schema carries no time column, so this is the moment the row was read.
    pub fn created(&self) -> SystemTime {
        self.created
    }
}

/// A set of tiles of one layer, grid set and format over a zoom interval,
/// optionally restricted to `[min_x, min_y, max_x, max_y]` at every level.
///
/// Range deletion is not supported by the SQLite store; the type exists so the
/// capability surface stays complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub layer_name: String,
    pub grid_set_id: String,
    pub format: String,
    pub zoom_start: i64,
    pub zoom_stop: i64,
    pub bounds: Option<[i64; 4]>,
}

impl TileRange {
    pub fn new(
        layer_name: impl Into<String>,
        grid_set_id: impl Into<String>,
        format: impl Into<String>,
        zoom_start: i64,
        zoom_stop: i64,
    ) -> Self {
        Self {
            layer_name: layer_name.into(),
            grid_set_id: grid_set_id.into(),
            format: format.into(),
            zoom_start,
            zoom_stop,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        self.bounds = Some([min_x, min_y, max_x, max_y]);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let key = TileKey::new("topp:states", "EPSG:4326", "png", TileCoordinate::new(4, 2, 3));
        let key_str = key.to_key_string();
        assert_eq!(key_str, "topp:states/EPSG:4326/3/4/2.png");

        let parsed = TileKey::parse(&key_str).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_key_parse_layer_with_slash() {
        let key: TileKey = "workspace/roads/EPSG:900913/12/2048/1361.jpeg".parse().unwrap();
        assert_eq!(key.layer_name, "workspace/roads");
        assert_eq!(key.grid_set_id, "EPSG:900913");
        assert_eq!(key.format, "jpeg");
        assert_eq!(key.coordinate, TileCoordinate::new(2048, 1361, 12));
    }

    #[test]
    fn test_key_parse_negative_ordinates() {
        let key = TileKey::parse("layer/g/0/-1/-2.png").unwrap();
        assert_eq!(key.coordinate, TileCoordinate::new(-1, -2, 0));
    }

    #[test]
    fn test_invalid_key() {
        assert!(TileKey::parse("invalid").is_err());
        assert!(TileKey::parse("layer/g/1/2/3").is_err()); // missing format
        assert!(TileKey::parse("g/1/2/3.png").is_err()); // missing layer
        assert!(TileKey::parse("layer/g/z/2/3.png").is_err());
        assert!(TileKey::parse("/g/1/2/3.png").is_err());
    }

    #[test]
    fn test_record_size_is_derived() {
        let key = TileKey::new("l", "g", "png", TileCoordinate::new(0, 0, 0));
        let record = TileRecord::new(key, vec![1, 2, 3, 4, 5]);
        assert_eq!(record.size(), 5);
        assert_eq!(record.data(), &[1, 2, 3, 4, 5]);
    }
}
